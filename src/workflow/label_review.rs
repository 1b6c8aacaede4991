//! 标签审核循环
//!
//! 审核 = 网关审核 + 标签一致性规则；
//! 修复 = 重新标注被标记文档 → 标题规则 → 标准上限 → 配额。
//! 每次修复后的快照都满足配额，因此循环耗尽时仍然可以直接使用。

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::models::document::DocumentSet;
use crate::models::label::LabelSet;
use crate::models::report::QuotaDowngrade;
use crate::models::review::ReviewVerdict;
use crate::services::brief::QueryBrief;
use crate::services::criteria;
use crate::services::labeling_service::LabelingService;
use crate::services::quota_engine::QuotaEngine;
use crate::workflow::review_loop::ReviewCycle;

pub struct LabelReviewCycle<'a> {
    service: &'a LabelingService,
    documents: &'a DocumentSet,
    brief: &'a QueryBrief,
    quota: &'a QuotaEngine,
    downgrades: Vec<QuotaDowngrade>,
    notes: Vec<String>,
}

impl<'a> LabelReviewCycle<'a> {
    pub fn new(
        service: &'a LabelingService,
        documents: &'a DocumentSet,
        brief: &'a QueryBrief,
        quota: &'a QuotaEngine,
    ) -> Self {
        Self {
            service,
            documents,
            brief,
            quota,
            downgrades: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// 修复过程中配额引擎做过的降级
    pub fn into_downgrades(self) -> Vec<QuotaDowngrade> {
        self.downgrades
    }
}

#[async_trait]
impl ReviewCycle for LabelReviewCycle<'_> {
    type State = LabelSet;

    fn name(&self) -> &'static str {
        "label_review"
    }

    async fn review(&mut self, labels: &LabelSet) -> AppResult<ReviewVerdict> {
        let max_relevant = self.quota.max_relevant();
        let findings = criteria::label_findings(labels, self.documents, self.brief, max_relevant);

        let verdict = match self
            .service
            .review(labels, self.documents, self.brief, max_relevant)
            .await
        {
            Ok(verdict) => verdict,
            Err(e) if e.is_malformed() => {
                warn!("⚠️ 标签审核输出无法使用，只按规则判断: {}", e);
                self.notes.push(e.to_string());
                let mut verdict = ReviewVerdict::accepted("审核输出无法使用，只按规则判断");
                verdict.rules_only = true;
                verdict
            }
            Err(e) => return Err(e),
        };

        let mut verdict = verdict.merge_rule_issues(findings.issues);
        for id in findings.flagged {
            if !verdict.flagged_doc_ids.contains(&id) {
                verdict.flagged_doc_ids.push(id);
            }
        }
        Ok(verdict)
    }

    async fn repair(&mut self, labels: &LabelSet, verdict: &ReviewVerdict) -> AppResult<LabelSet> {
        let flagged = verdict.flagged_doc_ids.clone();
        let revisions = match self
            .service
            .relabel(labels, self.documents, self.brief, verdict, &flagged)
            .await
        {
            Ok(revisions) => revisions,
            Err(e) if e.is_malformed() => {
                warn!("⚠️ 重新标注输出无法使用，只执行确定性规则: {}", e);
                self.notes.push(e.to_string());
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        info!("🔄 重新标注 {} 个文档", revisions.len());

        let revised = labels.with_updates(revisions);
        let revised = criteria::apply_title_rule(&revised, self.documents);
        let (revised, capped) = criteria::apply_caps(&revised, self.documents, self.brief);
        if !capped.is_empty() {
            info!("📏 规则上限调整 {} 个文档", capped.len());
        }

        let outcome = self
            .quota
            .apply(self.documents, &revised, self.brief.location.as_deref());
        self.downgrades.extend(outcome.downgrades);
        Ok(outcome.labels)
    }

    fn take_notes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notes)
    }
}
