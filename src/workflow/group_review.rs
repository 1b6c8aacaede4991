//! 分组审核循环
//!
//! 审核 = 网关审核 + 分组形状规则；修复 = 重新分组。
//! 网关审核输出无法解析时只按规则判断；重新分组输出无法解析时保留上一代快照。
//! 能解析但破坏覆盖的重新分组是致命错误。

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::warn;

use crate::config::RunParams;
use crate::error::AppResult;
use crate::models::document::DocumentSet;
use crate::models::group::GroupSet;
use crate::models::report::GroupHistoryEntry;
use crate::models::review::ReviewVerdict;
use crate::services::brief::QueryBrief;
use crate::services::criteria;
use crate::services::grouping_service::GroupingService;
use crate::workflow::review_loop::ReviewCycle;

pub struct GroupReviewCycle<'a> {
    service: &'a GroupingService,
    documents: &'a DocumentSet,
    brief: &'a QueryBrief,
    params: &'a RunParams,
    history: Vec<GroupHistoryEntry>,
    confidence: HashMap<String, f64>,
    notes: Vec<String>,
}

impl<'a> GroupReviewCycle<'a> {
    pub fn new(
        service: &'a GroupingService,
        documents: &'a DocumentSet,
        brief: &'a QueryBrief,
        params: &'a RunParams,
    ) -> Self {
        Self {
            service,
            documents,
            brief,
            params,
            history: Vec::new(),
            confidence: HashMap::new(),
            notes: Vec::new(),
        }
    }

    /// 每次审核过的快照及其结论
    pub fn into_history(self) -> (Vec<GroupHistoryEntry>, HashMap<String, f64>) {
        (self.history, self.confidence)
    }
}

#[async_trait]
impl ReviewCycle for GroupReviewCycle<'_> {
    type State = GroupSet;

    fn name(&self) -> &'static str {
        "group_review"
    }

    async fn review(&mut self, groups: &GroupSet) -> AppResult<ReviewVerdict> {
        let (verdict, confidence) = match self.service.review(groups, self.documents, self.brief).await {
            Ok(review) => (review.verdict, review.confidence),
            Err(e) if e.is_malformed() => {
                warn!("⚠️ 分组审核输出无法使用，只按规则判断: {}", e);
                self.notes.push(e.to_string());
                let mut verdict = ReviewVerdict::accepted("审核输出无法使用，只按规则判断");
                verdict.rules_only = true;
                (verdict, HashMap::new())
            }
            Err(e) => return Err(e),
        };

        let findings = criteria::group_findings(groups, &verdict.justified_groups, self.params);
        let verdict = verdict.merge_rule_issues(findings.issues);

        self.confidence = confidence;
        self.history.push(GroupHistoryEntry {
            generation: groups.generation,
            produced_by: if groups.generation == 0 { "grouping" } else { "regroup" }.to_string(),
            groups: groups.groups.clone(),
            verdict: Some(verdict.clone()),
        });
        Ok(verdict)
    }

    async fn repair(&mut self, groups: &GroupSet, verdict: &ReviewVerdict) -> AppResult<GroupSet> {
        match self
            .service
            .regroup(groups, self.documents, self.brief, &verdict.feedback_text())
            .await
        {
            Ok(next) => Ok(next),
            Err(e) if e.is_malformed() => {
                warn!("⚠️ 重新分组输出无法解析，保留第 {} 代分组: {}", groups.generation, e);
                self.notes.push(e.to_string());
                Ok(groups.clone())
            }
            Err(e) => Err(e),
        }
    }

    fn take_notes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notes)
    }
}
