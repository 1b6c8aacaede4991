//! 单次运行控制器 - 编排层
//!
//! 严格按顺序执行各阶段：
//!
//! ```text
//! 过滤 → 分组 → 分组审核循环 → 标注 → 标签审核循环 → 最终规则与配额 → 报告
//! ```
//!
//! 每个阶段的输出校验通过后才进入下一阶段；取消只在阶段边界生效。
//! 当前分组/标签状态只由控制器持有。

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RunParams;
use crate::error::AppResult;
use crate::infrastructure::gateway::GenerationGateway;
use crate::models::document::DocumentSet;
use crate::models::group::{GroupSet, GroupStatus};
use crate::models::label::LabelSet;
use crate::models::report::{
    FilterRemoval, GroupHistoryEntry, LoopTrace, QuotaDowngrade, Report, ReportEntry, RunStatus,
};
use crate::models::task::TaskInput;
use crate::services::brief::QueryBrief;
use crate::services::criteria;
use crate::services::{FilterService, GroupingService, LabelingService, QuotaEngine};
use crate::utils::logging;
use crate::workflow::{CancelToken, GroupReviewCycle, LabelReviewCycle, ReviewLoop, RunCtx};

pub struct WorkflowController {
    params: RunParams,
    filter: FilterService,
    grouping: GroupingService,
    labeling: LabelingService,
    cancel: CancelToken,
}

impl WorkflowController {
    pub fn new(gateway: Arc<dyn GenerationGateway>, params: RunParams, cancel: CancelToken) -> Self {
        Self {
            filter: FilterService::new(gateway.clone(), params.filter_batch_size),
            grouping: GroupingService::new(gateway.clone(), params.min_group_size, params.max_group_size),
            labeling: LabelingService::new(gateway, params.max_concurrent_groups),
            params,
            cancel,
        }
    }

    pub fn params(&self) -> &RunParams {
        &self.params
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub async fn run(&self, input: &TaskInput) -> AppResult<Report> {
        self.run_in(&RunCtx::single(input.task_id), input).await
    }

    /// 运行完整流程
    ///
    /// 返回错误时不会产生报告；循环耗尽不是错误
    pub async fn run_in(&self, ctx: &RunCtx, input: &TaskInput) -> AppResult<Report> {
        logging::log_run_banner(ctx, input);

        // ========== 阶段 1: 过滤 ==========
        self.cancel.check("filter")?;
        logging::log_stage(ctx, "filter");
        let brief = QueryBrief::new(
            input.query.clone(),
            input.location.clone(),
            QueryBrief::resolve_reference_year(self.params.reference_year, &input.documents),
        );
        let filtered = self.filter.filter(&input.documents, &brief).await?;
        let kept = filtered.kept;
        let kept_ids = kept.ids();
        info!(
            "{} ✓ 过滤完成: 保留 {} 个, 移除 {} 个",
            ctx,
            kept.len(),
            filtered.removed.len()
        );

        let brief = QueryBrief {
            reference_year: QueryBrief::resolve_reference_year(self.params.reference_year, &kept),
            ..brief
        };
        debug!("{} 参考年份: {}", ctx, brief.reference_year);

        // ========== 阶段 2: 分组 + 分组审核 ==========
        self.cancel.check("grouping")?;
        logging::log_stage(ctx, "grouping");
        let initial_groups = self.grouping.group(&kept, &brief).await?;
        initial_groups.verify_coverage("grouping", &kept_ids)?;

        let (groups, group_history, group_loop) = if kept.is_empty() {
            (
                initial_groups,
                Vec::new(),
                LoopTrace::skipped("group_review", self.params.max_group_review_attempts),
            )
        } else {
            self.cancel.check("group_review")?;
            logging::log_stage(ctx, "group_review");
            let mut cycle = GroupReviewCycle::new(&self.grouping, &kept, &brief, &self.params);
            let result = ReviewLoop::new(self.params.max_group_review_attempts)
                .run(&mut cycle, initial_groups)
                .await?;
            let (history, confidence) = cycle.into_history();

            let accepted = result.accepted();
            let mut groups = result.state;
            groups.verify_coverage("group_review", &kept_ids)?;
            for group in groups.groups.iter_mut() {
                group.quality = confidence.get(&group.name).copied();
                group.status = if accepted {
                    GroupStatus::Accepted
                } else {
                    GroupStatus::Rejected
                };
            }
            (groups, history, result.trace)
        };
        info!("{} ✓ 分组确定: {} 个分组 (第 {} 代)", ctx, groups.len(), groups.generation);

        // ========== 阶段 3: 标注 + 标签审核 ==========
        let quota = QuotaEngine::with_groups(
            self.params.max_relevant,
            &groups,
            self.params.default_quality,
        );
        let (labels, label_loop, mut quota_downgrades) = if kept.is_empty() {
            (
                LabelSet::default(),
                LoopTrace::skipped("label_review", self.params.max_label_review_attempts),
                Vec::new(),
            )
        } else {
            self.cancel.check("labeling")?;
            logging::log_stage(ctx, "labeling");
            let labels = self
                .labeling
                .label(&groups, &kept, &brief, &input.examples)
                .await?;
            let labels = criteria::apply_title_rule(&labels, &kept);

            self.cancel.check("label_review")?;
            logging::log_stage(ctx, "label_review");
            let mut cycle = LabelReviewCycle::new(&self.labeling, &kept, &brief, &quota);
            let result = ReviewLoop::new(self.params.max_label_review_attempts)
                .run(&mut cycle, labels)
                .await?;
            (result.state, result.trace, cycle.into_downgrades())
        };

        // ========== 阶段 4: 最终规则 + 配额（无论循环结果如何都执行） ==========
        let labels = criteria::apply_title_rule(&labels, &kept);
        let (labels, capped) = criteria::apply_caps(&labels, &kept, &brief);
        if !capped.is_empty() {
            warn!("{} 📏 最终规则上限调整 {} 个文档: {:?}", ctx, capped.len(), capped);
        }
        let outcome = quota.apply(&kept, &labels, brief.location.as_deref());
        if !outcome.downgrades.is_empty() {
            warn!("{} 📉 最终配额降级 {} 个文档", ctx, outcome.downgrades.len());
        }
        quota_downgrades.extend(outcome.downgrades);
        let labels = LabelSet::from_decisions(
            "report",
            &kept_ids,
            outcome.labels.iter().cloned().collect(),
        )?;

        let report = self.assemble(
            input,
            &brief,
            &kept,
            &groups,
            labels,
            filtered.removed,
            group_history,
            group_loop,
            label_loop,
            quota_downgrades,
        );
        logging::log_summary(ctx, &report);
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        input: &TaskInput,
        brief: &QueryBrief,
        kept: &DocumentSet,
        groups: &GroupSet,
        labels: LabelSet,
        filtered: Vec<FilterRemoval>,
        group_history: Vec<GroupHistoryEntry>,
        group_loop: LoopTrace,
        label_loop: LoopTrace,
        quota_downgrades: Vec<QuotaDowngrade>,
    ) -> Report {
        let membership = groups.membership();
        let entries = labels
            .iter()
            .filter_map(|decision| {
                let doc = kept.get(&decision.doc_id)?;
                Some(ReportEntry {
                    doc_id: decision.doc_id.clone(),
                    title: doc.title().to_string(),
                    label: decision.label,
                    reasoning: decision.reasoning.clone(),
                    confidence: decision.confidence,
                    decided_by: decision.decided_by.clone(),
                    group: membership.get(&decision.doc_id).cloned(),
                    year: doc.year(),
                    location: doc.location().map(str::to_string),
                })
            })
            .collect();

        let exhausted: Vec<String> = [&group_loop, &label_loop]
            .iter()
            .filter(|t| t.exhausted())
            .map(|t| t.name.clone())
            .collect();
        let status = if exhausted.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithExhaustion { loops: exhausted }
        };

        Report {
            task_id: input.task_id,
            query: input.query.clone(),
            location: input.location.clone(),
            generated_at: chrono::Local::now().to_rfc3339(),
            status,
            reference_year: brief.reference_year,
            entries,
            filtered,
            group_history,
            group_loop,
            label_loop,
            quota_downgrades,
            distribution: labels.distribution(),
            prelabeled: input.prelabeled.clone(),
            annotation_id: input.annotation_id,
        }
    }
}
