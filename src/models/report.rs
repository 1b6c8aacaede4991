//! 运行报告（审计轨迹）

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::group::Group;
use crate::models::label::{Confidence, Label};
use crate::models::review::ReviewVerdict;

/// 被过滤阶段移除的文档
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterRemoval {
    pub doc_id: String,
    pub title: String,
    pub reason: String,
    pub confidence: Confidence,
}

/// 分组历史中的一个快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupHistoryEntry {
    pub generation: u32,
    /// grouping / regroup
    pub produced_by: String,
    pub groups: Vec<Group>,
    /// 对该快照的审核结论（未审核时为空）
    pub verdict: Option<ReviewVerdict>,
}

/// 审核循环的终止方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopTermination {
    Accepted,
    Exhausted,
}

/// 审核循环的轨迹
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopTrace {
    pub name: String,
    pub max_attempts: u32,
    /// 审核次数
    pub reviews: u32,
    /// 修复次数（计数器的最终值）
    pub repairs: u32,
    pub termination: LoopTermination,
    /// 被吸收的网关格式错误
    pub absorbed: Vec<String>,
}

impl LoopTrace {
    /// 没有运行的循环（没有可处理的文档）
    pub fn skipped(name: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            name: name.into(),
            max_attempts,
            reviews: 0,
            repairs: 0,
            termination: LoopTermination::Accepted,
            absorbed: Vec::new(),
        }
    }

    pub fn exhausted(&self) -> bool {
        self.termination == LoopTermination::Exhausted
    }
}

/// 配额引擎的一次降级
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaDowngrade {
    pub doc_id: String,
    /// 在 RELEVANT 候选中的排名（从 1 开始）
    pub rank: usize,
    pub from: Label,
    pub to: Label,
}

/// 报告中的一行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub doc_id: String,
    pub title: String,
    pub label: Label,
    pub reasoning: String,
    pub confidence: Confidence,
    pub decided_by: String,
    pub group: Option<String>,
    pub year: Option<i32>,
    pub location: Option<String>,
}

/// 完成状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Completed,
    /// 列出耗尽的循环名
    CompletedWithExhaustion { loops: Vec<String> },
}

/// 最终报告
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub task_id: u64,
    pub query: String,
    pub location: Option<String>,
    pub generated_at: String,
    pub status: RunStatus,
    pub reference_year: i32,
    /// 按输入顺序排列的标注结果
    pub entries: Vec<ReportEntry>,
    pub filtered: Vec<FilterRemoval>,
    pub group_history: Vec<GroupHistoryEntry>,
    pub group_loop: LoopTrace,
    pub label_loop: LoopTrace,
    pub quota_downgrades: Vec<QuotaDowngrade>,
    pub distribution: BTreeMap<Label, usize>,
    /// 已有标注的层级 → 文档标识符，写回时保留
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub prelabeled: BTreeMap<String, Vec<String>>,
    /// 写回目标标注
    #[serde(skip)]
    pub annotation_id: Option<u64>,
}

impl Report {
    pub fn relevant_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.label == Label::Relevant)
            .count()
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.status, RunStatus::CompletedWithExhaustion { .. })
    }

    /// 写回用的层级 → 文档标识符视图
    ///
    /// 已有标注原样保留，被过滤的文档归入 irrelevant。
    /// 已有的 relevant 与本次的 RELEVANT 合并，所以写回的 relevant
    /// 数量可能超过 `max_relevant`；配额只约束本次标注的 `entries`
    pub fn updated_annotations(&self) -> BTreeMap<String, Vec<String>> {
        let mut ranker: BTreeMap<String, Vec<String>> = Label::ALL
            .iter()
            .map(|l| (l.key().to_string(), Vec::new()))
            .collect();

        for (tier, ids) in &self.prelabeled {
            let key = Label::parse(tier)
                .map(|l| l.key().to_string())
                .unwrap_or_else(|| Label::NotSure.key().to_string());
            ranker.entry(key).or_default().extend(ids.iter().cloned());
        }
        for entry in &self.entries {
            ranker
                .entry(entry.label.key().to_string())
                .or_default()
                .push(entry.doc_id.clone());
        }
        for removal in &self.filtered {
            ranker
                .entry(Label::Irrelevant.key().to_string())
                .or_default()
                .push(removal.doc_id.clone());
        }
        ranker
    }
}

/// 一次运行的结果
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(Box<Report>),
    Aborted {
        task_id: u64,
        stage: String,
        reason: String,
    },
}

impl RunOutcome {
    pub fn task_id(&self) -> u64 {
        match self {
            RunOutcome::Completed(report) => report.task_id,
            RunOutcome::Aborted { task_id, .. } => *task_id,
        }
    }

    pub fn report(&self) -> Option<&Report> {
        match self {
            RunOutcome::Completed(report) => Some(report),
            RunOutcome::Aborted { .. } => None,
        }
    }
}
