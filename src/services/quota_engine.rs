//! 排名/配额引擎
//!
//! 纯函数：(文档, 当前标签) → 调整后的标签。
//! 当前为 RELEVANT 的文档按以下顺序排名：
//!
//! 1. 年份降序（未知年份排最后）
//! 2. 完整度降序
//! 3. 质量分降序
//! 4. 位置完全匹配优先
//! 5. 输入顺序
//!
//! 前 `max_relevant` 个保持 RELEVANT，其余降为 SOMEWHAT_RELEVANT。
//! 对自身输出再次运行不会产生任何变化。

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::document::{Document, DocumentSet, LocationMatch};
use crate::models::group::GroupSet;
use crate::models::label::{Label, LabelDecision, LabelSet};
use crate::models::report::QuotaDowngrade;
use crate::utils::text;

/// 排名用的文档评分
pub trait DocScorer: Send + Sync {
    fn score(&self, doc: &Document) -> f64;
}

/// 完整度：正文长度与结构（段落、列表、标题）的组合
pub struct ContentCompleteness {
    /// 达到满分的正文字符数
    pub full_length: usize,
    /// 达到满分的结构块数量
    pub full_blocks: usize,
}

impl Default for ContentCompleteness {
    fn default() -> Self {
        Self {
            full_length: 3000,
            full_blocks: 10,
        }
    }
}

impl DocScorer for ContentCompleteness {
    fn score(&self, doc: &Document) -> f64 {
        let length = doc.text().chars().count().min(self.full_length) as f64
            / self.full_length.max(1) as f64;
        let blocks = text::block_count(doc.content()).min(self.full_blocks) as f64
            / self.full_blocks.max(1) as f64;
        let link = if doc.has_link() { 0.1 } else { 0.0 };
        length * 0.6 + blocks * 0.3 + link
    }
}

/// 质量分：文档所在分组的审核置信度，没有时取默认值
pub struct GroupQuality {
    by_doc: HashMap<String, f64>,
    default: f64,
}

impl GroupQuality {
    pub fn new(by_doc: HashMap<String, f64>, default: f64) -> Self {
        Self { by_doc, default }
    }

    pub fn from_groups(groups: &GroupSet, default: f64) -> Self {
        Self::new(groups.quality_by_doc(), default)
    }
}

impl DocScorer for GroupQuality {
    fn score(&self, doc: &Document) -> f64 {
        self.by_doc.get(doc.id()).copied().unwrap_or(self.default)
    }
}

/// 配额引擎的输出
#[derive(Debug, Clone)]
pub struct QuotaOutcome {
    pub labels: LabelSet,
    pub downgrades: Vec<QuotaDowngrade>,
}

struct Candidate<'a> {
    decision: &'a LabelDecision,
    year: Option<i32>,
    completeness: f64,
    quality: f64,
    exact: bool,
    position: usize,
}

impl Candidate<'_> {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        let year = |c: &Self| c.year.unwrap_or(i32::MIN);
        year(other)
            .cmp(&year(self))
            .then_with(|| other.completeness.total_cmp(&self.completeness))
            .then_with(|| other.quality.total_cmp(&self.quality))
            .then_with(|| other.exact.cmp(&self.exact))
            .then_with(|| self.position.cmp(&other.position))
    }
}

pub struct QuotaEngine {
    max_relevant: usize,
    completeness: Box<dyn DocScorer>,
    quality: Box<dyn DocScorer>,
}

impl QuotaEngine {
    pub fn new(
        max_relevant: usize,
        completeness: Box<dyn DocScorer>,
        quality: Box<dyn DocScorer>,
    ) -> Self {
        Self {
            max_relevant,
            completeness,
            quality,
        }
    }

    /// 默认评分：内容完整度 + 分组质量
    pub fn with_groups(max_relevant: usize, groups: &GroupSet, default_quality: f64) -> Self {
        Self::new(
            max_relevant,
            Box::new(ContentCompleteness::default()),
            Box::new(GroupQuality::from_groups(groups, default_quality)),
        )
    }

    pub fn max_relevant(&self) -> usize {
        self.max_relevant
    }

    /// RELEVANT 候选的排名顺序
    pub fn rank(
        &self,
        documents: &DocumentSet,
        labels: &LabelSet,
        target_location: Option<&str>,
    ) -> Vec<String> {
        self.candidates(documents, labels, target_location)
            .into_iter()
            .map(|c| c.decision.doc_id.clone())
            .collect()
    }

    fn candidates<'a>(
        &self,
        documents: &DocumentSet,
        labels: &'a LabelSet,
        target_location: Option<&str>,
    ) -> Vec<Candidate<'a>> {
        let mut candidates: Vec<Candidate<'a>> = labels
            .iter()
            .filter(|d| d.label == Label::Relevant)
            .map(|decision| match documents.get(&decision.doc_id) {
                Some(doc) => Candidate {
                    decision,
                    year: doc.year(),
                    completeness: self.completeness.score(doc),
                    quality: self.quality.score(doc),
                    exact: doc.location_match(target_location) == LocationMatch::Exact,
                    position: documents.position(doc.id()).unwrap_or(usize::MAX),
                },
                None => Candidate {
                    decision,
                    year: None,
                    completeness: 0.0,
                    quality: 0.0,
                    exact: false,
                    position: usize::MAX,
                },
            })
            .collect();
        candidates.sort_by(|a, b| a.rank_cmp(b));
        candidates
    }

    /// 执行配额：只降不升，只降到 SOMEWHAT_RELEVANT
    pub fn apply(
        &self,
        documents: &DocumentSet,
        labels: &LabelSet,
        target_location: Option<&str>,
    ) -> QuotaOutcome {
        let candidates = self.candidates(documents, labels, target_location);
        if candidates.len() <= self.max_relevant {
            return QuotaOutcome {
                labels: labels.clone(),
                downgrades: Vec::new(),
            };
        }

        let mut downgrades = Vec::new();
        let mut updates = Vec::new();
        for (idx, candidate) in candidates.iter().enumerate().skip(self.max_relevant) {
            let rank = idx + 1;
            updates.push(LabelDecision::new(
                &candidate.decision.doc_id,
                Label::SomewhatRelevant,
                format!(
                    "{} (RELEVANT 排名第 {}，超出上限 {})",
                    candidate.decision.reasoning, rank, self.max_relevant
                ),
                candidate.decision.confidence,
                "quota",
            ));
            downgrades.push(QuotaDowngrade {
                doc_id: candidate.decision.doc_id.clone(),
                rank,
                from: Label::Relevant,
                to: Label::SomewhatRelevant,
            });
        }

        QuotaOutcome {
            labels: labels.with_updates(updates),
            downgrades,
        }
    }
}
