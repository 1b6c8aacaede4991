//! 标签与标签快照
//!
//! `LabelSet` 是不可变快照：每次标注/重新标注都产生新的快照，
//! 失败或耗尽的尝试不会留下半途修改的状态。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{AppError, AppResult};

/// 相关度等级，按相关程度从高到低排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    Relevant,
    SomewhatRelevant,
    Acceptable,
    NotSure,
    Irrelevant,
}

impl Label {
    pub const ALL: [Label; 5] = [
        Label::Relevant,
        Label::SomewhatRelevant,
        Label::Acceptable,
        Label::NotSure,
        Label::Irrelevant,
    ];

    /// 标注结果中使用的键名
    pub fn key(self) -> &'static str {
        match self {
            Label::Relevant => "relevant",
            Label::SomewhatRelevant => "somewhat_relevant",
            Label::Acceptable => "acceptable",
            Label::NotSure => "not_sure",
            Label::Irrelevant => "irrelevant",
        }
    }

    /// 宽松解析，兼容常见写法；无法识别时返回 None
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "relevant" => Some(Label::Relevant),
            "somewhat_relevant" => Some(Label::SomewhatRelevant),
            "acceptable" | "semantically_acceptable" => Some(Label::Acceptable),
            "not_sure" | "notsure" => Some(Label::NotSure),
            "irrelevant" => Some(Label::Irrelevant),
            _ => None,
        }
    }

    /// 解析失败时保守地归为 NOT_SURE
    pub fn parse_or_not_sure(s: &str) -> Self {
        Self::parse(s).unwrap_or(Label::NotSure)
    }

    /// 把标签限制在 `ceiling` 及以下（只降不升）
    pub fn capped_at(self, ceiling: Label) -> Label {
        self.max(ceiling)
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key().to_uppercase())
    }
}

/// 决策置信度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

impl Confidence {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" => Confidence::High,
            "low" => Confidence::Low,
            _ => Confidence::Medium,
        }
    }
}

/// 单个文档的标注决策
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelDecision {
    pub doc_id: String,
    pub label: Label,
    pub reasoning: String,
    pub confidence: Confidence,
    /// 产生该决策的步骤（labeling / relabel / criteria / quota）
    pub decided_by: String,
}

impl LabelDecision {
    pub fn new(
        doc_id: impl Into<String>,
        label: Label,
        reasoning: impl Into<String>,
        confidence: Confidence,
        decided_by: impl Into<String>,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            label,
            reasoning: reasoning.into(),
            confidence,
            decided_by: decided_by.into(),
        }
    }
}

/// 标签快照：每个文档恰好一个决策，按文档输入顺序排列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelSet {
    decisions: Vec<LabelDecision>,
}

impl LabelSet {
    /// 由决策列表构建快照，并校验与 `expected_ids` 一一对应
    pub fn from_decisions(
        stage: &str,
        expected_ids: &[String],
        decisions: Vec<LabelDecision>,
    ) -> AppResult<Self> {
        let mut by_id: HashMap<String, LabelDecision> = HashMap::with_capacity(decisions.len());
        let expected: HashSet<&str> = expected_ids.iter().map(|s| s.as_str()).collect();
        let mut duplicated = Vec::new();
        let mut unknown = Vec::new();

        for decision in decisions {
            if !expected.contains(decision.doc_id.as_str()) {
                unknown.push(decision.doc_id.clone());
                continue;
            }
            let id = decision.doc_id.clone();
            if by_id.insert(id.clone(), decision).is_some() {
                duplicated.push(id);
            }
        }

        let missing: Vec<String> = expected_ids
            .iter()
            .filter(|id| !by_id.contains_key(id.as_str()))
            .cloned()
            .collect();

        if !missing.is_empty() || !duplicated.is_empty() || !unknown.is_empty() {
            return Err(AppError::CoverageViolation {
                stage: stage.to_string(),
                missing,
                duplicated,
                unknown,
            });
        }

        let decisions = expected_ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();
        Ok(Self { decisions })
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelDecision> {
        self.decisions.iter()
    }

    pub fn get(&self, doc_id: &str) -> Option<&LabelDecision> {
        self.decisions.iter().find(|d| d.doc_id == doc_id)
    }

    pub fn label_of(&self, doc_id: &str) -> Option<Label> {
        self.get(doc_id).map(|d| d.label)
    }

    pub fn ids(&self) -> Vec<String> {
        self.decisions.iter().map(|d| d.doc_id.clone()).collect()
    }

    pub fn count(&self, label: Label) -> usize {
        self.decisions.iter().filter(|d| d.label == label).count()
    }

    /// 各等级的数量
    pub fn distribution(&self) -> BTreeMap<Label, usize> {
        let mut dist: BTreeMap<Label, usize> = Label::ALL.iter().map(|l| (*l, 0)).collect();
        for d in &self.decisions {
            *dist.entry(d.label).or_default() += 1;
        }
        dist
    }

    /// 应用一组替换决策，返回新快照
    ///
    /// 只替换已存在的文档，覆盖集合不变
    pub fn with_updates(&self, updates: Vec<LabelDecision>) -> LabelSet {
        let mut replacements: HashMap<String, LabelDecision> =
            updates.into_iter().map(|d| (d.doc_id.clone(), d)).collect();
        let decisions = self
            .decisions
            .iter()
            .map(|d| replacements.remove(&d.doc_id).unwrap_or_else(|| d.clone()))
            .collect();
        LabelSet { decisions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(id: &str, label: Label) -> LabelDecision {
        LabelDecision::new(id, label, "r", Confidence::Medium, "test")
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_label_parse_aliases() {
        assert_eq!(Label::parse("RELEVANT"), Some(Label::Relevant));
        assert_eq!(Label::parse("Somewhat Relevant"), Some(Label::SomewhatRelevant));
        assert_eq!(Label::parse("semantically_acceptable"), Some(Label::Acceptable));
        assert_eq!(Label::parse("not sure"), Some(Label::NotSure));
        assert_eq!(Label::parse_or_not_sure("maybe"), Label::NotSure);
    }

    #[test]
    fn test_capped_at_never_raises() {
        assert_eq!(Label::Relevant.capped_at(Label::Acceptable), Label::Acceptable);
        assert_eq!(Label::NotSure.capped_at(Label::SomewhatRelevant), Label::NotSure);
    }

    #[test]
    fn test_label_serializes_screaming_snake() {
        let json = serde_json::to_string(&Label::SomewhatRelevant).unwrap();
        assert_eq!(json, "\"SOMEWHAT_RELEVANT\"");
    }

    #[test]
    fn test_from_decisions_orders_by_expected_ids() {
        let set = LabelSet::from_decisions(
            "labeling",
            &ids(&["a", "b"]),
            vec![decision("b", Label::Acceptable), decision("a", Label::Relevant)],
        )
        .unwrap();
        assert_eq!(set.ids(), ids(&["a", "b"]));
        assert_eq!(set.count(Label::Relevant), 1);
    }

    #[test]
    fn test_from_decisions_reports_missing_duplicated_unknown() {
        let err = LabelSet::from_decisions(
            "labeling",
            &ids(&["a", "b"]),
            vec![
                decision("a", Label::Relevant),
                decision("a", Label::Relevant),
                decision("z", Label::Relevant),
            ],
        )
        .unwrap_err();
        match err {
            AppError::CoverageViolation {
                missing,
                duplicated,
                unknown,
                ..
            } => {
                assert_eq!(missing, ids(&["b"]));
                assert_eq!(duplicated, ids(&["a"]));
                assert_eq!(unknown, ids(&["z"]));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_with_updates_keeps_coverage() {
        let set = LabelSet::from_decisions(
            "labeling",
            &ids(&["a", "b"]),
            vec![decision("a", Label::Relevant), decision("b", Label::Relevant)],
        )
        .unwrap();
        let updated = set.with_updates(vec![
            decision("b", Label::SomewhatRelevant),
            decision("ghost", Label::Relevant),
        ]);
        assert_eq!(updated.ids(), ids(&["a", "b"]));
        assert_eq!(updated.label_of("b"), Some(Label::SomewhatRelevant));
        assert_eq!(set.label_of("b"), Some(Label::Relevant));
    }
}
