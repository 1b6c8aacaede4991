//! 确定性规则
//!
//! - 标题规则：无效标题一律 NOT_SURE
//! - 标准上限：位置不符最高 ACCEPTABLE，旧年份最高 SOMEWHAT_RELEVANT
//! - 分组形状：成员数在上下限之内，单文档分组必须有审核给出的理由

use std::collections::HashSet;

use crate::config::RunParams;
use crate::models::document::{Document, DocumentSet, LocationMatch};
use crate::models::group::GroupSet;
use crate::models::label::{Confidence, Label, LabelDecision, LabelSet};
use crate::services::brief::QueryBrief;

/// 规则检查发现的问题
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleFindings {
    pub issues: Vec<String>,
    /// 标签与规则不一致的文档
    pub flagged: Vec<String>,
}

impl RuleFindings {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// 文档按规则能得到的最高等级
pub fn ceiling(doc: &Document, brief: &QueryBrief) -> Label {
    if !doc.has_valid_title() {
        return Label::NotSure;
    }
    match brief.location_match(doc) {
        LocationMatch::Mismatch => Label::Acceptable,
        _ if brief.is_older(doc) => Label::SomewhatRelevant,
        _ => Label::Relevant,
    }
}

/// 无效标题的文档改为 NOT_SURE
pub fn apply_title_rule(labels: &LabelSet, documents: &DocumentSet) -> LabelSet {
    let updates: Vec<LabelDecision> = labels
        .iter()
        .filter(|d| d.label != Label::NotSure)
        .filter(|d| documents.get(&d.doc_id).is_some_and(|doc| !doc.has_valid_title()))
        .map(|d| {
            LabelDecision::new(
                &d.doc_id,
                Label::NotSure,
                "标题缺失或无效，无法判断相关性",
                Confidence::High,
                "title_rule",
            )
        })
        .collect();

    if updates.is_empty() {
        labels.clone()
    } else {
        labels.with_updates(updates)
    }
}

/// 把超出上限的标签降到上限，返回新快照和被调整的文档
pub fn apply_caps(
    labels: &LabelSet,
    documents: &DocumentSet,
    brief: &QueryBrief,
) -> (LabelSet, Vec<String>) {
    let mut changed = Vec::new();
    let updates: Vec<LabelDecision> = labels
        .iter()
        .filter_map(|d| {
            let doc = documents.get(&d.doc_id)?;
            let cap = ceiling(doc, brief);
            let capped = d.label.capped_at(cap);
            if capped == d.label {
                return None;
            }
            changed.push(d.doc_id.clone());
            Some(LabelDecision::new(
                &d.doc_id,
                capped,
                format!("{} (规则上限 {}: {})", d.reasoning, cap, cap_reason(doc, brief)),
                d.confidence,
                "criteria",
            ))
        })
        .collect();

    (labels.with_updates(updates), changed)
}

fn cap_reason(doc: &Document, brief: &QueryBrief) -> String {
    if !doc.has_valid_title() {
        return "标题无效".to_string();
    }
    match brief.location_match(doc) {
        LocationMatch::Mismatch => format!(
            "文档位置 {} 与目标位置不符",
            doc.location().unwrap_or("未知")
        ),
        _ => format!(
            "年份 {} 早于 {}",
            doc.year().map(|y| y.to_string()).unwrap_or_default(),
            brief.reference_year
        ),
    }
}

/// 标签一致性检查：RELEVANT 数量与标准上限
pub fn label_findings(
    labels: &LabelSet,
    documents: &DocumentSet,
    brief: &QueryBrief,
    max_relevant: usize,
) -> RuleFindings {
    let mut findings = RuleFindings::default();

    let relevant = labels.count(Label::Relevant);
    if relevant > max_relevant {
        findings.issues.push(format!(
            "RELEVANT 数量 {} 超过上限 {}",
            relevant, max_relevant
        ));
    }

    for decision in labels.iter() {
        let Some(doc) = documents.get(&decision.doc_id) else {
            continue;
        };
        let cap = ceiling(doc, brief);
        let violates = if cap == Label::NotSure {
            decision.label != Label::NotSure
        } else {
            decision.label < cap
        };
        if violates {
            findings.issues.push(format!(
                "文档 {} 标为 {}，但规则上限为 {} ({})",
                decision.doc_id,
                decision.label,
                cap,
                cap_reason(doc, brief)
            ));
            findings.flagged.push(decision.doc_id.clone());
        }
    }

    findings
}

/// 分组形状检查
///
/// 文档总数小于最小分组规模时不检查
pub fn group_findings(groups: &GroupSet, justified: &[String], params: &RunParams) -> RuleFindings {
    let mut findings = RuleFindings::default();
    let total: usize = groups.iter().map(|g| g.len()).sum();
    if total < params.min_group_size || total <= 1 {
        return findings;
    }

    let justified: HashSet<&str> = justified.iter().map(String::as_str).collect();
    for group in groups.iter() {
        if group.len() > params.max_group_size {
            findings.issues.push(format!(
                "分组 '{}' 有 {} 个文档，超过上限 {}",
                group.name,
                group.len(),
                params.max_group_size
            ));
        } else if group.is_single() {
            if !justified.contains(group.name.as_str()) {
                findings.issues.push(format!(
                    "单文档分组 '{}' 没有给出理由",
                    group.name
                ));
            }
        } else if group.len() < params.min_group_size {
            findings.issues.push(format!(
                "分组 '{}' 只有 {} 个文档，少于下限 {}",
                group.name,
                group.len(),
                params.min_group_size
            ));
        }
    }
    findings
}
