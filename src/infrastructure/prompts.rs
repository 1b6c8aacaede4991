//! 各阶段的系统提示词与输出格式

use crate::infrastructure::gateway::StageKind;

const TIER_DEFINITIONS: &str = "\
RELEVANT: answers the query for the user's location with current, complete information.
SOMEWHAT_RELEVANT: correct location, but older or incomplete.
ACCEPTABLE: correct topic, but for a different location (or only general context).
NOT_SURE: missing/placeholder title or content too unclear to judge.
IRRELEVANT: unrelated to the query.";

/// 系统提示词
pub fn system_prompt(stage: StageKind) -> String {
    match stage {
        StageKind::Filter => "You are a document filter. Remove only documents that are CLEARLY \
unrelated to the query (different topic entirely, system pages, broken content). \
Keep documents with missing titles, documents about the same topic for another location, \
and older documents on the same topic. When in doubt, keep the document and use low confidence."
            .to_string(),
        StageKind::Grouping => "You are a document grouping specialist. Partition the documents \
into groups by topic first and year second. Every document must appear in exactly one group. \
Respect the size limits given in the task; a single-document group needs a clear reason."
            .to_string(),
        StageKind::GroupReview => "You are a quality reviewer for document groups. Check that each \
group is coherent in topic and year, that sizes respect the limits, and that every single-document \
group is justified. Accept only when the grouping is good; otherwise list concrete issues."
            .to_string(),
        StageKind::Regroup => "You are a document regrouping specialist. Rebuild the groups using \
the reviewer feedback. Every document from the current groups must appear in exactly one new group; \
never drop or invent document ids."
            .to_string(),
        StageKind::Labeling => format!(
            "You are a document labeling specialist. Assign exactly one tier to every document \
in the group. Year recency and location match are the first criteria.\n\nTIERS:\n{}",
            TIER_DEFINITIONS
        ),
        StageKind::LabelReview => format!(
            "You are a labeling quality reviewer. Check the tier counts and that every label \
agrees with the year and location criteria. Flag the ids of documents whose label is wrong.\n\nTIERS:\n{}",
            TIER_DEFINITIONS
        ),
        StageKind::Relabel => format!(
            "You are a relabeling specialist. Revise the labels of the flagged documents using the \
reviewer feedback and justify each revised label. Only return documents you were given.\n\nTIERS:\n{}",
            TIER_DEFINITIONS
        ),
    }
}

/// 要求的输出格式
pub fn output_schema(stage: StageKind) -> &'static str {
    match stage {
        StageKind::Filter => {
            r#"{"decisions": [{"doc_id": "id", "keep": true, "reason": "why", "confidence": "high|medium|low"}]}"#
        }
        StageKind::Grouping | StageKind::Regroup => {
            r#"{"groups": [{"name": "short name", "theme": "topic and year", "doc_ids": ["id"], "reasoning": "why"}]}"#
        }
        StageKind::GroupReview => {
            r#"{"status": "ACCEPTED|REJECTED", "issues": ["issue"], "feedback": "text", "justified_single_groups": ["group name"], "group_confidence": {"group name": 0.8}}"#
        }
        StageKind::Labeling | StageKind::Relabel => {
            r#"{"labels": [{"doc_id": "id", "label": "RELEVANT|SOMEWHAT_RELEVANT|ACCEPTABLE|NOT_SURE|IRRELEVANT", "reasoning": "why", "confidence": "high|medium|low"}]}"#
        }
        StageKind::LabelReview => {
            r#"{"status": "ACCEPTED|REJECTED", "issues": ["issue"], "feedback": "text", "flagged_doc_ids": ["id"]}"#
        }
    }
}
