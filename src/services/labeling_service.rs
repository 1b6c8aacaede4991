//! 标注服务 - 业务能力层
//!
//! 按分组并发标注、审核标签、重新标注被标记的文档

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::AppResult;
use crate::infrastructure::gateway::{GatewayRequest, GenerationGateway, StageKind};
use crate::models::document::DocumentSet;
use crate::models::group::{Group, GroupSet};
use crate::models::label::{Confidence, Label, LabelDecision, LabelSet};
use crate::models::review::{ReviewVerdict, VerdictStatus};
use crate::models::task::ReferenceExample;
use crate::services::brief::QueryBrief;
use crate::services::parse::{check_ids, de_id, de_ids, parse_response, parse_status};

const PREVIEW_CHARS: usize = 600;
const REVIEW_PREVIEW_CHARS: usize = 150;

#[derive(Debug, Deserialize)]
struct LabelsResponse {
    labels: Vec<RawLabel>,
}

#[derive(Debug, Deserialize)]
struct RawLabel {
    #[serde(deserialize_with = "de_id")]
    doc_id: String,
    label: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    confidence: Option<String>,
}

impl RawLabel {
    fn into_decision(self, decided_by: &str) -> LabelDecision {
        let label = Label::parse(&self.label);
        let confidence = self
            .confidence
            .as_deref()
            .map(Confidence::parse)
            .unwrap_or_default();
        match label {
            Some(label) => LabelDecision::new(self.doc_id, label, self.reasoning, confidence, decided_by),
            None => LabelDecision::new(
                self.doc_id,
                Label::NotSure,
                format!("无法识别的标签 '{}': {}", self.label, self.reasoning),
                Confidence::Low,
                decided_by,
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LabelReviewResponse {
    status: String,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    feedback: String,
    #[serde(default, deserialize_with = "de_ids")]
    flagged_doc_ids: Vec<String>,
}

pub struct LabelingService {
    gateway: Arc<dyn GenerationGateway>,
    max_concurrent_groups: usize,
}

impl LabelingService {
    pub fn new(gateway: Arc<dyn GenerationGateway>, max_concurrent_groups: usize) -> Self {
        Self {
            gateway,
            max_concurrent_groups: max_concurrent_groups.max(1),
        }
    }

    /// 按分组标注全部文档
    ///
    /// 分组之间并发，结果按文档输入顺序组装；任何一组失败则整体失败
    pub async fn label(
        &self,
        groups: &GroupSet,
        documents: &DocumentSet,
        brief: &QueryBrief,
        examples: &[ReferenceExample],
    ) -> AppResult<LabelSet> {
        let examples = examples_payload(examples);
        let per_group: Vec<Vec<LabelDecision>> = stream::iter(groups.iter())
            .map(|group| self.label_group(group, documents, brief, examples.clone()))
            .buffered(self.max_concurrent_groups)
            .try_collect()
            .await?;

        let decisions = per_group.into_iter().flatten().collect();
        let labels = LabelSet::from_decisions(StageKind::Labeling.as_str(), &documents.ids(), decisions)?;
        info!("✓ 标注完成: {} 个文档", labels.len());
        Ok(labels)
    }

    async fn label_group(
        &self,
        group: &Group,
        documents: &DocumentSet,
        brief: &QueryBrief,
        examples: Option<serde_json::Value>,
    ) -> AppResult<Vec<LabelDecision>> {
        let stage = StageKind::Labeling.as_str();
        debug!("标注分组 '{}' ({} 个文档)", group.name, group.len());

        let task = format!(
            "{}\n\nLabel every document of the group '{}' (theme: {}).",
            brief.describe(),
            group.name,
            group.theme
        );
        let payload = group
            .member_ids
            .iter()
            .filter_map(|id| documents.get(id))
            .map(|d| d.to_payload(PREVIEW_CHARS))
            .collect();
        let mut request = GatewayRequest::new(StageKind::Labeling, task, payload);
        if let Some(examples) = examples {
            request = request.with_examples(examples);
        }

        let response: LabelsResponse = parse_response(stage, self.gateway.generate(&request).await?)?;
        check_ids(stage, &group.member_ids, response.labels.iter().map(|l| &l.doc_id), true)?;

        Ok(response
            .labels
            .into_iter()
            .map(|l| l.into_decision("labeling"))
            .collect())
    }

    /// 审核当前标签快照
    ///
    /// 被标记的文档必须来自快照
    pub async fn review(
        &self,
        labels: &LabelSet,
        documents: &DocumentSet,
        brief: &QueryBrief,
        max_relevant: usize,
    ) -> AppResult<ReviewVerdict> {
        let stage = StageKind::LabelReview.as_str();
        let distribution: Vec<String> = labels
            .distribution()
            .iter()
            .map(|(label, n)| format!("{}: {}", label, n))
            .collect();
        let task = format!(
            "{}\n\nReview the labels. At most {} documents may be RELEVANT.\n\
             CURRENT DISTRIBUTION: {}",
            brief.describe(),
            max_relevant,
            distribution.join(", ")
        );
        let payload = labels
            .iter()
            .filter_map(|decision| {
                let doc = documents.get(&decision.doc_id)?;
                let mut value = doc.to_payload(REVIEW_PREVIEW_CHARS);
                value["label"] = json!(decision.label);
                value["reasoning"] = json!(decision.reasoning);
                Some(value)
            })
            .collect();
        let request = GatewayRequest::new(StageKind::LabelReview, task, payload);

        let response: LabelReviewResponse =
            parse_response(stage, self.gateway.generate(&request).await?)?;
        let status = parse_status(stage, &response.status)?;
        check_ids(stage, &labels.ids(), response.flagged_doc_ids.iter(), false)?;

        let mut verdict = match status {
            VerdictStatus::Accepted => ReviewVerdict::accepted(response.feedback),
            VerdictStatus::Rejected => ReviewVerdict::rejected(response.feedback, Vec::new()),
        };
        verdict.issues = response.issues;
        verdict.flagged_doc_ids = response.flagged_doc_ids;
        Ok(verdict)
    }

    /// 重新标注被标记的文档，返回替换决策
    ///
    /// 返回的文档必须是 `flagged` 的子集
    pub async fn relabel(
        &self,
        labels: &LabelSet,
        documents: &DocumentSet,
        brief: &QueryBrief,
        verdict: &ReviewVerdict,
        flagged: &[String],
    ) -> AppResult<Vec<LabelDecision>> {
        if flagged.is_empty() {
            return Ok(Vec::new());
        }
        let stage = StageKind::Relabel.as_str();
        let task = format!(
            "{}\n\nRevise the labels of the flagged documents.\n\nREVIEWER FEEDBACK:\n{}",
            brief.describe(),
            verdict.feedback_text()
        );
        let payload = flagged
            .iter()
            .filter_map(|id| {
                let doc = documents.get(id)?;
                let mut value = doc.to_payload(PREVIEW_CHARS);
                if let Some(current) = labels.get(id) {
                    value["current_label"] = json!(current.label);
                    value["current_reasoning"] = json!(current.reasoning);
                }
                Some(value)
            })
            .collect();
        let request = GatewayRequest::new(StageKind::Relabel, task, payload);

        let response: LabelsResponse = parse_response(stage, self.gateway.generate(&request).await?)?;
        check_ids(stage, flagged, response.labels.iter().map(|l| &l.doc_id), false)?;

        Ok(response
            .labels
            .into_iter()
            .map(|l| l.into_decision("relabel"))
            .collect())
    }
}

/// 参考样例按等级分组，只发标题
fn examples_payload(examples: &[ReferenceExample]) -> Option<serde_json::Value> {
    if examples.is_empty() {
        return None;
    }
    let mut by_tier: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for example in examples {
        if seen.insert(example.doc_id.as_str()) {
            by_tier
                .entry(example.tier.as_str())
                .or_default()
                .push(example.title.as_str());
        }
    }
    Some(json!(by_tier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::infrastructure::gateway::testing::FnGateway;
    use crate::models::document::Document;
    use serde_json::Value as JsonValue;
    use tokio_test::{assert_err, assert_ok};

    fn docs() -> DocumentSet {
        DocumentSet::new(vec![
            Document::new("a", "India Holidays 2025", "<p>x</p>"),
            Document::new("b", "India Holidays 2024", "<p>x</p>"),
            Document::new("c", "US Holidays 2025", "<p>x</p>"),
        ])
        .unwrap()
    }

    fn groups() -> GroupSet {
        GroupSet::new(
            "grouping",
            0,
            vec![
                Group::new("India", "t", vec!["a".into(), "b".into()], ""),
                Group::new("US", "t", vec!["c".into()], ""),
            ],
            &docs().ids(),
        )
        .unwrap()
    }

    fn brief() -> QueryBrief {
        QueryBrief::new("holidays", Some("India".into()), 2025)
    }

    /// 每个文档都标为 RELEVANT
    fn label_everything(req: &GatewayRequest) -> AppResult<JsonValue> {
        let labels: Vec<JsonValue> = req
            .documents
            .iter()
            .map(|d| json!({"doc_id": d["id"], "label": "RELEVANT", "reasoning": "ok", "confidence": "high"}))
            .collect();
        Ok(json!({ "labels": labels }))
    }

    #[tokio::test]
    async fn test_label_assembles_in_document_order() {
        let service = LabelingService::new(Arc::new(FnGateway(label_everything)), 2);
        let labels = assert_ok!(service.label(&groups(), &docs(), &brief(), &[]).await);
        assert_eq!(labels.ids(), vec!["a", "b", "c"]);
        assert_eq!(labels.count(Label::Relevant), 3);
        assert_eq!(labels.get("a").unwrap().decided_by, "labeling");
    }

    #[tokio::test]
    async fn test_label_sends_examples() {
        let gateway = FnGateway(|req: &GatewayRequest| {
            let examples = req.examples.as_ref().expect("examples");
            assert_eq!(examples["relevant"][0], "India Holidays 2023");
            label_everything(req)
        });
        let service = LabelingService::new(Arc::new(gateway), 1);
        let examples = vec![ReferenceExample {
            doc_id: "x".into(),
            title: "India Holidays 2023".into(),
            tier: "relevant".into(),
        }];
        assert_ok!(service.label(&groups(), &docs(), &brief(), &examples).await);
    }

    #[tokio::test]
    async fn test_label_rejects_missing_documents() {
        let gateway = FnGateway(|req: &GatewayRequest| {
            let first = &req.documents[0];
            Ok(json!({"labels": [{"doc_id": first["id"], "label": "RELEVANT"}]}))
        });
        let service = LabelingService::new(Arc::new(gateway), 2);
        let err = assert_err!(service.label(&groups(), &docs(), &brief(), &[]).await);
        assert!(err.is_malformed());
    }

    #[tokio::test]
    async fn test_unknown_label_becomes_not_sure() {
        let gateway = FnGateway(|req: &GatewayRequest| {
            let labels: Vec<JsonValue> = req
                .documents
                .iter()
                .map(|d| json!({"doc_id": d["id"], "label": "GREAT"}))
                .collect();
            Ok(json!({ "labels": labels }))
        });
        let service = LabelingService::new(Arc::new(gateway), 2);
        let labels = assert_ok!(service.label(&groups(), &docs(), &brief(), &[]).await);
        assert_eq!(labels.count(Label::NotSure), 3);
    }

    fn current_labels() -> LabelSet {
        let decisions = docs()
            .iter()
            .map(|d| LabelDecision::new(d.id(), Label::Relevant, "r", Confidence::Medium, "labeling"))
            .collect();
        LabelSet::from_decisions("labeling", &docs().ids(), decisions).unwrap()
    }

    #[tokio::test]
    async fn test_review_parses_flagged_ids() {
        let gateway = FnGateway(|_: &GatewayRequest| {
            Ok(json!({"status": "REJECTED", "issues": ["b is old"], "feedback": "fix", "flagged_doc_ids": ["b"]}))
        });
        let service = LabelingService::new(Arc::new(gateway), 1);
        let verdict = assert_ok!(service.review(&current_labels(), &docs(), &brief(), 10).await);
        assert!(!verdict.is_accepted());
        assert_eq!(verdict.flagged_doc_ids, vec!["b"]);
    }

    #[tokio::test]
    async fn test_review_rejects_unknown_flagged_ids() {
        let gateway = FnGateway(|_: &GatewayRequest| {
            Ok(json!({"status": "REJECTED", "flagged_doc_ids": ["ghost"]}))
        });
        let service = LabelingService::new(Arc::new(gateway), 1);
        let err = assert_err!(service.review(&current_labels(), &docs(), &brief(), 10).await);
        assert!(matches!(err, AppError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_relabel_only_accepts_flagged_documents() {
        let gateway = FnGateway(|_: &GatewayRequest| {
            Ok(json!({"labels": [{"doc_id": "a", "label": "ACCEPTABLE"}]}))
        });
        let service = LabelingService::new(Arc::new(gateway), 1);
        let verdict = ReviewVerdict::rejected("fix", vec![]);
        let err = assert_err!(
            service
                .relabel(&current_labels(), &docs(), &brief(), &verdict, &["b".to_string()])
                .await
        );
        assert!(err.is_malformed());
    }

    #[tokio::test]
    async fn test_relabel_without_flagged_skips_gateway() {
        let gateway = FnGateway(|_: &GatewayRequest| panic!("gateway must not be called"));
        let service = LabelingService::new(Arc::new(gateway), 1);
        let verdict = ReviewVerdict::rejected("fix", vec![]);
        let revisions = assert_ok!(
            service
                .relabel(&current_labels(), &docs(), &brief(), &verdict, &[])
                .await
        );
        assert!(revisions.is_empty());
    }

    #[tokio::test]
    async fn test_relabel_returns_revisions() {
        let gateway = FnGateway(|_: &GatewayRequest| {
            Ok(json!({"labels": [{"doc_id": "b", "label": "SOMEWHAT_RELEVANT", "reasoning": "2024"}]}))
        });
        let service = LabelingService::new(Arc::new(gateway), 1);
        let verdict = ReviewVerdict::rejected("fix", vec![]);
        let revisions = assert_ok!(
            service
                .relabel(&current_labels(), &docs(), &brief(), &verdict, &["b".to_string()])
                .await
        );
        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].label, Label::SomewhatRelevant);
        assert_eq!(revisions[0].decided_by, "relabel");
    }
}
