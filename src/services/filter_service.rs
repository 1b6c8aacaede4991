//! 过滤服务 - 业务能力层
//!
//! 单次过滤，不重试。保守策略：只有网关明确判定移除且置信度不低时才移除，
//! 无法解析的结果一律保留。

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::infrastructure::gateway::{GatewayRequest, GenerationGateway, StageKind};
use crate::models::document::{Document, DocumentSet};
use crate::models::label::Confidence;
use crate::models::report::FilterRemoval;
use crate::services::brief::QueryBrief;
use crate::services::parse::{check_ids, de_id, parse_response};

const PREVIEW_CHARS: usize = 400;

#[derive(Debug, Deserialize)]
struct FilterResponse {
    #[serde(default)]
    decisions: Vec<FilterDecision>,
}

#[derive(Debug, Deserialize)]
struct FilterDecision {
    #[serde(deserialize_with = "de_id")]
    doc_id: String,
    #[serde(default)]
    keep: Option<bool>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
}

/// 过滤结果
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub kept: DocumentSet,
    pub removed: Vec<FilterRemoval>,
}

pub struct FilterService {
    gateway: Arc<dyn GenerationGateway>,
    batch_size: usize,
}

impl FilterService {
    pub fn new(gateway: Arc<dyn GenerationGateway>, batch_size: usize) -> Self {
        Self {
            gateway,
            batch_size: batch_size.max(1),
        }
    }

    /// 过滤明显无关的文档
    ///
    /// 网关不可用时返回错误；格式错误只影响所在批次（整批保留）
    pub async fn filter(&self, documents: &DocumentSet, brief: &QueryBrief) -> AppResult<FilterOutcome> {
        let mut removed_ids: HashSet<String> = HashSet::new();
        let mut removed = Vec::new();

        for batch in documents.as_slice().chunks(self.batch_size) {
            let decisions = self.filter_batch(batch, brief).await?;
            for doc in batch {
                let Some(decision) = decisions.get(doc.id()) else {
                    debug!("✓ 保留 {}: 没有给出决定", doc.id());
                    continue;
                };
                let confidence = decision
                    .confidence
                    .as_deref()
                    .map(Confidence::parse)
                    .unwrap_or_default();
                let remove = decision.keep == Some(false) && confidence != Confidence::Low;
                if remove {
                    let reason = decision
                        .reason
                        .clone()
                        .unwrap_or_else(|| "与查询无关".to_string());
                    info!("❌ 过滤 {}: {}", doc.id(), reason);
                    removed_ids.insert(doc.id().to_string());
                    removed.push(FilterRemoval {
                        doc_id: doc.id().to_string(),
                        title: doc.title().to_string(),
                        reason,
                        confidence,
                    });
                } else {
                    debug!("✓ 保留 {}", doc.id());
                }
            }
        }

        let keep: HashSet<String> = documents
            .iter()
            .filter(|d| !removed_ids.contains(d.id()))
            .map(|d| d.id().to_string())
            .collect();

        Ok(FilterOutcome {
            kept: documents.subset(&keep),
            removed,
        })
    }

    async fn filter_batch(
        &self,
        batch: &[Document],
        brief: &QueryBrief,
    ) -> AppResult<HashMap<String, FilterDecision>> {
        let stage = StageKind::Filter.as_str();
        let task = format!(
            "{}\n\nDecide for every document whether to keep it. \
             Only remove documents that are completely unrelated to the query.",
            brief.describe()
        );
        let payload = batch.iter().map(|d| d.to_payload(PREVIEW_CHARS)).collect();
        let request = GatewayRequest::new(StageKind::Filter, task, payload);

        let parsed = match self.gateway.generate(&request).await {
            Ok(value) => parse_response::<FilterResponse>(stage, value),
            Err(e) => Err(e),
        };

        let response = match parsed {
            Ok(response) => response,
            Err(e) if e.is_malformed() => {
                warn!("⚠️ 过滤结果无法解析，本批 {} 个文档全部保留: {}", batch.len(), e);
                return Ok(HashMap::new());
            }
            Err(e) => return Err(e),
        };

        let expected: Vec<String> = batch.iter().map(|d| d.id().to_string()).collect();
        if let Err(e) = check_ids(stage, &expected, response.decisions.iter().map(|d| &d.doc_id), false) {
            warn!("⚠️ 过滤结果标识符不匹配，本批全部保留: {}", e);
            return Ok(HashMap::new());
        }

        Ok(response
            .decisions
            .into_iter()
            .map(|d| (d.doc_id.clone(), d))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::infrastructure::gateway::testing::FnGateway;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn docs() -> DocumentSet {
        DocumentSet::new(vec![
            Document::new("a", "India Holidays 2025", "<p>list</p>"),
            Document::new("b", "Cafeteria Menu", "<p>food</p>"),
            Document::new("c", "Parking Rules", "<p>cars</p>"),
        ])
        .unwrap()
    }

    fn brief() -> QueryBrief {
        QueryBrief::new("holidays", Some("India".into()), 2025)
    }

    #[tokio::test]
    async fn test_removes_only_confident_rejections() {
        let gateway = FnGateway(|_: &GatewayRequest| {
            Ok(json!({"decisions": [
                {"doc_id": "a", "keep": true, "confidence": "high"},
                {"doc_id": "b", "keep": false, "reason": "food menu", "confidence": "high"},
                {"doc_id": "c", "keep": false, "reason": "maybe", "confidence": "low"}
            ]}))
        });
        let service = FilterService::new(Arc::new(gateway), 20);
        let outcome = assert_ok!(service.filter(&docs(), &brief()).await);

        assert_eq!(outcome.kept.ids(), vec!["a", "c"]);
        assert_eq!(outcome.removed.len(), 1);
        assert_eq!(outcome.removed[0].doc_id, "b");
        assert_eq!(outcome.removed[0].reason, "food menu");
    }

    #[tokio::test]
    async fn test_malformed_batch_keeps_everything() {
        let gateway = FnGateway(|_: &GatewayRequest| Ok(json!({"decisions": "nope"})));
        let service = FilterService::new(Arc::new(gateway), 20);
        let outcome = assert_ok!(service.filter(&docs(), &brief()).await);
        assert_eq!(outcome.kept.len(), 3);
        assert!(outcome.removed.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_ids_keep_the_batch() {
        let gateway = FnGateway(|_: &GatewayRequest| {
            Ok(json!({"decisions": [
                {"doc_id": "b", "keep": false, "confidence": "high"},
                {"doc_id": "ghost", "keep": false, "confidence": "high"}
            ]}))
        });
        let service = FilterService::new(Arc::new(gateway), 20);
        let outcome = assert_ok!(service.filter(&docs(), &brief()).await);
        assert_eq!(outcome.kept.len(), 3);
    }

    #[tokio::test]
    async fn test_batches_are_independent() {
        // 第一批（a, b）格式错误，第二批（c）正常
        let gateway = FnGateway(|req: &GatewayRequest| {
            if req.documents.len() == 2 {
                Err(AppError::malformed("filter", "bad"))
            } else {
                Ok(json!({"decisions": [{"doc_id": "c", "keep": false, "confidence": "medium"}]}))
            }
        });
        let service = FilterService::new(Arc::new(gateway), 2);
        let outcome = assert_ok!(service.filter(&docs(), &brief()).await);
        assert_eq!(outcome.kept.ids(), vec!["a", "b"]);
        assert_eq!(outcome.removed[0].doc_id, "c");
    }

    #[tokio::test]
    async fn test_gateway_unavailable_propagates() {
        let gateway = FnGateway(|_: &GatewayRequest| {
            Err(AppError::gateway_unavailable("filter", "connection refused"))
        });
        let service = FilterService::new(Arc::new(gateway), 20);
        let err = assert_err!(service.filter(&docs(), &brief()).await);
        assert!(err.is_retryable());
    }
}
