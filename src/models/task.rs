//! 任务输入
//!
//! 本地任务文件与 Label Studio 使用同一种任务结构：
//! `{id, data:{text, location, items:[{id,title,html}]}, annotations:[...]}`。
//! 已有标注里除 "New Doc" 外的文档是参考样例，不再重新标注。

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::error::AppResult;
use crate::models::document::{Document, DocumentSet};
use crate::utils::text;

/// 未标注文档所在的层级名
pub const NEW_DOC_TIER: &str = "New Doc";

/// 原始任务
#[derive(Debug, Clone, Deserialize)]
pub struct RawTask {
    pub id: u64,
    #[serde(default)]
    pub data: RawTaskData,
    #[serde(default)]
    pub annotations: Vec<RawAnnotation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTaskData {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub items: Vec<RawItem>,
    /// 本地任务文件把标注放在 data 下
    #[serde(default)]
    pub annotations: Vec<RawAnnotation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawItem {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub html: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAnnotation {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub ground_truth: bool,
    #[serde(default)]
    pub result: Vec<RawResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawResult {
    #[serde(default)]
    pub value: RawResultValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawResultValue {
    #[serde(default)]
    pub ranker: BTreeMap<String, Vec<JsonValue>>,
}

/// 文档标识符既可能是字符串也可能是数字
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(json_id(&value))
}

fn json_id(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 已有标注中的参考样例
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceExample {
    pub doc_id: String,
    pub title: String,
    pub tier: String,
}

/// 一次运行的输入
#[derive(Debug, Clone)]
pub struct TaskInput {
    pub task_id: u64,
    pub query: String,
    /// 归一化后的目标位置
    pub location: Option<String>,
    /// 待标注文档
    pub documents: DocumentSet,
    /// 参考样例（只给标注阶段使用）
    pub examples: Vec<ReferenceExample>,
    /// 已有的层级 → 文档标识符，写回时原样保留
    pub prelabeled: BTreeMap<String, Vec<String>>,
    /// 已有标注的标识符，写回时据此决定更新还是新建
    pub annotation_id: Option<u64>,
}

impl TaskInput {
    /// 由原始任务构建运行输入
    pub fn from_raw(raw: RawTask) -> AppResult<Self> {
        let RawTask {
            id,
            data,
            annotations,
        } = raw;

        let annotation = data
            .annotations
            .first()
            .or_else(|| annotations.first())
            .cloned();
        let annotation_id = annotation.as_ref().and_then(|a| a.id);
        let ranker = annotation
            .and_then(|a| a.result.into_iter().next())
            .map(|r| r.value.ranker)
            .unwrap_or_default();

        let mut prelabeled: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (tier, ids) in ranker {
            if tier == NEW_DOC_TIER {
                continue;
            }
            prelabeled.insert(tier, ids.iter().map(json_id).collect());
        }
        let labeled_ids: HashSet<&str> = prelabeled
            .values()
            .flat_map(|ids| ids.iter().map(String::as_str))
            .collect();

        let mut examples = Vec::new();
        let mut documents = Vec::new();
        for item in &data.items {
            if labeled_ids.contains(item.id.as_str()) {
                if let Some((tier, _)) = prelabeled.iter().find(|(_, ids)| ids.contains(&item.id)) {
                    examples.push(ReferenceExample {
                        doc_id: item.id.clone(),
                        title: item.title.clone(),
                        tier: tier.clone(),
                    });
                }
            } else {
                documents.push(Document::new(&item.id, &item.title, &item.html));
            }
        }

        debug!(
            "任务 #{}: {} 个待标注文档, {} 个参考样例",
            id,
            documents.len(),
            examples.len()
        );

        Ok(Self {
            task_id: id,
            query: data.text,
            location: text::normalize_location(&data.location),
            documents: DocumentSet::new(documents)?,
            examples,
            prelabeled,
            annotation_id,
        })
    }
}
