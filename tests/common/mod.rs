#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use doc_labeler::error::{AppError, AppResult};
use doc_labeler::infrastructure::{DocumentSource, GatewayRequest, GenerationGateway, ResultSink, StageKind};
use doc_labeler::models::{Document, DocumentSet, Report, TaskInput};

type Handler = Box<dyn Fn(&GatewayRequest) -> AppResult<JsonValue> + Send + Sync>;

/// 按阶段返回预设响应的网关
///
/// 没有预设的阶段使用"配合"的默认行为：全部保留、按年份分组、
/// 审核一律通过、全部标为 RELEVANT、重新标注不做修改
pub struct ScriptedGateway {
    handlers: HashMap<StageKind, Handler>,
    calls: Mutex<Vec<StageKind>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on<F>(mut self, stage: StageKind, handler: F) -> Self
    where
        F: Fn(&GatewayRequest) -> AppResult<JsonValue> + Send + Sync + 'static,
    {
        self.handlers.insert(stage, Box::new(handler));
        self
    }

    pub fn count(&self, stage: StageKind) -> usize {
        self.calls.lock().unwrap().iter().filter(|s| **s == stage).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationGateway for ScriptedGateway {
    async fn generate(&self, request: &GatewayRequest) -> AppResult<JsonValue> {
        self.calls.lock().unwrap().push(request.stage);
        match self.handlers.get(&request.stage) {
            Some(handler) => handler(request),
            None => default_response(request),
        }
    }
}

pub fn doc_ids(request: &GatewayRequest) -> Vec<String> {
    request
        .documents
        .iter()
        .filter_map(|d| d["id"].as_str().map(str::to_string))
        .collect()
}

pub fn keep_all(request: &GatewayRequest) -> AppResult<JsonValue> {
    let decisions: Vec<JsonValue> = doc_ids(request)
        .into_iter()
        .map(|id| json!({"doc_id": id, "keep": true, "confidence": "high"}))
        .collect();
    Ok(json!({ "decisions": decisions }))
}

/// 按年份分组，保持文档出现顺序；同一年份每 6 个文档一组
pub fn group_by_year(request: &GatewayRequest) -> AppResult<JsonValue> {
    let mut order: Vec<String> = Vec::new();
    let mut by_year: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for doc in &request.documents {
        let key = doc["year"]
            .as_i64()
            .map(|y| format!("Year {}", y))
            .unwrap_or_else(|| "Undated".to_string());
        if !by_year.contains_key(&key) {
            order.push(key.clone());
        }
        if let Some(id) = doc["id"].as_str() {
            by_year.entry(key).or_default().push(id.to_string());
        }
    }

    let mut groups: Vec<JsonValue> = Vec::new();
    for year in &order {
        for (idx, chunk) in by_year[year].chunks(6).enumerate() {
            let name = format!("{} #{}", year, idx + 1);
            groups.push(json!({"name": name, "theme": year, "doc_ids": chunk, "reasoning": "same year"}));
        }
    }
    Ok(json!({ "groups": groups }))
}

/// 所有文档放进同一个分组
pub fn single_group(request: &GatewayRequest) -> AppResult<JsonValue> {
    Ok(json!({"groups": [{"name": "Leave policies", "theme": "leave", "doc_ids": doc_ids(request)}]}))
}

pub fn accept(_: &GatewayRequest) -> AppResult<JsonValue> {
    Ok(json!({"status": "ACCEPTED", "issues": [], "feedback": "looks good"}))
}

pub fn reject(_: &GatewayRequest) -> AppResult<JsonValue> {
    Ok(json!({"status": "REJECTED", "issues": ["not good enough"], "feedback": "try again"}))
}

pub fn label_all(label: &'static str) -> impl Fn(&GatewayRequest) -> AppResult<JsonValue> + Send + Sync {
    move |request: &GatewayRequest| {
        let labels: Vec<JsonValue> = doc_ids(request)
            .into_iter()
            .map(|id| json!({"doc_id": id, "label": label, "reasoning": "matches query", "confidence": "high"}))
            .collect();
        Ok(json!({ "labels": labels }))
    }
}

pub fn malformed(request: &GatewayRequest) -> AppResult<JsonValue> {
    Err(AppError::malformed(request.stage.as_str(), "not json"))
}

fn default_response(request: &GatewayRequest) -> AppResult<JsonValue> {
    match request.stage {
        StageKind::Filter => keep_all(request),
        StageKind::Grouping | StageKind::Regroup => group_by_year(request),
        StageKind::GroupReview | StageKind::LabelReview => accept(request),
        StageKind::Labeling => label_all("RELEVANT")(request),
        StageKind::Relabel => Ok(json!({"labels": []})),
    }
}

pub fn task(task_id: u64, query: &str, location: Option<&str>, docs: Vec<Document>) -> TaskInput {
    TaskInput {
        task_id,
        query: query.to_string(),
        location: location.map(str::to_string),
        documents: DocumentSet::new(docs).unwrap(),
        examples: Vec::new(),
        prelabeled: BTreeMap::new(),
        annotation_id: None,
    }
}

/// 10 篇 2025 年 + 2 篇 2024 年的印度假期文档，2024 年的夹在中间
pub fn holiday_docs() -> Vec<Document> {
    let mut docs = Vec::new();
    for i in 1..=12 {
        let year = if i == 3 || i == 8 { 2024 } else { 2025 };
        docs.push(Document::new(
            format!("h{}", i),
            format!("India Holiday List {} part {}", year, i),
            "<p>Holidays</p><ul><li>Diwali</li><li>Holi</li></ul>",
        ));
    }
    docs
}

/// 12 篇内容相同的 2025 年文档
pub fn current_docs() -> Vec<Document> {
    (1..=12)
        .map(|i| {
            Document::new(
                format!("c{}", i),
                format!("India Benefits Guide 2025 v{}", i),
                "<p>Benefits overview</p>",
            )
        })
        .collect()
}

/// 两篇符合条件的印度文档，一篇美国文档，一篇 2023 年的旧文档
pub fn mixed_docs() -> Vec<Document> {
    vec![
        Document::new("in1", "India Leave Policy 2025", "<p>Annual leave</p>"),
        Document::new("in2", "India Leave FAQ 2025", "<p>Sick leave</p>"),
        Document::new("us", "US Leave Policy 2025", "<p>PTO</p>"),
        Document::new("old", "India Leave Policy 2023", "<p>Annual leave</p>"),
    ]
}

/// 内存中的任务来源
pub struct MemorySource {
    pub tasks: HashMap<u64, TaskInput>,
}

#[async_trait]
impl DocumentSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self, task_id: u64) -> AppResult<TaskInput> {
        self.tasks.get(&task_id).cloned().ok_or_else(|| AppError::Source {
            task_id: task_id.to_string(),
            message: "not found".to_string(),
        })
    }
}

/// 记录收到的报告
#[derive(Default)]
pub struct RecordingSink {
    pub delivered: std::sync::Arc<Mutex<Vec<u64>>>,
}

#[async_trait]
impl ResultSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, report: &Report) -> AppResult<()> {
        self.delivered.lock().unwrap().push(report.task_id);
        Ok(())
    }
}
