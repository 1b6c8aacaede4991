//! 文档来源

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::AppResult;
use crate::infrastructure::label_studio::LabelStudioClient;
use crate::models::loaders;
use crate::models::task::TaskInput;

/// 按任务标识符提供运行输入
#[async_trait]
pub trait DocumentSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn load(&self, task_id: u64) -> AppResult<TaskInput>;

    /// 来源中可用的全部任务；不支持枚举的来源返回空列表
    async fn task_ids(&self) -> AppResult<Vec<u64>> {
        Ok(Vec::new())
    }
}

/// 本地 JSON 任务文件
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DocumentSource for JsonFileSource {
    fn name(&self) -> &'static str {
        "json-file"
    }

    async fn load(&self, task_id: u64) -> AppResult<TaskInput> {
        let raw = loaders::load_task_by_id(&self.path, task_id).await?;
        TaskInput::from_raw(raw)
    }

    async fn task_ids(&self) -> AppResult<Vec<u64>> {
        let tasks = loaders::load_tasks_file(&self.path).await?;
        Ok(tasks.iter().map(|t| t.id).collect())
    }
}

/// Label Studio 任务
pub struct LabelStudioSource {
    client: Arc<LabelStudioClient>,
}

impl LabelStudioSource {
    pub fn new(client: Arc<LabelStudioClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DocumentSource for LabelStudioSource {
    fn name(&self) -> &'static str {
        "label-studio"
    }

    async fn load(&self, task_id: u64) -> AppResult<TaskInput> {
        let raw = self.client.get_task(task_id).await?;
        TaskInput::from_raw(raw)
    }
}
