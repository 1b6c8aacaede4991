//! 结果写出

use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::infrastructure::label_studio::LabelStudioClient;
use crate::models::report::Report;

/// 接收最终报告
#[async_trait]
pub trait ResultSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, report: &Report) -> AppResult<()>;
}

/// 写出 `output_id_<id>.json` 与 `report_id_<id>.json`
pub struct JsonFileSink {
    output_dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_path(&self, task_id: u64) -> PathBuf {
        self.output_dir.join(format!("output_id_{}.json", task_id))
    }

    pub fn report_path(&self, task_id: u64) -> PathBuf {
        self.output_dir.join(format!("report_id_{}.json", task_id))
    }
}

async fn write_json(path: &Path, value: &serde_json::Value) -> AppResult<()> {
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content)
        .await
        .map_err(|e| AppError::io(path.display().to_string(), e))
}

#[async_trait]
impl ResultSink for JsonFileSink {
    fn name(&self) -> &'static str {
        "json-file"
    }

    async fn deliver(&self, report: &Report) -> AppResult<()> {
        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| AppError::io(self.output_dir.display().to_string(), e))?;

        let detailed = serde_json::to_value(report)?;
        let output = json!({
            "updated_annotations": report.updated_annotations(),
            "detailed_report": detailed,
        });

        let output_path = self.output_path(report.task_id);
        write_json(&output_path, &output).await?;
        let report_path = self.report_path(report.task_id);
        write_json(&report_path, &output["detailed_report"]).await?;

        info!("💾 结果已保存至 {}", output_path.display());
        info!("💾 详细报告已保存至 {}", report_path.display());
        Ok(())
    }
}

/// 把标注写回 Label Studio
///
/// 已有标注时更新，否则新建一条 ground truth 标注
pub struct LabelStudioSink {
    client: Arc<LabelStudioClient>,
}

impl LabelStudioSink {
    pub fn new(client: Arc<LabelStudioClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResultSink for LabelStudioSink {
    fn name(&self) -> &'static str {
        "label-studio"
    }

    async fn deliver(&self, report: &Report) -> AppResult<()> {
        let ranker = report.updated_annotations();
        match report.annotation_id {
            Some(annotation_id) => {
                self.client
                    .update_annotation(report.task_id, annotation_id, &ranker)
                    .await?;
                info!(
                    "📤 已更新任务 #{} 的标注 #{}",
                    report.task_id, annotation_id
                );
            }
            None => {
                let created = self
                    .client
                    .create_annotation(report.task_id, &ranker, true)
                    .await?;
                info!(
                    "📤 已为任务 #{} 新建标注 {:?}",
                    report.task_id, created
                );
            }
        }
        Ok(())
    }
}
