//! Label Studio API 客户端
//!
//! 封装任务读取与标注写回，只使用 ground truth 标注

use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::task::RawTask;

pub struct LabelStudioClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl LabelStudioClient {
    pub fn new(config: &Config) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.run.gateway_timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("无法创建 HTTP 客户端: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.label_studio_url.trim_end_matches('/').to_string(),
            api_key: config.label_studio_api_key.clone(),
        })
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.api_key)
    }

    /// 读取任务，只保留 ground truth 标注
    pub async fn get_task(&self, task_id: u64) -> AppResult<RawTask> {
        let url = format!("{}/api/tasks/{}", self.base_url, task_id);
        debug!("GET {}", url);

        let source_err = |message: String| AppError::Source {
            task_id: task_id.to_string(),
            message,
        };

        let response = self
            .http_client
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| source_err(format!("请求失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(source_err(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let mut task: RawTask = response
            .json()
            .await
            .map_err(|e| source_err(format!("响应解析失败: {}", e)))?;
        task.annotations.retain(|a| a.ground_truth);
        task.annotations.truncate(1);

        info!("📥 已从 Label Studio 读取任务 #{}", task_id);
        Ok(task)
    }

    /// 更新已有标注（PATCH）
    pub async fn update_annotation(
        &self,
        task_id: u64,
        annotation_id: u64,
        ranker: &BTreeMap<String, Vec<String>>,
    ) -> AppResult<()> {
        let url = format!(
            "{}/api/tasks/{}/annotations/{}",
            self.base_url, task_id, annotation_id
        );
        debug!("PATCH {}", url);

        let response = self
            .http_client
            .patch(&url)
            .header("Authorization", self.auth_header())
            .json(&ranker_payload(ranker, None))
            .send()
            .await
            .map_err(|e| sink_err(&url, e))?;
        check_status(&url, response).await?;
        Ok(())
    }

    /// 新建标注（POST），返回新标注的标识符
    pub async fn create_annotation(
        &self,
        task_id: u64,
        ranker: &BTreeMap<String, Vec<String>>,
        ground_truth: bool,
    ) -> AppResult<Option<u64>> {
        let url = format!("{}/api/tasks/{}/annotations/", self.base_url, task_id);
        debug!("POST {}", url);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&ranker_payload(ranker, Some(ground_truth)))
            .send()
            .await
            .map_err(|e| sink_err(&url, e))?;
        let response = check_status(&url, response).await?;

        let body: JsonValue = response.json().await.map_err(|e| sink_err(&url, e))?;
        Ok(body.get("id").and_then(JsonValue::as_u64))
    }
}

fn sink_err(url: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Sink {
        target: url.to_string(),
        message: e.to_string(),
    }
}

async fn check_status(url: &str, response: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(sink_err(url, format!("HTTP {}: {}", status.as_u16(), body)))
}

/// 构建 ranker 结果的请求体
pub fn ranker_payload(
    ranker: &BTreeMap<String, Vec<String>>,
    ground_truth: Option<bool>,
) -> JsonValue {
    let mut payload = json!({
        "result": [{
            "value": {"ranker": ranker},
            "from_name": "rank",
            "to_name": "results",
            "type": "ranker"
        }]
    });
    if let Some(gt) = ground_truth {
        payload["ground_truth"] = json!(gt);
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranker_payload_shape() {
        let mut ranker = BTreeMap::new();
        ranker.insert("relevant".to_string(), vec!["d1".to_string()]);

        let payload = ranker_payload(&ranker, None);
        assert_eq!(payload["result"][0]["type"], "ranker");
        assert_eq!(payload["result"][0]["from_name"], "rank");
        assert_eq!(payload["result"][0]["value"]["ranker"]["relevant"][0], "d1");
        assert!(payload.get("ground_truth").is_none());

        let payload = ranker_payload(&ranker, Some(true));
        assert_eq!(payload["ground_truth"], true);
    }
}
