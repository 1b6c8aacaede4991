//! 从模型输出中提取 JSON

use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;

use crate::error::{AppError, AppResult};

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("static regex"))
}

/// 提取 JSON 对象
///
/// 依次尝试：整段解析、```json 代码块、第一个 `{` 到最后一个 `}` 的片段
pub fn extract_json(stage: &str, raw: &str) -> AppResult<JsonValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::malformed(stage, "模型返回内容为空"));
    }

    if let Ok(value) = serde_json::from_str::<JsonValue>(trimmed) {
        return Ok(value);
    }

    if let Some(caps) = fence_regex().captures(trimmed) {
        if let Ok(value) = serde_json::from_str::<JsonValue>(caps[1].trim()) {
            return Ok(value);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<JsonValue>(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(AppError::malformed(
        stage,
        format!("无法从输出中提取 JSON: {}", crate::utils::text::truncate_text(trimmed, 120)),
    ))
}
