//! 网关响应的结构校验

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

use crate::error::{AppError, AppResult};
use crate::models::review::VerdictStatus;

/// 反序列化为阶段响应结构，失败即格式错误
pub fn parse_response<T: DeserializeOwned>(stage: &str, value: JsonValue) -> AppResult<T> {
    serde_json::from_value(value)
        .map_err(|e| AppError::malformed(stage, format!("响应结构不符: {}", e)))
}

/// 标识符可能是字符串或数字
pub fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(id_of(&JsonValue::deserialize(deserializer)?))
}

pub fn de_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<JsonValue>::deserialize(deserializer)?;
    Ok(values.iter().map(id_of).collect())
}

fn id_of(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// 审核结论的宽松解析
pub fn parse_status(stage: &str, raw: &str) -> AppResult<VerdictStatus> {
    match raw.trim().to_uppercase().as_str() {
        "ACCEPTED" | "ACCEPT" | "APPROVED" => Ok(VerdictStatus::Accepted),
        "REJECTED" | "REJECT" => Ok(VerdictStatus::Rejected),
        other => Err(AppError::malformed(stage, format!("未知的审核结论 '{}'", other))),
    }
}

/// 校验返回的标识符只来自请求中的文档且不重复
///
/// `exact` 为 true 时还要求请求中的每个文档都出现
pub fn check_ids<'a>(
    stage: &str,
    expected: &[String],
    returned: impl IntoIterator<Item = &'a String>,
    exact: bool,
) -> AppResult<()> {
    let expected_set: HashSet<&str> = expected.iter().map(String::as_str).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut problems = Vec::new();

    for id in returned {
        if !expected_set.contains(id.as_str()) {
            problems.push(format!("未知文档 {}", id));
        } else if !seen.insert(id.as_str()) {
            problems.push(format!("重复文档 {}", id));
        }
    }
    if exact {
        for id in expected {
            if !seen.contains(id.as_str()) {
                problems.push(format!("缺少文档 {}", id));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::malformed(stage, problems.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_check_ids_exact() {
        let expected = ids(&["a", "b"]);
        assert!(check_ids("labeling", &expected, &ids(&["b", "a"]), true).is_ok());
        assert!(check_ids("labeling", &expected, &ids(&["a"]), true).is_err());
        assert!(check_ids("labeling", &expected, &ids(&["a", "b", "c"]), true).is_err());
        assert!(check_ids("labeling", &expected, &ids(&["a", "a", "b"]), true).is_err());
    }

    #[test]
    fn test_check_ids_subset() {
        let expected = ids(&["a", "b"]);
        assert!(check_ids("relabel", &expected, &ids(&["b"]), false).is_ok());
        let err = check_ids("relabel", &expected, &ids(&["z"]), false).unwrap_err();
        assert!(err.is_malformed());
    }

    #[derive(Debug, Deserialize)]
    struct Item {
        #[serde(deserialize_with = "de_id")]
        doc_id: String,
    }

    #[test]
    fn test_numeric_ids_become_strings() {
        let item: Item = parse_response("filter", serde_json::json!({"doc_id": 12})).unwrap();
        assert_eq!(item.doc_id, "12");
        let err = parse_response::<Item>("filter", serde_json::json!({"id": 1}));
        assert!(err.unwrap_err().is_malformed());
    }
}
