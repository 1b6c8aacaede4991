//! 生成网关 - 基础设施层
//!
//! 外部语言模型调用的边界。网关只负责"发请求、拿回 JSON"，
//! 不保证返回内容的结构正确，校验由各个阶段完成。

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;

use crate::error::AppResult;

/// 阶段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Filter,
    Grouping,
    GroupReview,
    Regroup,
    Labeling,
    LabelReview,
    Relabel,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Filter => "filter",
            StageKind::Grouping => "grouping",
            StageKind::GroupReview => "group_review",
            StageKind::Regroup => "regroup",
            StageKind::Labeling => "labeling",
            StageKind::LabelReview => "label_review",
            StageKind::Relabel => "relabel",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 网关请求
#[derive(Debug, Clone, Serialize)]
pub struct GatewayRequest {
    pub stage: StageKind,
    /// 任务描述（查询、位置、约束、反馈等）
    pub task: String,
    /// 结构化的文档列表
    pub documents: Vec<JsonValue>,
    /// 可选的参考样例
    #[serde(skip_serializing_if = "Option::is_none")]
    pub examples: Option<JsonValue>,
}

impl GatewayRequest {
    pub fn new(stage: StageKind, task: impl Into<String>, documents: Vec<JsonValue>) -> Self {
        Self {
            stage,
            task: task.into(),
            documents,
            examples: None,
        }
    }

    pub fn with_examples(mut self, examples: JsonValue) -> Self {
        self.examples = Some(examples);
        self
    }
}

/// 生成能力
///
/// 实现方需要把传输失败/超时映射为 `GatewayUnavailable`，
/// 把无法解析为 JSON 的输出映射为 `MalformedResponse`。
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    async fn generate(&self, request: &GatewayRequest) -> AppResult<JsonValue>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// 用闭包模拟网关
    pub struct FnGateway<F>(pub F);

    #[async_trait]
    impl<F> GenerationGateway for FnGateway<F>
    where
        F: Fn(&GatewayRequest) -> AppResult<JsonValue> + Send + Sync,
    {
        async fn generate(&self, request: &GatewayRequest) -> AppResult<JsonValue> {
            (self.0)(request)
        }
    }
}
