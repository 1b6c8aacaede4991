use thiserror::Error;

/// 应用程序错误类型
///
/// 分类原则：
/// - `GatewayUnavailable` 可重试，其余一律不在调用点重试
/// - `CoverageViolation` 永远是致命错误，不做自动修复
#[derive(Debug, Error)]
pub enum AppError {
    /// 生成网关不可用（传输失败或超时）
    #[error("生成网关不可用 ({stage}): {message}")]
    GatewayUnavailable { stage: String, message: String },

    /// 网关返回的内容无法通过结构/标识符校验
    #[error("网关返回格式错误 ({stage}): {detail}")]
    MalformedResponse { stage: String, detail: String },

    /// 阶段输出没有守恒文档集合
    #[error(
        "文档覆盖校验失败 ({stage}): 缺失 {missing:?}, 重复 {duplicated:?}, 未知 {unknown:?}"
    )]
    CoverageViolation {
        stage: String,
        missing: Vec<String>,
        duplicated: Vec<String>,
        unknown: Vec<String>,
    },

    /// 在阶段之间收到取消请求
    #[error("运行已取消 (下一阶段: {stage})")]
    Cancelled { stage: String },

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 文档来源错误
    #[error("文档来源错误 ({task_id}): {message}")]
    Source { task_id: String, message: String },

    /// 结果写出错误
    #[error("结果写出失败 ({target}): {message}")]
    Sink { target: String, message: String },

    /// 文件读写错误
    #[error("文件错误 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON 解析错误
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// 只有网关不可用才值得在调用点重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::GatewayUnavailable { .. })
    }

    /// 是否为网关返回格式错误
    pub fn is_malformed(&self) -> bool {
        matches!(self, AppError::MalformedResponse { .. })
    }

    /// 出错的阶段（不属于某个阶段时为空）
    pub fn stage(&self) -> Option<&str> {
        match self {
            AppError::GatewayUnavailable { stage, .. }
            | AppError::MalformedResponse { stage, .. }
            | AppError::CoverageViolation { stage, .. }
            | AppError::Cancelled { stage } => Some(stage),
            _ => None,
        }
    }

    /// 创建网关不可用错误
    pub fn gateway_unavailable(stage: impl Into<String>, message: impl std::fmt::Display) -> Self {
        AppError::GatewayUnavailable {
            stage: stage.into(),
            message: message.to_string(),
        }
    }

    /// 创建网关格式错误
    pub fn malformed(stage: impl Into<String>, detail: impl Into<String>) -> Self {
        AppError::MalformedResponse {
            stage: stage.into(),
            detail: detail.into(),
        }
    }

    /// 创建文件读写错误
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(format!("TOML解析失败: {}", err))
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
