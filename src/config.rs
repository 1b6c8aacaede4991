//! 程序配置
//!
//! 所有字段都有默认值，并允许通过环境变量覆盖。
//! 运行参数（`RunParams`）还可以来自 TOML 文件的 `[run]` 表，优先级：
//! 默认值 < TOML 文件 < 环境变量。

use serde::Deserialize;
use std::path::Path;

use crate::error::{AppError, AppResult};

/// 一次运行的参数，在构造 `WorkflowController` 时传入
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunParams {
    /// 最终报告中 RELEVANT 的最大数量
    pub max_relevant: usize,
    /// 分组最小成员数
    pub min_group_size: usize,
    /// 分组最大成员数
    pub max_group_size: usize,
    /// 分组审核循环的最大修复次数
    pub max_group_review_attempts: u32,
    /// 标签审核循环的最大修复次数
    pub max_label_review_attempts: u32,
    /// 生成温度（越低越稳定）
    pub temperature: f32,
    /// 单次生成的最大 token 数
    pub max_tokens: u32,
    /// 判断"当年"的参考年份；为空时取文档中最新的年份
    pub reference_year: Option<i32>,
    /// 分组审核没有给出置信度时使用的质量分
    pub default_quality: f64,
    /// 标注阶段同时发往网关的分组数量
    pub max_concurrent_groups: usize,
    /// 单次网关调用超时（秒）
    pub gateway_timeout_secs: u64,
    /// 网关不可用时的最大重试次数
    pub gateway_max_retries: u32,
    /// 重试初始等待（毫秒），之后指数退避
    pub retry_delay_ms: u64,
    /// 过滤阶段每次请求包含的文档数量
    pub filter_batch_size: usize,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            max_relevant: 10,
            min_group_size: 2,
            max_group_size: 10,
            max_group_review_attempts: 3,
            max_label_review_attempts: 3,
            temperature: 0.3,
            max_tokens: 2000,
            reference_year: None,
            default_quality: 0.5,
            max_concurrent_groups: 4,
            gateway_timeout_secs: 60,
            gateway_max_retries: 3,
            retry_delay_ms: 2000,
            filter_batch_size: 20,
        }
    }
}

impl RunParams {
    /// 校验参数组合是否合法
    pub fn validate(&self) -> AppResult<()> {
        let mut errors = Vec::new();

        if !(0.0..=1.0).contains(&self.temperature) {
            errors.push(format!("temperature 必须在 0.0 到 1.0 之间, 当前 {}", self.temperature));
        }
        if self.min_group_size < 1 {
            errors.push("min_group_size 必须 >= 1".to_string());
        }
        if self.max_group_size < self.min_group_size {
            errors.push(format!(
                "max_group_size ({}) 必须 >= min_group_size ({})",
                self.max_group_size, self.min_group_size
            ));
        }
        if self.max_relevant == 0 {
            errors.push("max_relevant 必须 >= 1".to_string());
        }
        if self.max_concurrent_groups == 0 {
            errors.push("max_concurrent_groups 必须 >= 1".to_string());
        }
        if self.filter_batch_size == 0 {
            errors.push("filter_batch_size 必须 >= 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Config(errors.join("; ")))
        }
    }

    /// 用环境变量覆盖
    fn apply_env(mut self) -> Self {
        self.max_relevant = env_parse("MAX_RELEVANT").unwrap_or(self.max_relevant);
        self.min_group_size = env_parse("MIN_GROUP_SIZE").unwrap_or(self.min_group_size);
        self.max_group_size = env_parse("MAX_GROUP_SIZE").unwrap_or(self.max_group_size);
        self.max_group_review_attempts =
            env_parse("MAX_GROUP_REVIEW_ATTEMPTS").unwrap_or(self.max_group_review_attempts);
        self.max_label_review_attempts =
            env_parse("MAX_LABEL_REVIEW_ATTEMPTS").unwrap_or(self.max_label_review_attempts);
        self.temperature = env_parse("TEMPERATURE").unwrap_or(self.temperature);
        self.max_tokens = env_parse("MAX_TOKENS").unwrap_or(self.max_tokens);
        self.reference_year = env_parse("REFERENCE_YEAR").or(self.reference_year);
        self.max_concurrent_groups =
            env_parse("MAX_CONCURRENT_GROUPS").unwrap_or(self.max_concurrent_groups);
        self.gateway_timeout_secs = env_parse("API_TIMEOUT").unwrap_or(self.gateway_timeout_secs);
        self.gateway_max_retries = env_parse("MAX_RETRIES").unwrap_or(self.gateway_max_retries);
        self.retry_delay_ms = env_parse("RETRY_DELAY_MS").unwrap_or(self.retry_delay_ms);
        self
    }
}

/// 配置文件结构
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    run: RunParams,
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 本地任务文件（JSON 数组）
    pub input_file: String,
    /// 报告输出目录
    pub output_dir: String,
    /// 运行参数
    pub run: RunParams,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- Label Studio 配置 ---
    pub label_studio_url: String,
    pub label_studio_api_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_file: "input_data.json".to_string(),
            output_dir: ".".to_string(),
            run: RunParams::default(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4".to_string(),
            label_studio_url: "http://localhost:8080".to_string(),
            label_studio_api_key: String::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let default = Self::default();
        let config_file = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "labeler.toml".to_string());

        let run = load_run_params(Path::new(&config_file))?.apply_env();
        run.validate()?;

        Ok(Self {
            input_file: std::env::var("INPUT_FILE").unwrap_or(default.input_file),
            output_dir: std::env::var("OUTPUT_DIR").unwrap_or(default.output_dir),
            run,
            llm_api_key: std::env::var("LLM_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            label_studio_url: std::env::var("LABEL_STUDIO_URL").unwrap_or(default.label_studio_url),
            label_studio_api_key: std::env::var("LABEL_STUDIO_API_KEY")
                .unwrap_or(default.label_studio_api_key),
        })
    }
}

/// 从 TOML 文件读取运行参数，文件不存在时使用默认值
pub fn load_run_params(path: &Path) -> AppResult<RunParams> {
    if !path.exists() {
        return Ok(RunParams::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::io(path.display().to_string(), e))?;
    parse_run_params(&content)
}

/// 解析 TOML 文本中的 `[run]` 表
pub fn parse_run_params(content: &str) -> AppResult<RunParams> {
    let file: ConfigFile = toml::from_str(content)?;
    Ok(file.run)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
