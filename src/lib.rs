//! # Doc Labeler
//!
//! 按查询对候选文档进行相关度分级标注的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有外部资源，只暴露能力
//! - `GenerationGateway` - 生成网关边界，`OpenAiGateway` 为其实现，`RetryingGateway` 负责超时与重试
//! - `LabelStudioClient` - 任务读取与标注写回
//! - `DocumentSource` / `ResultSink` - 任务来源与结果输出
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心先后顺序
//! - `FilterService` - 过滤明显无关的文档
//! - `GroupingService` - 分组、分组审核、重新分组
//! - `LabelingService` - 标注、标签审核、重新标注
//! - `QuotaEngine` / `criteria` - 确定性的排名、配额与规则
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 审核-修复状态机 `ReviewLoop` 及两个具体循环
//! - `RunCtx` - 上下文封装（任务 ID + 批次序号）
//! - `CancelToken` - 阶段边界的协作式取消
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/controller` - 单次运行控制器，独占分组/标签状态
//! - `orchestrator/batch_processor` - 批量任务处理器，管理来源、输出与统计
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, RunParams};
pub use error::{AppError, AppResult};
pub use infrastructure::{GatewayRequest, GenerationGateway, StageKind};
pub use models::{Label, Report, RunOutcome, TaskInput};
pub use orchestrator::{App, AppOptions, SourceKind, WorkflowController};
pub use workflow::{CancelToken, RunCtx};
