//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `controller` - 单次运行控制器
//! - 按顺序执行过滤、分组、分组审核、标注、标签审核、最终规则与配额
//! - 独占当前分组/标签状态，在阶段边界检查取消
//! - 组装报告
//!
//! ### `batch_processor` - 批量任务处理器
//! - 构建网关、文档来源、结果输出
//! - 逐个运行任务，把报告交给输出
//! - 输出全局统计信息
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<task id>)
//!     ↓
//! controller (处理单个 TaskInput)
//!     ↓
//! workflow::ReviewLoop (分组/标签审核循环)
//!     ↓
//! services (能力层：filter / grouping / labeling / quota)
//!     ↓
//! infrastructure (基础设施：网关、Label Studio、文件)
//! ```

pub mod batch_processor;
pub mod controller;

pub use batch_processor::{App, AppOptions, SourceKind};
pub use controller::WorkflowController;
