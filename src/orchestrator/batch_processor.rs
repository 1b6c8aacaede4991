//! 批量任务处理器 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：构建网关、文档来源和结果输出
//! 2. **逐个处理**：一次只运行一个任务，任务之间互不影响
//! 3. **结果分发**：完成的报告交给所有输出；输出失败只记录日志
//! 4. **全局统计**：汇总所有任务的处理结果
//!
//! 某个任务中止不会影响后续任务；收到取消请求后不再开始新任务。

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::infrastructure::{
    DocumentSource, GenerationGateway, JsonFileSink, JsonFileSource, LabelStudioClient,
    LabelStudioSink, LabelStudioSource, OpenAiGateway, ResultSink, RetryingGateway,
};
use crate::models::report::RunOutcome;
use crate::orchestrator::controller::WorkflowController;
use crate::utils::logging;
use crate::workflow::{CancelToken, RunCtx};

/// 任务来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceKind {
    /// 本地 JSON 任务文件
    File,
    /// Label Studio 接口
    LabelStudio,
}

/// 命令行给出的运行选项
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub source: SourceKind,
    /// 是否把结果写回 Label Studio
    pub write_back: bool,
    /// 覆盖配置中的任务文件
    pub input: Option<String>,
    /// 覆盖配置中的输出目录
    pub output_dir: Option<String>,
}

/// 应用主结构
pub struct App {
    controller: WorkflowController,
    source: Box<dyn DocumentSource>,
    sinks: Vec<Box<dyn ResultSink>>,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config, options: &AppOptions, cancel: CancelToken) -> Result<Self> {
        log_startup(&config, options);

        let gateway: Arc<dyn GenerationGateway> = Arc::new(RetryingGateway::from_params(
            Arc::new(OpenAiGateway::new(&config)),
            &config.run,
        ));

        let needs_label_studio = options.source == SourceKind::LabelStudio || options.write_back;
        let label_studio = if needs_label_studio {
            Some(Arc::new(
                LabelStudioClient::new(&config).context("创建 Label Studio 客户端失败")?,
            ))
        } else {
            None
        };

        let source: Box<dyn DocumentSource> = match (options.source, &label_studio) {
            (SourceKind::LabelStudio, Some(client)) => Box::new(LabelStudioSource::new(client.clone())),
            _ => Box::new(JsonFileSource::new(
                options.input.clone().unwrap_or_else(|| config.input_file.clone()),
            )),
        };

        let mut sinks: Vec<Box<dyn ResultSink>> = vec![Box::new(JsonFileSink::new(
            options
                .output_dir
                .clone()
                .unwrap_or_else(|| config.output_dir.clone()),
        ))];
        if let (true, Some(client)) = (options.write_back, &label_studio) {
            sinks.push(Box::new(LabelStudioSink::new(client.clone())));
        }

        let controller = WorkflowController::new(gateway, config.run.clone(), cancel);
        Ok(Self::with_parts(controller, source, sinks))
    }

    /// 由已构建的组件组装
    pub fn with_parts(
        controller: WorkflowController,
        source: Box<dyn DocumentSource>,
        sinks: Vec<Box<dyn ResultSink>>,
    ) -> Self {
        Self {
            controller,
            source,
            sinks,
        }
    }

    /// 运行应用主逻辑
    ///
    /// 未指定任务时处理来源中的全部任务
    pub async fn run(&self, task_ids: &[u64]) -> Result<Vec<RunOutcome>> {
        let task_ids = if task_ids.is_empty() {
            self.source
                .task_ids()
                .await
                .with_context(|| format!("无法从 {} 列出任务", self.source.name()))?
        } else {
            task_ids.to_vec()
        };

        if task_ids.is_empty() {
            warn!("⚠️ 没有找到待处理的任务，程序结束");
            return Ok(Vec::new());
        }
        info!("✓ 找到 {} 个待处理的任务 (来源: {})", task_ids.len(), self.source.name());

        let total = task_ids.len();
        let mut outcomes = Vec::with_capacity(total);
        for (idx, task_id) in task_ids.iter().enumerate() {
            if self.controller.cancel_token().is_cancelled() {
                warn!("🛑 已取消，跳过剩余 {} 个任务", total - idx);
                break;
            }
            let ctx = RunCtx::new(*task_id, idx + 1, total);
            outcomes.push(self.process_task(&ctx).await);
        }

        print_final_stats(&outcomes, total);
        Ok(outcomes)
    }

    /// 处理单个任务
    pub async fn process_task(&self, ctx: &RunCtx) -> RunOutcome {
        let input = match self.source.load(ctx.task_id).await {
            Ok(input) => input,
            Err(e) => {
                error!("{} ❌ 加载失败: {}", ctx, e);
                return RunOutcome::Aborted {
                    task_id: ctx.task_id,
                    stage: "load".to_string(),
                    reason: e.to_string(),
                };
            }
        };

        let report = match self.controller.run_in(ctx, &input).await {
            Ok(report) => report,
            Err(e) => {
                error!("{} ❌ 运行中止: {}", ctx, e);
                return RunOutcome::Aborted {
                    task_id: ctx.task_id,
                    stage: e.stage().unwrap_or("run").to_string(),
                    reason: e.to_string(),
                };
            }
        };

        for sink in &self.sinks {
            match sink.deliver(&report).await {
                Ok(()) => info!("{} 📤 已写出到 {}", ctx, sink.name()),
                Err(e) => error!("{} ⚠️ 写出到 {} 失败: {}", ctx, sink.name(), e),
            }
        }

        RunOutcome::Completed(Box::new(report))
    }
}

// ========== 日志辅助函数 ==========

fn log_startup(config: &Config, options: &AppOptions) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 文档相关度标注");
    info!("🤖 模型: {}", config.llm_model_name);
    info!("📥 来源: {:?}, 写回: {}", options.source, options.write_back);
    info!(
        "📊 RELEVANT 上限: {}, 审核次数: 分组 {} / 标签 {}",
        config.run.max_relevant,
        config.run.max_group_review_attempts,
        config.run.max_label_review_attempts
    );
    info!("{}", "=".repeat(60));
}

fn print_final_stats(outcomes: &[RunOutcome], total: usize) {
    let completed = outcomes.iter().filter(|o| o.report().is_some()).count();
    let exhausted = outcomes
        .iter()
        .filter_map(RunOutcome::report)
        .filter(|r| r.is_exhausted())
        .count();
    let aborted = outcomes.len() - completed;
    logging::print_final_stats(completed, exhausted, aborted, total);

    for outcome in outcomes {
        if let RunOutcome::Aborted {
            task_id,
            stage,
            reason,
        } = outcome
        {
            warn!("  任务 #{} 在 {} 阶段中止: {}", task_id, stage, reason);
        }
    }
}
