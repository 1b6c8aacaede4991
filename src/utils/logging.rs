//! 日志工具模块
//!
//! 提供运行横幅、阶段横幅和统计输出的辅助函数

use tracing::info;

use crate::models::report::{LoopTrace, Report};
use crate::models::task::TaskInput;
use crate::workflow::run_ctx::RunCtx;

/// 记录单个任务的开始信息
pub fn log_run_banner(ctx: &RunCtx, input: &TaskInput) {
    info!("\n{}", "=".repeat(60));
    info!("{} 🚀 开始处理", ctx);
    info!("🔍 查询: {}", input.query);
    info!("📍 位置: {}", input.location.as_deref().unwrap_or("未指定"));
    info!(
        "📄 待标注文档: {} 个, 参考样例: {} 个",
        input.documents.len(),
        input.examples.len()
    );
    info!("{}", "=".repeat(60));
}

/// 记录阶段开始
pub fn log_stage(ctx: &RunCtx, stage: &str) {
    info!("{} {} {}", ctx, "─".repeat(10), stage);
}

fn loop_line(trace: &LoopTrace) -> String {
    format!(
        "审核 {} 次 / 修复 {}/{} 次{}",
        trace.reviews,
        trace.repairs,
        trace.max_attempts,
        if trace.exhausted() { " (耗尽)" } else { "" }
    )
}

/// 打印单个任务的统计信息
pub fn log_summary(ctx: &RunCtx, report: &Report) {
    info!("\n{}", "─".repeat(60));
    info!("{} 📊 处理完成", ctx);
    for (label, count) in &report.distribution {
        info!("  {:<18} {}", label.to_string(), count);
    }
    info!("🗑️ 过滤: {} 个", report.filtered.len());
    info!("🧩 分组审核: {}", loop_line(&report.group_loop));
    info!("🏷️ 标签审核: {}", loop_line(&report.label_loop));
    if !report.quota_downgrades.is_empty() {
        info!("📉 配额降级: {} 个", report.quota_downgrades.len());
    }
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(completed: usize, exhausted: usize, aborted: usize, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 完成: {}/{}", completed, total);
    if exhausted > 0 {
        info!("⚠️ 其中审核耗尽: {}", exhausted);
    }
    info!("❌ 中止: {}", aborted);
    info!("{}", "=".repeat(60));
}
