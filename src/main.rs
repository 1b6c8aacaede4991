use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::warn;

use doc_labeler::config::Config;
use doc_labeler::logger;
use doc_labeler::orchestrator::{App, AppOptions, SourceKind};
use doc_labeler::workflow::CancelToken;

/// 按查询对候选文档进行相关度标注
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// 要处理的任务 ID；为空时处理任务文件中的全部任务
    task_ids: Vec<u64>,

    /// 任务来源
    #[arg(long, value_enum, default_value = "file")]
    source: SourceKind,

    /// 把结果写回 Label Studio
    #[arg(long)]
    write_back: bool,

    /// 本地任务文件（覆盖 INPUT_FILE）
    #[arg(long)]
    input: Option<String>,

    /// 报告输出目录（覆盖 OUTPUT_DIR）
    #[arg(long)]
    output_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logger::init();

    let cli = Cli::parse();

    // 加载配置
    let config = Config::from_env().context("加载配置失败")?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("🛑 收到中断信号，当前阶段结束后停止");
                cancel.cancel();
            }
        });
    }

    let options = AppOptions {
        source: cli.source,
        write_back: cli.write_back,
        input: cli.input,
        output_dir: cli.output_dir,
    };

    // 初始化并运行应用
    let app = App::initialize(config, &options, cancel)?;
    let outcomes = app.run(&cli.task_ids).await?;

    let aborted = outcomes.iter().filter(|o| o.report().is_none()).count();
    if aborted > 0 {
        bail!("{} 个任务中止", aborted);
    }
    Ok(())
}
