//! questionnaire：命令行入口
//!
//! 解析参数、初始化日志、加载配置，运行一次问答循环（或 --import 批量问答）并以退出码报告结果（0 成功 / 1 用尽重试 / 2 失败）。

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use questionnaire::{
    batch,
    cli::Cli,
    config::load_config,
    core::{create_orchestrator, AgentOrchestrator},
    observability,
    report::{self, EXIT_FAILURE},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let level = observability::level_for(cli.verbose, cli.debug);
    observability::init(level, cli.log_file.as_deref()).context("Failed to open log file")?;

    let mut cfg = load_config(cli.config.clone()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut cfg);

    let orchestrator = create_orchestrator(&cfg).context("Failed to set up agents")?;

    if let Some(input) = cli.import.as_deref() {
        return run_batch(&orchestrator, input, cli.output.as_deref()).await;
    }

    let question = cli.question.as_deref().context("No question given")?;
    tracing::info!("Question: {}", question);
    let outcome = orchestrator
        .answer_question(question)
        .await
        .context("Run aborted")?;

    report::print_outcome(&outcome, cli.json).context("Failed to print result")?;
    Ok(report::exit_code(&outcome))
}

async fn run_batch(
    orchestrator: &AgentOrchestrator,
    input: &Path,
    output: Option<&Path>,
) -> anyhow::Result<u8> {
    let file = File::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let items = batch::read_items(BufReader::new(file))
        .with_context(|| format!("Failed to read {}", input.display()))?;
    tracing::info!("Loaded {} question(s) from {}", items.len(), input.display());

    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout()),
    };
    let summary = batch::run_batch(orchestrator, &items, &mut out)
        .await
        .context("Batch aborted")?;

    eprintln!(
        "Processed {}/{} question(s) successfully ({} exhausted, {} failed)",
        summary.succeeded,
        summary.total(),
        summary.exhausted,
        summary.failed
    );
    Ok(summary.exit_code())
}
