//! Healer - 端到端 UI 测试自愈
//!
//! 入口：初始化日志、加载配置、构造推理客户端与测试执行器，运行一次自愈会话。
//! 退出码：测试通过（或无需自愈）为 0，其余为 1。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use healer::{
    config::{load_config, AppConfig},
    healing::{CommandRunner, HealingConfig, HealingLoop},
    llm::create_llm_from_config,
    observability, HealError,
};

/// 修复失败的端到端 UI 测试脚本：诊断、修补并回归验证
#[derive(Parser, Debug)]
#[command(name = "healer")]
#[command(version)]
#[command(about, long_about = None)]
struct Cli {
    /// 待修复的测试文件（须位于允许目录下）
    test_file: String,

    /// 最大修复尝试次数（覆盖配置中的 healing.max_retries）
    #[arg(long)]
    max_retries: Option<usize>,

    /// 额外的 TOML 配置文件
    #[arg(long)]
    config: Option<PathBuf>,
}

/// 显式指定的配置文件加载失败时报错；否则回落到默认配置
fn resolve_config(path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let explicit = path.is_some();
    match load_config(path).map_err(HealError::from) {
        Ok(cfg) => Ok(cfg),
        Err(e) if explicit => Err(e).context("Failed to load config"),
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            Ok(AppConfig::default())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cli = Cli::parse();
    let cfg = resolve_config(cli.config)?;

    let llm = create_llm_from_config(&cfg.llm);
    let runner = Arc::new(CommandRunner::from(&cfg.runner));
    let mut healing_config = HealingConfig::from(&cfg);
    if let Some(n) = cli.max_retries {
        healing_config.max_retries = n;
    }

    let healing_loop = HealingLoop::new(llm.clone(), runner, healing_config);
    let report = healing_loop.attempt_healing(&cli.test_file).await;

    println!("{}", report.outcome.message());
    if !report.decisions.is_empty() {
        match healing_loop.recorder().latest() {
            Ok(latest) => {
                if let Some(decision) = latest.decision {
                    println!(
                        "\nLatest decision: {} (confidence {:.2})",
                        decision.failure_type, decision.confidence_score
                    );
                    println!("Summary: {}", decision.failure_summary);
                }
                if let Some(timeline) = latest.timeline {
                    println!("Timeline ({}):", timeline.session_id());
                    for step in timeline.steps() {
                        println!("  - [{}] {}", step.step_name, step.details);
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not read latest artifacts"),
        }
        println!("\nArtifacts: {}", healing_loop.recorder().dir().display());

        let (prompt, completion, total) = llm.token_usage();
        if total > 0 {
            println!(
                "Tokens: {} prompt + {} completion = {}",
                prompt, completion, total
            );
        }
    }

    if !report.outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
