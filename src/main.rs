//! Forage - Rust 自主智能体执行核心
//!
//! 入口：初始化日志、加载配置、装配 AgentExecutor，执行命令行给出的目标并输出 JSON 结果。
//!
//! 用法：`forage [--config PATH] <目标描述...>`

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use forage::{
    agent::create_agent,
    config::load_config,
    core::{ShutdownCoordinator, ShutdownManager},
    observability,
    ontology::JsonFileStore,
    Goal,
};

struct CliArgs {
    config_path: Option<PathBuf>,
    goal: String,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut config_path = None;
    let mut words = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config requires a path")?;
                config_path = Some(PathBuf::from(path));
            }
            _ => words.push(arg),
        }
    }
    let goal = words.join(" ");
    if goal.trim().is_empty() {
        bail!("usage: forage [--config PATH] <goal description...>");
    }
    Ok(CliArgs { config_path, goal })
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // 日志写 stderr，stdout 只输出结果 JSON
    let _ = observability::init();

    let args = parse_args()?;
    let cfg = load_config(args.config_path).context("Failed to load config")?;

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let mut executor = create_agent(&cfg, shutdown.token()).context("Failed to create agent")?;
    executor.start().await;

    let result = executor.execute_goal(Goal::new(args.goal)).await;

    let mut coordinator =
        ShutdownCoordinator::new(Arc::clone(&shutdown)).with_cleanup_timeout(Duration::from_secs(10));
    if let Some(dir) = &cfg.agent.store_dir {
        coordinator = coordinator.with_store(Arc::new(JsonFileStore::new(dir)));
    }
    let report = coordinator.finish(&mut executor).await;
    tracing::info!(
        persisted = report.persisted,
        sessions_closed = report.sessions_closed,
        "Agent finished"
    );

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to serialize result")?
    );

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
