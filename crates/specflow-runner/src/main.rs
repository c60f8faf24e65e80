use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use specflow_core::{BackendPlatform, ExecutionRequest};
use specflow_runner::backend::factory::create_backend;
use specflow_runner::config::{timeout_from_secs, BatchArgs, RunArgs, RunnerCommand, RunnerConfig};
use specflow_runner::coordinator::{BackendLease, ParallelExecutor, ParallelTask};
use specflow_runner::rate_limit::execute_with_retry;
use specflow_runner::run_tracker::TaskStatus;
use specflow_runner::{preflight, resolver};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = RunnerConfig::parse();
    match dispatch(&config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(config: &RunnerConfig) -> Result<bool> {
    match &config.command {
        RunnerCommand::Check => Ok(check(config)),
        RunnerCommand::Run(args) => {
            let platform = resolve(config)?;
            run_single(config, platform, args).await
        }
        RunnerCommand::Batch(args) => {
            let platform = resolve(config)?;
            run_batch(config, platform, args).await
        }
    }
}

fn resolve(config: &RunnerConfig) -> Result<BackendPlatform> {
    let platform = resolver::resolve_platform(config.backend.as_deref(), || {
        config.ai_backend.clone()
    })?;
    info!("backend: {platform}");
    Ok(platform)
}

fn check(config: &RunnerConfig) -> bool {
    let rows = preflight::check_all(&config.backend_settings());
    for row in &rows {
        let mark = if row.installed { "ok" } else { "missing" };
        println!("{:<8} {:<8} {}", row.platform, mark, row.message);
    }
    rows.iter().any(|r| r.installed)
}

async fn run_single(config: &RunnerConfig, platform: BackendPlatform, args: &RunArgs) -> Result<bool> {
    let settings = config.backend_settings();
    let policy = config.retry_policy();

    let request = ExecutionRequest {
        prompt: args.prompt.clone(),
        subagent: args.subagent.clone(),
        model: args.model.clone(),
        isolate_session: !args.keep_session,
        timeout: timeout_from_secs(args.timeout),
    };

    let result = tokio::task::spawn_blocking(move || {
        let backend = BackendLease::new(Box::new(create_backend(platform, &settings, true)?));
        execute_with_retry(&*backend, &request, &policy, &mut |line: &str| {
            println!("{line}")
        })
    })
    .await
    .context("execution worker panicked")??;

    if !result.succeeded {
        error!("backend exited with code {}", result.exit_code);
    }
    Ok(result.succeeded)
}

async fn run_batch(config: &RunnerConfig, platform: BackendPlatform, args: &BatchArgs) -> Result<bool> {
    let raw = std::fs::read_to_string(&args.tasks)
        .with_context(|| format!("read tasks file {}", args.tasks.display()))?;
    let mut tasks: Vec<ParallelTask> = serde_json::from_str(&raw)
        .with_context(|| format!("parse tasks file {}", args.tasks.display()))?;
    for task in &mut tasks {
        if task.id.trim().is_empty() {
            task.id = uuid::Uuid::new_v4().to_string();
        }
    }

    let settings = config.backend_settings();
    preflight::require(platform, &settings)?;

    let executor = ParallelExecutor::new(platform, settings, config.parallel_options(args));
    let report = executor.run(tasks).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    info!(
        "batch finished: {} succeeded, {} failed, {} cancelled",
        report.count(TaskStatus::Succeeded),
        report.count(TaskStatus::Failed),
        report.count(TaskStatus::Cancelled)
    );
    match report.into_result() {
        Ok(_) => Ok(true),
        Err(e) => {
            error!("{e}");
            Ok(false)
        }
    }
}
