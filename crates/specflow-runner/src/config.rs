use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::backend::BackendSettings;
use crate::coordinator::ParallelOptions;
use crate::rate_limit::RetryPolicy;

#[derive(Debug, Parser)]
#[command(name = "specflow-runner", about = "Run prompts through AI coding CLIs")]
pub struct RunnerConfig {
    /// One-shot backend override (wins over SPECFLOW_AI_BACKEND)
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Configured default backend
    #[arg(long, env = "SPECFLOW_AI_BACKEND", global = true, hide_env_values = true)]
    pub ai_backend: Option<String>,

    /// Default model when neither the call nor the subagent sets one
    #[arg(long, env = "SPECFLOW_DEFAULT_MODEL", global = true)]
    pub default_model: Option<String>,

    /// Directory holding <name>.md subagent prompt files
    #[arg(
        long,
        env = "SPECFLOW_SUBAGENT_DIR",
        default_value = ".specflow/agents",
        global = true
    )]
    pub subagent_dir: PathBuf,

    /// Working directory for the backend CLI
    #[arg(long, env = "SPECFLOW_WORK_DIR", global = true)]
    pub work_dir: Option<PathBuf>,

    /// Grace period after SIGTERM before SIGKILL (seconds).
    #[arg(long, env = "SPECFLOW_KILL_GRACE", default_value = "5", global = true)]
    pub kill_grace: u64,

    /// Total attempts for rate-limited executions.
    #[arg(long, env = "SPECFLOW_MAX_RETRIES", default_value = "3", global = true)]
    pub max_retries: u32,

    /// Base delay for rate-limit backoff (seconds); doubles per attempt.
    #[arg(long, default_value = "2", global = true)]
    pub retry_base_delay: u64,

    /// Upper bound for a single backoff delay (seconds).
    #[arg(long, default_value = "60", global = true)]
    pub retry_max_delay: u64,

    #[command(subcommand)]
    pub command: RunnerCommand,
}

#[derive(Debug, Subcommand)]
pub enum RunnerCommand {
    /// Run a single prompt, streaming output to stdout.
    Run(RunArgs),
    /// Run a JSON array of tasks concurrently.
    Batch(BatchArgs),
    /// Report which backend CLIs are installed.
    Check,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Prompt text
    #[arg(long)]
    pub prompt: String,

    /// Subagent whose instructions and model apply
    #[arg(long)]
    pub subagent: Option<String>,

    /// Model for this call
    #[arg(long)]
    pub model: Option<String>,

    /// Timeout in seconds (0 = none)
    #[arg(long, env = "SPECFLOW_TIMEOUT", default_value = "0")]
    pub timeout: u64,

    /// Let the CLI persist the conversation
    #[arg(long)]
    pub keep_session: bool,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// JSON file: [{"id": "...", "prompt": "...", "subagent": "...", "model": "..."}]
    #[arg(long)]
    pub tasks: PathBuf,

    /// Maximum concurrent tasks
    #[arg(long, env = "SPECFLOW_MAX_WORKERS", default_value = "4")]
    pub workers: usize,

    /// Stop starting tasks after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Per-task timeout in seconds (0 = none)
    #[arg(long, env = "SPECFLOW_TIMEOUT", default_value = "0")]
    pub timeout: u64,
}

impl RunnerConfig {
    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            default_model: self.default_model.clone(),
            subagent_dir: self.subagent_dir.clone(),
            kill_grace: Duration::from_secs(self.kill_grace),
            work_dir: self.work_dir.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: Duration::from_secs(self.retry_base_delay),
            max_delay: Duration::from_secs(self.retry_max_delay),
        }
    }

    pub fn parallel_options(&self, args: &BatchArgs) -> ParallelOptions {
        ParallelOptions {
            max_workers: args.workers,
            fail_fast: args.fail_fast,
            timeout: timeout_from_secs(args.timeout),
            isolate_session: true,
            retry: self.retry_policy(),
        }
    }
}

/// Zero seconds means no deadline.
pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
