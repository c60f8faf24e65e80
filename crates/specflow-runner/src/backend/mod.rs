pub mod auggie;
pub mod claude_cli;
pub mod cursor;
pub mod factory;
pub mod gemini_cli;
pub mod mock;

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use specflow_core::{BackendError, BackendPlatform, ExecutionRequest, ExecutionResult};
use specflow_prompts::{compose_prompt, Subagent, SubagentLoader};
use tracing::debug;

use crate::process;
use crate::rate_limit;

pub use auggie::AuggieBackend;
pub use claude_cli::ClaudeCliBackend;
pub use cursor::CursorBackend;
pub use gemini_cli::GeminiCliBackend;

/// Settings shared by every concrete backend.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Model used when neither the call nor the subagent names one.
    pub default_model: Option<String>,
    /// Directory holding `<name>.md` subagent prompt files.
    pub subagent_dir: PathBuf,
    /// Grace period after SIGTERM before SIGKILL.
    pub kill_grace: Duration,
    /// Working directory for the CLI; inherits ours when unset.
    pub work_dir: Option<PathBuf>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            default_model: None,
            subagent_dir: PathBuf::from(".specflow/agents"),
            kill_grace: Duration::from_secs(5),
            work_dir: None,
        }
    }
}

impl BackendSettings {
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn subagents(&self) -> SubagentLoader {
        SubagentLoader::new(&self.subagent_dir)
    }
}

/// Pick the model for one call.
///
/// Explicit per-call model, then the subagent's declared model, then the
/// backend's default. Blank values are skipped. `None` leaves the choice to
/// the CLI.
pub fn resolve_model(
    explicit: Option<&str>,
    subagent: Option<&str>,
    default: Option<&str>,
) -> Option<String> {
    [explicit, subagent, default]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|m| !m.is_empty())
        .map(str::to_string)
}

/// Capability contract for AI coding CLI backends.
///
/// Each backend encapsulates:
/// - How to invoke its CLI non-interactively
/// - Which flags express session isolation and model selection
/// - Which output phrases mean the vendor is throttling us
/// - How to prove the CLI is installed
///
/// The trait does NOT handle:
/// - Interactive use (callers embed any user input in the prompt)
/// - Process group management (handled by [`process::run_streaming`])
/// - Retries (handled by [`rate_limit::execute_with_retry`])
pub trait AgentBackend: Send {
    /// Human-readable backend name for logging and error messages.
    fn name(&self) -> &str;

    fn platform(&self) -> BackendPlatform;

    /// Whether several instances may run at once. A fact about the CLI.
    fn supports_parallel(&self) -> bool {
        true
    }

    fn settings(&self) -> &BackendSettings;

    /// Default model configured for this instance.
    fn model_hint(&self) -> Option<&str> {
        self.settings().default_model.as_deref()
    }

    /// Build the non-interactive CLI invocation.
    fn command(&self, prompt: &str, model: Option<&str>, isolate_session: bool) -> Command;

    /// Whether the installed CLI takes a model flag.
    fn accepts_model(&self) -> bool {
        true
    }

    /// Vendor phrases that indicate throttling, on top of the common ones.
    fn rate_limit_patterns(&self) -> &[&'static str] {
        &[]
    }

    /// Returns `(installed, diagnostic)`.
    fn check_installed(&self) -> (bool, String);

    fn load_subagent(&self, name: &str) -> Subagent {
        self.settings().subagents().load(name)
    }

    fn resolve_model(&self, request: &ExecutionRequest, subagent: &Subagent) -> Option<String> {
        resolve_model(
            request.model.as_deref(),
            subagent.metadata.model(),
            self.model_hint(),
        )
    }

    /// Run one request, streaming each output line to `on_line`.
    fn execute(
        &self,
        request: &ExecutionRequest,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<ExecutionResult, BackendError> {
        let subagent = match request.subagent.as_deref() {
            Some(name) => self.load_subagent(name),
            None => Subagent::default(),
        };

        let model = match self.resolve_model(request, &subagent) {
            Some(m) if !self.accepts_model() => {
                debug!("{} does not accept a model flag, ignoring {m}", self.name());
                None
            }
            other => other,
        };

        let prompt = compose_prompt(&subagent.body, &request.prompt);
        let mut cmd = self.command(&prompt, model.as_deref(), request.isolate_session);
        if let Some(ref dir) = self.settings().work_dir {
            cmd.current_dir(dir);
        }

        debug!(
            backend = self.name(),
            model = model.as_deref().unwrap_or("<cli default>"),
            isolate_session = request.isolate_session,
            "executing prompt"
        );
        let (exit_code, output) = process::run_streaming(
            cmd,
            request.effective_timeout(),
            self.settings().kill_grace,
            on_line,
        )?;
        Ok(ExecutionResult::from_exit(exit_code, output))
    }

    /// Run one request and collect the output without a live callback.
    fn run(&self, request: &ExecutionRequest) -> Result<ExecutionResult, BackendError> {
        self.execute(request, &mut |_: &str| {})
    }

    fn detect_rate_limit(&self, output: &str) -> bool {
        rate_limit::is_rate_limited(output, self.rate_limit_patterns())
    }

    /// Release held resources. Called once when the backend's task ends.
    fn close(&mut self) {}
}

/// Upper bound on a `--version` or `--help` call.
pub(crate) const CLI_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `<program> <args>` and treat a zero exit with version-like output as
/// proof of installation.
pub(crate) fn version_check(
    program: &str,
    args: &[&str],
    install_hint: &str,
    settings: &BackendSettings,
) -> (bool, String) {
    version_check_within(program, args, install_hint, CLI_PROBE_TIMEOUT, settings.kill_grace)
}

fn version_check_within(
    program: &str,
    args: &[&str],
    install_hint: &str,
    timeout: Duration,
    kill_grace: Duration,
) -> (bool, String) {
    let mut cmd = Command::new(program);
    cmd.args(args);
    let invocation = format!("{program} {}", args.join(" "));

    let (exit_code, output) =
        match process::run_streaming(cmd, Some(timeout), kill_grace, &mut |_: &str| {}) {
            Ok(done) => done,
            Err(BackendError::Spawn { source, .. }) => {
                return (
                    false,
                    format!("{program} is not installed ({source}). {install_hint}"),
                )
            }
            Err(BackendError::Timeout { .. }) => {
                return (
                    false,
                    format!("`{}` timed out after {timeout:?}. {install_hint}", invocation.trim()),
                )
            }
            Err(e) => return (false, format!("`{}` failed: {e}", invocation.trim())),
        };

    let version = output.trim();
    if exit_code != 0 {
        return (
            false,
            format!("`{}` failed: {version}. {install_hint}", invocation.trim()),
        );
    }
    if !version.chars().any(|c| c.is_ascii_digit()) {
        return (
            false,
            format!("{program} printed no version information. {install_hint}"),
        );
    }
    (true, format!("{program}: {version}"))
}

/// The closed set of concrete backends, one variant per implemented
/// [`BackendPlatform`]. Only [`factory::create_backend`] builds these.
pub enum Backend {
    Auggie(AuggieBackend),
    Claude(ClaudeCliBackend),
    Cursor(CursorBackend),
    Gemini(GeminiCliBackend),
}

macro_rules! delegate {
    ($self:expr, $b:ident => $body:expr) => {
        match $self {
            Backend::Auggie($b) => $body,
            Backend::Claude($b) => $body,
            Backend::Cursor($b) => $body,
            Backend::Gemini($b) => $body,
        }
    };
}

impl AgentBackend for Backend {
    fn name(&self) -> &str {
        delegate!(self, b => b.name())
    }

    fn platform(&self) -> BackendPlatform {
        delegate!(self, b => b.platform())
    }

    fn supports_parallel(&self) -> bool {
        delegate!(self, b => b.supports_parallel())
    }

    fn settings(&self) -> &BackendSettings {
        delegate!(self, b => b.settings())
    }

    fn model_hint(&self) -> Option<&str> {
        delegate!(self, b => b.model_hint())
    }

    fn command(&self, prompt: &str, model: Option<&str>, isolate_session: bool) -> Command {
        delegate!(self, b => b.command(prompt, model, isolate_session))
    }

    fn accepts_model(&self) -> bool {
        delegate!(self, b => b.accepts_model())
    }

    fn rate_limit_patterns(&self) -> &[&'static str] {
        delegate!(self, b => b.rate_limit_patterns())
    }

    fn check_installed(&self) -> (bool, String) {
        delegate!(self, b => b.check_installed())
    }

    fn close(&mut self) {
        delegate!(self, b => b.close())
    }
}
