use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;

use specflow_core::BackendPlatform;
use tracing::debug;

use super::{version_check, AgentBackend, BackendSettings, CLI_PROBE_TIMEOUT};
use crate::process;

/// Whether the installed `cursor-agent` takes `--model`, probed once per
/// process and shared by every instance.
static MODEL_FLAG: OnceLock<bool> = OnceLock::new();

/// Cursor backend: wraps the `cursor-agent` CLI in print mode.
///
/// Print mode only continues a chat when `--resume` is passed, which this
/// backend never does, so every run is already session-isolated. Older
/// releases lack `--model`.
pub struct CursorBackend {
    settings: BackendSettings,
    model_flag: Option<bool>,
}

impl CursorBackend {
    pub fn new(settings: BackendSettings) -> Self {
        Self {
            settings,
            model_flag: None,
        }
    }

    /// Skip the probe with a known answer.
    pub fn with_model_flag(mut self, supported: bool) -> Self {
        self.model_flag = Some(supported);
        self
    }
}

fn cached_model_flag(cache: &OnceLock<bool>, probe: impl FnOnce() -> bool) -> bool {
    *cache.get_or_init(probe)
}

/// Run a help command and look for `--model`. A timeout or spawn failure
/// counts as unsupported.
fn help_mentions_model(cmd: Command, timeout: Duration, kill_grace: Duration) -> bool {
    match process::run_streaming(cmd, Some(timeout), kill_grace, &mut |_: &str| {}) {
        Ok((_, help)) => {
            let supported = help.contains("--model");
            debug!("cursor-agent --model supported: {supported}");
            supported
        }
        Err(e) => {
            debug!("cursor-agent --help probe failed: {e}");
            false
        }
    }
}

impl AgentBackend for CursorBackend {
    fn name(&self) -> &str {
        "cursor-agent"
    }

    fn platform(&self) -> BackendPlatform {
        BackendPlatform::Cursor
    }

    fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    fn command(&self, prompt: &str, model: Option<&str>, _isolate_session: bool) -> Command {
        let mut cmd = Command::new("cursor-agent");
        cmd.arg("--print")
            .arg("--output-format")
            .arg("text")
            .arg("--force");
        if let Some(model) = model {
            cmd.arg("--model").arg(model);
        }
        cmd.arg(prompt);
        cmd
    }

    fn accepts_model(&self) -> bool {
        if let Some(supported) = self.model_flag {
            return supported;
        }
        cached_model_flag(&MODEL_FLAG, || {
            let mut cmd = Command::new("cursor-agent");
            cmd.arg("--help");
            help_mentions_model(cmd, CLI_PROBE_TIMEOUT, self.settings.kill_grace)
        })
    }

    fn rate_limit_patterns(&self) -> &[&'static str] {
        &["usage limit", "slow pool"]
    }

    fn check_installed(&self) -> (bool, String) {
        version_check(
            "cursor-agent",
            &["--version"],
            "Install it: curl https://cursor.com/install -fsS | bash",
            &self.settings,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn command_shape() {
        let b = CursorBackend::new(BackendSettings::default()).with_model_flag(true);
        let a = args(&b.command("ship it", Some("gpt-5"), true));
        assert_eq!(a.first().map(String::as_str), Some("--print"));
        assert_eq!(a.last().map(String::as_str), Some("ship it"));
        assert!(!a.contains(&"--resume".to_string()));
        assert!(a.windows(2).any(|w| w == ["--model", "gpt-5"]));
    }

    #[test]
    fn preset_probe_result_is_used() {
        let b = CursorBackend::new(BackendSettings::default()).with_model_flag(false);
        assert!(!b.accepts_model());
        let b = CursorBackend::new(BackendSettings::default()).with_model_flag(true);
        assert!(b.accepts_model());
    }

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn probe_runs_once_per_cache() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let script = format!(
            "echo call >> '{}'; echo '  --model <model>  pick a model'",
            log.display()
        );
        let cache = OnceLock::new();
        let grace = Duration::from_millis(200);

        for _ in 0..4 {
            assert!(cached_model_flag(&cache, || {
                help_mentions_model(sh(&script), Duration::from_secs(5), grace)
            }));
        }
        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().count(), 1);
    }

    #[test]
    fn help_without_model_flag() {
        let grace = Duration::from_millis(200);
        assert!(!help_mentions_model(
            sh("echo '--print  non-interactive'"),
            Duration::from_secs(5),
            grace
        ));
    }

    #[test]
    fn wedged_help_counts_as_unsupported() {
        let start = std::time::Instant::now();
        let grace = Duration::from_millis(200);
        assert!(!help_mentions_model(
            sh("sleep 30"),
            Duration::from_millis(200),
            grace
        ));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn name_and_platform() {
        let b = CursorBackend::new(BackendSettings::default());
        assert_eq!(b.name(), "cursor-agent");
        assert_eq!(b.platform(), BackendPlatform::Cursor);
    }
}
