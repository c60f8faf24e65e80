use std::process::Command;

use specflow_core::BackendPlatform;

use super::{version_check, AgentBackend, BackendSettings};

/// Claude CLI backend: wraps the `claude` command-line tool.
pub struct ClaudeCliBackend {
    settings: BackendSettings,
}

impl ClaudeCliBackend {
    pub fn new(settings: BackendSettings) -> Self {
        Self { settings }
    }
}

impl AgentBackend for ClaudeCliBackend {
    fn name(&self) -> &str {
        "claude-cli"
    }

    fn platform(&self) -> BackendPlatform {
        BackendPlatform::Claude
    }

    fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    fn command(&self, prompt: &str, model: Option<&str>, isolate_session: bool) -> Command {
        let mut cmd = Command::new("claude");
        cmd.arg("-p")
            .arg(prompt)
            .arg("--output-format")
            .arg("text")
            .arg("--dangerously-skip-permissions");
        if isolate_session {
            cmd.arg("--no-session-persistence");
        }
        if let Some(model) = model {
            cmd.arg("--model").arg(model);
        }
        cmd
    }

    fn rate_limit_patterns(&self) -> &[&'static str] {
        &["overloaded", "529", "usage limit"]
    }

    fn check_installed(&self) -> (bool, String) {
        version_check(
            "claude",
            &["--version"],
            "Install it: npm install -g @anthropic-ai/claude-code",
            &self.settings,
        )
    }
}
