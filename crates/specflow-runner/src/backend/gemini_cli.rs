use std::process::Command;

use specflow_core::BackendPlatform;

use super::{version_check, AgentBackend, BackendSettings};

/// Gemini CLI backend: wraps the `gemini` command-line tool (`@google/gemini-cli`).
///
/// Non-interactive `-p` runs do not resume or save chats, so session
/// isolation needs no extra flag.
pub struct GeminiCliBackend {
    settings: BackendSettings,
}

impl GeminiCliBackend {
    pub fn new(settings: BackendSettings) -> Self {
        Self { settings }
    }
}

impl AgentBackend for GeminiCliBackend {
    fn name(&self) -> &str {
        "gemini-cli"
    }

    fn platform(&self) -> BackendPlatform {
        BackendPlatform::Gemini
    }

    fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    fn command(&self, prompt: &str, model: Option<&str>, _isolate_session: bool) -> Command {
        let mut cmd = Command::new("gemini");
        cmd.arg("-p")
            .arg(prompt)
            .arg("--output-format")
            .arg("text")
            .arg("--yolo");
        if let Some(model) = model {
            cmd.arg("-m").arg(model);
        }
        cmd
    }

    fn rate_limit_patterns(&self) -> &[&'static str] {
        &["resource_exhausted", "resource exhausted"]
    }

    fn check_installed(&self) -> (bool, String) {
        version_check(
            "gemini",
            &["--version"],
            "Install it: npm install -g @google/gemini-cli (requires Node.js >= 18)",
            &self.settings,
        )
    }
}
