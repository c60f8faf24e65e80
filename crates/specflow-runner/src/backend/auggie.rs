use std::process::Command;

use specflow_core::BackendPlatform;

use super::{version_check, AgentBackend, BackendSettings};

/// Auggie backend: wraps Augment's `auggie` CLI in print mode.
pub struct AuggieBackend {
    settings: BackendSettings,
}

impl AuggieBackend {
    pub fn new(settings: BackendSettings) -> Self {
        Self { settings }
    }
}

impl AgentBackend for AuggieBackend {
    fn name(&self) -> &str {
        "auggie"
    }

    fn platform(&self) -> BackendPlatform {
        BackendPlatform::Auggie
    }

    fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    fn command(&self, prompt: &str, model: Option<&str>, isolate_session: bool) -> Command {
        let mut cmd = Command::new("auggie");
        cmd.arg("--print").arg("--quiet");
        if isolate_session {
            cmd.arg("--dont-save-session");
        }
        if let Some(model) = model {
            cmd.arg("--model").arg(model);
        }
        cmd.arg(prompt);
        cmd
    }

    fn rate_limit_patterns(&self) -> &[&'static str] {
        &["capacity", "try again later"]
    }

    fn check_installed(&self) -> (bool, String) {
        version_check(
            "auggie",
            &["--version"],
            "Install it: npm install -g @augmentcode/auggie",
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
    fn prompt_is_last_argument() {
        let b = AuggieBackend::new(BackendSettings::default());
        let a = args(&b.command("fix it", Some("sonnet"), true));
        assert_eq!(a.first().map(String::as_str), Some("--print"));
        assert_eq!(a.last().map(String::as_str), Some("fix it"));
        assert!(a.contains(&"--dont-save-session".to_string()));
        assert!(a.windows(2).any(|w| w == ["--model", "sonnet"]));
    }

    #[test]
    fn session_kept_when_not_isolated() {
        let b = AuggieBackend::new(BackendSettings::default());
        let a = args(&b.command("p", None, false));
        assert_eq!(a, vec!["--print", "--quiet", "p"]);
    }

    #[test]
    fn name_and_platform() {
        let b = AuggieBackend::new(BackendSettings::default());
        assert_eq!(b.name(), "auggie");
        assert_eq!(b.platform(), BackendPlatform::Auggie);
    }

    #[test]
    fn capacity_message_is_rate_limit() {
        let b = AuggieBackend::new(BackendSettings::default());
        assert!(b.detect_rate_limit("Server at capacity, try again later"));
    }
}
