use std::time::Duration;

/// A single prompt execution, built per call and not mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub prompt: String,
    /// Name of a subagent prompt file whose body and metadata apply.
    pub subagent: Option<String>,
    /// Explicit model for this call; wins over every other source.
    pub model: Option<String>,
    /// Ask the CLI not to persist the conversation.
    pub isolate_session: bool,
    /// Wall-clock deadline. `None` or zero disables the watchdog.
    pub timeout: Option<Duration>,
}

impl ExecutionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            subagent: None,
            model: None,
            isolate_session: true,
            timeout: None,
        }
    }

    pub fn with_subagent(mut self, name: impl Into<String>) -> Self {
        self.subagent = Some(name.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_isolated_session(mut self, isolate: bool) -> Self {
        self.isolate_session = isolate;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Timeout with a zero duration treated as "no deadline".
    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }
}

/// Output of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub succeeded: bool,
    /// Everything the process printed, line terminators intact.
    pub output: String,
    pub exit_code: i32,
}

impl ExecutionResult {
    pub fn from_exit(exit_code: i32, output: String) -> Self {
        Self {
            succeeded: exit_code == 0,
            output,
            exit_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let req = ExecutionRequest::new("do it")
            .with_subagent("planner")
            .with_model("gpt-x")
            .with_isolated_session(false)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(req.prompt, "do it");
        assert_eq!(req.subagent.as_deref(), Some("planner"));
        assert_eq!(req.model.as_deref(), Some("gpt-x"));
        assert!(!req.isolate_session);
        assert_eq!(req.effective_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn zero_timeout_is_no_timeout() {
        let req = ExecutionRequest::new("p").with_timeout(Duration::ZERO);
        assert_eq!(req.effective_timeout(), None);
    }

    #[test]
    fn from_exit_maps_success() {
        assert!(ExecutionResult::from_exit(0, String::new()).succeeded);
        assert!(!ExecutionResult::from_exit(2, String::new()).succeeded);
    }
}
