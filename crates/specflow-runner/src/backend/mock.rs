use std::collections::VecDeque;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use specflow_core::{BackendError, BackendPlatform, ExecutionRequest, ExecutionResult};

use super::{AgentBackend, BackendSettings};

/// One scripted response from a [`MockBackend`].
#[derive(Debug, Clone)]
pub struct MockReply {
    pub lines: Vec<String>,
    pub succeeded: bool,
    /// How long the "process" runs before printing.
    pub delay: Duration,
}

impl MockReply {
    pub fn success(output: &str) -> Self {
        Self {
            lines: output.lines().map(str::to_string).collect(),
            succeeded: true,
            delay: Duration::ZERO,
        }
    }

    pub fn failure(output: &str) -> Self {
        Self {
            succeeded: false,
            ..Self::success(output)
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Responder = dyn Fn(&ExecutionRequest) -> MockReply + Send + Sync;

enum Script {
    Sequence(Mutex<VecDeque<MockReply>>),
    Responder(Arc<Responder>),
}

/// A backend for tests that replays scripted replies instead of spawning a
/// CLI. Counters are shared `Arc`s so they stay readable after the backend
/// is boxed and moved into a worker.
pub struct MockBackend {
    platform: BackendPlatform,
    settings: BackendSettings,
    parallel: bool,
    installed: bool,
    script: Script,
    calls: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Create a mock that returns success with the given output.
    pub fn success(output: &str) -> Self {
        Self::sequence(vec![MockReply::success(output)])
    }

    /// Create a mock that returns failure with the given output.
    pub fn failure(output: &str) -> Self {
        Self::sequence(vec![MockReply::failure(output)])
    }

    /// Replies are consumed in order; the last one repeats.
    pub fn sequence(replies: Vec<MockReply>) -> Self {
        Self::with_script(Script::Sequence(Mutex::new(replies.into())))
    }

    /// Compute each reply from the request.
    pub fn responder<F>(f: F) -> Self
    where
        F: Fn(&ExecutionRequest) -> MockReply + Send + Sync + 'static,
    {
        Self::with_script(Script::Responder(Arc::new(f)))
    }

    fn with_script(script: Script) -> Self {
        Self {
            platform: BackendPlatform::Claude,
            settings: BackendSettings::default(),
            parallel: true,
            installed: true,
            script,
            calls: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_installed(mut self, installed: bool) -> Self {
        self.installed = installed;
        self
    }

    pub fn with_platform(mut self, platform: BackendPlatform) -> Self {
        self.platform = platform;
        self
    }

    /// Share call and close counters with other mocks.
    pub fn with_counters(mut self, calls: Arc<AtomicUsize>, closed: Arc<AtomicUsize>) -> Self {
        self.calls = calls;
        self.closed = closed;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn next_reply(&self, request: &ExecutionRequest) -> MockReply {
        match &self.script {
            Script::Responder(f) => f(request),
            Script::Sequence(queue) => {
                let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
                if queue.len() > 1 {
                    queue.pop_front().unwrap_or_else(|| MockReply::success(""))
                } else {
                    queue.front().cloned().unwrap_or_else(|| MockReply::success(""))
                }
            }
        }
    }
}

impl AgentBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn platform(&self) -> BackendPlatform {
        self.platform
    }

    fn supports_parallel(&self) -> bool {
        self.parallel
    }

    fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    fn command(&self, _prompt: &str, _model: Option<&str>, _isolate_session: bool) -> Command {
        Command::new("true")
    }

    fn check_installed(&self) -> (bool, String) {
        if self.installed {
            (true, "mock 1.0.0".into())
        } else {
            (false, "mock is not installed".into())
        }
    }

    fn execute(
        &self,
        request: &ExecutionRequest,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<ExecutionResult, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.next_reply(request);

        if let Some(limit) = request.effective_timeout() {
            if reply.delay > limit {
                std::thread::sleep(limit);
                return Err(BackendError::Timeout { after: limit });
            }
        }
        std::thread::sleep(reply.delay);

        let mut output = String::new();
        for line in &reply.lines {
            on_line(line);
            output.push_str(line);
            output.push('\n');
        }
        Ok(ExecutionResult::from_exit(
            if reply.succeeded { 0 } else { 1 },
            output,
        ))
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
