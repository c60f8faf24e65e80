use std::time::Duration;

use specflow_core::{BackendError, ExecutionRequest, ExecutionResult};
use tracing::{info, warn};

use crate::backend::AgentBackend;

/// Phrases shared by every vendor. Matching is a plain case-insensitive
/// substring test, so unrelated text containing e.g. "429" also matches.
pub const COMMON_PATTERNS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "quota exceeded",
    "throttl",
    "429",
    "502",
    "503",
    "504",
];

/// Whether `output` looks like a rate-limit failure.
///
/// Only use this to decide between retrying and surfacing an error.
pub fn is_rate_limited(output: &str, vendor_patterns: &[&str]) -> bool {
    let haystack = output.to_lowercase();
    COMMON_PATTERNS
        .iter()
        .chain(vendor_patterns)
        .any(|p| haystack.contains(&p.to_lowercase()))
}

/// Exponential backoff for rate-limited executions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retrying after failed `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Execute `request`, retrying while the backend reports a rate limit.
///
/// Errors (spawn failures, timeouts) and failures that do not look like rate
/// limiting are returned straight away. A rate-limited final attempt becomes
/// [`BackendError::RateLimited`].
pub fn execute_with_retry<B: AgentBackend + ?Sized>(
    backend: &B,
    request: &ExecutionRequest,
    policy: &RetryPolicy,
    on_line: &mut dyn FnMut(&str),
) -> Result<ExecutionResult, BackendError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = backend.execute(request, on_line)?;
        if result.succeeded || !backend.detect_rate_limit(&result.output) {
            return Ok(result);
        }

        if attempt >= max_attempts {
            warn!(
                "{} still rate limited after {attempt} attempts, giving up",
                backend.name()
            );
            return Err(BackendError::RateLimited {
                backend: backend.name().to_string(),
                attempts: attempt,
                output: result.output,
            });
        }

        let delay = policy.delay_after(attempt);
        info!(
            "{} rate limited (attempt {attempt}/{max_attempts}), retrying in {delay:?}",
            backend.name()
        );
        std::thread::sleep(delay);
        attempt += 1;
    }
}
