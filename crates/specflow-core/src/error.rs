use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{backend} is rate limited (gave up after {attempts} attempts)")]
    RateLimited {
        backend: String,
        attempts: u32,
        output: String,
    },

    #[error("{backend} is not installed or not working: {message}")]
    NotInstalled { backend: String, message: String },

    #[error(
        "no AI backend configured. Set SPECFLOW_AI_BACKEND (e.g. SPECFLOW_AI_BACKEND=claude) \
         or pass --backend <name>. Valid values: {valid}"
    )]
    NotConfigured { valid: String },

    #[error("process timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("invalid AI backend '{value}'. Valid values: {valid}")]
    InvalidPlatform { value: String, valid: String },

    #[error("the {platform} backend is not yet implemented")]
    NotImplemented { platform: String },

    #[error("{platform} cannot be used as an AI backend")]
    Unsupported { platform: String },

    #[error("invalid task batch: {0}")]
    InvalidBatch(String),

    #[error("task {id} failed: {message}")]
    TaskFailed { id: String, message: String },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_configured_message_is_actionable() {
        let err = BackendError::NotConfigured {
            valid: "auggie, claude".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("SPECFLOW_AI_BACKEND"));
        assert!(msg.contains("--backend"));
    }

    #[test]
    fn task_failed_names_the_task() {
        let err = BackendError::TaskFailed {
            id: "t2".into(),
            message: "claude exited with code 1".into(),
        };
        assert_eq!(err.to_string(), "task t2 failed: claude exited with code 1");
    }
}
