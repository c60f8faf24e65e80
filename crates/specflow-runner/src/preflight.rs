use serde::Serialize;
use specflow_core::{BackendError, BackendPlatform};
use tracing::{info, warn};

use crate::backend::factory::create_backend;
use crate::backend::{AgentBackend, BackendSettings};

/// Installation status of one backend CLI.
#[derive(Debug, Clone, Serialize)]
pub struct InstallStatus {
    pub platform: BackendPlatform,
    pub installed: bool,
    pub message: String,
}

/// Check every implemented backend's CLI.
pub fn check_all(settings: &BackendSettings) -> Vec<InstallStatus> {
    BackendPlatform::implemented()
        .map(|platform| check_one(platform, settings))
        .collect()
}

/// Check a single platform. Planned or unsupported platforms report the
/// construction error as their message.
pub fn check_one(platform: BackendPlatform, settings: &BackendSettings) -> InstallStatus {
    let (installed, message) = match create_backend(platform, settings, false) {
        Ok(backend) => backend.check_installed(),
        Err(e) => (false, e.to_string()),
    };

    if installed {
        info!("{platform}: {message}");
    } else {
        warn!("{platform}: {message}");
    }
    InstallStatus {
        platform,
        installed,
        message,
    }
}

/// Fail unless the chosen platform's CLI is usable.
pub fn require(platform: BackendPlatform, settings: &BackendSettings) -> Result<(), BackendError> {
    create_backend(platform, settings, true).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_all_covers_implemented_platforms() {
        let rows = check_all(&BackendSettings::default());
        let platforms: Vec<_> = rows.iter().map(|r| r.platform).collect();
        assert_eq!(platforms, BackendPlatform::implemented().collect::<Vec<_>>());
        for row in &rows {
            assert!(!row.message.is_empty());
        }
    }

    #[test]
    fn planned_platform_reports_construction_error() {
        let row = check_one(BackendPlatform::Codex, &BackendSettings::default());
        assert!(!row.installed);
        assert!(row.message.contains("not yet implemented"));
    }

    #[test]
    fn require_rejects_manual() {
        let err = require(BackendPlatform::Manual, &BackendSettings::default()).unwrap_err();
        assert!(matches!(err, BackendError::Unsupported { .. }));
    }
}
