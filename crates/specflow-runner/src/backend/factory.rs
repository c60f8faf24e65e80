use specflow_core::{Availability, BackendError, BackendPlatform};
use tracing::{debug, info};

use super::{
    AgentBackend, AuggieBackend, Backend, BackendSettings, ClaudeCliBackend, CursorBackend,
    GeminiCliBackend,
};

/// Construct the backend for `platform`.
///
/// Planned and unsupported platforms fail before anything is constructed or
/// checked. With `verify_installed`, a backend whose CLI is missing fails with
/// [`BackendError::NotInstalled`].
pub fn create_backend(
    platform: BackendPlatform,
    settings: &BackendSettings,
    verify_installed: bool,
) -> Result<Backend, BackendError> {
    match platform.availability() {
        Availability::Implemented => {}
        Availability::Planned => {
            return Err(BackendError::NotImplemented {
                platform: platform.to_string(),
            })
        }
        Availability::Unsupported => {
            return Err(BackendError::Unsupported {
                platform: platform.to_string(),
            })
        }
    }

    let settings = settings.clone();
    let backend = match platform {
        BackendPlatform::Auggie => Backend::Auggie(AuggieBackend::new(settings)),
        BackendPlatform::Claude => Backend::Claude(ClaudeCliBackend::new(settings)),
        BackendPlatform::Cursor => Backend::Cursor(CursorBackend::new(settings)),
        BackendPlatform::Gemini => Backend::Gemini(GeminiCliBackend::new(settings)),
        other => {
            return Err(BackendError::NotImplemented {
                platform: other.to_string(),
            })
        }
    };
    debug!("created {} backend", backend.name());

    if verify_installed {
        verify(&backend)?;
    }
    Ok(backend)
}

/// Fail with [`BackendError::NotInstalled`] unless the backend's CLI works.
pub fn verify<B: AgentBackend + ?Sized>(backend: &B) -> Result<(), BackendError> {
    let (installed, message) = backend.check_installed();
    if !installed {
        return Err(BackendError::NotInstalled {
            backend: backend.name().to_string(),
            message,
        });
    }
    info!("{message}");
    Ok(())
}
