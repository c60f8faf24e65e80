use specflow_core::{BackendError, BackendPlatform};
use tracing::debug;

/// Decide which platform to use.
///
/// A non-blank `override_value` wins, then the non-blank value returned by
/// `configured`. Either one must name a known platform; invalid values are
/// errors, never skipped. Blank values count as absent. With neither set the
/// result is [`BackendError::NotConfigured`].
pub fn resolve_platform<F>(
    override_value: Option<&str>,
    configured: F,
) -> Result<BackendPlatform, BackendError>
where
    F: FnOnce() -> Option<String>,
{
    if let Some(value) = non_blank(override_value) {
        let platform = value.parse::<BackendPlatform>()?;
        debug!("using backend {platform} from override");
        return Ok(platform);
    }

    let configured = configured();
    if let Some(value) = non_blank(configured.as_deref()) {
        let platform = value.parse::<BackendPlatform>()?;
        debug!("using backend {platform} from configuration");
        return Ok(platform);
    }

    Err(BackendError::NotConfigured {
        valid: BackendPlatform::valid_values(),
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(value: &str) -> impl FnOnce() -> Option<String> + '_ {
        move || Some(value.to_string())
    }

    #[test]
    fn override_beats_config() {
        let p = resolve_platform(Some("claude"), cfg("auggie")).unwrap();
        assert_eq!(p, BackendPlatform::Claude);
    }

    #[test]
    fn empty_override_falls_back_to_config() {
        let p = resolve_platform(Some(""), cfg("cursor")).unwrap();
        assert_eq!(p, BackendPlatform::Cursor);
        let p = resolve_platform(None, cfg("cursor")).unwrap();
        assert_eq!(p, BackendPlatform::Cursor);
    }

    #[test]
    fn whitespace_override_is_absent() {
        let p = resolve_platform(Some("   \t"), cfg(" gemini ")).unwrap();
        assert_eq!(p, BackendPlatform::Gemini);
    }

    #[test]
    fn nothing_set_is_not_configured() {
        let err = resolve_platform(Some(""), cfg("")).unwrap_err();
        assert!(matches!(err, BackendError::NotConfigured { .. }));
        let err = resolve_platform(None, || None).unwrap_err();
        assert!(matches!(err, BackendError::NotConfigured { .. }));
    }

    #[test]
    fn blank_config_is_not_configured() {
        let err = resolve_platform(None, cfg("  ")).unwrap_err();
        assert!(matches!(err, BackendError::NotConfigured { .. }));
    }

    #[test]
    fn bogus_override_is_rejected_regardless_of_config() {
        let err = resolve_platform(Some("bogus"), cfg("claude")).unwrap_err();
        assert!(matches!(err, BackendError::InvalidPlatform { .. }));
    }

    #[test]
    fn bogus_config_is_rejected() {
        let err = resolve_platform(None, cfg("bogus")).unwrap_err();
        assert!(matches!(err, BackendError::InvalidPlatform { .. }));
    }

    #[test]
    fn config_not_read_when_override_present() {
        let p = resolve_platform(Some("auggie"), || panic!("config should not be read")).unwrap();
        assert_eq!(p, BackendPlatform::Auggie);
    }
}
