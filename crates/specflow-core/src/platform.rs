use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Identifier for one supported AI coding CLI.
///
/// This is the only persisted or transmitted representation of "which
/// backend". Live backend instances are never serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPlatform {
    Auggie,
    Claude,
    Cursor,
    Gemini,
    Codex,
    Aider,
    Manual,
}

/// Availability of a platform as an automated backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// A concrete backend exists.
    Implemented,
    /// Planned, but no backend has been written yet.
    Planned,
    /// Will never be driven as an AI backend.
    Unsupported,
}

impl BackendPlatform {
    pub const ALL: [BackendPlatform; 7] = [
        BackendPlatform::Auggie,
        BackendPlatform::Claude,
        BackendPlatform::Cursor,
        BackendPlatform::Gemini,
        BackendPlatform::Codex,
        BackendPlatform::Aider,
        BackendPlatform::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendPlatform::Auggie => "auggie",
            BackendPlatform::Claude => "claude",
            BackendPlatform::Cursor => "cursor",
            BackendPlatform::Gemini => "gemini",
            BackendPlatform::Codex => "codex",
            BackendPlatform::Aider => "aider",
            BackendPlatform::Manual => "manual",
        }
    }

    /// Parse a platform name. Surrounding whitespace and case are ignored.
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auggie" => Some(BackendPlatform::Auggie),
            "claude" => Some(BackendPlatform::Claude),
            "cursor" => Some(BackendPlatform::Cursor),
            "gemini" => Some(BackendPlatform::Gemini),
            "codex" => Some(BackendPlatform::Codex),
            "aider" => Some(BackendPlatform::Aider),
            "manual" => Some(BackendPlatform::Manual),
            _ => None,
        }
    }

    pub fn availability(&self) -> Availability {
        match self {
            BackendPlatform::Auggie
            | BackendPlatform::Claude
            | BackendPlatform::Cursor
            | BackendPlatform::Gemini => Availability::Implemented,
            BackendPlatform::Codex | BackendPlatform::Aider => Availability::Planned,
            BackendPlatform::Manual => Availability::Unsupported,
        }
    }

    /// Platforms that have a concrete backend.
    pub fn implemented() -> impl Iterator<Item = BackendPlatform> {
        Self::ALL
            .into_iter()
            .filter(|p| p.availability() == Availability::Implemented)
    }

    /// Comma-separated list of every accepted value, for error messages.
    pub fn valid_values() -> String {
        Self::ALL
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for BackendPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendPlatform {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s).ok_or_else(|| BackendError::InvalidPlatform {
            value: s.to_string(),
            valid: Self::valid_values(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_str_parse_str_agree() {
        for p in BackendPlatform::ALL {
            assert_eq!(BackendPlatform::parse_str(p.as_str()), Some(p));
        }
    }

    #[test]
    fn parse_ignores_case_and_whitespace() {
        assert_eq!(
            BackendPlatform::parse_str("  Claude \n"),
            Some(BackendPlatform::Claude)
        );
        assert_eq!(
            BackendPlatform::parse_str("AUGGIE"),
            Some(BackendPlatform::Auggie)
        );
    }

    #[test]
    fn from_str_rejects_unknown() {
        let err = "bogus".parse::<BackendPlatform>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bogus"));
        assert!(msg.contains("claude"));
    }

    #[test]
    fn serde_uses_lowercase_name() {
        let json = serde_json::to_string(&BackendPlatform::Cursor).unwrap();
        assert_eq!(json, "\"cursor\"");
        let back: BackendPlatform = serde_json::from_str("\"gemini\"").unwrap();
        assert_eq!(back, BackendPlatform::Gemini);
    }

    #[test]
    fn implemented_excludes_planned_and_manual() {
        let implemented: Vec<_> = BackendPlatform::implemented().collect();
        assert_eq!(implemented.len(), 4);
        assert!(!implemented.contains(&BackendPlatform::Aider));
        assert!(!implemented.contains(&BackendPlatform::Manual));
    }
}
