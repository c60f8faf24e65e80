use std::path::PathBuf;

use serde::Deserialize;
use tracing::debug;

/// Metadata from the optional `---` block at the top of a subagent file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubagentMetadata {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

impl SubagentMetadata {
    /// The declared model, if it is non-blank.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }
}

/// A parsed subagent prompt file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subagent {
    pub metadata: SubagentMetadata,
    pub body: String,
}

/// Loads subagent prompt files (`<dir>/<name>.md`).
///
/// Files are re-read on every call; nothing is cached.
#[derive(Debug, Clone)]
pub struct SubagentLoader {
    dir: PathBuf,
}

impl SubagentLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.md"))
    }

    /// Load a subagent by name.
    ///
    /// A missing or unreadable file yields an empty subagent, so callers can
    /// treat it as "no persona instructions".
    pub fn load(&self, name: &str) -> Subagent {
        let path = self.path_for(name);
        match std::fs::read_to_string(&path) {
            Ok(content) => parse(&content),
            Err(e) => {
                debug!("subagent {name} not loaded from {}: {e}", path.display());
                Subagent::default()
            }
        }
    }
}

/// Split a subagent file into metadata and body.
///
/// Without a leading `---` block the whole text is the body. A block that
/// is unterminated or not valid key/value YAML is ignored and the raw text
/// becomes the body.
pub fn parse(content: &str) -> Subagent {
    let raw = || Subagent {
        metadata: SubagentMetadata::default(),
        body: content.to_string(),
    };

    let Some((block, body)) = split_front_matter(content) else {
        return raw();
    };

    if block.trim().is_empty() {
        return Subagent {
            metadata: SubagentMetadata::default(),
            body: body.to_string(),
        };
    }

    match serde_yaml::from_str::<SubagentMetadata>(block) {
        Ok(metadata) => Subagent {
            metadata,
            body: body.to_string(),
        },
        Err(e) => {
            debug!("ignoring malformed subagent metadata: {e}");
            raw()
        }
    }
}

/// Returns `(metadata_block, body)` when `content` opens with a `---` line
/// and a closing `---` line follows.
fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let first_end = content.find('\n')?;
    if content[..first_end].trim_end() != "---" {
        return None;
    }

    let mut offset = first_end + 1;
    for line in content[offset..].split_inclusive('\n') {
        if line.trim_end() == "---" {
            let block = &content[first_end + 1..offset];
            let body = &content[offset + line.len()..];
            return Some((block, body.strip_prefix('\n').unwrap_or(body)));
        }
        offset += line.len();
    }
    None
}
