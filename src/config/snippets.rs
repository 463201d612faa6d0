//! Static snippet text.
//!
//! The snippet file is a flat YAML mapping of key → text, e.g. the DGX
//! system list or the supported driver range. A few keys are copied into
//! every record and must be present before any container is probed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SmxError};

/// Snippet keys copied into every record.
pub const STANDARD_SNIPPETS: &[&str] = &["dgx_system", "nvidia_driver", "gpu_model"];

/// Loaded snippet file.
#[derive(Debug, Clone, Default)]
pub struct Snippets {
    entries: BTreeMap<String, String>,
}

impl Snippets {
    /// Parse snippet YAML without validation.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let entries: Option<BTreeMap<String, serde_yaml::Value>> = serde_yaml::from_str(content)
            .map_err(|e| SmxError::SnippetParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let entries = entries
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, value)| scalar_text(value).map(|text| (key, text)))
            .collect();

        Ok(Self { entries })
    }

    /// Load and validate the snippet file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| SmxError::SnippetParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let snippets = Self::parse(&content, path)?;
        snippets.require(STANDARD_SNIPPETS, path)?;
        Ok(snippets)
    }

    /// Fail unless every key in `keys` maps to non-empty text.
    pub fn require(&self, keys: &[&str], path: &Path) -> Result<()> {
        for key in keys {
            if self.get(key).is_none_or(|text| text.trim().is_empty()) {
                return Err(SmxError::SnippetMissing {
                    key: key.to_string(),
                    path: PathBuf::from(path),
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// `(key, text)` pairs for the standard snippets that are present.
    pub fn standard(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        STANDARD_SNIPPETS
            .iter()
            .filter_map(|key| self.get(key).map(|text| (*key, text)))
    }
}

/// Render a YAML scalar as text; collections are not snippets.
fn scalar_text(value: serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
