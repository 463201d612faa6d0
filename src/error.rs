//! Error types for smx operations.
//!
//! This module defines [`SmxError`], the primary error type used throughout
//! the crate, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Probe failures never surface here; they become sentinel values
//! - Use `SmxError` for failures that end a run or a publish phase
//! - Use `anyhow::Error` (via `SmxError::Other`) for unexpected errors

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for smx operations.
#[derive(Debug, Error)]
pub enum SmxError {
    /// Snippet file could not be read or parsed.
    #[error("Failed to load snippets from {path}: {message}")]
    SnippetParse { path: PathBuf, message: String },

    /// A required snippet is absent or empty.
    #[error("Snippet '{key}' is missing or empty in {path}")]
    SnippetMissing { key: String, path: PathBuf },

    /// Store file exists but is not a valid support matrix.
    #[error("Failed to parse store at {path}: {message}")]
    StoreParse { path: PathBuf, message: String },

    /// Container engine call failed.
    #[error("Container runtime error during {operation}: {message}")]
    Runtime { operation: String, message: String },

    /// Every candidate scratch branch name was already taken.
    #[error("Failed to create a unique branch name after {attempts} attempts (last tried '{last}')")]
    BranchNamesExhausted { attempts: u32, last: String },

    /// Source-hosting API call failed.
    #[error("GitHub API error during {operation}: {message}")]
    HostApi { operation: String, message: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SmxError {
    /// Build a [`SmxError::HostApi`] from any displayable cause.
    pub fn host_api(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::HostApi {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Build a [`SmxError::Runtime`] from any displayable cause.
    pub fn runtime(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Runtime {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for smx operations.
pub type Result<T> = std::result::Result<T, SmxError>;
