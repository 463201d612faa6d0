//! Container runtime access and scoped container lifecycles.
//!
//! This module provides:
//! - [`ContainerRuntime`] trait, the seam to the container engine
//! - [`DockerEngine`] which drives the Docker Engine API
//! - [`acquire`] and [`Acquisition`] for scoped, always-cleaned-up containers
//! - [`MockRuntime`] for tests

pub mod docker;
pub mod lifecycle;
pub mod mock;

pub use docker::DockerEngine;
pub use lifecycle::{acquire, Acquisition, ManagedContainer};
pub use mock::MockRuntime;

use std::fmt;

use crate::error::Result;

/// Identifier of a running container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form, like `docker ps`.
        let short = self.0.get(..12).unwrap_or(&self.0);
        f.write_str(short)
    }
}

/// Output of a command executed inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit status reported by the runtime.
    pub status: i32,

    /// Standard output.
    pub stdout: String,

    /// Standard error.
    pub stderr: String,
}

impl ExecOutput {
    pub fn new(status: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// Why a container could not be started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    /// The image does not exist locally and could not be pulled.
    ImageNotFound,

    /// Any other startup failure.
    Other(String),
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::ImageNotFound => f.write_str("image not found"),
            StartError::Other(detail) => f.write_str(detail),
        }
    }
}

/// Operations the extractor needs from a container engine.
///
/// Every call blocks until the engine answers.
pub trait ContainerRuntime {
    /// Start `image` detached with an idle shell so that later `exec` calls work.
    fn start_detached(&self, image: &str) -> std::result::Result<ContainerId, StartError>;

    /// Run `argv` inside the container and collect its output.
    fn exec(&self, id: &ContainerId, argv: &[&str]) -> Result<ExecOutput>;

    /// Stop a running container.
    fn stop(&self, id: &ContainerId) -> Result<()>;

    /// Remove a stopped container.
    fn remove(&self, id: &ContainerId) -> Result<()>;

    /// Attributes of the image the container was started from.
    fn image_attributes(&self, id: &ContainerId) -> Result<serde_json::Map<String, serde_json::Value>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_id_displays_short_form() {
        let id = ContainerId::new("0123456789abcdef0123");
        assert_eq!(id.to_string(), "0123456789ab");
        assert_eq!(id.as_str(), "0123456789abcdef0123");
    }

    #[test]
    fn short_container_id_displays_whole() {
        assert_eq!(ContainerId::new("abc").to_string(), "abc");
    }

    #[test]
    fn start_error_display() {
        assert_eq!(StartError::ImageNotFound.to_string(), "image not found");
        assert_eq!(
            StartError::Other("daemon not running".into()).to_string(),
            "daemon not running"
        );
    }
}
