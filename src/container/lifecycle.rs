//! Scoped container acquisition.
//!
//! [`acquire`] never fails with an error: a missing image or a broken
//! runtime is reported through [`Acquisition`] so the caller can decide to
//! skip the image. A started container is wrapped in a [`ManagedContainer`]
//! that stops and removes it when dropped, whichever way the scope ends.

use super::{ContainerId, ContainerRuntime, ExecOutput, StartError};
use crate::error::Result;

/// Outcome of trying to start a container for an image.
pub enum Acquisition<'r> {
    /// The container is running; cleanup happens when the guard drops.
    Acquired(ManagedContainer<'r>),

    /// The image does not exist.
    NotFound,

    /// The container could not be started for another reason.
    OtherFailure(String),
}

impl std::fmt::Debug for Acquisition<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Acquisition::Acquired(c) => f.debug_tuple("Acquired").field(c.id()).finish(),
            Acquisition::NotFound => f.write_str("NotFound"),
            Acquisition::OtherFailure(detail) => {
                f.debug_tuple("OtherFailure").field(detail).finish()
            }
        }
    }
}

/// Start a detached container for `image`.
pub fn acquire<'r>(runtime: &'r dyn ContainerRuntime, image: &str) -> Acquisition<'r> {
    match runtime.start_detached(image) {
        Ok(id) => {
            tracing::debug!("Started container {} from {}", id, image);
            Acquisition::Acquired(ManagedContainer { runtime, id })
        }
        Err(StartError::ImageNotFound) => Acquisition::NotFound,
        Err(StartError::Other(detail)) => Acquisition::OtherFailure(detail),
    }
}

/// A running container that is stopped and removed on drop.
pub struct ManagedContainer<'r> {
    runtime: &'r dyn ContainerRuntime,
    id: ContainerId,
}

impl ManagedContainer<'_> {
    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    /// Run a command inside the container.
    pub fn exec(&self, argv: &[&str]) -> Result<ExecOutput> {
        self.runtime.exec(&self.id, argv)
    }

    /// Attributes of the container's image.
    pub fn image_attributes(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        self.runtime.image_attributes(&self.id)
    }
}

impl Drop for ManagedContainer<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.runtime.stop(&self.id) {
            tracing::warn!("Failed to stop container {}: {}", self.id, e);
        }
        if let Err(e) = self.runtime.remove(&self.id) {
            tracing::warn!("Failed to remove container {}: {}", self.id, e);
        }
        tracing::debug!("Released container {}", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MockRuntime;

    #[test]
    fn acquired_container_is_cleaned_up_on_drop() {
        let runtime = MockRuntime::new();
        {
            let acquisition = acquire(&runtime, "img:1");
            assert!(matches!(acquisition, Acquisition::Acquired(_)));
            assert_eq!(runtime.running(), 1);
        }
        assert_eq!(runtime.running(), 0);
        assert_eq!(runtime.stopped().len(), 1);
        assert_eq!(runtime.removed().len(), 1);
    }

    #[test]
    fn cleanup_runs_on_early_return() {
        fn probe_then_bail(runtime: &MockRuntime) -> std::result::Result<(), String> {
            let container = match acquire(runtime, "img:1") {
                Acquisition::Acquired(c) => c,
                other => return Err(format!("{:?}", other)),
            };
            container.exec(&["false"]).map_err(|e| e.to_string())?;
            Err("probe aborted".to_string())
        }

        let runtime = MockRuntime::new();
        assert!(probe_then_bail(&runtime).is_err());
        assert_eq!(runtime.running(), 0);
        assert_eq!(runtime.removed().len(), 1);
    }

    #[test]
    fn cleanup_runs_during_unwind() {
        let runtime = MockRuntime::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _container = acquire(&runtime, "img:1");
            panic!("probe blew up");
        }));
        assert!(result.is_err());
        assert_eq!(runtime.running(), 0);
    }

    #[test]
    fn missing_image_is_reported_as_data() {
        let runtime = MockRuntime::new().with_missing_image("img:404");
        let acquisition = acquire(&runtime, "img:404");
        assert!(matches!(acquisition, Acquisition::NotFound));
        assert!(runtime.stopped().is_empty());
    }

    #[test]
    fn other_start_failure_is_reported_as_data() {
        let runtime = MockRuntime::new().with_start_failure("daemon unavailable");
        match acquire(&runtime, "img:1") {
            Acquisition::OtherFailure(detail) => assert_eq!(detail, "daemon unavailable"),
            other => panic!("expected OtherFailure, got {:?}", other),
        };
    }

    #[test]
    fn cleanup_errors_are_swallowed() {
        let runtime = MockRuntime::new().with_failing_cleanup();
        {
            let _container = acquire(&runtime, "img:1");
        }
        assert_eq!(runtime.stopped().len(), 1);
        assert_eq!(runtime.removed().len(), 1);
    }
}
