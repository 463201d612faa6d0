//! In-memory container runtime for testing.
//!
//! `MockRuntime` implements [`ContainerRuntime`] and answers the commands the
//! probe engine issues (`bash -c 'echo ${VAR}'`, `source <file>; echo`,
//! `python -m pip show`, arbitrary scripts) from pre-configured data, while
//! recording every lifecycle call for later assertion.
//!
//! # Example
//!
//! ```
//! use smx::container::{acquire, Acquisition, MockRuntime};
//!
//! let runtime = MockRuntime::new().with_env("CUDA_VERSION", "11.6");
//! if let Acquisition::Acquired(container) = acquire(&runtime, "img:1") {
//!     let out = container.exec(&["bash", "-c", "echo ${CUDA_VERSION}"]).unwrap();
//!     assert_eq!(out.stdout, "11.6\n");
//! }
//! assert_eq!(runtime.running(), 0);
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use super::{ContainerId, ContainerRuntime, ExecOutput, StartError};
use crate::error::{Result, SmxError};

/// Mock container runtime.
#[derive(Debug, Default)]
pub struct MockRuntime {
    env: HashMap<String, String>,
    env_files: HashMap<String, HashMap<String, String>>,
    pip: HashMap<String, ExecOutput>,
    commands: HashMap<String, ExecOutput>,
    image_attributes: Map<String, Value>,
    missing_images: HashSet<String>,
    start_failure: Option<String>,
    failing_exec: bool,
    failing_cleanup: bool,
    started: RefCell<Vec<String>>,
    stopped: RefCell<Vec<ContainerId>>,
    removed: RefCell<Vec<ContainerId>>,
    execs: RefCell<Vec<Vec<String>>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose a process environment variable inside every container.
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Provide a sourceable file defining `key=value`.
    pub fn with_env_file(mut self, path: &str, key: &str, value: &str) -> Self {
        self.env_files
            .entry(path.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Install a package that `pip show` reports with `version`.
    pub fn with_package(self, name: &str, version: &str) -> Self {
        let stdout = format!(
            "Name: {}\nVersion: {}\nSummary: mock package\nLocation: /usr/lib/python3/dist-packages\n",
            name, version
        );
        self.with_pip_output(name, 0, &stdout)
    }

    /// Set raw `pip show` output for a package.
    pub fn with_pip_output(mut self, name: &str, status: i32, stdout: &str) -> Self {
        self.pip
            .insert(name.to_string(), ExecOutput::new(status, stdout, ""));
        self
    }

    /// Answer `bash -c '<script>'` with the given status and stdout.
    pub fn with_command(mut self, script: &str, status: i32, stdout: &str) -> Self {
        self.commands
            .insert(script.to_string(), ExecOutput::new(status, stdout, ""));
        self
    }

    /// Set an attribute on the image descriptor.
    pub fn with_image_attribute(mut self, key: &str, value: Value) -> Self {
        self.image_attributes.insert(key.to_string(), value);
        self
    }

    /// Make starting `image` fail with image-not-found.
    pub fn with_missing_image(mut self, image: &str) -> Self {
        self.missing_images.insert(image.to_string());
        self
    }

    /// Make every start fail with an unexpected error.
    pub fn with_start_failure(mut self, detail: &str) -> Self {
        self.start_failure = Some(detail.to_string());
        self
    }

    /// Make every exec (and image inspection) fail at the runtime level.
    pub fn with_failing_exec(mut self) -> Self {
        self.failing_exec = true;
        self
    }

    /// Make stop and remove report errors.
    pub fn with_failing_cleanup(mut self) -> Self {
        self.failing_cleanup = true;
        self
    }

    /// Images that containers were started from, in order.
    pub fn started(&self) -> Vec<String> {
        self.started.borrow().clone()
    }

    /// Containers that were stopped.
    pub fn stopped(&self) -> Vec<ContainerId> {
        self.stopped.borrow().clone()
    }

    /// Containers that were removed.
    pub fn removed(&self) -> Vec<ContainerId> {
        self.removed.borrow().clone()
    }

    /// Containers started but not yet removed.
    pub fn running(&self) -> usize {
        self.started.borrow().len() - self.removed.borrow().len()
    }

    /// Every argv passed to `exec`.
    pub fn execs(&self) -> Vec<Vec<String>> {
        self.execs.borrow().clone()
    }

    fn answer_script(&self, script: &str) -> ExecOutput {
        if let Some(rest) = script.strip_prefix("source ") {
            if let Some((path, echo)) = rest.split_once("; ") {
                let var = echoed_variable(echo);
                return match (self.env_files.get(path), var) {
                    (Some(vars), Some(var)) => {
                        let value = vars.get(var).map(String::as_str).unwrap_or("");
                        ExecOutput::new(0, format!("{}\n", value), "")
                    }
                    // bash keeps going after a failed `source`; echo prints a bare newline.
                    _ => ExecOutput::new(
                        0,
                        "\n",
                        format!("bash: {}: No such file or directory\n", path),
                    ),
                };
            }
        }

        if let Some(var) = echoed_variable(script) {
            let value = self.env.get(var).map(String::as_str).unwrap_or("");
            return ExecOutput::new(0, format!("{}\n", value), "");
        }

        self.commands.get(script).cloned().unwrap_or_else(|| {
            ExecOutput::new(127, "", format!("bash: {}: command not found\n", script))
        })
    }
}

/// Variable name from `echo ${NAME}`.
fn echoed_variable(script: &str) -> Option<&str> {
    script.strip_prefix("echo ${")?.strip_suffix('}')
}

impl ContainerRuntime for MockRuntime {
    fn start_detached(&self, image: &str) -> std::result::Result<ContainerId, StartError> {
        if self.missing_images.contains(image) {
            return Err(StartError::ImageNotFound);
        }
        if let Some(detail) = &self.start_failure {
            return Err(StartError::Other(detail.clone()));
        }
        let mut started = self.started.borrow_mut();
        started.push(image.to_string());
        Ok(ContainerId::new(format!("mock{:012}", started.len())))
    }

    fn exec(&self, _id: &ContainerId, argv: &[&str]) -> Result<ExecOutput> {
        self.execs
            .borrow_mut()
            .push(argv.iter().map(|a| a.to_string()).collect());

        if self.failing_exec {
            return Err(SmxError::runtime("exec", "exec failed"));
        }

        let output = match argv {
            ["bash", "-c", script] => self.answer_script(script),
            ["python", "-m", "pip", "show", package] => {
                self.pip.get(*package).cloned().unwrap_or_else(|| {
                    ExecOutput::new(
                        1,
                        "",
                        format!("WARNING: Package(s) not found: {}\n", package),
                    )
                })
            }
            _ => ExecOutput::new(1, "", "unsupported command\n"),
        };
        Ok(output)
    }

    fn stop(&self, id: &ContainerId) -> Result<()> {
        self.stopped.borrow_mut().push(id.clone());
        if self.failing_cleanup {
            return Err(anyhow::anyhow!("stop refused").into());
        }
        Ok(())
    }

    fn remove(&self, id: &ContainerId) -> Result<()> {
        self.removed.borrow_mut().push(id.clone());
        if self.failing_cleanup {
            return Err(anyhow::anyhow!("remove refused").into());
        }
        Ok(())
    }

    fn image_attributes(&self, _id: &ContainerId) -> Result<Map<String, Value>> {
        if self.failing_exec {
            return Err(anyhow::anyhow!("inspect failed").into());
        }
        Ok(self.image_attributes.clone())
    }
}
