//! Probe engine.
//!
//! A [`Prober`] borrows an acquired container and fills a fresh
//! [`FieldRecord`]. Each probe owns exactly one key: it writes
//! [`NOT_APPLICABLE`] first and overwrites it only on success, so a failing
//! probe never disturbs other keys or stops later probes.
//!
//! # Example
//!
//! ```
//! use smx::container::{acquire, Acquisition, MockRuntime};
//! use smx::probe::{ExitPolicy, Prober, NOT_APPLICABLE};
//!
//! let runtime = MockRuntime::new().with_env("CUDA_VERSION", "11.6");
//! let Acquisition::Acquired(container) = acquire(&runtime, "img:1") else {
//!     unreachable!()
//! };
//! let mut prober = Prober::new(&container, ExitPolicy::Compatible);
//! prober.from_env("CUDA_VERSION", "cuda");
//! prober.from_env("CUDNN_VERSION", "cudnn");
//!
//! let record = prober.into_record();
//! assert_eq!(record["cuda"], "11.6");
//! assert_eq!(record["cudnn"], NOT_APPLICABLE);
//! ```

pub mod parse;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::container::{ExecOutput, ManagedContainer};

/// Value stored for a field whose probe failed.
pub const NOT_APPLICABLE: &str = "Not applicable";

/// Image attribute converted from bytes to a human-readable size.
pub const SIZE_ATTRIBUTE: &str = "Size";

/// Command-probe key whose output is a list of GPU architectures.
pub const ARCH_LIST_KEY: &str = "sm";

/// Probed facts for one (container, release) pair, sorted by key.
pub type FieldRecord = BTreeMap<String, String>;

/// How exit statuses of in-container commands are judged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Only status 1 is a failure; e.g. 127 (command not found) passes.
    #[default]
    Compatible,

    /// Any non-zero status is a failure.
    Strict,
}

impl ExitPolicy {
    pub fn is_failure(self, status: i32) -> bool {
        match self {
            ExitPolicy::Compatible => status == 1,
            ExitPolicy::Strict => status != 0,
        }
    }
}

/// One introspection step of a probe plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Source `path` and echo `lookup`.
    EnvFile {
        path: &'static str,
        lookup: &'static str,
        key: &'static str,
    },

    /// Echo the process environment variable `lookup`.
    Env {
        lookup: &'static str,
        key: &'static str,
    },

    /// Installed version of a Python package, read without importing it.
    Pip {
        package: &'static str,
        key: &'static str,
    },

    /// Attribute of the image descriptor.
    Image {
        attribute: &'static str,
        key: &'static str,
    },

    /// Stdout of an arbitrary shell command.
    Command {
        script: &'static str,
        key: &'static str,
    },
}

impl Probe {
    /// Field key this probe writes.
    pub fn key(&self) -> &'static str {
        match self {
            Probe::EnvFile { key, .. }
            | Probe::Env { key, .. }
            | Probe::Pip { key, .. }
            | Probe::Image { key, .. }
            | Probe::Command { key, .. } => key,
        }
    }
}

/// Runs probes against one container.
pub struct Prober<'c, 'r> {
    container: &'c ManagedContainer<'r>,
    policy: ExitPolicy,
    record: FieldRecord,
}

impl<'c, 'r> Prober<'c, 'r> {
    pub fn new(container: &'c ManagedContainer<'r>, policy: ExitPolicy) -> Self {
        Self {
            container,
            policy,
            record: FieldRecord::new(),
        }
    }

    /// Fields collected so far.
    pub fn record(&self) -> &FieldRecord {
        &self.record
    }

    pub fn into_record(self) -> FieldRecord {
        self.record
    }

    /// Write a fixed value.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.record.insert(key.to_string(), value.into());
    }

    /// Apply every probe of a plan in order.
    pub fn run(&mut self, plan: &[Probe]) {
        for probe in plan {
            match *probe {
                Probe::EnvFile { path, lookup, key } => self.from_env_file(path, lookup, key),
                Probe::Env { lookup, key } => self.from_env(lookup, key),
                Probe::Pip { package, key } => self.from_pip(package, key),
                Probe::Image { attribute, key } => self.from_image(attribute, key),
                Probe::Command { script, key } => self.from_command(script, key),
            }
        }
    }

    /// Source a shell file inside the container and read one variable.
    pub fn from_env_file(&mut self, path: &str, lookup: &str, key: &str) {
        self.fail(key);
        let script = format!("source {}; echo ${{{}}}", path, lookup);
        match self.shell(&script).and_then(|out| parse::echoed_value(&out.stdout)) {
            Some(value) => self.insert(key, value),
            None => tracing::info!("Failed to get env var '{}' from file '{}'", lookup, path),
        }
    }

    /// Read a process environment variable inside the container.
    pub fn from_env(&mut self, lookup: &str, key: &str) {
        self.fail(key);
        let script = format!("echo ${{{}}}", lookup);
        match self.shell(&script).and_then(|out| parse::echoed_value(&out.stdout)) {
            Some(value) => self.insert(key, value),
            None => tracing::info!("Failed to get env var: '{}'", lookup),
        }
    }

    /// Read a Python package version from pip metadata.
    ///
    /// Importing the package is avoided: some packages crash at import time
    /// on machines without a GPU.
    pub fn from_pip(&mut self, package: &str, key: &str) {
        self.fail(key);
        let output = match self.container.exec(&["python", "-m", "pip", "show", package]) {
            Ok(out) if out.status == 0 => out,
            Ok(_) | Err(_) => {
                tracing::info!("Failed to get package version from pip: {}", package);
                return;
            }
        };

        match parse::pip_version(&output.stdout) {
            Some(version) => self.insert(key, version),
            None => tracing::info!(
                "Failed to extract version from pip output: {}",
                output.stdout.trim()
            ),
        }
    }

    /// Read an attribute off the image descriptor.
    pub fn from_image(&mut self, attribute: &str, key: &str) {
        self.fail(key);
        let attributes = match self.container.image_attributes() {
            Ok(attrs) => attrs,
            Err(e) => {
                tracing::info!("Failed to inspect image: {}", e);
                return;
            }
        };

        let value = match (attribute, attributes.get(attribute)) {
            (_, None) => None,
            (SIZE_ATTRIBUTE, Some(size)) => size.as_f64().map(parse::format_size),
            (_, Some(Value::String(s))) => Some(s.clone()),
            (_, Some(other)) => Some(other.to_string()),
        };

        match value {
            Some(value) => self.insert(key, value),
            None => tracing::info!("Failed to get attr from image: '{}'", attribute),
        }
    }

    /// Run a shell command inside the container and keep its stdout.
    pub fn from_command(&mut self, script: &str, key: &str) {
        self.fail(key);
        let Some(output) = self.shell(script) else {
            tracing::info!("Command '{}' failed", script);
            return;
        };

        let value = if key == ARCH_LIST_KEY {
            parse::join_list(&output.stdout)
        } else {
            output.stdout.trim().to_string()
        };
        self.insert(key, value);
    }

    fn fail(&mut self, key: &str) {
        self.insert(key, NOT_APPLICABLE);
    }

    /// Run `bash -c <script>`; `None` when the runtime errors or the policy
    /// judges the status a failure.
    fn shell(&self, script: &str) -> Option<ExecOutput> {
        match self.container.exec(&["bash", "-c", script]) {
            Ok(out) if !self.policy.is_failure(out.status) => Some(out),
            Ok(out) => {
                tracing::debug!("`{}` exited {}: {}", script, out.status, out.stderr.trim());
                None
            }
            Err(e) => {
                tracing::debug!("`{}` could not run: {}", script, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{acquire, Acquisition, MockRuntime};
    use serde_json::json;

    fn with_prober<F>(runtime: &MockRuntime, policy: ExitPolicy, f: F) -> FieldRecord
    where
        F: FnOnce(&mut Prober),
    {
        let Acquisition::Acquired(container) = acquire(runtime, "img:1") else {
            panic!("mock container should start");
        };
        let mut prober = Prober::new(&container, policy);
        prober.insert("existing", "kept");
        f(&mut prober);
        prober.into_record()
    }

    fn probe(runtime: &MockRuntime, f: impl FnOnce(&mut Prober)) -> FieldRecord {
        with_prober(runtime, ExitPolicy::Compatible, f)
    }

    #[test]
    fn exit_policy_compatible_only_fails_on_one() {
        assert!(ExitPolicy::Compatible.is_failure(1));
        assert!(!ExitPolicy::Compatible.is_failure(0));
        assert!(!ExitPolicy::Compatible.is_failure(127));
    }

    #[test]
    fn exit_policy_strict_fails_on_nonzero() {
        assert!(ExitPolicy::Strict.is_failure(1));
        assert!(ExitPolicy::Strict.is_failure(127));
        assert!(!ExitPolicy::Strict.is_failure(0));
    }

    #[test]
    fn env_probe_reads_value() {
        let runtime = MockRuntime::new().with_env("CUDA_VERSION", "11.6");
        let record = probe(&runtime, |p| p.from_env("CUDA_VERSION", "cuda"));
        assert_eq!(record["cuda"], "11.6");
    }

    #[test]
    fn env_probe_failure_writes_sentinel_only_for_its_key() {
        let runtime = MockRuntime::new();
        let record = probe(&runtime, |p| p.from_env("CUDA_VERSION", "cuda"));
        assert_eq!(record["cuda"], NOT_APPLICABLE);
        assert_eq!(record["existing"], "kept");
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn env_file_probe_strips_quotes() {
        let runtime = MockRuntime::new().with_env_file(
            "/etc/os-release",
            "PRETTY_NAME",
            "\"Ubuntu 20.04.4 LTS\"",
        );
        let record = probe(&runtime, |p| {
            p.from_env_file("/etc/os-release", "PRETTY_NAME", "os")
        });
        assert_eq!(record["os"], "Ubuntu 20.04.4 LTS");
    }

    #[test]
    fn env_file_probe_failure_writes_sentinel() {
        let runtime = MockRuntime::new();
        let record = probe(&runtime, |p| {
            p.from_env_file("/etc/os-release", "PRETTY_NAME", "os")
        });
        assert_eq!(record["os"], NOT_APPLICABLE);
        assert_eq!(record["existing"], "kept");
    }

    #[test]
    fn pip_probe_reads_version() {
        let runtime = MockRuntime::new().with_package("nvtabular", "1.2.3");
        let record = probe(&runtime, |p| p.from_pip("nvtabular", "nvtabular"));
        assert_eq!(record["nvtabular"], "1.2.3");
    }

    #[test]
    fn pip_probe_missing_package_writes_sentinel() {
        let runtime = MockRuntime::new();
        let record = probe(&runtime, |p| p.from_pip("tensorflow", "tf"));
        assert_eq!(record["tf"], NOT_APPLICABLE);
        assert_eq!(record["existing"], "kept");
    }

    #[test]
    fn pip_probe_ambiguous_output_writes_sentinel() {
        let runtime = MockRuntime::new().with_pip_output(
            "torch",
            0,
            "Name: torch\nVersion: 1.10\nName: torch\nVersion: 1.11\n",
        );
        let record = probe(&runtime, |p| p.from_pip("torch", "pytorch"));
        assert_eq!(record["pytorch"], NOT_APPLICABLE);
    }

    #[test]
    fn pip_probe_is_strict_about_status() {
        let runtime = MockRuntime::new().with_pip_output("cudf", 2, "Version: 22.02\n");
        let record = probe(&runtime, |p| p.from_pip("cudf", "cudf"));
        assert_eq!(record["cudf"], NOT_APPLICABLE);
    }

    #[test]
    fn image_probe_formats_size() {
        let runtime = MockRuntime::new().with_image_attribute("Size", json!(3221225472u64));
        let record = probe(&runtime, |p| p.from_image("Size", "size"));
        assert_eq!(record["size"], "3.0 GB");
    }

    #[test]
    fn image_probe_reads_plain_attribute() {
        let runtime = MockRuntime::new().with_image_attribute("Architecture", json!("amd64"));
        let record = probe(&runtime, |p| p.from_image("Architecture", "arch"));
        assert_eq!(record["arch"], "amd64");
    }

    #[test]
    fn image_probe_missing_attribute_writes_sentinel() {
        let runtime = MockRuntime::new();
        let record = probe(&runtime, |p| p.from_image("Size", "size"));
        assert_eq!(record["size"], NOT_APPLICABLE);
        assert_eq!(record["existing"], "kept");
    }

    #[test]
    fn image_probe_non_numeric_size_writes_sentinel() {
        let runtime = MockRuntime::new().with_image_attribute("Size", json!("huge"));
        let record = probe(&runtime, |p| p.from_image("Size", "size"));
        assert_eq!(record["size"], NOT_APPLICABLE);
    }

    #[test]
    fn command_probe_captures_stdout() {
        let runtime =
            MockRuntime::new().with_command("cat /opt/tritonserver/TRITON_VERSION", 0, "2.19.0\n");
        let record = probe(&runtime, |p| {
            p.from_command("cat /opt/tritonserver/TRITON_VERSION", "triton")
        });
        assert_eq!(record["triton"], "2.19.0");
    }

    #[test]
    fn command_probe_joins_architecture_list() {
        let runtime = MockRuntime::new().with_command("list-archs", 0, "60\n70\n80\n");
        let record = probe(&runtime, |p| p.from_command("list-archs", ARCH_LIST_KEY));
        assert_eq!(record["sm"], "60, 70, 80");
    }

    #[test]
    fn command_probe_status_one_writes_sentinel() {
        let runtime = MockRuntime::new().with_command("exit 1", 1, "");
        let record = probe(&runtime, |p| p.from_command("exit 1", "triton"));
        assert_eq!(record["triton"], NOT_APPLICABLE);
        assert_eq!(record["existing"], "kept");
    }

    #[test]
    fn compatible_policy_accepts_command_not_found() {
        let runtime = MockRuntime::new();
        let record = probe(&runtime, |p| p.from_command("missing-tool", "triton"));
        assert_eq!(record["triton"], "");
    }

    #[test]
    fn strict_policy_rejects_command_not_found() {
        let runtime = MockRuntime::new();
        let record = with_prober(&runtime, ExitPolicy::Strict, |p| {
            p.from_command("missing-tool", "triton")
        });
        assert_eq!(record["triton"], NOT_APPLICABLE);
    }

    #[test]
    fn runtime_errors_never_abort_the_record() {
        let runtime = MockRuntime::new().with_failing_exec();
        let record = probe(&runtime, |p| {
            p.from_env("CUDA_VERSION", "cuda");
            p.from_env_file("/etc/os-release", "PRETTY_NAME", "os");
            p.from_pip("rmm", "rmm");
            p.from_image("Size", "size");
            p.from_command("cat x", "triton");
        });
        for key in ["cuda", "os", "rmm", "size", "triton"] {
            assert_eq!(record[key], NOT_APPLICABLE, "key {}", key);
        }
        assert_eq!(record["existing"], "kept");
    }

    #[test]
    fn run_applies_plan_in_order() {
        let runtime = MockRuntime::new()
            .with_env("CUDA_VERSION", "11.6")
            .with_package("rmm", "22.02.00");
        let plan = [
            Probe::Env {
                lookup: "CUDA_VERSION",
                key: "cuda",
            },
            Probe::Pip {
                package: "rmm",
                key: "rmm",
            },
            Probe::Env {
                lookup: "TRT_VERSION",
                key: "tensorrt",
            },
        ];
        let record = probe(&runtime, |p| p.run(&plan));
        assert_eq!(record["cuda"], "11.6");
        assert_eq!(record["rmm"], "22.02.00");
        assert_eq!(record["tensorrt"], NOT_APPLICABLE);
        assert_eq!(runtime.execs().len(), 3);
    }

    #[test]
    fn probe_key_accessor() {
        let probe = Probe::Command {
            script: "true",
            key: "sm",
        };
        assert_eq!(probe.key(), "sm");
    }
}
