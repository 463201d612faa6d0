//! Image catalog, release naming, and the standard probe plan.
//!
//! Everything here describes *which* containers are inspected and *what*
//! is read from them; the mechanics live in [`crate::probe`].

use std::fmt;

use chrono::{Datelike, NaiveDate};

use crate::probe::{FieldRecord, Probe, NOT_APPLICABLE};

/// Registry namespace all catalogued images live under.
pub const REGISTRY_BASE: &str = "nvcr.io/nvidia/merlin/";

/// Container families inspected on every run.
pub const CONTAINERS: &[&str] = &[
    "merlin-training",
    "merlin-tensorflow-training",
    "merlin-pytorch-training",
    "merlin-inference",
    "merlin-tensorflow-inference",
    "merlin-pytorch-inference",
];

/// A registry path plus release tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Full repository path, e.g. `nvcr.io/nvidia/merlin/merlin-training`.
    pub repository: String,

    /// Release tag, e.g. `22.02`.
    pub tag: String,
}

impl ImageRef {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// Catalogued image for a container family at a release.
    pub fn for_family(family: &str, release: &str) -> Self {
        Self::new(format!("{}{}", REGISTRY_BASE, family), release)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// Release tag for a date, e.g. `22.03` for March 2022.
pub fn release_for(date: NaiveDate) -> String {
    format!("{:02}.{:02}", date.year() % 100, date.month())
}

/// Release tag for the current month.
pub fn current_release() -> String {
    release_for(chrono::Local::now().date_naive())
}

/// Probes run against every container, in order.
pub fn standard_plan() -> Vec<Probe> {
    fn env(lookup: &'static str, key: &'static str) -> Probe {
        Probe::Env { lookup, key }
    }
    fn pip(package: &'static str, key: &'static str) -> Probe {
        Probe::Pip { package, key }
    }

    vec![
        Probe::Image {
            attribute: "Size",
            key: "size",
        },
        Probe::EnvFile {
            path: "/etc/os-release",
            lookup: "PRETTY_NAME",
            key: "os",
        },
        env("CUDA_VERSION", "cuda"),
        pip("rmm", "rmm"),
        pip("cudf", "cudf"),
        env("CUDNN_VERSION", "cudnn"),
        pip("nvtabular", "nvtabular"),
        pip("transformers4rec", "transformers4rec"),
        pip("merlin.core", "merlin.core"),
        pip("merlin.systems", "merlin.systems"),
        pip("merlin.models", "merlin.models"),
        pip("hugectr2onnx", "hugectr2onnx"),
        pip("hugectr", "hugectr"),
        pip("sparse_operation_kit", "sparse_operation_kit"),
        pip("tensorflow", "tf"),
        pip("torch", "pytorch"),
        env("CUBLAS_VERSION", "cublas"),
        env("CUFFT_VERSION", "cufft"),
        env("CURAND_VERSION", "curand"),
        env("CUSOLVER_VERSION", "cusolver"),
        env("CUSPARSE_VERSION", "cusparse"),
        env("CUTENSOR_VERSION", "cutensor"),
        env("NVIDIA_TENSORFLOW_VERSION", "nvidia_tensorflow"),
        env("NVIDIA_PYTORCH_VERSION", "nvidia_pytorch"),
        env("OPENMPI_VERSION", "openmpi"),
        env("TRT_VERSION", "tensorrt"),
        env("TRTOSS_VERSION", "base_container"),
        Probe::Command {
            script: "if [ ! -f /usr/local/hugectr/lib/libhuge_ctr_shared.so ]; then exit 1; fi; \
                     cuobjdump /usr/local/hugectr/lib/libhuge_ctr_shared.so | grep arch | sed -e 's/.*sm_//'",
            key: "sm",
        },
        Probe::Command {
            script: "cat /opt/tritonserver/TRITON_VERSION",
            key: "triton",
        },
        Probe::Command {
            script: "python -c \"import sys;print(sys.version_info[0]);\"",
            key: "python_major",
        },
    ]
}

/// Value of the `base_container` field for a container family.
///
/// Runs after the probes; reads fields they produced.
pub fn base_container(family: &str, record: &FieldRecord) -> String {
    let field = |key: &str| record.get(key).map(String::as_str).unwrap_or(NOT_APPLICABLE);

    match family {
        "merlin-training" => NOT_APPLICABLE.to_string(),
        "merlin-tensorflow-training" => format!(
            "nvcr.io/nvidia/tensorflow:{}-py{}",
            field("nvidia_tensorflow"),
            field("python_major")
        ),
        "merlin-pytorch-training" => format!(
            "nvcr.io/nvidia/pytorch:{}-py{}",
            field("nvidia_pytorch"),
            field("python_major")
        ),
        _ => format!("Triton version {}", field("base_container")),
    }
}
