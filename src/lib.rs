//! smx - Container support-matrix extractor.
//!
//! smx starts each catalogued container image, probes it for library and
//! toolkit versions, merges the results into a cumulative JSON data file,
//! and opens a pull request when that file changed.
//!
//! # Modules
//!
//! - [`catalog`] - Image families, release tags, and the standard probe plan
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Environment settings and the snippet file
//! - [`container`] - Container runtime abstraction and scoped acquisition
//! - [`error`] - Error types and result aliases
//! - [`probe`] - Fault-isolated probes producing field records
//! - [`publish`] - Idempotent pull request workflow
//! - [`runner`] - Per-image extraction loop
//! - [`store`] - Cumulative support-matrix storage
//!
//! # Example
//!
//! ```
//! use smx::catalog::ImageRef;
//!
//! let image = ImageRef::for_family("merlin-inference", "22.03");
//! assert_eq!(image.to_string(), "nvcr.io/nvidia/merlin/merlin-inference:22.03");
//! ```
//!
//! For end-to-end runs against a mock runtime, see the integration tests.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod container;
pub mod error;
pub mod probe;
pub mod publish;
pub mod runner;
pub mod store;

pub use error::{Result, SmxError};
