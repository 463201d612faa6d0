//! CLI command implementations.
//!
//! Each command implements the [`Command`] trait, which provides a uniform
//! interface for executing commands and reporting results.
//!
//! smx has a single command, [`extract::ExtractCommand`]; the dispatcher
//! keeps argument handling separate from execution.

pub mod dispatcher;
pub mod extract;

pub use dispatcher::{Command, CommandDispatcher, CommandResult};
pub use extract::{ExtractCommand, ExtractSummary};
