//! Run configuration.
//!
//! - [`settings`] - Environment-variable settings (credentials, switches)
//! - [`snippets`] - Static snippet text copied into every record

pub mod settings;
pub mod snippets;

pub use settings::{Settings, DEFAULT_API_URL, DEFAULT_REPO};
pub use snippets::{Snippets, STANDARD_SNIPPETS};
