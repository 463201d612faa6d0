//! Publishing store changes as a pull request.
//!
//! The workflow is idempotent: the new store content is committed to a
//! fresh scratch branch, and a pull request is opened only when that commit
//! actually differs from the base branch. Otherwise the branch is deleted.
//!
//! ```text
//! NoCredential ──▶ Skipped
//! BranchNameProbe ──(25 collisions)──▶ error
//!        │
//!        ▼
//! ContentCommitted ──▶ Diffed ──(no files)──▶ NoChanges
//!                        │
//!                        ▼
//!               PullRequestOpened / PullRequestFailed
//! ```

pub mod github;
pub mod mock;

pub use github::GitHubClient;
pub use mock::MockHost;

use std::fmt;

use crate::config::Settings;
use crate::error::{Result, SmxError};

/// Prefix of scratch branch names.
pub const BRANCH_PREFIX: &str = "docs-smx-";

/// Highest counter tried when looking for a free branch name.
pub const MAX_BRANCH_ATTEMPTS: u32 = 25;

/// Commit message and pull request body.
pub const COMMIT_MESSAGE: &str = "Updates from containers";

/// Branch pull requests target.
pub const BASE_BRANCH: &str = "main";

/// Why a ref could not be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefError {
    /// A ref with that name exists already.
    AlreadyExists,

    /// Any other failure.
    Other(String),
}

impl fmt::Display for RefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefError::AlreadyExists => f.write_str("reference already exists"),
            RefError::Other(detail) => f.write_str(detail),
        }
    }
}

/// A file as stored on a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    pub content: String,
    /// Blob revision, required to update the file.
    pub sha: String,
}

/// Operations the workflow needs from a source-hosting service.
pub trait SourceHost {
    /// Commit SHA at the tip of `branch`.
    fn branch_sha(&self, branch: &str) -> Result<String>;

    /// Create branch `name` pointing at `sha`.
    fn create_ref(&self, name: &str, sha: &str) -> std::result::Result<(), RefError>;

    /// Delete branch `name`.
    fn delete_ref(&self, name: &str) -> Result<()>;

    /// Read `path` as of `branch`.
    fn file(&self, path: &str, branch: &str) -> Result<RemoteFile>;

    /// Replace the content of `path` on `branch`; returns the new commit SHA.
    fn update_file(
        &self,
        path: &str,
        message: &str,
        content: &str,
        branch: &str,
        blob_sha: &str,
    ) -> Result<String>;

    /// Names of files that differ between two commits.
    fn compare(&self, base_sha: &str, head_sha: &str) -> Result<Vec<String>>;

    /// Open a pull request; returns its URL.
    fn create_pull(&self, title: &str, body: &str, head: &str, base: &str) -> Result<String>;
}

/// What to publish.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Release the changes belong to, e.g. `22.03`.
    pub release: String,

    /// Path of the store file inside the repository.
    pub repo_path: String,

    /// New content of the store file.
    pub content: String,
}

impl PublishRequest {
    /// Scratch branch name for attempt `counter`.
    pub fn branch_name(&self, counter: u32) -> String {
        format!("{}{}-{}", BRANCH_PREFIX, self.release.replace('.', ""), counter)
    }

    /// Pull request title.
    pub fn title(&self) -> String {
        format!("Support matrix updates for {}", self.release)
    }
}

/// How the publish phase ended, short of a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// No credential configured.
    Skipped,

    /// The committed content matched the base branch; scratch branch deleted.
    NoChanges { branch: String },

    /// Pull request opened.
    Opened { branch: String, url: String },

    /// Everything up to the pull request worked; opening it did not.
    PullRequestFailed { branch: String, detail: String },

    /// A hosting API call failed before a pull request could be attempted.
    Failed { stage: &'static str, detail: String },
}

/// Result of looking for a free scratch branch name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchAttempt {
    Created(String),
    Exhausted { last: String },
}

/// Create the first free scratch branch at `sha`.
///
/// Collisions bump the counter; any other ref error is returned as-is.
pub fn claim_branch(
    host: &dyn SourceHost,
    request: &PublishRequest,
    sha: &str,
) -> std::result::Result<BranchAttempt, RefError> {
    let mut last = String::new();
    for counter in 1..=MAX_BRANCH_ATTEMPTS {
        let name = request.branch_name(counter);
        match host.create_ref(&name, sha) {
            Ok(()) => {
                tracing::info!("Remote ref created: 'refs/heads/{}'", name);
                return Ok(BranchAttempt::Created(name));
            }
            Err(RefError::AlreadyExists) => {
                tracing::info!(
                    "PR branch '{}' already exists. Incrementing the counter.",
                    name
                );
                last = name;
            }
            Err(other) => return Err(other),
        }
    }
    Ok(BranchAttempt::Exhausted { last })
}

/// Publish with credentials from `settings`, skipping when there are none.
pub fn open_pr(settings: &Settings, request: &PublishRequest) -> Result<PublishOutcome> {
    let Some(token) = settings.token.as_deref() else {
        tracing::info!("Env var GH_TOKEN is not found. Cannot open PR.");
        return Ok(PublishOutcome::Skipped);
    };

    let client = GitHubClient::new(&settings.api_url, &settings.repo, token)?;
    publish(&client, request)
}

/// Run the publish workflow against `host`.
///
/// Only running out of branch names is an error; API failures are logged
/// and reported through [`PublishOutcome`].
pub fn publish(host: &dyn SourceHost, request: &PublishRequest) -> Result<PublishOutcome> {
    let base_sha = match host.branch_sha(BASE_BRANCH) {
        Ok(sha) => sha,
        Err(e) => return Ok(failed("resolve base branch", e)),
    };

    let branch = match claim_branch(host, request, &base_sha) {
        Ok(BranchAttempt::Created(name)) => name,
        Ok(BranchAttempt::Exhausted { last }) => {
            tracing::info!("Failed to create a unique branch name. Giving up.");
            return Err(SmxError::BranchNamesExhausted {
                attempts: MAX_BRANCH_ATTEMPTS,
                last,
            });
        }
        Err(e) => return Ok(failed("create branch", e)),
    };

    let head_sha = match commit_content(host, request, &branch) {
        Ok(sha) => sha,
        Err((stage, e)) => {
            discard_branch(host, &branch);
            return Ok(failed(stage, e));
        }
    };

    let changed = match host.compare(&base_sha, &head_sha) {
        Ok(files) => files,
        Err(e) => {
            discard_branch(host, &branch);
            return Ok(failed("compare", e));
        }
    };

    if changed.is_empty() {
        tracing::info!("No changes to commit.");
        discard_branch(host, &branch);
        return Ok(PublishOutcome::NoChanges { branch });
    }
    tracing::debug!("Changed files: {}", changed.join(", "));

    match host.create_pull(&request.title(), COMMIT_MESSAGE, &branch, BASE_BRANCH) {
        Ok(url) => {
            tracing::info!("Opened PR: '{}'", url);
            Ok(PublishOutcome::Opened { branch, url })
        }
        Err(e) => {
            tracing::info!("Failed to open PR: {}", e);
            Ok(PublishOutcome::PullRequestFailed {
                branch,
                detail: e.to_string(),
            })
        }
    }
}

/// Commit the request content onto `branch`.
fn commit_content(
    host: &dyn SourceHost,
    request: &PublishRequest,
    branch: &str,
) -> std::result::Result<String, (&'static str, SmxError)> {
    let file = host
        .file(&request.repo_path, branch)
        .map_err(|e| ("fetch file", e))?;
    host.update_file(
        &file.path,
        COMMIT_MESSAGE,
        &request.content,
        branch,
        &file.sha,
    )
    .map_err(|e| ("update file", e))
}

fn discard_branch(host: &dyn SourceHost, branch: &str) {
    if let Err(e) = host.delete_ref(branch) {
        tracing::warn!("Failed to delete branch '{}': {}", branch, e);
    }
}

fn failed(stage: &'static str, cause: impl fmt::Display) -> PublishOutcome {
    tracing::info!("Publishing stopped at {}: {}", stage, cause);
    PublishOutcome::Failed {
        stage,
        detail: cause.to_string(),
    }
}
