//! In-memory source host for testing.
//!
//! Tracks branches, commits of a single file, deletions and pull requests
//! so tests can assert on the whole publish workflow without a network.
//!
//! # Example
//!
//! ```
//! use smx::publish::{publish, MockHost, PublishOutcome, PublishRequest};
//!
//! let host = MockHost::new("docs/data.json", "{}");
//! let request = PublishRequest {
//!     release: "22.03".to_string(),
//!     repo_path: "docs/data.json".to_string(),
//!     content: "{}".to_string(),
//! };
//! let outcome = publish(&host, &request).unwrap();
//! assert!(matches!(outcome, PublishOutcome::NoChanges { .. }));
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;

use super::{RefError, RemoteFile, SourceHost, BASE_BRANCH};
use crate::error::{Result, SmxError};

/// A pull request opened against the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRecord {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// In-memory [`SourceHost`] holding one tracked file.
#[derive(Debug)]
pub struct MockHost {
    path: String,
    branches: RefCell<BTreeMap<String, String>>,
    commits: RefCell<BTreeMap<String, String>>,
    deleted: RefCell<Vec<String>>,
    pulls: RefCell<Vec<PullRecord>>,
    fail_refs: bool,
    fail_update: bool,
    fail_compare: bool,
    fail_pull: bool,
}

impl MockHost {
    /// Host whose base branch holds `content` at `path`.
    pub fn new(path: &str, content: &str) -> Self {
        let mut branches = BTreeMap::new();
        branches.insert(BASE_BRANCH.to_string(), "c0".to_string());
        let mut commits = BTreeMap::new();
        commits.insert("c0".to_string(), content.to_string());

        Self {
            path: path.to_string(),
            branches: RefCell::new(branches),
            commits: RefCell::new(commits),
            deleted: RefCell::new(Vec::new()),
            pulls: RefCell::new(Vec::new()),
            fail_refs: false,
            fail_update: false,
            fail_compare: false,
            fail_pull: false,
        }
    }

    /// Add a branch at the base commit.
    pub fn with_branch(self, name: &str) -> Self {
        self.branches
            .borrow_mut()
            .insert(name.to_string(), "c0".to_string());
        self
    }

    /// Make ref creation fail for reasons other than a collision.
    pub fn with_failing_refs(mut self) -> Self {
        self.fail_refs = true;
        self
    }

    pub fn with_failing_update(mut self) -> Self {
        self.fail_update = true;
        self
    }

    pub fn with_failing_compare(mut self) -> Self {
        self.fail_compare = true;
        self
    }

    pub fn with_failing_pull(mut self) -> Self {
        self.fail_pull = true;
        self
    }

    pub fn has_branch(&self, name: &str) -> bool {
        self.branches.borrow().contains_key(name)
    }

    /// Tracked file content at the tip of `branch`.
    pub fn content_on(&self, branch: &str) -> Option<String> {
        let sha = self.branches.borrow().get(branch).cloned()?;
        self.commits.borrow().get(&sha).cloned()
    }

    /// Branches deleted so far, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.borrow().clone()
    }

    /// Pull requests opened so far.
    pub fn pulls(&self) -> Vec<PullRecord> {
        self.pulls.borrow().clone()
    }

    fn unknown(operation: &str, what: &str) -> SmxError {
        SmxError::host_api(operation, format!("HTTP 404: {} not found", what))
    }
}

impl SourceHost for MockHost {
    fn branch_sha(&self, branch: &str) -> Result<String> {
        self.branches
            .borrow()
            .get(branch)
            .cloned()
            .ok_or_else(|| Self::unknown("get branch", branch))
    }

    fn create_ref(&self, name: &str, sha: &str) -> std::result::Result<(), RefError> {
        if self.fail_refs {
            return Err(RefError::Other("HTTP 500: server error".to_string()));
        }
        let mut branches = self.branches.borrow_mut();
        if branches.contains_key(name) {
            return Err(RefError::AlreadyExists);
        }
        branches.insert(name.to_string(), sha.to_string());
        Ok(())
    }

    fn delete_ref(&self, name: &str) -> Result<()> {
        self.branches
            .borrow_mut()
            .remove(name)
            .ok_or_else(|| Self::unknown("delete ref", name))?;
        self.deleted.borrow_mut().push(name.to_string());
        Ok(())
    }

    fn file(&self, path: &str, branch: &str) -> Result<RemoteFile> {
        if path != self.path {
            return Err(Self::unknown("get contents", path));
        }
        let sha = self.branch_sha(branch)?;
        let content = self
            .commits
            .borrow()
            .get(&sha)
            .cloned()
            .ok_or_else(|| Self::unknown("get contents", &sha))?;
        Ok(RemoteFile {
            path: path.to_string(),
            content,
            sha: format!("blob-{}", sha),
        })
    }

    fn update_file(
        &self,
        path: &str,
        _message: &str,
        content: &str,
        branch: &str,
        blob_sha: &str,
    ) -> Result<String> {
        if self.fail_update {
            return Err(SmxError::host_api("update file", "HTTP 409: conflict"));
        }
        let current = self.file(path, branch)?;
        if current.sha != blob_sha {
            return Err(SmxError::host_api("update file", "HTTP 409: sha mismatch"));
        }

        let sha = format!("c{}", self.commits.borrow().len());
        self.commits
            .borrow_mut()
            .insert(sha.clone(), content.to_string());
        self.branches
            .borrow_mut()
            .insert(branch.to_string(), sha.clone());
        Ok(sha)
    }

    fn compare(&self, base_sha: &str, head_sha: &str) -> Result<Vec<String>> {
        if self.fail_compare {
            return Err(SmxError::host_api("compare", "HTTP 500: server error"));
        }
        let commits = self.commits.borrow();
        let base = commits
            .get(base_sha)
            .ok_or_else(|| Self::unknown("compare", base_sha))?;
        let head = commits
            .get(head_sha)
            .ok_or_else(|| Self::unknown("compare", head_sha))?;
        if base == head {
            Ok(Vec::new())
        } else {
            Ok(vec![self.path.clone()])
        }
    }

    fn create_pull(&self, title: &str, body: &str, head: &str, base: &str) -> Result<String> {
        if self.fail_pull {
            return Err(SmxError::host_api("create pull request", "HTTP 422: invalid"));
        }
        let mut pulls = self.pulls.borrow_mut();
        pulls.push(PullRecord {
            title: title.to_string(),
            body: body.to_string(),
            head: head.to_string(),
            base: base.to_string(),
        });
        Ok(format!("https://github.com/mock/repo/pull/{}", pulls.len()))
    }
}
