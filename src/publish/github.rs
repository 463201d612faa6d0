//! GitHub REST implementation of [`SourceHost`].

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::blocking::{RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{RefError, RemoteFile, SourceHost};
use crate::error::{Result, SmxError};

const USER_AGENT: &str = concat!("smx/", env!("CARGO_PKG_VERSION"));
const TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one repository on a GitHub-compatible API.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::blocking::Client,
    api_url: String,
    repo: String,
    token: String,
}

impl GitHubClient {
    /// Create a client for `repo` (`owner/name`) at `api_url`.
    pub fn new(api_url: &str, repo: &str, token: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(TIMEOUT)
            .build()
            .map_err(|e| SmxError::host_api("create client", e))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            token: token.to_string(),
        })
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}{}", self.api_url, self.repo, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorized(request)
            .send()
            .map_err(|e| SmxError::host_api(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SmxError::host_api(
                operation,
                format!("HTTP {} {}", status, body.trim()),
            ));
        }
        Ok(response)
    }

    fn send_json<T: DeserializeOwned>(&self, operation: &str, request: RequestBuilder) -> Result<T> {
        self.send(operation, request)?
            .json::<T>()
            .map_err(|e| SmxError::host_api(operation, e))
    }
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

/// `GET /branches/{name}` and `PUT /contents/{path}` both nest a commit.
#[derive(Debug, Deserialize)]
struct WithCommit {
    commit: CommitRef,
}

#[derive(Debug, Deserialize)]
struct Contents {
    path: String,
    /// Base64, wrapped at 60 columns.
    content: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct Comparison {
    #[serde(default)]
    files: Vec<ChangedFile>,
}

#[derive(Debug, Deserialize)]
struct ChangedFile {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct Pull {
    html_url: String,
}

impl SourceHost for GitHubClient {
    fn branch_sha(&self, branch: &str) -> Result<String> {
        let op = "get branch";
        tracing::debug!("Resolving branch '{}' in {}", branch, self.repo);
        let found: WithCommit =
            self.send_json(op, self.client.get(self.url(&format!("/branches/{}", branch))))?;
        Ok(found.commit.sha)
    }

    fn create_ref(&self, name: &str, sha: &str) -> std::result::Result<(), RefError> {
        let request = self.authorized(self.client.post(self.url("/git/refs")).json(&json!({
            "ref": format!("refs/heads/{}", name),
            "sha": sha,
        })));

        let response = request.send().map_err(|e| RefError::Other(e.to_string()))?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNPROCESSABLE_ENTITY => Err(RefError::AlreadyExists),
            status => {
                let body = response.text().unwrap_or_default();
                Err(RefError::Other(format!("HTTP {} {}", status, body.trim())))
            }
        }
    }

    fn delete_ref(&self, name: &str) -> Result<()> {
        self.send(
            "delete ref",
            self.client
                .delete(self.url(&format!("/git/refs/heads/{}", name))),
        )?;
        tracing::debug!("Deleted branch '{}'", name);
        Ok(())
    }

    fn file(&self, path: &str, branch: &str) -> Result<RemoteFile> {
        let op = "get contents";
        let url = format!("{}?ref={}", self.url(&format!("/contents/{}", path)), branch);
        let contents: Contents = self.send_json(op, self.client.get(url))?;

        let encoded: String = contents
            .content
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| SmxError::host_api(op, e))?;

        Ok(RemoteFile {
            path: contents.path,
            content: String::from_utf8_lossy(&bytes).into_owned(),
            sha: contents.sha,
        })
    }

    fn update_file(
        &self,
        path: &str,
        message: &str,
        content: &str,
        branch: &str,
        blob_sha: &str,
    ) -> Result<String> {
        let op = "update file";
        let updated: WithCommit = self.send_json(
            op,
            self.client
                .put(self.url(&format!("/contents/{}", path)))
                .json(&json!({
                    "message": message,
                    "content": STANDARD.encode(content),
                    "sha": blob_sha,
                    "branch": branch,
                })),
        )?;
        let sha = updated.commit.sha;
        tracing::debug!("Committed {} to '{}' as {}", path, branch, sha);
        Ok(sha)
    }

    fn compare(&self, base_sha: &str, head_sha: &str) -> Result<Vec<String>> {
        let op = "compare";
        let comparison: Comparison = self.send_json(
            op,
            self.client
                .get(self.url(&format!("/compare/{}...{}", base_sha, head_sha))),
        )?;

        Ok(comparison
            .files
            .into_iter()
            .map(|file| file.filename)
            .collect())
    }

    fn create_pull(&self, title: &str, body: &str, head: &str, base: &str) -> Result<String> {
        let op = "create pull request";
        let pull: Pull = self.send_json(
            op,
            self.client.post(self.url("/pulls")).json(&json!({
                "title": title,
                "body": body,
                "head": head,
                "base": base,
            })),
        )?;
        Ok(pull.html_url)
    }
}
