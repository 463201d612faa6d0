//! Settings read from environment variables.

use std::env::VarError;

/// Repository pull requests are opened against when `REPO` is unset.
pub const DEFAULT_REPO: &str = "NVIDIA-Merlin/Merlin";

/// Public GitHub REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Runtime-wide settings sourced from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Token used to publish; `None` skips publishing.
    pub token: Option<String>,

    /// `owner/name` of the repository to publish to.
    pub repo: String,

    /// Publishing disabled via `SKIP_PR`.
    pub skip_publish: bool,

    /// Debug logging requested via `DEBUG`.
    pub debug: bool,

    /// GitHub REST base URL.
    pub api_url: String,

    /// Repository-relative path of the store file, if overridden.
    pub repo_path: Option<String>,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key))
    }

    /// Read settings through a custom lookup function.
    ///
    /// This allows testing without modifying actual environment variables.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let value = |key: &str| lookup(key).ok();
        let non_empty = |key: &str| value(key).filter(|v| !v.trim().is_empty());

        Self {
            token: non_empty("GH_TOKEN"),
            repo: non_empty("REPO").unwrap_or_else(|| DEFAULT_REPO.to_string()),
            // Presence alone counts, matching how CI sets these switches.
            skip_publish: value("SKIP_PR").is_some(),
            debug: value("DEBUG").is_some(),
            api_url: non_empty("GITHUB_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            repo_path: non_empty("SMX_REPO_PATH"),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| Err(VarError::NotPresent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned().ok_or(VarError::NotPresent))
    }

    #[test]
    fn defaults_without_environment() {
        let s = Settings::default();
        assert_eq!(s.token, None);
        assert_eq!(s.repo, DEFAULT_REPO);
        assert!(!s.skip_publish);
        assert!(!s.debug);
        assert_eq!(s.api_url, DEFAULT_API_URL);
        assert_eq!(s.repo_path, None);
    }

    #[test]
    fn reads_token_and_repo_override() {
        let s = settings(&[("GH_TOKEN", "ghp_secret"), ("REPO", "me/fork")]);
        assert_eq!(s.token.as_deref(), Some("ghp_secret"));
        assert_eq!(s.repo, "me/fork");
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let s = settings(&[("GH_TOKEN", "  ")]);
        assert_eq!(s.token, None);
    }

    #[test]
    fn switches_trigger_on_presence() {
        let s = settings(&[("SKIP_PR", ""), ("DEBUG", "0")]);
        assert!(s.skip_publish);
        assert!(s.debug);
    }

    #[test]
    fn api_url_trailing_slash_is_trimmed() {
        let s = settings(&[("GITHUB_API_URL", "https://ghe.example.com/api/v3/")]);
        assert_eq!(s.api_url, "https://ghe.example.com/api/v3");
    }
}
