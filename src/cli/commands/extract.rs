//! Extract command implementation.
//!
//! `smx` probes every selected image, updates the data file, and opens a
//! pull request when the file content changed.

use std::fs;
use std::path::{Component, Path};

use crate::catalog;
use crate::cli::args::Cli;
use crate::config::{Settings, Snippets};
use crate::container::{ContainerRuntime, DockerEngine};
use crate::error::Result;
use crate::probe::ExitPolicy;
use crate::publish::{self, PublishOutcome, PublishRequest};
use crate::runner::{Extractor, RunOptions, RunReport};
use crate::store;

use super::dispatcher::{Command, CommandResult};

/// Publishes a request, e.g. through [`publish::open_pr`].
pub type Publisher<'a> = &'a dyn Fn(&PublishRequest) -> Result<PublishOutcome>;

/// Everything a run did.
#[derive(Debug)]
pub struct ExtractSummary {
    pub report: RunReport,

    /// Whether the data file content differs from before the run.
    pub changed: bool,

    /// `None` when publishing was not attempted.
    pub publish: Option<PublishOutcome>,
}

/// The extract command implementation.
pub struct ExtractCommand {
    cli: Cli,
    settings: Settings,
}

impl ExtractCommand {
    pub fn new(cli: Cli, settings: Settings) -> Self {
        Self { cli, settings }
    }

    /// Run options derived from arguments.
    pub fn options(&self) -> RunOptions {
        RunOptions {
            release: self
                .cli
                .release
                .clone()
                .unwrap_or_else(catalog::current_release),
            store_path: self.cli.file.clone(),
            container: self.cli.container.clone(),
            force: self.cli.force,
            policy: if self.cli.strict_exit_codes {
                ExitPolicy::Strict
            } else {
                ExitPolicy::Compatible
            },
        }
    }

    pub fn skip_publish(&self) -> bool {
        self.cli.skip_pr || self.settings.skip_publish
    }

    /// Path of the data file inside the repository.
    pub fn repo_path(&self) -> Result<String> {
        if let Some(path) = &self.settings.repo_path {
            return Ok(path.clone());
        }
        let cwd = std::env::current_dir()?;
        Ok(repo_relative(&self.cli.file, &cwd))
    }

    /// Run against explicit collaborators.
    pub fn run(
        &self,
        runtime: &dyn ContainerRuntime,
        publisher: Publisher<'_>,
    ) -> Result<ExtractSummary> {
        // Snippets are validated before any container is started.
        let snippets = Snippets::load(&self.cli.snippets)?;
        let options = self.options();

        let before = store::fingerprint(&options.store_path)?;
        let report = Extractor::new(runtime, &snippets, &options).run()?;
        let after = store::fingerprint(&options.store_path)?;
        let changed = after.is_some() && before != after;

        tracing::info!(
            "Release {}: {} recorded, {} already present, {} unavailable",
            options.release,
            report.recorded(),
            report.skipped(),
            report.unavailable()
        );

        let publish = if !changed {
            tracing::info!("Data file unchanged; nothing to publish.");
            None
        } else if self.skip_publish() {
            tracing::info!("Publishing disabled; not opening a PR.");
            None
        } else {
            let request = PublishRequest {
                release: options.release.clone(),
                repo_path: self.repo_path()?,
                content: fs::read_to_string(&options.store_path)?,
            };
            Some(publisher(&request)?)
        };

        Ok(ExtractSummary {
            report,
            changed,
            publish,
        })
    }
}

impl Command for ExtractCommand {
    fn execute(&self) -> Result<CommandResult> {
        let runtime = DockerEngine::connect()?;
        let publisher = |request: &PublishRequest| publish::open_pr(&self.settings, request);
        self.run(&runtime, &publisher)?;
        Ok(CommandResult::success())
    }
}

/// `path` relative to `cwd`, with `/` separators.
fn repo_relative(path: &Path, cwd: &Path) -> String {
    if outside_workdir(path, cwd) {
        tracing::warn!(
            "{} is outside {}; guessing its repository path, set SMX_REPO_PATH to choose it",
            path.display(),
            cwd.display()
        );
    }
    let relative = path.strip_prefix(cwd).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// An absolute path that `cwd` does not contain.
fn outside_workdir(path: &Path, cwd: &Path) -> bool {
    path.is_absolute() && !path.starts_with(cwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MockRuntime;
    use crate::publish::MockHost;
    use clap::Parser;
    use std::cell::Cell;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const SNIPPETS: &str = "dgx_system: DGX A100\nnvidia_driver: '510'\ngpu_model: A100\n";

    struct Fixture {
        temp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            fs::write(temp.path().join("snippets.yaml"), SNIPPETS).unwrap();
            Self { temp }
        }

        fn data(&self) -> PathBuf {
            self.temp.path().join("data.json")
        }

        fn command(&self, extra: &[&str], settings: Settings) -> ExtractCommand {
            let mut args = vec![
                "smx".to_string(),
                "-v".to_string(),
                "22.03".to_string(),
                "-c".to_string(),
                "merlin-inference".to_string(),
                "-f".to_string(),
                self.data().display().to_string(),
                "-s".to_string(),
                self.temp.path().join("snippets.yaml").display().to_string(),
            ];
            args.extend(extra.iter().map(|s| s.to_string()));
            ExtractCommand::new(Cli::parse_from(args), settings)
        }
    }

    fn repo_settings() -> Settings {
        Settings {
            repo_path: Some("docs/data.json".to_string()),
            ..Settings::default()
        }
    }

    #[test]
    fn options_follow_arguments() {
        let fx = Fixture::new();
        let opts = fx
            .command(&["--force", "--strict-exit-codes"], Settings::default())
            .options();
        assert_eq!(opts.release, "22.03");
        assert_eq!(opts.container.as_deref(), Some("merlin-inference"));
        assert!(opts.force);
        assert_eq!(opts.policy, ExitPolicy::Strict);
    }

    #[test]
    fn release_defaults_to_current_month() {
        let cli = Cli::parse_from(["smx"]);
        let opts = ExtractCommand::new(cli, Settings::default()).options();
        assert_eq!(opts.release, catalog::current_release());
        assert_eq!(opts.policy, ExitPolicy::Compatible);
    }

    #[test]
    fn changed_store_is_published() {
        let fx = Fixture::new();
        let cmd = fx.command(&[], repo_settings());
        let host = MockHost::new("docs/data.json", "{}");
        let runtime = MockRuntime::new().with_env("CUDA_VERSION", "11.6");

        let summary = cmd
            .run(&runtime, &|request| publish::publish(&host, request))
            .unwrap();

        assert!(summary.changed);
        assert!(matches!(summary.publish, Some(PublishOutcome::Opened { .. })));
        let published = host.content_on("docs-smx-2203-1").unwrap();
        assert_eq!(published, fs::read_to_string(fx.data()).unwrap());
    }

    #[test]
    fn unchanged_store_is_not_published() {
        let fx = Fixture::new();
        let cmd = fx.command(&[], repo_settings());
        let runtime = MockRuntime::new();
        let calls = Cell::new(0);
        let publisher = |_: &PublishRequest| -> Result<PublishOutcome> {
            calls.set(calls.get() + 1);
            Ok(PublishOutcome::Skipped)
        };

        cmd.run(&runtime, &publisher).unwrap();
        assert_eq!(calls.get(), 1);

        // Second run finds the record present and leaves the file alone.
        let summary = cmd.run(&runtime, &publisher).unwrap();
        assert!(!summary.changed);
        assert_eq!(summary.publish, None);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn skip_pr_flag_disables_publishing() {
        let fx = Fixture::new();
        let cmd = fx.command(&["--skip-pr"], repo_settings());
        let runtime = MockRuntime::new();
        let summary = cmd
            .run(&runtime, &|_| panic!("publisher must not be called"))
            .unwrap();
        assert!(summary.changed);
        assert_eq!(summary.publish, None);
    }

    #[test]
    fn skip_pr_env_disables_publishing() {
        let fx = Fixture::new();
        let settings = Settings {
            skip_publish: true,
            ..repo_settings()
        };
        let cmd = fx.command(&[], settings);
        let summary = cmd
            .run(&MockRuntime::new(), &|_| panic!("publisher must not be called"))
            .unwrap();
        assert_eq!(summary.publish, None);
    }

    #[test]
    fn missing_snippet_aborts_before_probing() {
        let fx = Fixture::new();
        fs::write(
            fx.temp.path().join("snippets.yaml"),
            "dgx_system: a\nnvidia_driver: b\n",
        )
        .unwrap();
        let runtime = MockRuntime::new();

        let result = fx
            .command(&[], repo_settings())
            .run(&runtime, &|_| Ok(PublishOutcome::Skipped));
        assert!(result.is_err());
        assert!(runtime.started().is_empty());
        assert!(!fx.data().exists());
    }

    #[test]
    fn repo_relative_strips_working_directory() {
        let cwd = Path::new("/work/merlin");
        assert_eq!(
            repo_relative(Path::new("/work/merlin/docs/data.json"), cwd),
            "docs/data.json"
        );
        assert_eq!(repo_relative(Path::new("./docs/data.json"), cwd), "docs/data.json");
        assert_eq!(repo_relative(Path::new("docs/data.json"), cwd), "docs/data.json");
    }

    #[test]
    fn absolute_path_outside_workdir_is_flagged() {
        let cwd = Path::new("/work/merlin");
        assert!(outside_workdir(Path::new("/tmp/x/data.json"), cwd));
        assert!(!outside_workdir(Path::new("/work/merlin/docs/data.json"), cwd));
        assert!(!outside_workdir(Path::new("docs/data.json"), cwd));
        // Root is dropped rather than kept as an absolute repository path.
        assert_eq!(repo_relative(Path::new("/tmp/x/data.json"), cwd), "tmp/x/data.json");
    }

    #[test]
    fn repo_path_override_wins() {
        let fx = Fixture::new();
        let cmd = fx.command(&[], repo_settings());
        assert_eq!(cmd.repo_path().unwrap(), "docs/data.json");
    }
}
