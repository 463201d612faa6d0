//! Container runtime backed by the Docker Engine API.
//!
//! Talks to the daemon through `bollard`. The daemon address follows the
//! usual `DOCKER_HOST` convention. A current-thread tokio runtime owned by
//! [`DockerEngine`] drives every call, so [`ContainerRuntime`] stays blocking.

use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as EngineError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::service::{ContainerCreateResponse, HostConfig};
use bollard::Docker;
use futures::StreamExt;
use serde_json::{Map, Value};
use tokio::runtime::Runtime;

use super::{ContainerId, ContainerRuntime, ExecOutput, StartError};
use crate::error::{Result, SmxError};

/// Seconds the daemon waits before killing a stopping container.
const STOP_GRACE_SECS: i64 = 10;

/// Drives a Docker-compatible daemon.
pub struct DockerEngine {
    docker: Docker,
    runtime: Runtime,
}

impl DockerEngine {
    /// Connect using the local defaults (`DOCKER_HOST` or the local socket).
    ///
    /// No request is made here; an unreachable daemon surfaces on first use.
    pub fn connect() -> Result<Self> {
        Self::with_client(Docker::connect_with_local_defaults)
    }

    /// Build an engine around a client created inside the owned runtime.
    pub fn with_client<F>(connect: F) -> Result<Self>
    where
        F: FnOnce() -> std::result::Result<Docker, EngineError>,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let docker = {
            let _guard = runtime.enter();
            connect().map_err(|e| SmxError::runtime("connect", e))?
        };
        Ok(Self { docker, runtime })
    }

    async fn create(&self, image: &str) -> std::result::Result<ContainerCreateResponse, EngineError> {
        let config = Config {
            image: Some(image.to_string()),
            cmd: Some(vec!["bash".to_string()]),
            tty: Some(true),
            host_config: Some(HostConfig {
                ipc_mode: Some("host".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        self.docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
    }

    async fn pull(&self, image: &str) -> std::result::Result<(), EngineError> {
        tracing::info!("Pulling {}", image);
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(step) = progress.next().await {
            if let Some(status) = step?.status {
                tracing::debug!("{}: {}", image, status);
            }
        }
        Ok(())
    }

    async fn start(&self, image: &str) -> std::result::Result<ContainerId, StartError> {
        let created = match self.create(image).await {
            // Absent locally: pull once and retry, like `docker run`.
            Err(e) if is_not_found(&e) => {
                self.pull(image).await.map_err(start_error)?;
                self.create(image).await.map_err(start_error)?
            }
            other => other.map_err(start_error)?,
        };

        if let Err(e) = self
            .docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
        {
            let removal = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            if let Err(cleanup) = self
                .docker
                .remove_container(&created.id, Some(removal))
                .await
            {
                tracing::warn!("Failed to remove unstarted container {}: {}", created.id, cleanup);
            }
            return Err(StartError::Other(e.to_string()));
        }

        Ok(ContainerId::new(created.id))
    }

    async fn exec_collect(&self, id: &ContainerId, argv: &[&str]) -> Result<ExecOutput> {
        let op = "exec";
        let options = CreateExecOptions {
            cmd: Some(argv.iter().map(|a| a.to_string()).collect()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let exec = self
            .docker
            .create_exec(id.as_str(), options)
            .await
            .map_err(|e| SmxError::runtime(op, e))?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| SmxError::runtime(op, e))?;

        if let StartExecResults::Attached { mut output, .. } = started {
            while let Some(chunk) = output.next().await {
                match chunk.map_err(|e| SmxError::runtime(op, e))? {
                    LogOutput::StdOut { message } => {
                        stdout.push_str(&String::from_utf8_lossy(&message))
                    }
                    LogOutput::StdErr { message } => {
                        stderr.push_str(&String::from_utf8_lossy(&message))
                    }
                    _ => {}
                }
            }
        }

        let inspected = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| SmxError::runtime(op, e))?;
        // Unknown status: report like a killed process.
        let status = inspected.exit_code.unwrap_or(-1) as i32;

        tracing::debug!("exec {:?} in {} exited {}", argv, id, status);
        Ok(ExecOutput::new(status, stdout, stderr))
    }

    async fn describe_image(&self, id: &ContainerId) -> Result<Map<String, Value>> {
        let container = self
            .docker
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(|e| SmxError::runtime("inspect container", e))?;
        let image = container
            .image
            .ok_or_else(|| SmxError::runtime("inspect container", "no image id reported"))?;

        let op = "inspect image";
        let descriptor = self
            .docker
            .inspect_image(&image)
            .await
            .map_err(|e| SmxError::runtime(op, e))?;

        match serde_json::to_value(descriptor).map_err(|e| SmxError::runtime(op, e))? {
            Value::Object(map) => Ok(map),
            _ => Err(SmxError::runtime(op, "image descriptor is not an object")),
        }
    }
}

impl ContainerRuntime for DockerEngine {
    fn start_detached(&self, image: &str) -> std::result::Result<ContainerId, StartError> {
        self.runtime.block_on(self.start(image))
    }

    fn exec(&self, id: &ContainerId, argv: &[&str]) -> Result<ExecOutput> {
        self.runtime.block_on(self.exec_collect(id, argv))
    }

    fn stop(&self, id: &ContainerId) -> Result<()> {
        let options = StopContainerOptions {
            t: STOP_GRACE_SECS,
        };
        self.runtime
            .block_on(self.docker.stop_container(id.as_str(), Some(options)))
            .map_err(|e| SmxError::runtime("stop container", e))
    }

    fn remove(&self, id: &ContainerId) -> Result<()> {
        self.runtime
            .block_on(
                self.docker
                    .remove_container(id.as_str(), None::<RemoveContainerOptions>),
            )
            .map_err(|e| SmxError::runtime("remove container", e))
    }

    fn image_attributes(&self, id: &ContainerId) -> Result<Map<String, Value>> {
        self.runtime.block_on(self.describe_image(id))
    }
}

fn is_not_found(err: &EngineError) -> bool {
    matches!(
        err,
        EngineError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Map a failed create or pull to a [`StartError`].
fn start_error(err: EngineError) -> StartError {
    if is_not_found(&err) {
        StartError::ImageNotFound
    } else {
        StartError::Other(err.to_string())
    }
}
