// src/runtime/api.rs
use async_trait::async_trait;
use bollard::container::LogOutput; // For LogOutput::StdOut, LogOutput::StdErr
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    CreateImageOptions as BollardCreateImageOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    WaitContainerOptions as BollardWaitContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;

use super::{ContainerRuntime, ContainerSpec, RawOutput};
use crate::config::parse_memory_limit;
use crate::errors::LaunchError;

const RUNTIME_NAME: &str = "docker-engine-api";

/// Runs sandboxes through the Docker Engine API.
pub struct DockerApi {
    docker: Docker,
}

impl DockerApi {
    pub fn connect() -> Result<Self, LaunchError> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| LaunchError::RuntimeUnavailable {
                runtime: RUNTIME_NAME.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { docker })
    }

    pub fn container_config(spec: &ContainerSpec) -> Result<ContainerCreateBody, LaunchError> {
        let memory = parse_memory_limit(&spec.memory_limit)
            .map_err(|e| LaunchError::RuntimeFailed(e.to_string()))?;

        Ok(ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: Some(spec.working_dir.clone()),
            host_config: Some(HostConfig {
                binds: Some(spec.mounts.iter().map(|m| m.to_bind_spec()).collect()),
                memory: Some(memory),
                network_mode: Some(spec.network.as_network_mode().to_string()),
                // Removed explicitly once the logs have been read.
                auto_remove: Some(false),
                ..Default::default()
            }),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        })
    }

    async fn pull_image(&self, image: &str) -> Result<(), LaunchError> {
        log::info!("Pulling image {}", image);
        let mut progress = self.docker.create_image(
            Some(BollardCreateImageOptionsQuery {
                from_image: Some(image.to_string()),
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(info) = progress.next().await {
            let info = info?;
            log::debug!("Pulling image {}: {:?}", image, info.status);
        }
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, LaunchError> {
        let config = Self::container_config(spec)?;
        let options = || {
            Some(BollardCreateContainerOptionsQuery {
                name: Some(spec.name.clone()),
                ..Default::default()
            })
        };

        match self.docker.create_container(options(), config.clone()).await {
            Ok(created) => Ok(created.id),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                self.pull_image(&spec.image).await?;
                let created = self.docker.create_container(options(), config).await?;
                Ok(created.id)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn run_created(&self, id: &str) -> Result<RawOutput, LaunchError> {
        self.docker
            .start_container(id, None::<BollardStartContainerOptionsQuery>)
            .await?;

        let mut wait_stream = self
            .docker
            .wait_container(id, None::<BollardWaitContainerOptionsQuery>);

        // Bollard reports a non-zero exit as an error carrying the exit code.
        let exit_code = match wait_stream.next().await {
            Some(Ok(response)) => response.status_code,
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => return Err(LaunchError::BollardError(e)),
            None => {
                return Err(LaunchError::RuntimeFailed(
                    "Container wait stream ended unexpectedly".to_string(),
                ))
            }
        };

        let mut output_stream = self.docker.logs(
            id,
            Some(BollardLogsOptionsQuery {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Some(log_result) = output_stream.next().await {
            match log_result? {
                LogOutput::StdOut { message } => {
                    stdout.push_str(&String::from_utf8_lossy(&message))
                }
                LogOutput::StdErr { message } => {
                    stderr.push_str(&String::from_utf8_lossy(&message))
                }
                _ => {}
            }
        }

        Ok(RawOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    async fn remove(&self, id_or_name: &str) -> Result<(), LaunchError> {
        self.docker
            .remove_container(
                id_or_name,
                Some(BollardRemoveContainerOptionsQuery {
                    force: true,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for DockerApi {
    fn name(&self) -> &str {
        RUNTIME_NAME
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<RawOutput, LaunchError> {
        self.docker
            .ping()
            .await
            .map_err(|e| LaunchError::RuntimeUnavailable {
                runtime: RUNTIME_NAME.to_string(),
                reason: e.to_string(),
            })?;

        let id = self.create(spec).await?;
        let outcome = self.run_created(&id).await;
        if let Err(e) = self.remove(&id).await {
            log::warn!("Failed to remove container {}: {}", spec.name, e);
        }
        outcome
    }

    async fn terminate(&self, container_name: &str) -> Result<(), LaunchError> {
        match self.remove(container_name).await {
            Err(LaunchError::BollardError(BollardError::DockerResponseServerError {
                status_code: 404,
                ..
            })) => {
                log::debug!("Container {} already gone", container_name);
                Ok(())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkPolicy;
    use crate::runtime::BindMount;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            name: "snipbox-api-test".to_string(),
            image: "node:20".to_string(),
            mounts: vec![
                BindMount::new("/tmp/snipbox-xyz", "/app"),
                BindMount::new("/cache/javascript", "/root/.npm"),
            ],
            memory_limit: "256m".to_string(),
            network: NetworkPolicy::Isolated,
            working_dir: "/app".to_string(),
            command: vec!["node".to_string(), "code_to_run.js".to_string()],
        }
    }

    #[test]
    fn test_container_config_carries_constraints() {
        let config = DockerApi::container_config(&spec()).unwrap();
        assert_eq!(config.image.as_deref(), Some("node:20"));
        assert_eq!(config.working_dir.as_deref(), Some("/app"));
        assert_eq!(
            config.cmd,
            Some(vec!["node".to_string(), "code_to_run.js".to_string()])
        );

        let host = config.host_config.unwrap();
        assert_eq!(host.memory, Some(256 * 1024 * 1024));
        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert_eq!(
            host.binds,
            Some(vec![
                "/tmp/snipbox-xyz:/app".to_string(),
                "/cache/javascript:/root/.npm".to_string()
            ])
        );
    }

    #[test]
    fn test_invalid_memory_limit_fails_before_contacting_daemon() {
        let mut spec = spec();
        spec.memory_limit = "plenty".to_string();
        assert!(matches!(
            DockerApi::container_config(&spec),
            Err(LaunchError::RuntimeFailed(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires a running Docker daemon
    async fn test_runs_container_through_engine_api() {
        let runtime = DockerApi::connect().unwrap();
        let mut spec = spec();
        spec.name = format!("snipbox-api-{}", uuid::Uuid::new_v4());
        spec.image = "bash".to_string();
        spec.mounts.clear();
        spec.working_dir = "/".to_string();
        spec.command = vec![
            "bash".to_string(),
            "-c".to_string(),
            "echo hi; echo oops >&2; exit 4".to_string(),
        ];
        let output = runtime.run(&spec).await.unwrap();
        assert_eq!(output.stdout, "hi\n");
        assert_eq!(output.stderr, "oops\n");
        assert_eq!(output.exit_code, 4);
    }
}
