// src/runtime/cli.rs
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

use super::{ContainerRuntime, ContainerSpec, RawOutput};
use crate::errors::LaunchError;
use crate::shell::shell_escape;

/// Exit status the docker CLI uses for its own failures. A container may
/// exit with it too, so it is only trusted together with a CLI error line.
const RUNTIME_ERROR_EXIT_CODE: i64 = 125;

/// Prefix the docker CLI puts on its own error messages.
const CLI_ERROR_PREFIX: &str = "docker:";

const DAEMON_UNREACHABLE_MARKERS: &[&str] = &[
    "Cannot connect to the Docker daemon",
    "Is the docker daemon running",
    "error during connect",
];

/// Runs sandboxes by spawning `docker run --rm ...`.
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn locate(&self) -> Result<PathBuf, LaunchError> {
        which::which(&self.binary).map_err(|err| LaunchError::RuntimeUnavailable {
            runtime: self.binary.clone(),
            reason: err.to_string(),
        })
    }

    /// Arguments after the runtime binary, in the order the runtime expects them.
    pub fn run_args(spec: &ContainerSpec) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            spec.name.clone(),
            format!("--memory={}", spec.memory_limit),
            format!("--network={}", spec.network.as_network_mode()),
        ];
        for mount in &spec.mounts {
            args.push("-v".to_string());
            args.push(mount.to_bind_spec());
        }
        args.push("-w".to_string());
        args.push(spec.working_dir.clone());
        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }

    pub fn build_command(program: &Path, spec: &ContainerSpec) -> Command {
        let mut command = Command::new(program);
        command
            .args(Self::run_args(spec))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn unavailable(&self, reason: impl Into<String>) -> LaunchError {
        LaunchError::RuntimeUnavailable {
            runtime: self.binary.clone(),
            reason: reason.into(),
        }
    }
}

fn exit_code(status: &ExitStatus) -> i64 {
    if let Some(code) = status.code() {
        return i64::from(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + i64::from(signal);
        }
    }
    -1
}

/// Whether stderr of an exit-125 run came from the runtime rather than the snippet.
fn is_runtime_error(stderr: &str) -> bool {
    DAEMON_UNREACHABLE_MARKERS
        .iter()
        .any(|marker| stderr.contains(marker))
        || stderr
            .lines()
            .any(|line| line.trim_start().starts_with(CLI_ERROR_PREFIX))
}

fn command_line_string(program: &Path, spec: &ContainerSpec) -> String {
    std::iter::once(program.display().to_string())
        .chain(DockerCli::run_args(spec))
        .map(|part| shell_escape(&part))
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    fn name(&self) -> &str {
        &self.binary
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<RawOutput, LaunchError> {
        let program = self.locate()?;
        log::debug!("Launching container: {}", command_line_string(&program, spec));

        let output = Self::build_command(&program, spec)
            .output()
            .await
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    self.unavailable(err.to_string())
                }
                _ => LaunchError::IoError(err),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = exit_code(&output.status);

        if exit_code == RUNTIME_ERROR_EXIT_CODE && is_runtime_error(&stderr) {
            if DAEMON_UNREACHABLE_MARKERS
                .iter()
                .any(|marker| stderr.contains(marker))
            {
                return Err(self.unavailable(stderr.trim().to_string()));
            }
            return Err(LaunchError::RuntimeFailed(stderr.trim().to_string()));
        }

        Ok(RawOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    async fn terminate(&self, container_name: &str) -> Result<(), LaunchError> {
        let program = self.locate()?;
        let output = Command::new(&program)
            .args(["rm", "--force", container_name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            // The container may already be gone (it finished or was never created).
            log::debug!(
                "'{} rm --force {}' exited with {}: {}",
                self.binary,
                container_name,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}
