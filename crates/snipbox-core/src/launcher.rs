//! Sandbox launcher
//!
//! Owns the per-request working directory and the wall-clock budget. The
//! working directory is held by a [`WorkDir`] guard and removed on every path
//! out of [`SandboxLauncher::launch`]. Containers run as root, so anything they
//! leave in the bind mount is swept from a second container when the host
//! process cannot delete it.

use crate::cache::DependencyCache;
use crate::config::NetworkPolicy;
use crate::errors::LaunchError;
use crate::planner::ExecutionPlan;
use crate::registry::LanguageProfile;
use crate::runtime::{BindMount, ContainerRuntime, ContainerSpec, RawOutput, CONTAINER_WORKDIR};
use crate::shell;
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::{Builder, TempDir};
use uuid::Uuid;

const WORKDIR_PREFIX: &str = "snipbox-";

const SWEEP_COMMAND: &[&str] = &["find", CONTAINER_WORKDIR, "-mindepth", "1", "-delete"];

/// Upper bound on removing a timed-out container, and on a sweep container.
const TERMINATE_GRACE: Duration = Duration::from_secs(10);

/// Resource limits applied to one sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraints {
    pub memory_limit: String,
    pub network: NetworkPolicy,
    pub timeout: Duration,
}

/// Uniquely-named working directory, removed when dropped.
#[derive(Debug)]
pub struct WorkDir {
    _dir: TempDir,
    path: PathBuf,
}

impl WorkDir {
    pub fn create(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let root = fs::canonicalize(root)?;
        let dir = Builder::new().prefix(WORKDIR_PREFIX).tempdir_in(&root)?;
        let path = dir.path().to_path_buf();
        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the snippet verbatim as `filename` inside the directory.
    pub fn write_entry(&self, filename: &str, source_text: &str) -> io::Result<PathBuf> {
        let entry = self.path.join(filename);
        fs::write(&entry, source_text.as_bytes())?;
        Ok(entry)
    }

    /// Removes the directory now. It can be retried after a failure.
    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            log::warn!(
                "Failed to remove working directory {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

/// A container run that completed within its budget.
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub output: RawOutput,
    pub elapsed: Duration,
    pub completed_at: DateTime<Utc>,
}

fn container_name() -> String {
    format!("{}{}", WORKDIR_PREFIX, Uuid::new_v4())
}

/// Empties `dir` from inside a container, where the files' owner does not matter.
pub fn sweep_spec(
    dir: &Path,
    profile: &LanguageProfile,
    constraints: &Constraints,
) -> ContainerSpec {
    ContainerSpec {
        name: container_name(),
        image: profile.image.clone(),
        mounts: vec![BindMount::new(dir, CONTAINER_WORKDIR)],
        memory_limit: constraints.memory_limit.clone(),
        network: NetworkPolicy::Isolated,
        working_dir: "/".to_string(),
        command: SWEEP_COMMAND.iter().map(|part| part.to_string()).collect(),
    }
}

#[derive(Clone)]
pub struct SandboxLauncher {
    runtime: Arc<dyn ContainerRuntime>,
    workspace_root: PathBuf,
    cache: Option<DependencyCache>,
}

impl SandboxLauncher {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            workspace_root: workspace_root.into(),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: DependencyCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    fn cache_mount(&self, profile: &LanguageProfile) -> Option<BindMount> {
        let cache = self.cache.as_ref()?;
        let container_path = profile.cache_path.as_ref()?;
        match cache.ensure_dir(profile) {
            Ok(Some(host)) => Some(BindMount::new(host, container_path.clone())),
            Ok(None) => None,
            Err(e) => {
                // A cold cache only costs download time.
                log::warn!(
                    "Dependency cache unavailable for '{}', continuing without it: {}",
                    profile.language_id,
                    e
                );
                None
            }
        }
    }

    /// Materializes the snippet and runs `plan` in a fresh container.
    ///
    /// The working directory is removed before this returns, whatever the
    /// outcome.
    pub async fn launch(
        &self,
        profile: &LanguageProfile,
        source_text: &str,
        plan: &ExecutionPlan,
        constraints: &Constraints,
    ) -> Result<LaunchOutcome, LaunchError> {
        let workdir = WorkDir::create(&self.workspace_root).map_err(|e| {
            LaunchError::WorkspaceError(format!(
                "cannot create directory under {}: {}",
                self.workspace_root.display(),
                e
            ))
        })?;

        let outcome = self
            .run_in(&workdir, profile, source_text, plan, constraints)
            .await;
        self.release(workdir, profile, constraints).await;
        outcome
    }

    async fn run_in(
        &self,
        workdir: &WorkDir,
        profile: &LanguageProfile,
        source_text: &str,
        plan: &ExecutionPlan,
        constraints: &Constraints,
    ) -> Result<LaunchOutcome, LaunchError> {
        workdir
            .write_entry(&profile.entry_filename, source_text)
            .map_err(|e| {
                LaunchError::WorkspaceError(format!(
                    "cannot write {}: {}",
                    profile.entry_filename, e
                ))
            })?;

        let mut mounts = vec![BindMount::new(workdir.path(), CONTAINER_WORKDIR)];
        mounts.extend(self.cache_mount(profile));

        let spec = ContainerSpec {
            name: container_name(),
            image: profile.image.clone(),
            mounts,
            memory_limit: constraints.memory_limit.clone(),
            network: constraints.network,
            working_dir: CONTAINER_WORKDIR.to_string(),
            command: shell::entry_command(plan),
        };

        log::info!(
            "Starting sandbox {} ({}, image {}, timeout {:?})",
            spec.name,
            profile.language_id,
            spec.image,
            constraints.timeout
        );

        let started = Instant::now();
        let output =
            match tokio::time::timeout(constraints.timeout, self.runtime.run(&spec)).await {
                Ok(result) => result?,
                Err(_) => {
                    log::warn!(
                        "Execution timed out for container {} after {:?}",
                        spec.name,
                        constraints.timeout
                    );
                    self.terminate(&spec.name).await;
                    return Err(LaunchError::Timeout(constraints.timeout));
                }
            };
        let elapsed = started.elapsed();

        log::info!(
            "Sandbox {} exited with code {} in {:?}",
            spec.name,
            output.exit_code,
            elapsed
        );

        Ok(LaunchOutcome {
            output,
            elapsed,
            completed_at: Utc::now(),
        })
    }

    /// Removes the working directory. Files the container created as root
    /// (a virtualenv, `node_modules`) may not be removable by this process,
    /// in which case a sweep container empties the directory first.
    async fn release(
        &self,
        workdir: WorkDir,
        profile: &LanguageProfile,
        constraints: &Constraints,
    ) {
        let err = match workdir.remove() {
            Ok(()) => return,
            Err(e) => e,
        };
        log::info!(
            "Working directory {} not removable ({}), sweeping it from a container",
            workdir.path().display(),
            err
        );

        let spec = sweep_spec(workdir.path(), profile, constraints);
        match tokio::time::timeout(TERMINATE_GRACE, self.runtime.run(&spec)).await {
            Ok(Ok(output)) if output.exit_code == 0 => {}
            Ok(Ok(output)) => log::warn!(
                "Sweep container {} exited with code {}: {}",
                spec.name,
                output.exit_code,
                output.stderr.trim()
            ),
            Ok(Err(e)) => log::warn!("Sweep container {} failed: {}", spec.name, e),
            Err(_) => {
                log::warn!(
                    "Sweep container {} did not finish within {:?}",
                    spec.name,
                    TERMINATE_GRACE
                );
                self.terminate(&spec.name).await;
            }
        }

        if let Err(e) = workdir.remove() {
            log::error!(
                "Working directory {} survived the sweep: {}",
                workdir.path().display(),
                e
            );
        }
    }

    async fn terminate(&self, container_name: &str) {
        match tokio::time::timeout(TERMINATE_GRACE, self.runtime.terminate(container_name)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Failed to terminate container {}: {}", container_name, e),
            Err(_) => log::error!(
                "Terminating container {} did not finish within {:?}",
                container_name,
                TERMINATE_GRACE
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_workdir_is_unique_and_removed_on_drop() {
        let root = tempdir().unwrap();
        let first = WorkDir::create(root.path()).unwrap();
        let second = WorkDir::create(root.path()).unwrap();
        assert_ne!(first.path(), second.path());
        assert!(first
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(WORKDIR_PREFIX));

        let entry = first.write_entry("code_to_run.py", "print(\"hi\")").unwrap();
        assert_eq!(fs::read_to_string(&entry).unwrap(), "print(\"hi\")");

        let first_path = first.path().to_path_buf();
        drop(first);
        assert!(!first_path.exists());

        let second_path = second.path().to_path_buf();
        second.remove().unwrap();
        assert!(!second_path.exists());
    }

    #[test]
    fn test_workdir_creates_missing_root() {
        let base = tempdir().unwrap();
        let root = base.path().join("nested").join("work");
        let workdir = WorkDir::create(&root).unwrap();
        assert!(workdir.path().starts_with(fs::canonicalize(&root).unwrap()));
    }

    #[test]
    fn test_sweep_spec_mounts_only_the_workdir() {
        let registry = crate::registry::LanguageRegistry::builtin().unwrap();
        let profile = registry.get("python").unwrap();
        let constraints = Constraints {
            memory_limit: "256m".to_string(),
            network: NetworkPolicy::Default,
            timeout: Duration::from_secs(5),
        };
        let spec = sweep_spec(Path::new("/tmp/snipbox-x"), profile, &constraints);
        assert_eq!(spec.image, "python:3.11");
        assert_eq!(spec.mounts, vec![BindMount::new("/tmp/snipbox-x", "/app")]);
        assert_eq!(spec.network, NetworkPolicy::Isolated);
        assert_eq!(spec.command, vec!["find", "/app", "-mindepth", "1", "-delete"]);
        assert!(spec.name.starts_with(WORKDIR_PREFIX));
    }

    #[cfg(unix)]
    mod root_owned_files {
        use super::*;
        use async_trait::async_trait;
        use std::os::unix::fs::PermissionsExt;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tempfile::tempdir;

        /// Leaves a directory the host process cannot empty, the way a venv
        /// created by root inside the container does. Sweeps undo it.
        struct LockingRuntime {
            hang: bool,
            sweeps: AtomicUsize,
        }

        fn set_mode(path: &Path, mode: u32) {
            fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
        }

        #[async_trait]
        impl ContainerRuntime for LockingRuntime {
            fn name(&self) -> &str {
                "locking"
            }

            async fn run(&self, spec: &ContainerSpec) -> Result<RawOutput, LaunchError> {
                let host = spec.mounts[0].host.clone();
                if spec.command[0] == "find" {
                    self.sweeps.fetch_add(1, Ordering::SeqCst);
                    for entry in fs::read_dir(&host)? {
                        let path = entry?.path();
                        if path.is_dir() {
                            set_mode(&path, 0o755);
                            fs::remove_dir_all(&path)?;
                        } else {
                            fs::remove_file(&path)?;
                        }
                    }
                    return Ok(RawOutput {
                        stdout: String::new(),
                        stderr: String::new(),
                        exit_code: 0,
                    });
                }

                let venv = host.join("venv");
                fs::create_dir(&venv)?;
                fs::write(venv.join("pyvenv.cfg"), "home = /usr/local/bin\n")?;
                set_mode(&venv, 0o500);
                if self.hang {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                Ok(RawOutput {
                    stdout: "hi\n".to_string(),
                    stderr: String::new(),
                    exit_code: 0,
                })
            }

            async fn terminate(&self, _container_name: &str) -> Result<(), LaunchError> {
                Ok(())
            }
        }

        /// False when running privileged, where directory modes do not block deletion.
        fn permissions_enforced() -> bool {
            let dir = tempdir().unwrap();
            let locked = dir.path().join("locked");
            fs::create_dir(&locked).unwrap();
            set_mode(&locked, 0o500);
            let enforced = fs::write(locked.join("write-check"), "").is_err();
            set_mode(&locked, 0o755);
            enforced
        }

        async fn launch_python(hang: bool) -> (Result<LaunchOutcome, LaunchError>, usize, TempDir) {
            let root = tempdir().unwrap();
            let runtime = Arc::new(LockingRuntime {
                hang,
                sweeps: AtomicUsize::new(0),
            });
            let launcher = SandboxLauncher::new(runtime.clone(), root.path());
            let registry = crate::registry::LanguageRegistry::builtin().unwrap();
            let profile = registry.get("python").unwrap();
            let plan = crate::planner::plan(profile, &[]);
            let constraints = Constraints {
                memory_limit: "256m".to_string(),
                network: NetworkPolicy::Isolated,
                timeout: Duration::from_millis(300),
            };
            let outcome = launcher
                .launch(profile, "print(\"hi\")", &plan, &constraints)
                .await;
            let sweeps = runtime.sweeps.load(Ordering::SeqCst);
            (outcome, sweeps, root)
        }

        fn assert_empty(root: &TempDir) {
            let leftovers: Vec<_> = fs::read_dir(root.path()).unwrap().collect();
            assert!(leftovers.is_empty(), "left behind: {:?}", leftovers);
        }

        #[tokio::test]
        async fn test_root_owned_files_are_swept_after_completion() {
            let (outcome, sweeps, root) = launch_python(false).await;
            assert_eq!(outcome.unwrap().output.stdout, "hi\n");
            assert_empty(&root);
            assert_eq!(sweeps, usize::from(permissions_enforced()));
        }

        #[tokio::test]
        async fn test_root_owned_files_are_swept_after_timeout() {
            let (outcome, sweeps, root) = launch_python(true).await;
            assert!(matches!(outcome, Err(LaunchError::Timeout(_))));
            assert_empty(&root);
            assert_eq!(sweeps, usize::from(permissions_enforced()));
        }
    }
}
