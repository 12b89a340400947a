//! Idempotent deployment of a container image on the target host.

use crate::executor::CommandRunner;
use crate::types::{DeployOutcome, DeploymentTarget, RunSpec};
use common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Marker `id` prints when the account does not exist
const NO_SUCH_USER: &str = "no such user";

/// Ensures an image runs as a named container on a target
pub struct Deployer<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    runtime: String,
    archive_path: PathBuf,
    remote_dir: String,
}

impl<'a, R: CommandRunner + ?Sized> Deployer<'a, R> {
    /// Create a deployer.
    ///
    /// `archive_path` is the local file the image is saved to before a
    /// transfer, `remote_dir` where it is copied to on remote targets.
    pub fn new(
        runner: &'a R,
        runtime: impl Into<String>,
        archive_path: impl Into<PathBuf>,
        remote_dir: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            runtime: runtime.into(),
            archive_path: archive_path.into(),
            remote_dir: remote_dir.into(),
        }
    }

    /// Make sure exactly one container named `artifact` runs on `target`.
    ///
    /// Does nothing beyond the checks if one is already running.
    pub async fn ensure_running(
        &self,
        target: &DeploymentTarget,
        artifact: &str,
        spec: &RunSpec,
    ) -> Result<DeployOutcome> {
        let gid = self.lookup_group(target, &spec.service_account).await?;

        if target.is_remote() {
            self.transfer(target, artifact).await?;
        }

        if let Some(container_id) = self.running_container(target, artifact).await? {
            info!(target = %target, artifact, container_id = %container_id, "Container already running");
            return Ok(DeployOutcome::AlreadyRunning { container_id });
        }

        let argv = self.run_argv(artifact, spec, &gid);
        let result = self.runner.run(target, &argv).await?.into_success(&argv)?;
        let container_id = result.stdout.trim().to_string();

        info!(target = %target, artifact, container_id = %container_id, "Container started");
        Ok(DeployOutcome::Started { container_id })
    }

    /// Group id of the service account on the target
    pub async fn lookup_group(&self, target: &DeploymentTarget, account: &str) -> Result<String> {
        let argv = vec!["id".to_string(), "-g".to_string(), account.to_string()];
        let result = self.runner.run(target, &argv).await?;

        if !result.success() {
            if result.stderr.to_lowercase().contains(NO_SUCH_USER) {
                return Err(Error::configuration_missing(format!(
                    "The `{}` account does not exist on {}; is the tool running against an Uyuni server?",
                    account, target
                )));
            }
            return Err(Error::command_failed(
                argv.join(" "),
                Some(result.exit_code),
                format!("Failed to get the {} group id: {}", account, result.stderr.trim()),
            ));
        }

        let gid = result.stdout.trim().to_string();
        if gid.is_empty() {
            return Err(Error::command_failed(argv.join(" "), Some(0), "empty group id"));
        }
        debug!(target = %target, account, gid = %gid, "Service account found");
        Ok(gid)
    }

    /// Save the image locally, copy it to the target and load it there.
    ///
    /// A previous local archive is replaced. A failed step leaves whatever was
    /// already transferred in place.
    pub async fn transfer(&self, target: &DeploymentTarget, artifact: &str) -> Result<()> {
        let Some(host) = target.host() else {
            return Ok(());
        };

        if self.archive_path.exists() {
            debug!(path = %self.archive_path.display(), "Removing stale image archive");
            tokio::fs::remove_file(&self.archive_path).await?;
        }

        let archive = self.archive_path.display().to_string();
        let local = DeploymentTarget::Local;

        info!(artifact, path = %archive, "Saving image");
        let save = vec![
            self.runtime.clone(),
            "save".to_string(),
            "--output".to_string(),
            archive.clone(),
            artifact.to_string(),
        ];
        self.runner.run(&local, &save).await?.into_success(&save)?;

        info!(artifact, host, "Transferring image");
        let copy = vec![
            "scp".to_string(),
            "-q".to_string(),
            archive.clone(),
            format!("{}:{}", host, self.remote_dir),
        ];
        self.runner.run(&local, &copy).await?.into_success(&copy)?;

        info!(artifact, host, "Loading image");
        let load = vec![
            self.runtime.clone(),
            "load".to_string(),
            "--input".to_string(),
            self.remote_archive_path(),
        ];
        self.runner.run(target, &load).await?.into_success(&load)?;

        Ok(())
    }

    /// Id of the running container with that name, if any
    pub async fn running_container(
        &self,
        target: &DeploymentTarget,
        artifact: &str,
    ) -> Result<Option<String>> {
        let argv = vec![
            self.runtime.clone(),
            "ps".to_string(),
            "-f".to_string(),
            // The name filter matches substrings unless anchored
            format!("name=^{}$", artifact),
            "--quiet".to_string(),
        ];
        let result = self.runner.run(target, &argv).await?.into_success(&argv)?;

        Ok(result
            .stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string))
    }

    /// Path of the archive on the remote host
    pub fn remote_archive_path(&self) -> String {
        let file_name = self
            .archive_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Path::new(&self.remote_dir).join(file_name).display().to_string()
    }

    /// Detached `run` command line for the artifact
    pub fn run_argv(&self, artifact: &str, spec: &RunSpec, gid: &str) -> Vec<String> {
        let mut argv = vec![
            self.runtime.clone(),
            "run".to_string(),
            "-u".to_string(),
            format!("{}:{}", spec.service_account, gid),
            "-d".to_string(),
        ];
        if spec.remove_on_exit {
            argv.push("--rm".to_string());
        }
        if let Some(network) = &spec.network {
            argv.push(format!("--network={}", network));
        }
        if let Some(restart) = &spec.restart {
            argv.push(format!("--restart={}", restart));
        }
        for mount in &spec.mounts {
            argv.push("-v".to_string());
            argv.push(mount.to_string());
        }
        argv.push("--name".to_string());
        argv.push(artifact.to_string());
        argv.push(artifact.to_string());
        argv
    }
}
