//! Container image building and release provisioning.

use crate::executor::CommandRunner;
use crate::types::{ArtifactSpec, DeploymentTarget, ReleaseAsset};
use common::{Error, Result};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Builds the images needed by the health check on the local host
pub struct ArtifactBuilder<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    runtime: String,
    client: reqwest::Client,
}

impl<'a, R: CommandRunner + ?Sized> ArtifactBuilder<'a, R> {
    /// Create a builder driving the given container runtime (e.g. `podman`)
    pub fn new(runner: &'a R, runtime: impl Into<String>) -> Self {
        Self {
            runner,
            runtime: runtime.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Provision the artifact's release asset, if any, then build its image
    pub async fn build_artifact(
        &self,
        spec: &ArtifactSpec,
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> Result<()> {
        if let Some(release) = &spec.release {
            self.provision_release(release, &spec.context_dir).await?;
        }
        self.build_image(&spec.name, &spec.context_dir, on_line).await
    }

    /// Build an image from a context directory, streaming the build output.
    ///
    /// Always runs the build; caching is left to the container runtime.
    pub async fn build_image(
        &self,
        name: &str,
        context_dir: &Path,
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> Result<()> {
        let argv = vec![
            self.runtime.clone(),
            "build".to_string(),
            "-t".to_string(),
            name.to_string(),
            context_dir.display().to_string(),
        ];

        info!(image = name, context = %context_dir.display(), "Building image");
        let start = Instant::now();

        let result = self
            .runner
            .run_streaming(&DeploymentTarget::Local, &argv, on_line)
            .await?;

        if !result.success() {
            warn!(image = name, exit_code = result.exit_code, "Image build failed");
            return Err(Error::build_failed(name));
        }

        info!(image = name, duration_ms = start.elapsed().as_millis(), "Image built");
        Ok(())
    }

    /// Download a release archive and unpack its member into `dest_dir`
    pub async fn provision_release(&self, release: &ReleaseAsset, dest_dir: &Path) -> Result<PathBuf> {
        let archive = self.download(&release.url).await?;

        let member = release.member.clone();
        let dest_dir = dest_dir.to_path_buf();
        tokio::task::spawn_blocking(move || unpack_member(&archive, &member, &dest_dir))
            .await
            .map_err(|e| Error::download(format!("archive extraction task failed: {}", e)))?
    }

    /// Fetch a file over HTTP
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        info!(url, "Downloading release archive");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::download(format!("failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::download(format!("{} answered with status {}", url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::download(format!("failed to read {}: {}", url, e)))?;

        debug!(url, bytes = bytes.len(), "Release archive downloaded");
        Ok(bytes.to_vec())
    }
}

/// Extract one member of a zip archive into a directory.
///
/// The extracted file keeps its base name and is made executable.
pub fn unpack_member(archive: &[u8], member: &str, dest_dir: &Path) -> Result<PathBuf> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| Error::download(format!("invalid release archive: {}", e)))?;
    let mut entry = zip
        .by_name(member)
        .map_err(|e| Error::download(format!("`{}` not found in release archive: {}", member, e)))?;

    let file_name = Path::new(member)
        .file_name()
        .ok_or_else(|| Error::download(format!("`{}` is not a file", member)))?;

    std::fs::create_dir_all(dest_dir)?;
    let dest = dest_dir.join(file_name);
    let mut out = std::fs::File::create(&dest)?;
    std::io::copy(&mut entry, &mut out)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o755))?;
    }

    debug!(member, dest = %dest.display(), "Release member extracted");
    Ok(dest)
}
