//! Installation and update of the external tool.
//!
//! The release descriptor is the GitHub "latest release" document. A new
//! release is extracted into a staging directory first and only swapped
//! into place once extraction succeeded, so a failed download never
//! leaves a half-written tool directory behind.

use std::path::{Path, PathBuf};

use logrelay_core::ExternalToolSettings;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::discover::ToolBinaries;
use crate::error::ToolError;
use crate::paths::ToolPaths;
use crate::runtime::MANAGED_LAUNCHER;

/// Release feed of the analysis tool.
pub const DEFAULT_RELEASE_URL: &str =
    "https://api.github.com/repos/baaron4/GW2-Elite-Insights-Parser/releases/latest";

/// Asset name inside a release.
pub const DEFAULT_ASSET_NAME: &str = "GW2EICLI.zip";

/// Install script for the managed runtime launcher.
pub const DEFAULT_LAUNCHER_SCRIPT_URL: &str = "https://dot.net/v1/dotnet-install.sh";

const USER_AGENT: &str = concat!("logrelay/", env!("CARGO_PKG_VERSION"));

/// Subset of the release descriptor we read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(default)]
    pub browser_download_url: Option<String>,
}

impl ReleaseInfo {
    /// Tag name, else release name, else `unknown`.
    pub fn version(&self) -> String {
        self.tag_name
            .clone()
            .or_else(|| self.name.clone())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn asset_url(&self, asset_name: &str) -> Option<&str> {
        self.assets
            .iter()
            .find(|a| a.name == asset_name)
            .and_then(|a| a.browser_download_url.as_deref())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct VersionRecord {
    version: String,
}

/// Outcome of an explicit update check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateStatus {
    pub updated: bool,
    pub version: Option<String>,
    pub error: Option<String>,
}

/// Downloads, extracts and records tool releases.
#[derive(Debug, Clone)]
pub struct Installer {
    client: reqwest::Client,
    paths: ToolPaths,
    release_url: String,
    asset_name: String,
    launcher_script_url: String,
}

impl Installer {
    /// Create an installer using the default release feed.
    pub fn new(paths: ToolPaths) -> Self {
        Self {
            client: reqwest::Client::new(),
            paths,
            release_url: DEFAULT_RELEASE_URL.to_string(),
            asset_name: DEFAULT_ASSET_NAME.to_string(),
            launcher_script_url: DEFAULT_LAUNCHER_SCRIPT_URL.to_string(),
        }
    }

    /// Override the release descriptor URL.
    pub fn with_release_url(mut self, url: impl Into<String>) -> Self {
        self.release_url = url.into();
        self
    }

    /// Override the asset name looked up in the release.
    pub fn with_asset_name(mut self, name: impl Into<String>) -> Self {
        self.asset_name = name.into();
        self
    }

    pub fn paths(&self) -> &ToolPaths {
        &self.paths
    }

    /// Version recorded by the last install, if any.
    pub async fn installed_version(&self) -> Option<String> {
        let raw = tokio::fs::read_to_string(self.paths.version_file()).await.ok()?;
        serde_json::from_str::<VersionRecord>(&raw)
            .ok()
            .map(|record| record.version)
    }

    async fn write_version(&self, version: &str) -> Result<(), ToolError> {
        tokio::fs::create_dir_all(self.paths.base_dir()).await?;
        let body = serde_json::to_string(&VersionRecord {
            version: version.to_string(),
        })?;
        tokio::fs::write(self.paths.version_file(), body).await?;
        Ok(())
    }

    /// Currently installed artifacts.
    pub async fn binaries(&self) -> ToolBinaries {
        let root = self.paths.cli_dir();
        tokio::task::spawn_blocking(move || ToolBinaries::discover(&root))
            .await
            .unwrap_or_default()
    }

    /// Make sure some release is installed, installing the latest if permitted.
    ///
    /// Returns the installed version when known.
    pub async fn ensure_installed(
        &self,
        settings: &ExternalToolSettings,
    ) -> Result<Option<String>, ToolError> {
        if !self.binaries().await.is_empty() {
            return Ok(self.installed_version().await);
        }
        if !settings.auto_setup {
            return Err(ToolError::NotInstalled);
        }
        info!("Analysis tool missing, installing latest release");
        let release = self.fetch_release().await?;
        let version = self.install_release(&release).await?;
        Ok(Some(version))
    }

    /// Install the latest release when it differs from the recorded version.
    pub async fn update_if_needed(&self, settings: &ExternalToolSettings) -> UpdateStatus {
        if !settings.enabled || !settings.auto_update {
            return UpdateStatus::default();
        }
        match self.try_update(settings).await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Analysis tool update check failed");
                UpdateStatus {
                    updated: false,
                    version: self.installed_version().await,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn try_update(&self, settings: &ExternalToolSettings) -> Result<UpdateStatus, ToolError> {
        if self.binaries().await.is_empty() {
            let version = self.ensure_installed(settings).await?;
            return Ok(UpdateStatus {
                updated: true,
                version,
                error: None,
            });
        }

        let current = self.installed_version().await;
        let release = self.fetch_release().await?;
        let latest = release.version();
        if current.as_deref() == Some(latest.as_str()) {
            debug!(version = %latest, "Analysis tool up to date");
            return Ok(UpdateStatus {
                updated: false,
                version: current,
                error: None,
            });
        }

        info!(from = ?current, to = %latest, "Updating analysis tool");
        let version = self.install_release(&release).await?;
        Ok(UpdateStatus {
            updated: true,
            version: Some(version),
            error: None,
        })
    }

    /// Fetch the release descriptor.
    pub async fn fetch_release(&self) -> Result<ReleaseInfo, ToolError> {
        debug!(url = %self.release_url, "Fetching release descriptor");
        let response = self
            .client
            .get(&self.release_url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ToolError::HttpStatus {
                status: response.status().as_u16(),
                url: self.release_url.clone(),
            });
        }
        Ok(response.json().await?)
    }

    /// Download, extract and swap in a release; records and returns its version.
    pub async fn install_release(&self, release: &ReleaseInfo) -> Result<String, ToolError> {
        let url = release
            .asset_url(&self.asset_name)
            .ok_or_else(|| ToolError::AssetMissing(self.asset_name.clone()))?
            .to_string();

        tokio::fs::create_dir_all(self.paths.base_dir()).await?;
        let archive = self.paths.base_dir().join(&self.asset_name);
        self.download(&url, &archive).await?;

        let staging = self.paths.staging_dir();
        let cli_dir = self.paths.cli_dir();
        let archive_path = archive.clone();
        tokio::task::spawn_blocking(move || replace_from_archive(&archive_path, &staging, &cli_dir))
            .await
            .map_err(|e| ToolError::Io(std::io::Error::other(e)))??;

        if let Err(e) = tokio::fs::remove_file(&archive).await {
            debug!(error = %e, "Could not remove downloaded archive");
        }

        let version = release.version();
        self.write_version(&version).await?;
        info!(version = %version, "Analysis tool installed");
        Ok(version)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), ToolError> {
        info!(url = %url, dest = %dest.display(), "Downloading");
        let mut response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ToolError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    /// Launcher installed by [`Installer::install_managed_launcher`], if present.
    pub fn installed_launcher(&self) -> Option<PathBuf> {
        let path = self.paths.managed_runtime_dir().join(MANAGED_LAUNCHER);
        path.is_file().then_some(path)
    }

    /// Run the launcher install script into the managed runtime directory.
    pub async fn install_managed_launcher(&self) -> Result<PathBuf, ToolError> {
        if let Some(existing) = self.installed_launcher() {
            return Ok(existing);
        }
        if cfg!(windows) {
            return Err(ToolError::LauncherInstall(
                "on-demand install is not supported on this platform".to_string(),
            ));
        }

        let install_dir = self.paths.managed_runtime_dir();
        tokio::fs::create_dir_all(&install_dir).await?;
        let script = self.paths.base_dir().join("managed-runtime-install.sh");
        self.download(&self.launcher_script_url, &script).await?;

        info!(dir = %install_dir.display(), "Installing managed runtime");
        let status = Command::new("bash")
            .arg(&script)
            .args(["--channel", "8.0", "--runtime", "dotnet", "--no-path"])
            .arg("--install-dir")
            .arg(&install_dir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(ToolError::LauncherInstall(format!(
                "install script exited with {}",
                status.code().unwrap_or(-1)
            )));
        }

        self.installed_launcher().ok_or_else(|| {
            ToolError::LauncherInstall("launcher missing after install".to_string())
        })
    }
}

/// Extract `archive` into `staging`, then swap `staging` into `target`.
fn replace_from_archive(archive: &Path, staging: &Path, target: &Path) -> Result<(), ToolError> {
    if staging.exists() {
        std::fs::remove_dir_all(staging)?;
    }
    std::fs::create_dir_all(staging)?;

    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    zip.extract(staging)?;

    if target.exists() {
        std::fs::remove_dir_all(target)?;
    }
    std::fs::rename(staging, target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_archive(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("bin/GW2EICLI.dll", options).unwrap();
        zip.write_all(b"managed").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_release_version_fallbacks() {
        let release: ReleaseInfo =
            serde_json::from_str(r#"{"tag_name":"v3.18.1","name":"Release"}"#).unwrap();
        assert_eq!(release.version(), "v3.18.1");

        let release: ReleaseInfo = serde_json::from_str(r#"{"name":"Nightly"}"#).unwrap();
        assert_eq!(release.version(), "Nightly");

        assert_eq!(ReleaseInfo::default().version(), "unknown");
    }

    #[test]
    fn test_asset_lookup() {
        let release: ReleaseInfo = serde_json::from_str(
            r#"{"assets":[{"name":"other.zip","browser_download_url":"https://x/other"},
                          {"name":"GW2EICLI.zip","browser_download_url":"https://x/cli"}]}"#,
        )
        .unwrap();
        assert_eq!(release.asset_url(DEFAULT_ASSET_NAME), Some("https://x/cli"));
        assert_eq!(release.asset_url("missing.zip"), None);
    }

    #[test]
    fn test_replace_from_archive_swaps_directory() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("release.zip");
        write_archive(&archive);

        let target = dir.path().join("cli");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("stale.exe"), b"old").unwrap();

        let staging = dir.path().join("cli.staging");
        replace_from_archive(&archive, &staging, &target).unwrap();

        assert!(target.join("bin/GW2EICLI.dll").is_file());
        assert!(!target.join("stale.exe").exists());
        assert!(!staging.exists());
    }

    #[test]
    fn test_replace_from_bad_archive_keeps_existing_install() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("release.zip");
        std::fs::write(&archive, b"not a zip").unwrap();

        let target = dir.path().join("cli");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("tool.exe"), b"old").unwrap();

        let result = replace_from_archive(&archive, &dir.path().join("cli.staging"), &target);
        assert!(matches!(result, Err(ToolError::Archive(_))));
        assert!(target.join("tool.exe").is_file());
    }

    #[tokio::test]
    async fn test_ensure_installed_without_auto_setup() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Installer::new(ToolPaths::new(dir.path()));
        let settings = ExternalToolSettings {
            enabled: true,
            auto_setup: false,
            ..Default::default()
        };
        let result = installer.ensure_installed(&settings).await;
        assert!(matches!(result, Err(ToolError::NotInstalled)));
    }

    #[tokio::test]
    async fn test_ensure_installed_reads_recorded_version() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ToolPaths::new(dir.path());
        std::fs::create_dir_all(paths.cli_dir()).unwrap();
        std::fs::write(paths.cli_dir().join("GW2EICLI.dll"), b"x").unwrap();
        std::fs::write(paths.version_file(), r#"{"version":"v3.1"}"#).unwrap();

        let installer = Installer::new(paths);
        let settings = ExternalToolSettings::default().enabled();
        assert_eq!(
            installer.ensure_installed(&settings).await.unwrap(),
            Some("v3.1".to_string())
        );
    }

    #[tokio::test]
    async fn test_update_skipped_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let installer = Installer::new(ToolPaths::new(dir.path()));
        let status = installer
            .update_if_needed(&ExternalToolSettings::default())
            .await;
        assert_eq!(status, UpdateStatus::default());
    }
}
