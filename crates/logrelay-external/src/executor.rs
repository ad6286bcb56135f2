//! Runs the external analysis tool end to end.
//!
//! A run is: cache lookup, install/update, runtime resolution, config
//! generation, subprocess, output discovery, document read, cache write.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use logrelay_core::{ExternalToolRequest, ExternalToolResult, ExternalToolSettings, Runtime};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::config::{build_config, CONFIG_FILE_NAME};
use crate::discover::{pick_output_file, ToolBinaries, MAX_SCAN_DEPTH};
use crate::error::ToolError;
use crate::install::{Installer, UpdateStatus};
use crate::paths::{log_base_name, sanitize_key, ToolPaths};
use crate::reader::{DocumentReader, InlineReader};
use crate::runtime::{
    find_on_path, resolve_runtime, translate_compat_paths, RuntimeEnvironment, COMPAT_LAUNCHER,
    MANAGED_LAUNCHER,
};

/// Default interval between automatic update checks.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Resolved way of launching the tool.
#[derive(Debug, Clone)]
struct Launch {
    runtime: Runtime,
    program: PathBuf,
    /// Arguments placed before `-c <config> <log>`.
    leading_args: Vec<PathBuf>,
}

/// Executor for the external analysis tool.
pub struct ExternalToolRunner {
    installer: Installer,
    reader: Arc<dyn DocumentReader>,
    managed_launcher: Option<PathBuf>,
    compat_launcher: Option<PathBuf>,
    update_interval: Option<Duration>,
    last_update_check: Mutex<Option<Instant>>,
}

impl ExternalToolRunner {
    /// Create a runner whose tool directory lives under `data_root`.
    pub fn new(data_root: impl AsRef<Path>) -> Self {
        Self::with_installer(Installer::new(ToolPaths::new(data_root)))
    }

    /// Create a runner around a preconfigured installer.
    pub fn with_installer(installer: Installer) -> Self {
        Self {
            installer,
            reader: Arc::new(InlineReader),
            managed_launcher: None,
            compat_launcher: None,
            update_interval: Some(DEFAULT_UPDATE_INTERVAL),
            last_update_check: Mutex::new(None),
        }
    }

    /// Decode output documents through `reader`.
    pub fn with_reader(mut self, reader: Arc<dyn DocumentReader>) -> Self {
        self.reader = reader;
        self
    }

    /// Use this managed launcher instead of looking one up on `PATH`.
    pub fn with_managed_launcher(mut self, path: impl Into<PathBuf>) -> Self {
        self.managed_launcher = Some(path.into());
        self
    }

    /// Use this compatibility launcher instead of looking one up on `PATH`.
    pub fn with_compat_launcher(mut self, path: impl Into<PathBuf>) -> Self {
        self.compat_launcher = Some(path.into());
        self
    }

    /// Interval between automatic update checks; `None` disables them.
    pub fn with_update_interval(mut self, interval: Option<Duration>) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn paths(&self) -> &ToolPaths {
        self.installer.paths()
    }

    /// Explicit update check.
    pub async fn update_if_needed(&self, settings: &ExternalToolSettings) -> UpdateStatus {
        let status = self.installer.update_if_needed(settings).await;
        self.mark_update_checked();
        status
    }

    /// Run the tool for one log file. Failures are reported in the result.
    pub async fn run(&self, request: &ExternalToolRequest) -> ExternalToolResult {
        if !request.settings.enabled {
            return ExternalToolResult::disabled();
        }

        if let Some(key) = request.cache_key.as_deref() {
            if let Some(data) = self.read_cache(key).await {
                debug!(cache_key = %key, "Analysis cache hit");
                return ExternalToolResult::cached(data);
            }
        }

        let launch = match self.prepare(&request.settings).await {
            Ok(launch) => launch,
            Err(e) => {
                warn!(file = %request.file_path.display(), error = %e, "Analysis tool unavailable");
                return ExternalToolResult::error(e.to_string(), None);
            }
        };

        match self.execute(request, &launch).await {
            Ok((output_path, data)) => {
                if let Some(key) = request.cache_key.as_deref() {
                    self.write_cache(key, &data).await;
                }
                ExternalToolResult::parsed(data, launch.runtime, output_path)
            }
            Err(e) => {
                error!(
                    file = %request.file_path.display(),
                    runtime = %launch.runtime,
                    error = %e,
                    "Analysis tool run failed"
                );
                ExternalToolResult::error(e.to_string(), Some(launch.runtime))
            }
        }
    }

    fn update_due(&self) -> bool {
        let Some(interval) = self.update_interval else {
            return false;
        };
        match self.last_update_check.lock() {
            Ok(last) => last.map_or(true, |at| at.elapsed() >= interval),
            Err(_) => false,
        }
    }

    fn mark_update_checked(&self) {
        if let Ok(mut last) = self.last_update_check.lock() {
            *last = Some(Instant::now());
        }
    }

    /// Install or update as needed, then pick a runtime.
    async fn prepare(&self, settings: &ExternalToolSettings) -> Result<Launch, ToolError> {
        if settings.auto_update && self.update_due() {
            let status = self.update_if_needed(settings).await;
            if status.updated {
                info!(version = ?status.version, "Analysis tool updated");
            }
        }

        self.installer.ensure_installed(settings).await?;
        let binaries = self.installer.binaries().await;
        if binaries.is_empty() {
            return Err(ToolError::NotInstalled);
        }

        let env = self.detect_environment(&binaries, settings);
        let runtime = resolve_runtime(&env, settings.preferred_runtime).ok_or(ToolError::NoRuntime)?;
        debug!(runtime = %runtime, "Resolved analysis runtime");
        self.launch_for(runtime, &binaries, &env).await
    }

    fn detect_environment(&self, binaries: &ToolBinaries, settings: &ExternalToolSettings) -> RuntimeEnvironment {
        let managed_launcher = self
            .managed_launcher
            .clone()
            .or_else(|| find_on_path(MANAGED_LAUNCHER))
            .or_else(|| self.installer.installed_launcher());
        RuntimeEnvironment {
            native_supported: cfg!(windows),
            executable: binaries.executable.clone(),
            package: binaries.package.clone(),
            managed_launcher,
            launcher_installable: settings.auto_setup && !cfg!(windows),
            compat_launcher: self
                .compat_launcher
                .clone()
                .or_else(|| find_on_path(COMPAT_LAUNCHER)),
        }
    }

    async fn launch_for(
        &self,
        runtime: Runtime,
        binaries: &ToolBinaries,
        env: &RuntimeEnvironment,
    ) -> Result<Launch, ToolError> {
        let missing = || ToolError::NoRuntime;
        match runtime {
            Runtime::Native => Ok(Launch {
                runtime,
                program: binaries.executable.clone().ok_or_else(missing)?,
                leading_args: Vec::new(),
            }),
            Runtime::Managed => {
                let package = binaries.package.clone().ok_or_else(missing)?;
                let program = match env.managed_launcher.clone() {
                    Some(launcher) => launcher,
                    None => self.installer.install_managed_launcher().await?,
                };
                Ok(Launch {
                    runtime,
                    program,
                    leading_args: vec![package],
                })
            }
            Runtime::Compat => Ok(Launch {
                runtime,
                program: env.compat_launcher.clone().ok_or_else(missing)?,
                leading_args: vec![binaries.executable.clone().ok_or_else(missing)?],
            }),
        }
    }

    async fn execute(
        &self,
        request: &ExternalToolRequest,
        launch: &Launch,
    ) -> Result<(PathBuf, Value), ToolError> {
        let base_name = log_base_name(&request.file_path);
        let dir_key = request
            .cache_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| Some(base_name.clone()).filter(|b| !b.is_empty()))
            .unwrap_or_else(|| "log".to_string());
        let output_dir = self.paths().output_dir().join(sanitize_key(&dir_key));
        tokio::fs::create_dir_all(&output_dir).await?;
        let config_path = output_dir.join(CONFIG_FILE_NAME);

        let (out_location, config_arg, log_arg) = if launch.runtime == Runtime::Compat {
            let translated = translate_compat_paths(&[
                output_dir.as_path(),
                config_path.as_path(),
                request.file_path.as_path(),
            ])
            .await;
            match <[String; 3]>::try_from(translated) {
                Ok([out, config, log]) => (out, config, log),
                Err(_) => return Err(ToolError::ProcessError("path translation failed".into())),
            }
        } else {
            (
                output_dir.display().to_string(),
                config_path.display().to_string(),
                request.file_path.display().to_string(),
            )
        };

        let body = build_config(&out_location, request.auth_token.as_deref());
        tokio::fs::write(&config_path, body).await?;

        let mut args: Vec<String> = launch
            .leading_args
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        args.extend(["-c".to_string(), config_arg, log_arg]);

        run_process(&launch.program, &args, &output_dir).await?;

        let scan_dir = output_dir.clone();
        let scan_base = base_name.clone();
        let output_path = tokio::task::spawn_blocking(move || {
            pick_output_file(&scan_dir, &scan_base, MAX_SCAN_DEPTH)
        })
        .await
        .ok()
        .flatten()
        .ok_or(ToolError::NoOutput)?;

        let is_gzipped = logrelay_core::is_gzip_path(&output_path);
        let data = self.reader.read_document(&output_path, is_gzipped).await?;
        info!(output = %output_path.display(), runtime = %launch.runtime, "Analysis output read");
        Ok((output_path, data))
    }

    async fn read_cache(&self, key: &str) -> Option<Value> {
        let raw = tokio::fs::read_to_string(self.paths().cache_file(key)).await.ok()?;
        serde_json::from_str(&raw).ok()
    }

    async fn write_cache(&self, key: &str, data: &Value) {
        let write = async {
            tokio::fs::create_dir_all(self.paths().cache_dir()).await?;
            let body = serde_json::to_string(data)?;
            tokio::fs::write(self.paths().cache_file(key), body).await?;
            Ok::<(), ToolError>(())
        };
        if let Err(e) = write.await {
            warn!(cache_key = %key, error = %e, "Failed to write analysis cache");
        }
    }
}

/// Spawn the tool and wait for it; stderr becomes the error message on failure.
///
/// The child is killed if this future is dropped.
async fn run_process(program: &Path, args: &[String], cwd: &Path) -> Result<(), ToolError> {
    info!(program = %program.display(), cwd = %cwd.display(), "Spawning analysis tool");
    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            error!(error = %e, "Failed to spawn analysis tool");
            e
        })?;

    let output = child.wait_with_output().await?;
    let exit_code = output.status.code().unwrap_or(-1);
    debug!(exit_code, success = output.status.success(), "Analysis tool exited");
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(ToolError::ProcessError(if stderr.is_empty() {
        format!("Process exited with code {}", exit_code)
    } else {
        stderr
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use logrelay_core::{RuntimePreference, ToolSource};

    fn settings() -> ExternalToolSettings {
        ExternalToolSettings {
            enabled: true,
            auto_setup: false,
            auto_update: false,
            preferred_runtime: RuntimePreference::Auto,
        }
    }

    #[tokio::test]
    async fn test_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ExternalToolRunner::new(dir.path());
        let request = ExternalToolRequest::new("a.zevtc", ExternalToolSettings::default());
        let result = runner.run(&request).await;
        assert_eq!(result.source, ToolSource::Disabled);
        assert!(result.data.is_none());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_tool() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ExternalToolRunner::new(dir.path());
        std::fs::create_dir_all(runner.paths().cache_dir()).unwrap();
        std::fs::write(runner.paths().cache_file("log-1"), r#"{"players":[]}"#).unwrap();

        let request = ExternalToolRequest::new("a.zevtc", settings()).with_cache_key("log-1");
        let result = runner.run(&request).await;
        assert_eq!(result.source, ToolSource::Cache);
        assert_eq!(result.data, Some(serde_json::json!({"players": []})));
    }

    #[tokio::test]
    async fn test_not_installed_without_auto_setup() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ExternalToolRunner::new(dir.path());
        let request = ExternalToolRequest::new("a.zevtc", settings());
        let result = runner.run(&request).await;
        assert_eq!(result.source, ToolSource::Error);
        assert!(result.error.unwrap().contains("auto-setup is disabled"));
        assert!(result.runtime.is_none());
    }

    #[cfg(unix)]
    fn fake_launcher(dir: &Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-launcher.sh");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn install_package(runner: &ExternalToolRunner) {
        std::fs::create_dir_all(runner.paths().cli_dir()).unwrap();
        std::fs::write(runner.paths().cli_dir().join("GW2EICLI.dll"), b"pkg").unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_managed_run_produces_and_caches_output() {
        let dir = tempfile::tempdir().unwrap();
        // args: <package> -c <config> <log>
        let launcher = fake_launcher(
            dir.path(),
            "#!/bin/sh\nname=$(basename \"$4\" .zevtc)\nprintf '{\"fightName\":\"Gorseval\"}' > \"${name}_kill.json\"\n",
        );
        let runner = ExternalToolRunner::new(dir.path().join("data"))
            .with_managed_launcher(&launcher)
            .with_update_interval(None);
        install_package(&runner);

        let log = dir.path().join("20240101-1200.zevtc");
        std::fs::write(&log, b"evtc").unwrap();
        let request = ExternalToolRequest::new(&log, settings())
            .with_cache_key("key-1")
            .with_auth_token("tok");

        let result = runner.run(&request).await;
        assert_eq!(result.source, ToolSource::Parsed, "{:?}", result.error);
        assert_eq!(result.runtime, Some(Runtime::Managed));
        assert_eq!(result.data.as_ref().unwrap()["fightName"], "Gorseval");

        let output_dir = runner.paths().output_dir().join("key-1");
        assert_eq!(result.output_path, Some(output_dir.join("20240101-1200_kill.json")));
        let config = std::fs::read_to_string(output_dir.join(CONFIG_FILE_NAME)).unwrap();
        assert!(config.contains("DPSReportUserToken=tok"));

        let again = runner.run(&request).await;
        assert_eq!(again.source, ToolSource::Cache);
        assert_eq!(again.data, result.data);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_failure_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = fake_launcher(dir.path(), "#!/bin/sh\necho 'bad log' >&2\nexit 3\n");
        let runner = ExternalToolRunner::new(dir.path().join("data"))
            .with_managed_launcher(&launcher)
            .with_update_interval(None);
        install_package(&runner);

        let request = ExternalToolRequest::new(dir.path().join("x.evtc"), settings());
        let result = runner.run(&request).await;
        assert_eq!(result.source, ToolSource::Error);
        assert_eq!(result.runtime, Some(Runtime::Managed));
        assert_eq!(result.error.as_deref(), Some("bad log"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = fake_launcher(dir.path(), "#!/bin/sh\nexit 0\n");
        let runner = ExternalToolRunner::new(dir.path().join("data"))
            .with_managed_launcher(&launcher)
            .with_update_interval(None);
        install_package(&runner);

        let request = ExternalToolRequest::new(dir.path().join("x.zevtc"), settings());
        let result = runner.run(&request).await;
        assert_eq!(result.source, ToolSource::Error);
        assert_eq!(result.error, Some(ToolError::NoOutput.to_string()));
    }
}
