//! Runtime resolution for the external tool.
//!
//! Resolution is an ordered list of capability checks. The caller's explicit
//! preference is tried first; otherwise the first check that passes wins.
//! Adding a runtime means adding a check, nothing else.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use logrelay_core::{Runtime, RuntimePreference};
use tokio::process::Command;
use tracing::debug;

/// Launcher looked up on `PATH` for the managed runtime.
pub const MANAGED_LAUNCHER: &str = "dotnet";

/// Launcher looked up on `PATH` for the compatibility layer.
pub const COMPAT_LAUNCHER: &str = "wine";

/// Path translation helper shipped with the compatibility layer.
pub const COMPAT_PATH_TOOL: &str = "winepath";

/// Everything resolution needs to know about the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeEnvironment {
    /// Host can execute the native build directly.
    pub native_supported: bool,
    /// Native executable, if installed.
    pub executable: Option<PathBuf>,
    /// Managed package, if installed.
    pub package: Option<PathBuf>,
    /// Managed launcher already present.
    pub managed_launcher: Option<PathBuf>,
    /// Managed launcher may be installed on demand.
    pub launcher_installable: bool,
    /// Compatibility layer launcher.
    pub compat_launcher: Option<PathBuf>,
}

type Check = fn(&RuntimeEnvironment) -> bool;

/// Auto-detection order.
const CHECKS: &[(Runtime, Check)] = &[
    (Runtime::Native, native_available),
    (Runtime::Managed, managed_available),
    (Runtime::Compat, compat_available),
];

fn native_available(env: &RuntimeEnvironment) -> bool {
    env.native_supported && env.executable.is_some()
}

fn managed_available(env: &RuntimeEnvironment) -> bool {
    env.package.is_some() && (env.managed_launcher.is_some() || env.launcher_installable)
}

fn compat_available(env: &RuntimeEnvironment) -> bool {
    env.executable.is_some() && env.compat_launcher.is_some()
}

fn is_available(env: &RuntimeEnvironment, runtime: Runtime) -> bool {
    CHECKS
        .iter()
        .find(|(candidate, _)| *candidate == runtime)
        .is_some_and(|(_, check)| check(env))
}

/// Pick the runtime to run under, or `None` when nothing can run the tool.
pub fn resolve_runtime(env: &RuntimeEnvironment, preference: RuntimePreference) -> Option<Runtime> {
    let preferred = match preference {
        RuntimePreference::Auto => None,
        RuntimePreference::Managed => Some(Runtime::Managed),
        RuntimePreference::Compat => Some(Runtime::Compat),
    };
    if let Some(runtime) = preferred.filter(|r| is_available(env, *r)) {
        return Some(runtime);
    }
    CHECKS
        .iter()
        .find(|(_, check)| check(env))
        .map(|(runtime, _)| *runtime)
}

/// Locate an executable on `PATH`.
pub fn find_on_path(command: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(command);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let with_ext = dir.join(format!("{}.exe", command));
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }
        None
    })
}

/// Translate host paths into compatibility-layer paths.
///
/// Paths are returned unchanged when the path tool is missing or fails.
pub async fn translate_compat_paths(paths: &[&Path]) -> Vec<String> {
    let Some(tool) = find_on_path(COMPAT_PATH_TOOL) else {
        return paths.iter().map(|p| p.display().to_string()).collect();
    };

    let mut translated = Vec::with_capacity(paths.len());
    for path in paths {
        translated.push(translate_one(&tool, path.as_os_str()).await);
    }
    translated
}

async fn translate_one(tool: &Path, path: &OsStr) -> String {
    let fallback = || path.to_string_lossy().into_owned();
    match Command::new(tool).arg("-w").arg(path).output().await {
        Ok(output) if output.status.success() => {
            let converted = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if converted.is_empty() {
                fallback()
            } else {
                converted
            }
        }
        Ok(output) => {
            debug!(status = ?output.status.code(), "Path translation failed, using host path");
            fallback()
        }
        Err(e) => {
            debug!(error = %e, "Path translation unavailable, using host path");
            fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> RuntimeEnvironment {
        RuntimeEnvironment {
            native_supported: false,
            executable: Some("cli/tool.exe".into()),
            package: Some("cli/tool.dll".into()),
            managed_launcher: Some("/usr/bin/dotnet".into()),
            launcher_installable: false,
            compat_launcher: Some("/usr/bin/wine".into()),
        }
    }

    #[test]
    fn test_native_first_when_supported() {
        let env = RuntimeEnvironment {
            native_supported: true,
            ..env()
        };
        assert_eq!(resolve_runtime(&env, RuntimePreference::Auto), Some(Runtime::Native));
    }

    #[test]
    fn test_explicit_preference_wins_when_available() {
        let env = RuntimeEnvironment {
            native_supported: true,
            ..env()
        };
        assert_eq!(resolve_runtime(&env, RuntimePreference::Compat), Some(Runtime::Compat));
        assert_eq!(resolve_runtime(&env, RuntimePreference::Managed), Some(Runtime::Managed));
    }

    #[test]
    fn test_unavailable_preference_falls_through() {
        let env = RuntimeEnvironment {
            compat_launcher: None,
            ..env()
        };
        assert_eq!(resolve_runtime(&env, RuntimePreference::Compat), Some(Runtime::Managed));
    }

    #[test]
    fn test_installable_launcher_counts_as_managed() {
        let env = RuntimeEnvironment {
            managed_launcher: None,
            launcher_installable: true,
            compat_launcher: None,
            ..env()
        };
        assert_eq!(resolve_runtime(&env, RuntimePreference::Auto), Some(Runtime::Managed));
    }

    #[test]
    fn test_compat_as_last_resort() {
        let env = RuntimeEnvironment {
            package: None,
            ..env()
        };
        assert_eq!(resolve_runtime(&env, RuntimePreference::Managed), Some(Runtime::Compat));
    }

    #[test]
    fn test_no_runtime() {
        let env = RuntimeEnvironment {
            executable: Some("cli/tool.exe".into()),
            ..RuntimeEnvironment::default()
        };
        assert_eq!(resolve_runtime(&env, RuntimePreference::Auto), None);
        assert_eq!(resolve_runtime(&RuntimeEnvironment::default(), RuntimePreference::Compat), None);
    }
}
