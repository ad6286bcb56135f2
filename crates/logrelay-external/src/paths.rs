//! On-disk layout of the tool directory.

use std::path::{Path, PathBuf};

/// Platform data directory for logrelay.
///
/// - Linux: `~/.local/share/logrelay`
/// - macOS: `~/Library/Application Support/logrelay`
/// - Windows: `%APPDATA%\logrelay`
pub fn default_data_root() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("logrelay"))
        .unwrap_or_else(|| PathBuf::from(".logrelay"))
}

/// Directory layout rooted at `<data root>/tool`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    base: PathBuf,
}

impl ToolPaths {
    /// Create the layout under a data root.
    pub fn new(data_root: impl AsRef<Path>) -> Self {
        Self {
            base: data_root.as_ref().join("tool"),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    /// Extracted release contents.
    pub fn cli_dir(&self) -> PathBuf {
        self.base.join("cli")
    }

    /// Extraction target swapped into `cli_dir` once complete.
    pub fn staging_dir(&self) -> PathBuf {
        self.base.join("cli.staging")
    }

    /// Cached result documents keyed by cache key.
    pub fn cache_dir(&self) -> PathBuf {
        self.base.join("cache")
    }

    /// Per-invocation output directories.
    pub fn output_dir(&self) -> PathBuf {
        self.base.join("output")
    }

    /// Installed release version record.
    pub fn version_file(&self) -> PathBuf {
        self.base.join("version.json")
    }

    /// Install root for an on-demand managed runtime.
    pub fn managed_runtime_dir(&self) -> PathBuf {
        self.base.join("managed-runtime")
    }

    /// Cache document for a key.
    pub fn cache_file(&self, cache_key: &str) -> PathBuf {
        self.cache_dir().join(format!("{}.json", sanitize_key(cache_key)))
    }
}

/// Replace anything outside `[A-Za-z0-9._-]` runs with a single underscore.
pub fn sanitize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut in_run = false;
    for c in key.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// Log file name without its `.zevtc`/`.evtc` extension.
pub fn log_base_name(log_path: &Path) -> String {
    let name = log_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = name.to_ascii_lowercase();
    for ext in [".zevtc", ".evtc"] {
        if lower.ends_with(ext) {
            return name[..name.len() - ext.len()].to_string();
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_data_root_uses_platform_dir() {
        let root = default_data_root();
        match dirs::data_dir() {
            Some(data) => assert_eq!(root, data.join("logrelay")),
            None => assert_eq!(root, PathBuf::from(".logrelay")),
        }
    }

    #[test]
    fn test_layout() {
        let paths = ToolPaths::new("/data");
        assert_eq!(paths.cli_dir(), PathBuf::from("/data/tool/cli"));
        assert_eq!(paths.version_file(), PathBuf::from("/data/tool/version.json"));
        assert_eq!(
            paths.cache_file("ab/cd"),
            PathBuf::from("/data/tool/cache/ab_cd.json")
        );
    }

    #[test]
    fn test_sanitize_key_collapses_runs() {
        assert_eq!(sanitize_key("20240101-120000"), "20240101-120000");
        assert_eq!(sanitize_key("a b//c"), "a_b_c");
        assert_eq!(sanitize_key("fight.v2_x"), "fight.v2_x");
    }

    #[test]
    fn test_log_base_name() {
        assert_eq!(log_base_name(Path::new("/logs/20240101-120000.zevtc")), "20240101-120000");
        assert_eq!(log_base_name(Path::new("Fight.EVTC")), "Fight");
        assert_eq!(log_base_name(Path::new("notes.txt")), "notes.txt");
    }
}
