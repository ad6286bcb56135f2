//! Bounded directory scans for tool binaries and tool output.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::{DirEntry, WalkDir};

/// Recursion limit for every scan.
pub const MAX_SCAN_DEPTH: usize = 4;

/// Executable names of the native build.
pub const EXECUTABLE_NAMES: &[&str] = &["GuildWars2EliteInsights-CLI.exe", "gw2eicli.exe"];

/// Package names of the managed build.
pub const PACKAGE_NAMES: &[&str] = &["GuildWars2EliteInsights-CLI.dll", "GW2EICLI.dll"];

/// Artifacts found in the tool directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolBinaries {
    pub executable: Option<PathBuf>,
    pub package: Option<PathBuf>,
}

impl ToolBinaries {
    /// Scan `root` for both artifact kinds.
    pub fn discover(root: &Path) -> Self {
        Self {
            executable: find_file(root, EXECUTABLE_NAMES, MAX_SCAN_DEPTH),
            package: find_file(root, PACKAGE_NAMES, MAX_SCAN_DEPTH),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.executable.is_none() && self.package.is_none()
    }
}

/// Walks at most `max_depth` directory levels below `root`.
///
/// Entries are visited in name order with the files of a directory before
/// its subdirectories, so a shallower match wins over a nested one.
fn bounded_walk(root: &Path, max_depth: usize) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .max_depth(max_depth + 1)
        .sort_by(|a, b| {
            a.file_type()
                .is_dir()
                .cmp(&b.file_type().is_dir())
                .then_with(|| a.file_name().cmp(b.file_name()))
        })
        .into_iter()
        .filter_map(Result::ok)
}

/// First file named like one of `names`, searching `max_depth` levels deep.
pub fn find_file(root: &Path, names: &[&str], max_depth: usize) -> Option<PathBuf> {
    bounded_walk(root, max_depth)
        .find(|entry| {
            entry.file_type().is_file() && names.iter().any(|n| entry.file_name() == *n)
        })
        .map(DirEntry::into_path)
}

fn is_json_output(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".json") || lower.ends_with(".json.gz")
}

fn collect_outputs(dir: &Path, max_depth: usize) -> Vec<(PathBuf, SystemTime)> {
    bounded_walk(dir, max_depth)
        .filter(|entry| {
            entry.file_type().is_file() && is_json_output(&entry.file_name().to_string_lossy())
        })
        .map(|entry| {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (entry.into_path(), modified)
        })
        .collect()
}

/// Pick the newest JSON (or gzipped JSON) output under `dir`.
///
/// Files whose name starts with `base_name` (case-insensitive) are preferred;
/// any JSON output is accepted when none match.
pub fn pick_output_file(dir: &Path, base_name: &str, max_depth: usize) -> Option<PathBuf> {
    let candidates = collect_outputs(dir, max_depth);

    let prefix = base_name.to_ascii_lowercase();
    let matching: Vec<_> = candidates
        .iter()
        .filter(|(path, _)| {
            path.file_name()
                .map(|n| n.to_string_lossy().to_ascii_lowercase().starts_with(&prefix))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    let pool = if matching.is_empty() || prefix.is_empty() {
        candidates
    } else {
        matching
    };

    pool.into_iter()
        .max_by_key(|(_, modified)| *modified)
        .map(|(path, _)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::Duration;

    fn touch(path: &Path, age_secs: u64) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"{}").unwrap();
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    #[test]
    fn test_find_binary_nested() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("release/bin/GW2EICLI.dll"), 0);
        touch(&dir.path().join("readme.txt"), 0);

        let binaries = ToolBinaries::discover(dir.path());
        assert!(binaries.executable.is_none());
        assert_eq!(
            binaries.package,
            Some(dir.path().join("release/bin/GW2EICLI.dll"))
        );
        assert!(!binaries.is_empty());
    }

    #[test]
    fn test_find_binary_respects_depth() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a/b/c/d/e/f/gw2eicli.exe"), 0);
        assert!(ToolBinaries::discover(dir.path()).is_empty());
        assert!(find_file(dir.path(), EXECUTABLE_NAMES, 10).is_some());
    }

    #[test]
    fn test_find_binary_prefers_shallow_files_then_name_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a/GW2EICLI.dll"), 0);
        touch(&dir.path().join("b/GW2EICLI.dll"), 0);
        assert_eq!(
            find_file(dir.path(), PACKAGE_NAMES, MAX_SCAN_DEPTH),
            Some(dir.path().join("a/GW2EICLI.dll"))
        );

        touch(&dir.path().join("GW2EICLI.dll"), 0);
        assert_eq!(
            find_file(dir.path(), PACKAGE_NAMES, MAX_SCAN_DEPTH),
            Some(dir.path().join("GW2EICLI.dll"))
        );
    }

    #[test]
    fn test_find_binary_depth_boundary() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a/b/c/d/gw2eicli.exe"), 0);
        assert!(ToolBinaries::discover(dir.path()).executable.is_some());
        assert!(find_file(dir.path(), EXECUTABLE_NAMES, 3).is_none());
    }

    #[test]
    fn test_pick_output_prefers_base_name_then_newest() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("20240101_kill.json"), 60);
        touch(&dir.path().join("20240101_kill_v2.json.gz"), 10);
        touch(&dir.path().join("other_fight.json"), 0);
        touch(&dir.path().join("20240101.log"), 0);

        let picked = pick_output_file(dir.path(), "20240101", MAX_SCAN_DEPTH).unwrap();
        assert_eq!(picked, dir.path().join("20240101_kill_v2.json.gz"));
    }

    #[test]
    fn test_pick_output_falls_back_to_any_json() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("nested/renamed.JSON"), 5);
        touch(&dir.path().join("older.json"), 50);

        let picked = pick_output_file(dir.path(), "missing", MAX_SCAN_DEPTH).unwrap();
        assert_eq!(picked, dir.path().join("nested/renamed.JSON"));
    }

    #[test]
    fn test_pick_output_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(pick_output_file(dir.path(), "x", MAX_SCAN_DEPTH).is_none());
    }
}
