//! Locating the newest analyzable report under a log directory.

use crate::error::{ScanError, ScanResult};
use crate::report::parser::is_analyzable;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Sweep reports live here when scans and sweeps share a log root.
pub const ISM_SUBDIR: &str = "ism_sweeps";
pub const SUMMARY_FILE: &str = "summary.txt";

/// Whether the file at `path` can be fed to the analysis pass.
///
/// Unreadable files count as not analyzable.
pub fn summary_is_analyzable(path: &Path) -> bool {
    match std::fs::read(path) {
        Ok(bytes) => is_analyzable(&String::from_utf8_lossy(&bytes)),
        Err(e) => {
            trace!("Cannot read {}: {}", path.display(), e);
            false
        }
    }
}

/// Find the newest analyzable `<run>/summary.txt` one level below `log_dir`.
///
/// If `log_dir/ism_sweeps` exists it is searched instead. Core scan reports
/// without the frequency totals section are passed over.
pub fn find_latest_summary(log_dir: &Path) -> ScanResult<PathBuf> {
    let ism = log_dir.join(ISM_SUBDIR);
    let root = if ism.is_dir() { ism } else { log_dir.to_path_buf() };

    if !root.is_dir() {
        return Err(ScanError::NoData {
            path: root,
            reason: "log directory does not exist".to_string(),
        });
    }

    let mut candidates: Vec<(SystemTime, PathBuf)> = WalkDir::new(&root)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == SUMMARY_FILE)
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((modified, e.into_path()))
        })
        .collect();

    if candidates.is_empty() {
        return Err(ScanError::NoData {
            path: root,
            reason: format!("no {} found", SUMMARY_FILE),
        });
    }

    candidates.sort_by(|a, b| b.0.cmp(&a.0));
    debug!("Found {} candidate reports under {}", candidates.len(), root.display());

    candidates
        .into_iter()
        .map(|(_, path)| path)
        .find(|path| summary_is_analyzable(path))
        .ok_or_else(|| ScanError::NoData {
            path: root,
            reason: "no analyzable ISM sweep summaries; run an ISM sweep or pass --summary"
                .to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::Duration;
    use tempfile::TempDir;

    const ANALYZABLE: &str = "\
=== Per-Radio Summary ===
    1       1          7 SCM       910.200
=== Strongest Center Frequencies (by total messages) ===
    1   910.200000
";

    fn write_summary(root: &Path, run: &str, content: &str, age_secs: u64) -> PathBuf {
        let dir = root.join(run);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(SUMMARY_FILE);
        fs::write(&path, content).unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
        path
    }

    #[test]
    fn test_newest_analyzable_wins() {
        let dir = TempDir::new().unwrap();
        write_summary(dir.path(), "scan_old", ANALYZABLE, 300);
        let newer = write_summary(dir.path(), "scan_mid", ANALYZABLE, 100);
        // newest, but a core report without the frequency section
        write_summary(dir.path(), "scan_new", "=== Per-Radio Summary ===\n", 10);

        assert_eq!(find_latest_summary(dir.path()).unwrap(), newer);
    }

    #[test]
    fn test_prefers_ism_subdirectory() {
        let dir = TempDir::new().unwrap();
        write_summary(dir.path(), "scan_top", ANALYZABLE, 1);
        let ism = dir.path().join(ISM_SUBDIR);
        let inside = write_summary(&ism, "scan_sweep", ANALYZABLE, 500);

        assert_eq!(find_latest_summary(dir.path()).unwrap(), inside);
    }

    #[test]
    fn test_ignores_deeper_and_shallower_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SUMMARY_FILE), ANALYZABLE).unwrap();
        write_summary(&dir.path().join("a"), "b", ANALYZABLE, 1);

        let err = find_latest_summary(dir.path()).unwrap_err();
        assert!(matches!(err, ScanError::NoData { .. }));
    }

    #[test]
    fn test_errors() {
        let missing = find_latest_summary(Path::new("/nonexistent/logs")).unwrap_err();
        assert!(missing.to_string().contains("does not exist"));

        let dir = TempDir::new().unwrap();
        write_summary(dir.path(), "scan_core", "=== Per-Radio Summary ===\n", 1);
        let err = find_latest_summary(dir.path()).unwrap_err();
        assert!(err.to_string().contains("analyzable"));
    }
}
