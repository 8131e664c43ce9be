//! Suite scanner for discovering `.robot` files.
//!
//! Only the top level of the test directory is listed, matching how the
//! runner is invoked from inside that directory.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extension of Robot Framework suite files.
pub const SUITE_EXTENSION: &str = "robot";

/// A discovered suite file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteFile {
    /// File name relative to the test directory
    pub name: String,
    /// Full path of the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

/// Scanner over one test directory.
pub struct SuiteScanner {
    test_dir: PathBuf,
}

impl SuiteScanner {
    /// Create a new scanner.
    pub fn new(test_dir: PathBuf) -> Self {
        Self { test_dir }
    }

    /// List the suite files, sorted by name.
    pub fn scan(&self) -> Result<Vec<SuiteFile>> {
        if !self.test_dir.is_dir() {
            bail!("Not a directory: {}", self.test_dir.display());
        }

        let entries = fs::read_dir(&self.test_dir)
            .with_context(|| format!("Cannot read directory {}", self.test_dir.display()))?;

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || !is_suite(&path) {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            debug!("Found suite: {}", name);
            files.push(SuiteFile { name, path, size });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Resolve the requested suite names against the directory listing.
    ///
    /// `None` selects every suite. Unknown names are an error.
    pub fn select(&self, requested: Option<&[String]>) -> Result<Vec<SuiteFile>> {
        let available = self.scan()?;

        let Some(requested) = requested else {
            return Ok(available);
        };

        let mut selected = Vec::with_capacity(requested.len());
        for name in requested {
            let name = name.trim();
            match available.iter().find(|f| f.name == name) {
                Some(file) => selected.push(file.clone()),
                None => bail!(
                    "Suite not found in {}: {}",
                    self.test_dir.display(),
                    name
                ),
            }
        }

        Ok(selected)
    }
}

fn is_suite(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(SUITE_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("login.robot"), "*** Test Cases ***\n").unwrap();
        fs::write(dir.path().join("checkout.robot"), "*** Test Cases ***\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "not a suite").unwrap();
        fs::create_dir(dir.path().join("nested.robot")).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("deep.robot"), "").unwrap();
        dir
    }

    #[test]
    fn test_scan_lists_top_level_suites_sorted() {
        let dir = suite_dir();
        let files = SuiteScanner::new(dir.path().to_path_buf()).scan().unwrap();

        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["checkout.robot", "login.robot"]);
        assert!(files[1].size > 0);
    }

    #[test]
    fn test_scan_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = SuiteScanner::new(dir.path().join("missing"));
        assert!(scanner.scan().is_err());
    }

    #[test]
    fn test_select() {
        let dir = suite_dir();
        let scanner = SuiteScanner::new(dir.path().to_path_buf());

        assert_eq!(scanner.select(None).unwrap().len(), 2);

        let picked = scanner.select(Some(&["login.robot".to_string()])).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].path, dir.path().join("login.robot"));

        assert!(scanner
            .select(Some(&["missing.robot".to_string()]))
            .is_err());
    }
}
