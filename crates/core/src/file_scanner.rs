//! File scanning utilities
//!
//! Discovers Gradle build scripts and properties files under a platform
//! directory while skipping generated output.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Directory names never descended into
const DEFAULT_EXCLUDED_DIRS: [&str; 4] = ["build", ".gradle", ".cxx", ".idea"];

/// File scanner with suffix and directory filters
pub struct FileScanner {
    root: PathBuf,
    suffixes: Vec<String>,
    excluded_dirs: Vec<String>,
    max_depth: usize,
}

impl FileScanner {
    /// Create a new file scanner rooted at the given path
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            suffixes: Vec::new(),
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(ToString::to_string).collect(),
            max_depth: usize::MAX,
        }
    }

    /// Keep only files whose name ends with one of `suffixes`
    ///
    /// Suffixes rather than extensions, so `.gradle.kts` can be told apart
    /// from `.kts`.
    #[must_use]
    pub fn with_suffixes(mut self, suffixes: &[&str]) -> Self {
        self.suffixes = suffixes.iter().map(ToString::to_string).collect();
        self
    }

    /// Replace the set of directory names to skip
    #[must_use]
    pub fn exclude_dirs(mut self, names: &[&str]) -> Self {
        self.excluded_dirs = names.iter().map(ToString::to_string).collect();
        self
    }

    /// Limit recursion depth (the root itself is depth 0)
    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Scan and return matching files, sorted by path
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .max_depth(self.max_depth)
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e))
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| self.matches(e.path()))
            .map(DirEntry::into_path)
            .collect();
        files.sort();
        files
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.excluded_dirs.iter().any(|d| d == name))
    }

    fn matches(&self, path: &Path) -> bool {
        if self.suffixes.is_empty() {
            return true;
        }
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| self.suffixes.iter().any(|s| name.ends_with(s.as_str())))
    }
}

/// Gradle scripts (Groovy and Kotlin DSL) and properties files under `android_dir`
pub fn scan_gradle_files(android_dir: &Path) -> Vec<PathBuf> {
    FileScanner::new(android_dir)
        .with_suffixes(&[".gradle", ".gradle.kts", ".properties"])
        .scan()
}

/// Kotlin DSL scripts under `android_dir`
pub fn scan_kts_files(android_dir: &Path) -> Vec<PathBuf> {
    FileScanner::new(android_dir).with_suffixes(&[".gradle.kts"]).scan()
}
