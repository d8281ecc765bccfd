//! NDK version reconciliation
//!
//! `local.properties` may pin an installed NDK through `ndk.dir` while the
//! build scripts request another one through `ndkVersion`. The installed NDK
//! wins: every script's `ndkVersion` is set to the version in the `ndk.dir`
//! path and the `ndk.dir` line is commented out.

use crate::patch::{self, rules, PatchOutcome, VersionTriple};
use crate::project::{dsl_of_path, FileRole, ProjectLayout};
use emurun_core::file_scanner;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;

static NDK_DIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*ndk\.dir[ \t]*=[ \t]*(?P<path>[^\r\n]+)").expect("Invalid ndk.dir regex")
});
static NDK_DIR_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[/\\]ndk[/\\]+(?P<version>\d+(?:\.\d+)*)").expect("Invalid ndk version regex")
});

/// What reconciliation found and did
#[derive(Debug, Clone)]
pub struct NdkReconciliation {
    /// `ndkVersion` found in the scripts against the `ndk.dir` version
    pub triple: VersionTriple,
    /// Per-file outcomes; empty when the versions already agreed
    pub patched: Vec<(PathBuf, PatchOutcome)>,
}

impl NdkReconciliation {
    /// Whether any file was modified
    pub fn changed(&self) -> bool {
        self.patched.iter().any(|(_, o)| o.changed())
    }
}

/// NDK version encoded in an `ndk.dir=.../ndk/<version>` entry
pub fn ndk_dir_version(local_properties: &str) -> Option<String> {
    let path = NDK_DIR.captures(local_properties)?.name("path")?.as_str().trim().to_string();
    NDK_DIR_VERSION
        .captures(&path)
        .map(|caps| caps["version"].to_string())
}

/// First `ndkVersion` value across the scripts, app script first
pub fn script_ndk_version(layout: &ProjectLayout) -> Option<String> {
    script_files(layout).iter().find_map(|path| {
        let content = std::fs::read_to_string(path).ok()?;
        rules::ndk_version(dsl_of_path(path))
            .value(&content)
            .map(ToString::to_string)
    })
}

/// Gradle scripts under the Android dir, app script first
fn script_files(layout: &ProjectLayout) -> Vec<PathBuf> {
    let app = layout.path_for(FileRole::AppBuildScript);
    let mut files: Vec<PathBuf> = file_scanner::scan_gradle_files(layout.android_dir())
        .into_iter()
        .filter(|p| !p.to_string_lossy().ends_with(".properties"))
        .filter(|p| *p != app)
        .collect();
    if app.exists() {
        files.insert(0, app);
    }
    files
}

/// Align `ndkVersion` with `ndk.dir`
///
/// Returns `None` when `local.properties` names no versioned NDK directory.
pub fn reconcile_ndk(layout: &ProjectLayout) -> Option<NdkReconciliation> {
    let properties_path = layout.path_for(FileRole::LocalProperties);
    let properties = std::fs::read_to_string(&properties_path).ok()?;
    let required = ndk_dir_version(&properties)?;

    let triple = VersionTriple {
        tool: "ndk",
        current: script_ndk_version(layout),
        required,
    };
    tracing::debug!(%triple, "ndk versions");

    if triple.satisfied() {
        return Some(NdkReconciliation {
            triple,
            patched: Vec::new(),
        });
    }

    tracing::info!(%triple, "ndk.dir and ndkVersion disagree; using the installed NDK");
    let mut patched = Vec::new();
    let app = layout.path_for(FileRole::AppBuildScript);
    for path in script_files(layout) {
        let rule = rules::ndk_version(dsl_of_path(&path));
        let has_field = std::fs::read_to_string(&path)
            .map(|c| rule.value(&c).is_some())
            .unwrap_or(false);
        // Only the app script gets the field inserted; others are updated in place.
        if has_field || path == app {
            let outcome = patch::patch_field(&path, rule, &triple.required);
            patched.push((path, outcome));
        }
    }

    let outcome = patch::rewrite(&properties_path, comment_out_ndk_dir);
    patched.push((properties_path, outcome));

    Some(NdkReconciliation { triple, patched })
}

/// `ndk.dir=<path>` → `# ndk.dir=<path>`
pub fn comment_out_ndk_dir(properties: &str) -> String {
    properties
        .split_inclusive('\n')
        .map(|line| {
            if NDK_DIR.is_match(line) {
                format!("# {}", line.trim_start())
            } else {
                line.to_string()
            }
        })
        .collect()
}

/// Drop `ndk.dir` lines entirely
pub fn remove_ndk_dir(properties: &str) -> String {
    properties
        .split_inclusive('\n')
        .filter(|line| !NDK_DIR.is_match(line))
        .collect()
}
