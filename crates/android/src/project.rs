//! Flutter project layout
//!
//! Maps each configuration file the tool edits to its path, and tells Groovy
//! build scripts apart from Kotlin DSL ones.

use emurun_core::config::Config;
use emurun_core::file_scanner;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static MANIFEST_PACKAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"package\s*=\s*["']([^"']+)["']"#).expect("Invalid manifest package regex")
});
static SCRIPT_IDENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*(?:namespace|applicationId)\b[ \t]*=?[ \t]*["']([^"'\n]+)["']"#)
        .expect("Invalid namespace regex")
});

/// Build-script dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dsl {
    /// `build.gradle`
    Groovy,
    /// `build.gradle.kts`
    Kotlin,
}

/// A configuration file the tool knows how to find
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileRole {
    /// `android/build.gradle(.kts)`
    RootBuildScript,
    /// `android/app/build.gradle(.kts)`
    AppBuildScript,
    /// `android/settings.gradle(.kts)`
    SettingsScript,
    /// `android/local.properties`
    LocalProperties,
    /// `android/gradle.properties`
    GradleProperties,
    /// `android/gradle/wrapper/gradle-wrapper.properties`
    WrapperDescriptor,
    /// `android/app/src/main/AndroidManifest.xml`
    Manifest,
    /// `pubspec.yaml` in the project root
    Pubspec,
}

impl FileRole {
    /// Whether the role is a Gradle script with Groovy and Kotlin variants
    pub fn is_script(self) -> bool {
        matches!(
            self,
            Self::RootBuildScript | Self::AppBuildScript | Self::SettingsScript
        )
    }
}

/// Paths of a Flutter project and its Android platform directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
    android: PathBuf,
}

impl ProjectLayout {
    /// Layout with an explicit Android directory
    pub fn new(root: impl Into<PathBuf>, android: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            android: android.into(),
        }
    }

    /// Layout using the configured Android directory
    pub fn from_config(root: impl Into<PathBuf>, config: &Config) -> Self {
        let root = root.into();
        let android = config.android_dir(&root);
        Self { root, android }
    }

    /// Project root (contains `pubspec.yaml`)
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Android platform directory
    pub fn android_dir(&self) -> &Path {
        &self.android
    }

    /// The Dart entrypoint whose presence marks a Flutter project
    pub fn main_dart(&self) -> PathBuf {
        self.root.join("lib").join("main.dart")
    }

    /// Path for `role`
    ///
    /// Scripts resolve to the Groovy file when it exists, else the Kotlin DSL
    /// file when that exists, else the Groovy path.
    pub fn path_for(&self, role: FileRole) -> PathBuf {
        let groovy = self.groovy_path(role);
        if role.is_script() && !groovy.exists() {
            let kts = append_ext(&groovy, "kts");
            if kts.exists() {
                return kts;
            }
        }
        groovy
    }

    /// Dialect of the script that `path_for(role)` resolves to
    pub fn dsl_of(&self, role: FileRole) -> Dsl {
        dsl_of_path(&self.path_for(role))
    }

    /// Kotlin DSL variant of a script role, whether or not it exists
    pub fn kts_path(&self, role: FileRole) -> PathBuf {
        append_ext(&self.groovy_path(role), "kts")
    }

    fn groovy_path(&self, role: FileRole) -> PathBuf {
        match role {
            FileRole::RootBuildScript => self.android.join("build.gradle"),
            FileRole::AppBuildScript => self.android.join("app").join("build.gradle"),
            FileRole::SettingsScript => self.android.join("settings.gradle"),
            FileRole::LocalProperties => self.android.join("local.properties"),
            FileRole::GradleProperties => self.android.join("gradle.properties"),
            FileRole::WrapperDescriptor => self
                .android
                .join("gradle")
                .join("wrapper")
                .join("gradle-wrapper.properties"),
            FileRole::Manifest => self
                .android
                .join("app")
                .join("src")
                .join("main")
                .join("AndroidManifest.xml"),
            FileRole::Pubspec => self.root.join("pubspec.yaml"),
        }
    }

    /// Whether any Kotlin DSL build script is present
    pub fn has_kotlin_dsl(&self) -> bool {
        !file_scanner::scan_kts_files(&self.android).is_empty()
    }

    /// `package` attribute of the Android manifest
    pub fn manifest_package(&self) -> Option<String> {
        let content = std::fs::read_to_string(self.path_for(FileRole::Manifest)).ok()?;
        MANIFEST_PACKAGE
            .captures(&content)
            .map(|caps| caps[1].to_string())
    }

    /// Package name from the manifest, else the app script's `namespace` or
    /// `applicationId`, else `fallback`
    pub fn package_name(&self, fallback: &str) -> String {
        self.manifest_package()
            .or_else(|| self.script_package())
            .unwrap_or_else(|| fallback.to_string())
    }

    fn script_package(&self) -> Option<String> {
        let scripts = [
            self.groovy_path(FileRole::AppBuildScript),
            self.kts_path(FileRole::AppBuildScript),
        ];
        scripts.iter().find_map(|path| {
            let content = std::fs::read_to_string(path).ok()?;
            SCRIPT_IDENTITY
                .captures(&content)
                .map(|caps| caps[1].to_string())
        })
    }
}

/// Dialect implied by a script path
pub fn dsl_of_path(path: &Path) -> Dsl {
    if path.extension().is_some_and(|ext| ext == "kts") {
        Dsl::Kotlin
    } else {
        Dsl::Groovy
    }
}

/// `foo.gradle` + `kts` → `foo.gradle.kts`
pub fn append_ext(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}
