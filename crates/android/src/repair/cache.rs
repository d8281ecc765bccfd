//! Emergency Gradle repair
//!
//! Last targeted repair before regeneration. Wipes Gradle's caches and moves
//! the build onto a conservative, known-good toolchain: an older wrapper,
//! AGP and Kotlin, Google and Maven Central repositories, a clean
//! `local.properties` and an executable `gradlew`.

use super::java_gradle::set_wrapper_version;
use super::{evict, project_caches, RepairContext, RepairReport};
use crate::patch::{self, rules, PatchOutcome};
use crate::project::{dsl_of_path, FileRole};
use crate::reconcile::remove_ndk_dir;
use emurun_cli::output::Status;
use emurun_core::process::CommandRunner;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static REPOSITORIES_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\brepositories\s*\{").expect("Invalid repositories regex"));
static FLUTTER_SDK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*flutter\.sdk[ \t]*=").expect("Invalid flutter.sdk regex"));

/// Repositories every `repositories {}` block must list
pub const REQUIRED_REPOSITORIES: [&str; 2] = ["google()", "mavenCentral()"];

/// Global cache directories holding AGP artifacts and transforms
pub fn global_caches(caches: &Path) -> Vec<PathBuf> {
    vec![
        caches
            .join("modules-2")
            .join("files-2.1")
            .join("com.android.tools.build"),
        caches.join("transforms-3"),
    ]
}

/// Add missing [`REQUIRED_REPOSITORIES`] to every `repositories {}` block
pub fn ensure_repositories(script: &str) -> String {
    let mut patched = script.to_string();
    let openings: Vec<usize> = REPOSITORIES_BLOCK.find_iter(script).map(|m| m.end()).collect();
    for open in openings.into_iter().rev() {
        let close = block_end(&patched, open);
        let body = &patched[open..close];
        let missing: String = REQUIRED_REPOSITORIES
            .iter()
            .filter(|repo| !body.contains(*repo))
            .map(|repo| format!("\n        {repo}"))
            .collect();
        patched.insert_str(open, &missing);
    }
    patched
}

/// Offset of the brace closing the block opened just before `open`
fn block_end(text: &str, open: usize) -> usize {
    let mut depth = 1usize;
    for (offset, c) in text[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return open + offset;
                }
            }
            _ => {}
        }
    }
    text.len()
}

/// Drop `ndk.dir` and make sure `flutter.sdk` is set
pub fn clean_local_properties(properties: &str, flutter_sdk: Option<&Path>) -> String {
    let mut cleaned = remove_ndk_dir(properties);
    let Some(sdk) = flutter_sdk else {
        return cleaned;
    };
    if !FLUTTER_SDK.is_match(&cleaned) {
        if !cleaned.is_empty() && !cleaned.ends_with('\n') {
            cleaned.push('\n');
        }
        let escaped = sdk.display().to_string().replace('\\', "\\\\");
        cleaned.push_str(&format!("flutter.sdk={escaped}\n"));
    }
    cleaned
}

/// Flutter SDK root: `<sdk>/bin/flutter` → `<sdk>`
pub fn flutter_sdk_root(flutter_binary: &Path) -> Option<PathBuf> {
    flutter_binary.parent()?.parent().map(Path::to_path_buf)
}

/// Make `gradlew` executable
#[cfg(unix)]
pub fn ensure_executable(path: &Path) -> PatchOutcome {
    use std::os::unix::fs::PermissionsExt;

    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return PatchOutcome::FileMissing,
        Err(err) => return PatchOutcome::Failed(err.to_string()),
    };
    let mode = metadata.permissions().mode();
    if mode & 0o111 == 0o111 {
        return PatchOutcome::Unchanged;
    }
    match std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)) {
        Ok(()) => PatchOutcome::Updated {
            previous: Some(format!("{:o}", mode & 0o777)),
        },
        Err(err) => PatchOutcome::Failed(err.to_string()),
    }
}

/// Make `gradlew` executable
#[cfg(not(unix))]
pub fn ensure_executable(_path: &Path) -> PatchOutcome {
    PatchOutcome::Unchanged
}

/// Run the emergency repair
pub fn emergency_repair<R: CommandRunner + ?Sized>(ctx: &RepairContext<'_, R>) -> RepairReport {
    Status::warning("Running the emergency Gradle repair");
    let versions = &ctx.config.schema.versions;
    let layout = ctx.layout;
    let mut report = RepairReport::default();

    let mut caches = project_caches(layout);
    if let Some(global) = ctx.global_cache() {
        caches.extend(global_caches(&global));
    }
    report.evicted = evict(&caches);

    let wrapper = layout.path_for(FileRole::WrapperDescriptor);
    let outcome = set_wrapper_version(&wrapper, &versions.emergency_gradle_wrapper);
    report.record(wrapper, outcome);

    let root = layout.path_for(FileRole::RootBuildScript);
    let dsl = dsl_of_path(&root);
    report.record_present(&root, patch::patch_field(&root, rules::agp_classpath(), &versions.emergency_agp));
    report.record_present(&root, patch::patch_field(&root, rules::kotlin_version(dsl), &versions.emergency_kotlin));
    report.record_present(&root, patch::rewrite(&root, ensure_repositories));

    let settings = layout.path_for(FileRole::SettingsScript);
    report.record_present(&settings, patch::patch_field(&settings, rules::agp_plugins_dsl(), &versions.emergency_agp));
    report.record_present(
        &settings,
        patch::patch_field(&settings, rules::kotlin_plugins_dsl(), &versions.emergency_kotlin),
    );

    let app = layout.path_for(FileRole::AppBuildScript);
    let dsl = dsl_of_path(&app);
    report.record_present(&app, patch::ensure_field(&app, rules::namespace(dsl), &ctx.package_name()));
    report.record_present(
        &app,
        patch::patch_field(&app, rules::compile_sdk(dsl), &versions.compile_sdk.to_string()),
    );
    report.record_present(&app, patch::ensure_field(&app, rules::ndk_version(dsl), &versions.emergency_ndk));

    let properties = layout.path_for(FileRole::LocalProperties);
    let flutter_sdk = ctx
        .driver
        .runner()
        .locate(&ctx.driver.tools().flutter)
        .and_then(|binary| flutter_sdk_root(&binary));
    let outcome = if properties.exists() {
        patch::rewrite(&properties, |text| clean_local_properties(text, flutter_sdk.as_deref()))
    } else {
        match &flutter_sdk {
            Some(sdk) => patch::write_file(&properties, &clean_local_properties("", Some(sdk))),
            None => PatchOutcome::FileMissing,
        }
    };
    report.record_present(properties, outcome);

    let gradlew = layout.android_dir().join("gradlew");
    report.record_present(&gradlew, ensure_executable(&gradlew));

    let prepared = ctx.driver.prepare(true);
    report.command("flutter clean && flutter pub get", prepared.success);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repair::testing::Scratch;
    use emurun_core::process::FakeRunner;

    const ROOT: &str = "buildscript {\n    ext.kotlin_version = '1.9.0'\n    repositories {\n        google()\n    }\n    dependencies {\n        classpath 'com.android.tools.build:gradle:8.1.0'\n    }\n}\n\nallprojects {\n    repositories {\n    }\n}\n";

    #[test]
    fn test_ensure_repositories() {
        let patched = ensure_repositories(ROOT);
        assert_eq!(patched.matches("google()").count(), 2);
        assert_eq!(patched.matches("mavenCentral()").count(), 2);
        assert_eq!(ensure_repositories(&patched), patched);
    }

    #[test]
    fn test_clean_local_properties() {
        let cleaned = clean_local_properties(
            "sdk.dir=/sdk\nndk.dir=/sdk/ndk/21.4.7075529\n",
            Some(Path::new("/opt/flutter")),
        );
        assert_eq!(cleaned, "sdk.dir=/sdk\nflutter.sdk=/opt/flutter\n");
        assert_eq!(
            clean_local_properties("flutter.sdk=/a\n", Some(Path::new("/b"))),
            "flutter.sdk=/a\n"
        );
    }

    #[test]
    fn test_flutter_sdk_root() {
        assert_eq!(
            flutter_sdk_root(Path::new("/opt/flutter/bin/flutter")),
            Some(PathBuf::from("/opt/flutter"))
        );
    }

    #[test]
    fn test_emergency_repair() {
        let scratch = Scratch::new();
        scratch.write("android/build.gradle", ROOT);
        scratch.write(
            "android/app/build.gradle",
            "android {\n    compileSdkVersion 34\n    ndkVersion \"27.0.12077973\"\n}\n",
        );
        scratch.write(
            "android/gradle/wrapper/gradle-wrapper.properties",
            "distributionUrl=https\\://services.gradle.org/distributions/gradle-8.3-all.zip\n",
        );
        scratch.write("android/local.properties", "sdk.dir=/sdk\nndk.dir=/sdk/ndk/25.1.8937393\n");
        scratch.write("android/build/out", "x");
        let gradle_home = scratch.dir.path().join("gradle-home");
        let transforms = gradle_home.join("caches/transforms-3");
        std::fs::create_dir_all(&transforms).unwrap();

        let runner = FakeRunner::new();
        runner.with_tool("flutter");
        let driver = scratch.driver(&runner);
        let ctx = RepairContext::new(&scratch.layout, &scratch.config, &driver)
            .with_gradle_home(Some(gradle_home.clone()));

        let report = emergency_repair(&ctx);
        assert!(report.changed());
        assert!(!transforms.exists());
        assert!(!scratch.exists("android/build"));

        let versions = &scratch.config.schema.versions;
        let root = scratch.read("android/build.gradle");
        assert!(root.contains(&format!("gradle:{}'", versions.emergency_agp)));
        assert!(root.contains(&format!("ext.kotlin_version = \"{}\"", versions.emergency_kotlin)));
        assert!(root.contains("mavenCentral()"));

        let app = scratch.read("android/app/build.gradle");
        assert!(app.contains(&format!("compileSdkVersion {}", versions.compile_sdk)));
        assert!(app.contains("namespace \"com.example.app\""));
        assert!(app.contains("ndkVersion \"27.0.12077973\""));

        let wrapper = scratch.read("android/gradle/wrapper/gradle-wrapper.properties");
        assert!(wrapper.contains(&format!("gradle-{}-all.zip", versions.emergency_gradle_wrapper)));
        assert_eq!(
            scratch.read("android/local.properties"),
            "sdk.dir=/sdk\nflutter.sdk=/fake\n"
        );
        assert!(runner.ran("flutter clean"));
        assert!(runner.ran("flutter pub get"));
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_executable() {
        use std::os::unix::fs::PermissionsExt;

        let scratch = Scratch::new();
        let gradlew = scratch.write("android/gradlew", "#!/bin/sh\n");
        std::fs::set_permissions(&gradlew, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(ensure_executable(&gradlew).changed());
        assert_eq!(ensure_executable(&gradlew), PatchOutcome::Unchanged);
        assert_eq!(
            ensure_executable(&scratch.dir.path().join("missing")),
            PatchOutcome::FileMissing
        );
    }
}
