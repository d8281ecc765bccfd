//! Java/Gradle compatibility repair

use super::{evict, project_caches, RepairContext, RepairReport};
use crate::patch::{self, rules, PatchOutcome, VersionTriple};
use crate::project::{dsl_of_path, FileRole};
use emurun_cli::output::Status;
use emurun_core::process::CommandRunner;
use std::path::Path;

/// Newest JDK each Gradle version runs on, oldest first
pub const JAVA_GRADLE_COMPAT: &[(u32, &str)] = &[
    (8, "6.7.1"),
    (11, "7.6.1"),
    (17, "8.0.2"),
    (21, "8.4"),
    (22, "8.8"),
    (23, "8.10"),
];

/// JDK from which the Kotlin and AGP bumps are needed
pub const MODERN_JAVA: u32 = 17;

/// Gradle version for a JDK major version
///
/// JDKs newer than the table get the newest Gradle listed.
pub fn gradle_for_java(major: u32) -> &'static str {
    JAVA_GRADLE_COMPAT
        .iter()
        .find(|(java, _)| *java >= major)
        .or_else(|| JAVA_GRADLE_COMPAT.last())
        .map_or("7.6.1", |(_, gradle)| *gradle)
}

/// Wrapper descriptor Flutter generates, pointing at `version`
pub fn wrapper_descriptor(version: &str) -> String {
    format!(
        "distributionBase=GRADLE_USER_HOME\n\
         distributionPath=wrapper/dists\n\
         zipStoreBase=GRADLE_USER_HOME\n\
         zipStorePath=wrapper/dists\n\
         distributionUrl=https\\://services.gradle.org/distributions/gradle-{version}-all.zip\n"
    )
}

/// Move the wrapper to a Gradle that runs on `java_major`
///
/// From Java 17 on, Kotlin and AGP are raised as well.
pub fn repair<R: CommandRunner + ?Sized>(ctx: &RepairContext<'_, R>, java_major: u32) -> RepairReport {
    let gradle = gradle_for_java(java_major);
    Status::info(&format!("Java {java_major} detected; using Gradle {gradle}"));
    let mut report = RepairReport::default();

    let wrapper = ctx.layout.path_for(FileRole::WrapperDescriptor);
    let outcome = set_wrapper_version(&wrapper, gradle);
    report.record(wrapper, outcome);

    if java_major >= MODERN_JAVA {
        raise_plugins(ctx, &mut report);
    }

    report.evicted = evict(&project_caches(ctx.layout));
    report
}

/// Point the wrapper at `version`, keeping its `bin`/`all` type, creating
/// the descriptor when it is missing
pub fn set_wrapper_version(wrapper: &Path, version: &str) -> PatchOutcome {
    let current = std::fs::read_to_string(wrapper)
        .ok()
        .and_then(|content| rules::wrapper_distribution().value(&content).map(ToString::to_string));
    let triple = VersionTriple {
        tool: "gradle",
        current,
        required: version.to_string(),
    };
    tracing::debug!(%triple, "gradle wrapper");

    if !wrapper.exists() {
        return patch::write_file(wrapper, &wrapper_descriptor(version));
    }
    match patch::patch_field(wrapper, rules::wrapper_distribution(), version) {
        PatchOutcome::AnchorMissing => patch::rewrite(wrapper, |text| {
            let descriptor = wrapper_descriptor(version);
            let url = descriptor.lines().last().unwrap_or_default();
            let mut kept: String = text
                .lines()
                .filter(|line| !line.trim_start().starts_with("distributionUrl"))
                .map(|line| format!("{line}\n"))
                .collect();
            kept.push_str(url);
            kept.push('\n');
            kept
        }),
        outcome => outcome,
    }
}

fn raise_plugins<R: CommandRunner + ?Sized>(ctx: &RepairContext<'_, R>, report: &mut RepairReport) {
    let versions = &ctx.config.schema.versions;
    let root = ctx.layout.path_for(FileRole::RootBuildScript);
    let dsl = dsl_of_path(&root);
    report.record_present(&root, patch::patch_field(&root, rules::kotlin_version(dsl), &versions.kotlin_java17));
    // A `$kotlin_version` reference follows the variable patched above.
    let literal_plugin = std::fs::read_to_string(&root).ok().is_some_and(|content| {
        rules::kotlin_plugin()
            .value(&content)
            .is_some_and(|v| !v.starts_with('$'))
    });
    if literal_plugin {
        report.record(&root, patch::patch_field(&root, rules::kotlin_plugin(), &versions.kotlin_java17));
    }
    report.record_present(&root, patch::patch_field(&root, rules::agp_classpath(), &versions.agp));

    let settings = ctx.layout.path_for(FileRole::SettingsScript);
    report.record_present(&settings, patch::patch_field(&settings, rules::agp_plugins_dsl(), &versions.agp));
    report.record_present(
        &settings,
        patch::patch_field(&settings, rules::kotlin_plugins_dsl(), &versions.kotlin_java17),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repair::testing::Scratch;
    use emurun_core::process::FakeRunner;

    const WRAPPER: &str = "distributionBase=GRADLE_USER_HOME\ndistributionUrl=https\\://services.gradle.org/distributions/gradle-7.4-bin.zip\n";
    const ROOT: &str = "buildscript {\n    ext.kotlin_version = '1.6.10'\n    dependencies {\n        classpath 'com.android.tools.build:gradle:4.1.0'\n        classpath \"org.jetbrains.kotlin:kotlin-gradle-plugin:$kotlin_version\"\n    }\n}\n";

    #[test]
    fn test_gradle_for_java() {
        assert_eq!(gradle_for_java(8), "6.7.1");
        assert_eq!(gradle_for_java(11), "7.6.1");
        assert_eq!(gradle_for_java(17), "8.0.2");
        assert_eq!(gradle_for_java(19), "8.4");
        assert_eq!(gradle_for_java(30), "8.10");
    }

    #[test]
    fn test_java11_updates_wrapper_only() {
        let scratch = Scratch::new();
        scratch.write("android/gradle/wrapper/gradle-wrapper.properties", WRAPPER);
        scratch.write("android/build.gradle", ROOT);
        let runner = FakeRunner::new();
        let driver = scratch.driver(&runner);
        let ctx = RepairContext::new(&scratch.layout, &scratch.config, &driver).with_gradle_home(None);

        assert!(repair(&ctx, 11).changed());
        let wrapper = scratch.read("android/gradle/wrapper/gradle-wrapper.properties");
        assert!(wrapper.contains("gradle-7.6.1-bin.zip"));
        assert_eq!(scratch.read("android/build.gradle"), ROOT);
    }

    #[test]
    fn test_java17_raises_kotlin_and_agp() {
        let scratch = Scratch::new();
        scratch.write("android/gradle/wrapper/gradle-wrapper.properties", WRAPPER);
        scratch.write("android/build.gradle", ROOT);
        let runner = FakeRunner::new();
        let driver = scratch.driver(&runner);
        let ctx = RepairContext::new(&scratch.layout, &scratch.config, &driver).with_gradle_home(None);

        repair(&ctx, 17);
        let versions = &scratch.config.schema.versions;
        let root = scratch.read("android/build.gradle");
        assert!(root.contains(&format!("ext.kotlin_version = \"{}\"", versions.kotlin_java17)));
        assert!(root.contains(&format!("com.android.tools.build:gradle:{}'", versions.agp)));
        assert!(root.contains("kotlin-gradle-plugin:$kotlin_version\""));
        assert!(scratch
            .read("android/gradle/wrapper/gradle-wrapper.properties")
            .contains("gradle-8.0.2-bin.zip"));
    }

    #[test]
    fn test_missing_wrapper_is_created() {
        let scratch = Scratch::new();
        let runner = FakeRunner::new();
        let driver = scratch.driver(&runner);
        let ctx = RepairContext::new(&scratch.layout, &scratch.config, &driver).with_gradle_home(None);

        repair(&ctx, 21);
        let wrapper = scratch.read("android/gradle/wrapper/gradle-wrapper.properties");
        assert_eq!(wrapper, wrapper_descriptor("8.4"));
    }

    #[test]
    fn test_wrapper_without_distribution_url() {
        let scratch = Scratch::new();
        let path = scratch.write("android/gradle/wrapper/gradle-wrapper.properties", "zipStoreBase=GRADLE_USER_HOME\n");
        assert!(set_wrapper_version(&path, "7.6.1").changed());
        assert!(scratch
            .read("android/gradle/wrapper/gradle-wrapper.properties")
            .ends_with("gradle-7.6.1-all.zip\n"));
    }
}
