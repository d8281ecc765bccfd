//! The table of (file, field) rules
//!
//! Gradle script rules exist in a Groovy and a Kotlin DSL flavour; pick one
//! with the [`Dsl`] of the file being patched. Field patterns are anchored at
//! line start so commented-out lines and references such as
//! `flutter.ndkVersion` on the right-hand side never match.

use super::PatchRule;
use crate::project::{Dsl, FileRole};
use once_cell::sync::Lazy;

/// A quoted string or a bare token (`33`, `flutter.ndkVersion`, `$kotlin_version`)
const VALUE: &str = r#"(?P<value>"[^"\n]*"|'[^'\n]*'|[\w.$]+)"#;
const ANDROID_BLOCK: &str = r"(?m)^[ \t]*android\s*\{";
const DEFAULT_CONFIG_BLOCK: &str = r"\bdefaultConfig\s*\{";

fn field(key: &str) -> String {
    format!(r"(?m)^(?P<indent>[ \t]*){key}\b[ \t]*=?[ \t]*{VALUE}")
}

static NDK_GROOVY: Lazy<PatchRule> = Lazy::new(|| {
    PatchRule::new("ndk-version", &field("ndkVersion"), r#"${indent}ndkVersion "{value}""#)
        .and_then(|r| r.anchor(ANDROID_BLOCK, "\n    ndkVersion \"{value}\""))
        .expect("Invalid ndkVersion rule")
});
static NDK_KTS: Lazy<PatchRule> = Lazy::new(|| {
    PatchRule::new("ndk-version", &field("ndkVersion"), r#"${indent}ndkVersion = "{value}""#)
        .and_then(|r| r.anchor(ANDROID_BLOCK, "\n    ndkVersion = \"{value}\""))
        .expect("Invalid ndkVersion rule")
});

static NAMESPACE_GROOVY: Lazy<PatchRule> = Lazy::new(|| {
    PatchRule::new("namespace", &field("namespace"), r#"${indent}namespace "{value}""#)
        .and_then(|r| r.anchor(ANDROID_BLOCK, "\n    namespace \"{value}\""))
        .expect("Invalid namespace rule")
});
static NAMESPACE_KTS: Lazy<PatchRule> = Lazy::new(|| {
    PatchRule::new("namespace", &field("namespace"), r#"${indent}namespace = "{value}""#)
        .and_then(|r| r.anchor(ANDROID_BLOCK, "\n    namespace = \"{value}\""))
        .expect("Invalid namespace rule")
});

static APPLICATION_ID_GROOVY: Lazy<PatchRule> = Lazy::new(|| {
    PatchRule::new(
        "application-id",
        &field("applicationId"),
        r#"${indent}applicationId "{value}""#,
    )
    .and_then(|r| r.anchor(DEFAULT_CONFIG_BLOCK, "\n        applicationId \"{value}\""))
    .expect("Invalid applicationId rule")
});
static APPLICATION_ID_KTS: Lazy<PatchRule> = Lazy::new(|| {
    PatchRule::new(
        "application-id",
        &field("applicationId"),
        r#"${indent}applicationId = "{value}""#,
    )
    .and_then(|r| r.anchor(DEFAULT_CONFIG_BLOCK, "\n        applicationId = \"{value}\""))
    .expect("Invalid applicationId rule")
});

static COMPILE_SDK_GROOVY: Lazy<PatchRule> = Lazy::new(|| {
    PatchRule::new(
        "compile-sdk",
        &field("(?P<key>compileSdkVersion|compileSdk)"),
        "${indent}${key} {value}",
    )
    .and_then(|r| r.anchor(ANDROID_BLOCK, "\n    compileSdkVersion {value}"))
    .expect("Invalid compileSdk rule")
});
static COMPILE_SDK_KTS: Lazy<PatchRule> = Lazy::new(|| {
    PatchRule::new(
        "compile-sdk",
        &field("(?P<key>compileSdkVersion|compileSdk)"),
        "${indent}${key} = {value}",
    )
    .and_then(|r| r.anchor(ANDROID_BLOCK, "\n    compileSdk = {value}"))
    .expect("Invalid compileSdk rule")
});

static KOTLIN_VERSION_GROOVY: Lazy<PatchRule> = Lazy::new(|| {
    PatchRule::new(
        "kotlin-version",
        &format!(
            r"(?m)^(?P<indent>[ \t]*)(?P<key>ext\.kotlin_version|kotlin_version|kotlinVersion)[ \t]*=[ \t]*{VALUE}"
        ),
        r#"${indent}${key} = "{value}""#,
    )
    .and_then(|r| r.anchor(r"\bext\s*\{", "\n        kotlin_version = \"{value}\""))
    .and_then(|r| r.anchor(r"\bbuildscript\s*\{", "\n    ext.kotlin_version = \"{value}\""))
    .expect("Invalid kotlin version rule")
});
static KOTLIN_VERSION_KTS: Lazy<PatchRule> = Lazy::new(|| {
    PatchRule::new(
        "kotlin-version",
        &format!(r"(?m)^(?P<indent>[ \t]*)(?P<key>val kotlinVersion|val kotlin_version)[ \t]*=[ \t]*{VALUE}"),
        r#"${indent}${key} = "{value}""#,
    )
    .expect("Invalid kotlin version rule")
});

static KOTLIN_PLUGIN: Lazy<PatchRule> = Lazy::new(|| {
    PatchRule::new(
        "kotlin-gradle-plugin",
        r#"(?P<head>classpath[^\n]*?kotlin-gradle-plugin:)(?P<value>[^'"\s)]+)(?P<quote>['"])"#,
        "${head}{value}${quote}",
    )
    .expect("Invalid kotlin plugin rule")
});

static AGP_CLASSPATH: Lazy<PatchRule> = Lazy::new(|| {
    PatchRule::new(
        "android-gradle-plugin",
        r#"(?P<head>classpath[ \t(]*['"]com\.android\.tools\.build:gradle:)(?P<value>[^'"\s]+)(?P<quote>['"])"#,
        "${head}{value}${quote}",
    )
    .expect("Invalid AGP rule")
});

static AGP_PLUGINS_DSL: Lazy<PatchRule> = Lazy::new(|| {
    PatchRule::new(
        "android-gradle-plugin-dsl",
        r#"(?P<head>id[ \t(]*["']com\.android\.application["'][ \t)]*version[ \t(]*["'])(?P<value>[^"'\s]+)(?P<quote>["'])"#,
        "${head}{value}${quote}",
    )
    .expect("Invalid AGP plugins rule")
});

static KOTLIN_PLUGINS_DSL: Lazy<PatchRule> = Lazy::new(|| {
    PatchRule::new(
        "kotlin-android-plugin-dsl",
        r#"(?P<head>id[ \t(]*["']org\.jetbrains\.kotlin\.android["'][ \t)]*version[ \t(]*["'])(?P<value>[^"'\s]+)(?P<quote>["'])"#,
        "${head}{value}${quote}",
    )
    .expect("Invalid kotlin plugins rule")
});

static WRAPPER_DISTRIBUTION: Lazy<PatchRule> = Lazy::new(|| {
    PatchRule::new(
        "gradle-wrapper",
        r"(?m)^distributionUrl=(?P<base>[^\n]*?gradle-)(?P<value>\d[\w.\-]*?)-(?P<kind>bin|all)\.zip",
        "distributionUrl=${base}{value}-${kind}.zip",
    )
    .expect("Invalid wrapper rule")
});

/// `ndkVersion` in the app script
pub fn ndk_version(dsl: Dsl) -> &'static PatchRule {
    match dsl {
        Dsl::Groovy => &NDK_GROOVY,
        Dsl::Kotlin => &NDK_KTS,
    }
}

/// `namespace` in the app script
pub fn namespace(dsl: Dsl) -> &'static PatchRule {
    match dsl {
        Dsl::Groovy => &NAMESPACE_GROOVY,
        Dsl::Kotlin => &NAMESPACE_KTS,
    }
}

/// `applicationId` inside `defaultConfig`
pub fn application_id(dsl: Dsl) -> &'static PatchRule {
    match dsl {
        Dsl::Groovy => &APPLICATION_ID_GROOVY,
        Dsl::Kotlin => &APPLICATION_ID_KTS,
    }
}

/// `compileSdk` / `compileSdkVersion` in the app script
pub fn compile_sdk(dsl: Dsl) -> &'static PatchRule {
    match dsl {
        Dsl::Groovy => &COMPILE_SDK_GROOVY,
        Dsl::Kotlin => &COMPILE_SDK_KTS,
    }
}

/// Kotlin version variable in the root script
pub fn kotlin_version(dsl: Dsl) -> &'static PatchRule {
    match dsl {
        Dsl::Groovy => &KOTLIN_VERSION_GROOVY,
        Dsl::Kotlin => &KOTLIN_VERSION_KTS,
    }
}

/// `kotlin-gradle-plugin` classpath coordinate in the root script
pub fn kotlin_plugin() -> &'static PatchRule {
    &KOTLIN_PLUGIN
}

/// Android Gradle Plugin classpath coordinate in the root script
pub fn agp_classpath() -> &'static PatchRule {
    &AGP_CLASSPATH
}

/// Android Gradle Plugin version in the settings script `plugins {}` block
pub fn agp_plugins_dsl() -> &'static PatchRule {
    &AGP_PLUGINS_DSL
}

/// Kotlin Android plugin version in the settings script `plugins {}` block
pub fn kotlin_plugins_dsl() -> &'static PatchRule {
    &KOTLIN_PLUGINS_DSL
}

/// Gradle version in the wrapper `distributionUrl`, keeping `bin`/`all`
pub fn wrapper_distribution() -> &'static PatchRule {
    &WRAPPER_DISTRIBUTION
}

/// Header line of a top-level pubspec section, then any indented, blank or
/// comment lines before the entry
fn pubspec_section(section: &str) -> String {
    format!(r"(?P<head>^{section}:[ \t]*(?:#[^\n]*)?\n(?:[ \t]*(?:#[^\n]*)?\n|[ \t]+[^\n]*\n)*?)")
}

fn pubspec_entry(name: &str, rule: &'static str, section: &str) -> Result<PatchRule, regex::Error> {
    let escaped = regex::escape(name);
    let head = pubspec_section(section);
    PatchRule::new(
        rule,
        &format!(
            r#"(?m){head}(?P<indent>[ \t]+){escaped}:[ \t]*(?P<value>"[^"\n]*"|'[^'\n]*'|[^\s#"'][^#\n]*?)(?P<trail>[ \t]+#[^\n]*)?[ \t]*$"#
        ),
        &format!("${{head}}${{indent}}{name}: {{value}}${{trail}}"),
    )?
    .anchor(
        &format!(r"(?m)^{section}:[ \t]*$"),
        &format!("\n  {name}: {{value}}"),
    )
}

/// Version constraint of a plugin in `pubspec.yaml`, inserted under `dependencies:`
pub fn pubspec_dependency(name: &str) -> Result<PatchRule, regex::Error> {
    pubspec_entry(name, "pubspec-dependency", "dependencies")
}

/// Version constraint of a plugin, inserted under `dependency_overrides:`
pub fn pubspec_override(name: &str) -> Result<PatchRule, regex::Error> {
    pubspec_entry(name, "pubspec-override", "dependency_overrides")
}

/// Every static rule with the role of the file it applies to
pub fn catalog() -> Vec<(FileRole, &'static PatchRule)> {
    let mut all = Vec::new();
    for dsl in [Dsl::Groovy, Dsl::Kotlin] {
        all.push((FileRole::AppBuildScript, ndk_version(dsl)));
        all.push((FileRole::AppBuildScript, namespace(dsl)));
        all.push((FileRole::AppBuildScript, application_id(dsl)));
        all.push((FileRole::AppBuildScript, compile_sdk(dsl)));
        all.push((FileRole::RootBuildScript, kotlin_version(dsl)));
    }
    all.push((FileRole::RootBuildScript, kotlin_plugin()));
    all.push((FileRole::RootBuildScript, agp_classpath()));
    all.push((FileRole::SettingsScript, agp_plugins_dsl()));
    all.push((FileRole::SettingsScript, kotlin_plugins_dsl()));
    all.push((FileRole::WrapperDescriptor, wrapper_distribution()));
    all
}
