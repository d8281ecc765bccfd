//! Kotlin DSL to Groovy conversion
//!
//! Older Flutter Gradle tooling cannot compile `*.gradle.kts` scripts. Each
//! Kotlin DSL script is replaced by the Groovy script Flutter's own template
//! generates, and the original is kept next to it as `*.kts.disabled`.

use super::{evict, project_caches, RepairContext, RepairReport};
use crate::patch::{self, rules, PatchOutcome};
use crate::project::{append_ext, Dsl, FileRole};
use emurun_cli::output::Status;
use emurun_core::config::VersionsConfig;
use emurun_core::process::CommandRunner;
use std::path::Path;

const SETTINGS_TEMPLATE: &str = r#"include ':app'

def localPropertiesFile = new File(rootProject.projectDir, "local.properties")
def properties = new Properties()

assert localPropertiesFile.exists()
localPropertiesFile.withReader("UTF-8") { reader -> properties.load(reader) }

def flutterSdkPath = properties.getProperty("flutter.sdk")
assert flutterSdkPath != null, "flutter.sdk not set in local.properties"
apply from: "$flutterSdkPath/packages/flutter_tools/gradle/app_plugin_loader.gradle"
"#;

const ROOT_TEMPLATE: &str = r#"buildscript {
    ext.kotlin_version = '{kotlin}'
    repositories {
        google()
        mavenCentral()
    }

    dependencies {
        classpath 'com.android.tools.build:gradle:{agp}'
        classpath "org.jetbrains.kotlin:kotlin-gradle-plugin:$kotlin_version"
    }
}

allprojects {
    repositories {
        google()
        mavenCentral()
    }
}

rootProject.buildDir = '../build'
subprojects {
    project.buildDir = "${rootProject.buildDir}/${project.name}"
}
subprojects {
    project.evaluationDependsOn(':app')
}

tasks.register("clean", Delete) {
    delete rootProject.buildDir
}
"#;

const APP_TEMPLATE: &str = r#"def localProperties = new Properties()
def localPropertiesFile = rootProject.file('local.properties')
if (localPropertiesFile.exists()) {
    localPropertiesFile.withReader('UTF-8') { reader ->
        localProperties.load(reader)
    }
}

def flutterRoot = localProperties.getProperty('flutter.sdk')
if (flutterRoot == null) {
    throw new GradleException("Flutter SDK not found. Define location with flutter.sdk in the local.properties file.")
}

def flutterVersionCode = localProperties.getProperty('flutter.versionCode')
if (flutterVersionCode == null) {
    flutterVersionCode = '1'
}

def flutterVersionName = localProperties.getProperty('flutter.versionName')
if (flutterVersionName == null) {
    flutterVersionName = '1.0'
}

apply plugin: 'com.android.application'
apply plugin: 'kotlin-android'
apply from: "$flutterRoot/packages/flutter_tools/gradle/flutter.gradle"

android {
    namespace "{package}"
    compileSdkVersion flutter.compileSdkVersion
    ndkVersion {ndk}

    compileOptions {
        sourceCompatibility JavaVersion.VERSION_1_8
        targetCompatibility JavaVersion.VERSION_1_8
    }

    kotlinOptions {
        jvmTarget = '1.8'
    }

    sourceSets {
        main.java.srcDirs += 'src/main/kotlin'
    }

    defaultConfig {
        applicationId "{package}"
        minSdkVersion flutter.minSdkVersion
        targetSdkVersion flutter.targetSdkVersion
        versionCode flutterVersionCode.toInteger()
        versionName flutterVersionName
    }

    buildTypes {
        release {
            signingConfig signingConfigs.debug
        }
    }
}

flutter {
    source '../..'
}

dependencies {
    implementation "org.jetbrains.kotlin:kotlin-stdlib-jdk7:$kotlin_version"
}
"#;

/// Groovy settings script
pub fn settings_script() -> String {
    SETTINGS_TEMPLATE.to_string()
}

/// Groovy root build script pinning Kotlin and AGP
pub fn root_script(versions: &VersionsConfig) -> String {
    ROOT_TEMPLATE
        .replace("{kotlin}", &versions.kotlin)
        .replace("{agp}", &versions.agp)
}

/// Groovy app build script
///
/// `ndk` is the NDK pinned by the script being replaced, if any; otherwise
/// Flutter's default is used.
pub fn app_script(package: &str, ndk: Option<&str>) -> String {
    let ndk = ndk.map_or_else(|| "flutter.ndkVersion".to_string(), |v| format!("\"{v}\""));
    APP_TEMPLATE.replace("{package}", package).replace("{ndk}", &ndk)
}

/// Replace every Kotlin DSL script with its Groovy template
pub fn repair<R: CommandRunner + ?Sized>(ctx: &RepairContext<'_, R>) -> RepairReport {
    let mut report = RepairReport::default();
    let layout = ctx.layout;
    let versions = &ctx.config.schema.versions;

    for role in [FileRole::SettingsScript, FileRole::RootBuildScript, FileRole::AppBuildScript] {
        let kts = layout.kts_path(role);
        let Ok(previous) = std::fs::read_to_string(&kts) else {
            continue;
        };
        Status::info(&format!("Converting {} to Groovy", kts.display()));

        let groovy = kts.with_extension("");
        if !groovy.exists() {
            let template = match role {
                FileRole::SettingsScript => settings_script(),
                FileRole::RootBuildScript => root_script(versions),
                _ => {
                    let ndk = rules::ndk_version(Dsl::Kotlin)
                        .value(&previous)
                        .filter(|v| v.chars().next().is_some_and(|c| c.is_ascii_digit()));
                    app_script(&ctx.package_name(), ndk)
                }
            };
            let outcome = patch::write_file(&groovy, &template);
            let written = outcome.is_ok();
            report.record(&groovy, outcome);
            if !written {
                continue;
            }
        }
        disable(&kts, &mut report);
    }

    if report.renamed.is_empty() {
        tracing::debug!("no Kotlin DSL scripts to convert");
        return report;
    }

    let mut caches = project_caches(layout);
    caches.extend(ctx.global_cache());
    report.evicted = evict(&caches);
    report
}

fn disable(kts: &Path, report: &mut RepairReport) {
    let disabled = append_ext(kts, "disabled");
    match std::fs::rename(kts, &disabled) {
        Ok(()) => report.renamed.push((kts.to_path_buf(), disabled)),
        Err(err) => report.record(kts, PatchOutcome::Failed(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repair::testing::Scratch;
    use emurun_core::process::FakeRunner;

    const APP_KTS: &str = "plugins {\n    id(\"com.android.application\")\n}\n\nandroid {\n    namespace = \"dev.acme.shop\"\n    ndkVersion = \"27.0.12077973\"\n}\n";

    #[test]
    fn test_converts_settings_and_app_scripts() {
        let scratch = Scratch::new();
        scratch.write("android/settings.gradle.kts", "include(\":app\")\n");
        scratch.write("android/app/build.gradle.kts", APP_KTS);
        scratch.write("android/.gradle/x", "x");
        let runner = FakeRunner::new();
        let driver = scratch.driver(&runner);
        let ctx = RepairContext::new(&scratch.layout, &scratch.config, &driver).with_gradle_home(None);

        let report = repair(&ctx);
        assert!(report.changed());
        assert_eq!(report.renamed.len(), 2);

        assert!(scratch.read("android/settings.gradle").contains("app_plugin_loader.gradle"));
        let app = scratch.read("android/app/build.gradle");
        assert!(app.contains("namespace \"dev.acme.shop\""));
        assert!(app.contains("applicationId \"dev.acme.shop\""));
        assert!(app.contains("ndkVersion \"27.0.12077973\""));

        assert!(!scratch.exists("android/app/build.gradle.kts"));
        assert_eq!(scratch.read("android/app/build.gradle.kts.disabled"), APP_KTS);
        assert!(!scratch.exists("android/.gradle"));
    }

    #[test]
    fn test_existing_groovy_script_is_kept() {
        let scratch = Scratch::new();
        scratch.write("android/build.gradle", "// hand written\n");
        scratch.write("android/build.gradle.kts", "// kts\n");
        let runner = FakeRunner::new();
        let driver = scratch.driver(&runner);
        let ctx = RepairContext::new(&scratch.layout, &scratch.config, &driver).with_gradle_home(None);

        repair(&ctx);
        assert_eq!(scratch.read("android/build.gradle"), "// hand written\n");
        assert!(scratch.exists("android/build.gradle.kts.disabled"));
    }

    #[test]
    fn test_nothing_to_convert() {
        let scratch = Scratch::new();
        scratch.write("android/app/build.gradle", "android {\n}\n");
        scratch.write("android/.gradle/x", "x");
        let runner = FakeRunner::new();
        let driver = scratch.driver(&runner);
        let ctx = RepairContext::new(&scratch.layout, &scratch.config, &driver).with_gradle_home(None);

        assert!(!repair(&ctx).changed());
        assert!(scratch.exists("android/.gradle/x"));
    }

    #[test]
    fn test_app_script_falls_back_to_flutter_ndk() {
        let script = app_script("com.example.app", None);
        assert!(script.contains("ndkVersion flutter.ndkVersion"));
        assert!(script.contains("$flutterRoot/packages/flutter_tools/gradle/flutter.gradle"));
    }

    #[test]
    fn test_root_script_uses_configured_versions() {
        let versions = VersionsConfig::default();
        let script = root_script(&versions);
        assert!(script.contains(&format!("ext.kotlin_version = '{}'", versions.kotlin)));
        assert!(script.contains(&format!("com.android.tools.build:gradle:{}", versions.agp)));
    }
}
