//! Manifest and application identity checks run before the first build

use super::{RepairContext, RepairReport};
use crate::patch::{self, rules};
use crate::project::{dsl_of_path, FileRole};
use emurun_cli::output::Status;
use emurun_core::process::CommandRunner;

const LAUNCHER_CATEGORY: &str = "android.intent.category.LAUNCHER";

/// What the Android manifest looks like
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestCheck {
    /// No `AndroidManifest.xml`
    pub missing: bool,
    /// `package` attribute
    pub package: Option<String>,
    /// Declares a launcher activity
    pub has_launcher: bool,
}

/// Inspect the manifest
pub fn inspect<R: CommandRunner + ?Sized>(ctx: &RepairContext<'_, R>) -> ManifestCheck {
    let path = ctx.layout.path_for(FileRole::Manifest);
    match std::fs::read_to_string(&path) {
        Ok(content) => ManifestCheck {
            missing: false,
            package: ctx.layout.manifest_package(),
            has_launcher: content.contains(LAUNCHER_CATEGORY),
        },
        Err(_) => ManifestCheck {
            missing: true,
            package: None,
            has_launcher: false,
        },
    }
}

/// Recreate a missing manifest with `flutter create`, and report problems
/// that cannot be fixed automatically
pub fn ensure_manifest<R: CommandRunner + ?Sized>(ctx: &RepairContext<'_, R>) -> (ManifestCheck, RepairReport) {
    let mut report = RepairReport::default();
    let mut check = inspect(ctx);

    if check.missing {
        Status::warning("AndroidManifest.xml not found; recreating the Android platform files");
        let created = ctx.driver.flutter_step(&["create", "--platforms=android", "."]);
        report.command("flutter create --platforms=android .", created.success);
        report.regenerated = created.success;
        check = inspect(ctx);
    }

    if !check.missing {
        if check.package.is_none() {
            tracing::debug!("manifest has no package attribute; namespace comes from the build script");
        }
        if !check.has_launcher {
            Status::warning("AndroidManifest.xml declares no launcher activity; the app may not start");
        }
    }
    (check, report)
}

/// Insert `namespace` (and `applicationId`) into the app script when absent
///
/// Values come from the manifest package, then the script itself, then the
/// configured fallback.
pub fn ensure_identity<R: CommandRunner + ?Sized>(ctx: &RepairContext<'_, R>) -> RepairReport {
    let mut report = RepairReport::default();
    let app = ctx.layout.path_for(FileRole::AppBuildScript);
    if !app.exists() {
        return report;
    }
    let package = ctx.package_name();
    let dsl = dsl_of_path(&app);
    report.record_present(&app, patch::ensure_field(&app, rules::namespace(dsl), &package));
    report.record_present(&app, patch::ensure_field(&app, rules::application_id(dsl), &package));
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repair::testing::Scratch;
    use emurun_core::process::FakeRunner;

    const MANIFEST: &str = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="dev.acme.shop">
    <application>
        <activity android:name=".MainActivity">
            <intent-filter>
                <action android:name="android.intent.action.MAIN"/>
                <category android:name="android.intent.category.LAUNCHER"/>
            </intent-filter>
        </activity>
    </application>
</manifest>
"#;

    #[test]
    fn test_inspect_manifest() {
        let scratch = Scratch::new();
        scratch.write("android/app/src/main/AndroidManifest.xml", MANIFEST);
        let runner = FakeRunner::new();
        let driver = scratch.driver(&runner);
        let ctx = RepairContext::new(&scratch.layout, &scratch.config, &driver).with_gradle_home(None);

        let (check, report) = ensure_manifest(&ctx);
        assert_eq!(check.package.as_deref(), Some("dev.acme.shop"));
        assert!(check.has_launcher);
        assert!(!report.changed());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_missing_manifest_runs_flutter_create() {
        let scratch = Scratch::new();
        let runner = FakeRunner::new();
        let driver = scratch.driver(&runner);
        let ctx = RepairContext::new(&scratch.layout, &scratch.config, &driver).with_gradle_home(None);

        let (check, report) = ensure_manifest(&ctx);
        assert!(check.missing);
        assert!(report.regenerated);
        assert!(runner.ran("flutter create --platforms=android ."));
    }

    #[test]
    fn test_ensure_identity_from_manifest() {
        let scratch = Scratch::new();
        scratch.write("android/app/src/main/AndroidManifest.xml", MANIFEST);
        scratch.write(
            "android/app/build.gradle",
            "android {\n    defaultConfig {\n        minSdkVersion 21\n    }\n}\n",
        );
        let runner = FakeRunner::new();
        let driver = scratch.driver(&runner);
        let ctx = RepairContext::new(&scratch.layout, &scratch.config, &driver).with_gradle_home(None);

        assert!(ensure_identity(&ctx).changed());
        let app = scratch.read("android/app/build.gradle");
        assert!(app.contains("    namespace \"dev.acme.shop\""));
        assert!(app.contains("        applicationId \"dev.acme.shop\""));
        assert!(!ensure_identity(&ctx).changed());
    }
}
