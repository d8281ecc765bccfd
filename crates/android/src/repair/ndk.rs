//! NDK version repair

use super::{evict, version_lt, RepairContext, RepairReport};
use crate::patch::{self, rules};
use crate::project::{dsl_of_path, FileRole};
use crate::reconcile::comment_out_ndk_dir;
use emurun_cli::output::Status;
use emurun_core::process::CommandRunner;

/// Pin the NDK a plugin asked for (or the configured one) in the app script
///
/// A stale `ndk.dir` would override `ndkVersion`, so it is commented out.
/// Gradle's project state and the app build output are evicted.
pub fn repair<R: CommandRunner + ?Sized>(ctx: &RepairContext<'_, R>, required: Option<&str>) -> RepairReport {
    let version = required.unwrap_or(&ctx.config.schema.versions.ndk);
    Status::info(&format!("Pinning NDK {version}"));
    let mut report = RepairReport::default();

    let app = ctx.layout.path_for(FileRole::AppBuildScript);
    let outcome = patch::patch_field(&app, rules::ndk_version(dsl_of_path(&app)), version);
    report.record(app, outcome);

    let properties = ctx.layout.path_for(FileRole::LocalProperties);
    if properties.exists() {
        let outcome = patch::rewrite(&properties, comment_out_ndk_dir);
        report.record(properties, outcome);
    }

    let android = ctx.layout.android_dir();
    report.evicted = evict(&[android.join(".gradle"), android.join("app").join("build")]);
    report
}

/// Raise the app script's `ndkVersion` to the configured NDK when it is older
/// or unset
///
/// NDKs are backward compatible, so a newer pin is left alone.
pub fn pin_minimum<R: CommandRunner + ?Sized>(ctx: &RepairContext<'_, R>) -> RepairReport {
    let wanted = &ctx.config.schema.versions.ndk;
    let app = ctx.layout.path_for(FileRole::AppBuildScript);
    let rule = rules::ndk_version(dsl_of_path(&app));
    let current = std::fs::read_to_string(&app)
        .ok()
        .and_then(|content| rule.value(&content).map(ToString::to_string));

    let mut report = RepairReport::default();
    let outdated = match current.as_deref() {
        None => true,
        Some(current) => version_lt(current, wanted),
    };
    if outdated {
        tracing::debug!(?current, %wanted, "pinning configured ndk");
        report.record_present(&app, patch::patch_field(&app, rule, wanted));
    }
    report
}
