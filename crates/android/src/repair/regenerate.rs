//! Platform regeneration, the last resort
//!
//! The Android directory is moved aside (never deleted) and recreated by
//! `flutter create --platforms=android .`.

use super::{RepairContext, RepairReport};
use chrono::{DateTime, Local};
use emurun_cli::output::Status;
use emurun_core::process::CommandRunner;

/// `android_backup_<YYYYmmdd_HHMMSS>`
pub fn backup_dir_name(now: DateTime<Local>) -> String {
    format!("android_backup_{}", now.format("%Y%m%d_%H%M%S"))
}

/// Move the Android directory aside and let flutter recreate it
pub fn regenerate<R: CommandRunner + ?Sized>(ctx: &RepairContext<'_, R>) -> RepairReport {
    let mut report = RepairReport::default();
    let android = ctx.layout.android_dir();
    let root = ctx.layout.root();
    Status::warning("Regenerating the Android platform directory");

    if android.exists() {
        let mut backup = root.join(backup_dir_name(Local::now()));
        let mut n = 1;
        while backup.exists() {
            backup = root.join(format!("{}_{n}", backup_dir_name(Local::now())));
            n += 1;
        }
        if let Err(err) = std::fs::rename(android, &backup) {
            Status::error(&format!("Could not move {} aside: {err}", android.display()));
            return report;
        }
        Status::detail("backup", &backup.display().to_string());
        report.renamed.push((android.to_path_buf(), backup));
    }

    let created = ctx.driver.flutter_step(&["create", "--platforms=android", "."]);
    report.command("flutter create --platforms=android .", created.success);
    if !created.success {
        Status::error("flutter create failed");
        return report;
    }
    report.regenerated = true;

    let resolved = ctx.driver.pub_get();
    report.command("flutter pub get", resolved.success);
    report
}
