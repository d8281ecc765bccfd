//! Plugin compatibility
//!
//! Known problematic plugins come from configuration. A plugin is flagged
//! when `flutter pub deps` resolves it to a version older than the one
//! recommended for it.

use super::{version_lt, RepairContext, RepairReport};
use crate::patch::{self, rules, PatchOutcome};
use crate::project::FileRole;
use emurun_cli::output::Status;
use emurun_core::config::{KnownPlugin, PluginStrategy};
use emurun_core::process::CommandRunner;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static OVERRIDES_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^dependency_overrides:[ \t]*$").expect("Invalid overrides regex")
});

/// A known plugin found in the dependency graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginFinding {
    /// What configuration says about it
    pub plugin: KnownPlugin,
    /// Version `flutter pub deps` resolved, if it could be read
    pub installed: Option<String>,
    /// Listed in `pubspec.yaml` rather than pulled in transitively
    pub direct: bool,
}

/// Version of `name` in `flutter pub deps` output
pub fn installed_version(deps_output: &str, name: &str) -> Option<String> {
    let pattern = Regex::new(&format!(r"\b{}\s+(?P<version>\d[0-9.]*)", regex::escape(name))).ok()?;
    deps_output
        .lines()
        .find_map(|line| pattern.captures(line))
        .map(|caps| caps["version"].trim_end_matches('.').to_string())
}

fn is_direct(pubspec: &Path, name: &str) -> bool {
    let Ok(content) = std::fs::read_to_string(pubspec) else {
        return false;
    };
    rules::pubspec_dependency(name).is_ok_and(|rule| rule.value(&content).is_some())
}

/// Known plugins resolved to a version older than recommended
pub fn check_plugins<R: CommandRunner + ?Sized>(ctx: &RepairContext<'_, R>) -> Vec<PluginFinding> {
    let known = &ctx.config.schema.plugins.known;
    if known.is_empty() {
        return Vec::new();
    }
    let result = ctx.driver.flutter_output(&["pub", "deps"]);
    if !result.success {
        Status::warning("Could not read plugin versions (flutter pub deps failed)");
        return Vec::new();
    }

    let pubspec = ctx.layout.path_for(FileRole::Pubspec);
    known
        .iter()
        .filter_map(|plugin| {
            let installed = installed_version(&result.stdout, &plugin.name)?;
            version_lt(&installed, &plugin.recommended).then(|| PluginFinding {
                plugin: plugin.clone(),
                installed: Some(installed),
                direct: is_direct(&pubspec, &plugin.name),
            })
        })
        .collect()
}

/// Print what was found
pub fn report(findings: &[PluginFinding]) {
    if findings.is_empty() {
        Status::success("No known plugin compatibility problems");
        return;
    }
    Status::warning("Plugins with known compatibility problems:");
    for finding in findings {
        let plugin = &finding.plugin;
        Status::detail(
            &format!("{} {}", plugin.name, finding.installed.as_deref().unwrap_or("?")),
            &format!(
                "{} (recommended {}, latest {})",
                plugin.issue, plugin.recommended, plugin.latest
            ),
        );
    }
}

/// Pin every finding in `pubspec.yaml`, trying each plugin's latest version
/// and then its recommended one; the original file is put back if neither
/// resolves
pub fn pin<R: CommandRunner + ?Sized>(ctx: &RepairContext<'_, R>, findings: &[PluginFinding]) -> RepairReport {
    let mut report = RepairReport::default();
    if findings.is_empty() {
        return report;
    }
    let pubspec = ctx.layout.path_for(FileRole::Pubspec);
    let original = match std::fs::read_to_string(&pubspec) {
        Ok(content) => content,
        Err(err) => {
            report.record(&pubspec, PatchOutcome::Failed(err.to_string()));
            return report;
        }
    };

    let clean = ctx.driver.flutter_step(&["pub", "cache", "clean", "--force"]);
    report.command("flutter pub cache clean --force", clean.success);

    for choose_latest in [true, false] {
        let mut edits = Vec::new();
        for finding in findings {
            let plugin = &finding.plugin;
            let version = if choose_latest { &plugin.latest } else { &plugin.recommended };
            Status::info(&format!("Pinning {} to ^{version}", plugin.name));
            edits.push(pin_one(&pubspec, finding, version));
        }

        let resolved = ctx.driver.pub_get();
        report.command("flutter pub get", resolved.success);
        if resolved.success {
            for outcome in edits {
                report.record(&pubspec, outcome);
            }
            return report;
        }
        Status::warning("Dependency resolution failed with the pinned versions");
    }

    let restored = patch::restore(&pubspec, &original);
    if !restored.is_ok() {
        report.record(&pubspec, restored);
    }
    Status::warning("Restored the original pubspec.yaml");
    let resolved = ctx.driver.pub_get();
    report.command("flutter pub get", resolved.success);
    report
}

fn pin_one(pubspec: &Path, finding: &PluginFinding, version: &str) -> PatchOutcome {
    let name = &finding.plugin.name;
    let rule = if finding.direct {
        rules::pubspec_dependency(name)
    } else {
        let outcome = patch::rewrite(pubspec, |text| {
            if OVERRIDES_SECTION.is_match(text) {
                text.to_string()
            } else {
                let separator = if text.ends_with('\n') { "" } else { "\n" };
                format!("{text}{separator}\ndependency_overrides:\n")
            }
        });
        if !outcome.is_ok() {
            return outcome;
        }
        rules::pubspec_override(name)
    };
    match rule {
        Ok(rule) => patch::patch_field(pubspec, &rule, &format!("^{version}")),
        Err(err) => PatchOutcome::Failed(err.to_string()),
    }
}

/// `flutter pub upgrade`, then `--major-versions` when nothing moved
pub fn upgrade<R: CommandRunner + ?Sized>(ctx: &RepairContext<'_, R>) -> RepairReport {
    let mut report = RepairReport::default();
    Status::info("Upgrading dependencies...");
    let result = ctx.driver.flutter_output(&["pub", "upgrade"]);
    report.command("flutter pub upgrade", result.success);
    let mut success = result.success;
    let mut changed = !result.combined_output().contains("No dependencies changed");

    if success && !changed {
        Status::info("No dependencies changed; allowing major versions");
        let result = ctx.driver.flutter_output(&["pub", "upgrade", "--major-versions"]);
        report.command("flutter pub upgrade --major-versions", result.success);
        success = result.success;
        changed = !result.combined_output().contains("No dependencies changed");
    }

    if !success {
        Status::warning("Dependency upgrade failed");
    }
    report.regenerated = success && changed;
    report
}

/// Cascade repair: pin the flagged plugins (including one named by the build
/// output), or upgrade everything when none is known
pub fn repair<R: CommandRunner + ?Sized>(ctx: &RepairContext<'_, R>, named: Option<&str>) -> RepairReport {
    let mut findings = check_plugins(ctx);
    let unflagged = named
        .filter(|name| !findings.iter().any(|f| f.plugin.name == *name))
        .and_then(|name| ctx.config.schema.plugins.known.iter().find(|p| p.name == name));
    if let Some(plugin) = unflagged {
        let pubspec = ctx.layout.path_for(FileRole::Pubspec);
        findings.push(PluginFinding {
            plugin: plugin.clone(),
            installed: None,
            direct: is_direct(&pubspec, &plugin.name),
        });
    }

    if findings.is_empty() {
        upgrade(ctx)
    } else {
        report(&findings);
        pin(ctx, &findings)
    }
}

/// Pre-build handling according to the configured strategy
pub fn apply_strategy<R: CommandRunner + ?Sized>(
    ctx: &RepairContext<'_, R>,
    strategy: PluginStrategy,
) -> RepairReport {
    if strategy == PluginStrategy::Ignore {
        return RepairReport::default();
    }
    let findings = check_plugins(ctx);
    report(&findings);
    match strategy {
        PluginStrategy::Pin => pin(ctx, &findings),
        PluginStrategy::Upgrade if !findings.is_empty() => upgrade(ctx),
        _ => RepairReport::default(),
    }
}
