//! Targeted repairs
//!
//! One module per failure the cascade knows how to fix, plus the pre-build
//! checks. Repairs never return errors: what they touched (or failed to
//! touch) is collected in a [`RepairReport`] and the cascade decides whether
//! a rebuild is worth it from [`RepairReport::changed`].

pub mod cache;
pub mod java_gradle;
pub mod kotlin_dsl;
pub mod manifest;
pub mod ndk;
pub mod plugins;
pub mod regenerate;

use crate::cascade::{RepairKind, RepairToolkit};
use crate::classify::{classify_all, IssueKind};
use crate::driver::BuildDriver;
use crate::patch::PatchOutcome;
use crate::probe::Probe;
use crate::project::ProjectLayout;
use emurun_cli::output::Status;
use emurun_core::config::Config;
use emurun_core::process::CommandRunner;
use semver::Version;
use std::path::{Path, PathBuf};

/// Everything a repair needs to reach the project and its tools
pub struct RepairContext<'a, R: CommandRunner + ?Sized> {
    /// Project being repaired
    pub layout: &'a ProjectLayout,
    /// Pinned versions and cascade switches
    pub config: &'a Config,
    /// Runs flutter on behalf of the repairs
    pub driver: &'a BuildDriver<'a, R>,
    /// `~/.gradle`, when known
    pub gradle_home: Option<PathBuf>,
}

impl<'a, R: CommandRunner + ?Sized> RepairContext<'a, R> {
    /// Context with the user's `~/.gradle` as Gradle home
    pub fn new(layout: &'a ProjectLayout, config: &'a Config, driver: &'a BuildDriver<'a, R>) -> Self {
        Self {
            layout,
            config,
            driver,
            gradle_home: dirs::home_dir().map(|home| home.join(".gradle")),
        }
    }

    /// Override the Gradle home (`None` keeps repairs away from global caches)
    #[must_use]
    pub fn with_gradle_home(mut self, gradle_home: Option<PathBuf>) -> Self {
        self.gradle_home = gradle_home;
        self
    }

    /// `<gradle home>/caches`, when global eviction is allowed
    pub fn global_cache(&self) -> Option<PathBuf> {
        if !self.config.schema.cascade.evict_global_gradle_cache {
            return None;
        }
        self.gradle_home.as_ref().map(|home| home.join("caches"))
    }

    /// Package name for templates and `namespace`
    pub fn package_name(&self) -> String {
        self.layout.package_name(&self.config.schema.project.fallback_package)
    }
}

/// What a repair did
#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    /// File edits, in the order they were made
    pub patched: Vec<(PathBuf, PatchOutcome)>,
    /// Files or directories moved aside: (from, to)
    pub renamed: Vec<(PathBuf, PathBuf)>,
    /// Cache directories deleted
    pub evicted: Vec<PathBuf>,
    /// flutter commands run and whether they succeeded
    pub commands: Vec<(String, bool)>,
    /// Dependencies or platform files were regenerated by flutter
    pub regenerated: bool,
}

impl RepairReport {
    /// Record a file edit, warning when it did not land
    pub fn record(&mut self, path: impl Into<PathBuf>, outcome: PatchOutcome) {
        let path = path.into();
        if let PatchOutcome::Failed(reason) = &outcome {
            Status::warning(&format!("Could not patch {}: {reason}", path.display()));
        }
        self.patched.push((path, outcome));
    }

    /// Record an edit of a field that may legitimately be absent
    pub fn record_present(&mut self, path: impl Into<PathBuf>, outcome: PatchOutcome) {
        if !matches!(outcome, PatchOutcome::AnchorMissing | PatchOutcome::FileMissing) {
            self.record(path, outcome);
        }
    }

    /// Record a flutter command
    pub fn command(&mut self, command: impl Into<String>, success: bool) {
        self.commands.push((command.into(), success));
    }

    /// Whether the project is now different enough to rebuild
    pub fn changed(&self) -> bool {
        self.regenerated
            || !self.renamed.is_empty()
            || !self.evicted.is_empty()
            || self.patched.iter().any(|(_, outcome)| outcome.changed())
    }

    /// Print one line per change
    pub fn summarize(&self) {
        for (path, outcome) in self.patched.iter().filter(|(_, o)| o.changed()) {
            Status::detail(&path.display().to_string(), &outcome.to_string());
        }
        for (from, to) in &self.renamed {
            Status::detail(&from.display().to_string(), &format!("moved to {}", to.display()));
        }
        for dir in &self.evicted {
            Status::detail(&dir.display().to_string(), "removed");
        }
    }
}

/// Build output directories and Gradle state inside the Android directory
pub fn project_caches(layout: &ProjectLayout) -> Vec<PathBuf> {
    let android = layout.android_dir();
    vec![
        android.join(".gradle"),
        android.join("build"),
        android.join("app").join("build"),
    ]
}

/// Delete the directories that exist, returning the ones removed
pub fn evict(dirs: &[PathBuf]) -> Vec<PathBuf> {
    dirs.iter()
        .filter(|dir| dir.exists())
        .filter_map(|dir| match remove(dir) {
            Ok(()) => {
                tracing::info!(dir = %dir.display(), "cache evicted");
                Some(dir.clone())
            }
            Err(err) => {
                Status::warning(&format!("Could not remove {}: {err}", dir.display()));
                None
            }
        })
        .collect()
}

/// Parse `1.9`, `^1.9.2` or `27.0.12077973` as a semver version
pub fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches(['^', '~', '>', '<', '=', ' ']);
    let mut parts: Vec<&str> = trimmed.splitn(3, '.').collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    Version::parse(&parts.join(".")).ok()
}

/// `a < b`, false when either does not parse
pub fn version_lt(a: &str, b: &str) -> bool {
    match (parse_version(a), parse_version(b)) {
        (Some(a), Some(b)) => a < b,
        _ => false,
    }
}

fn remove(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// The repairs wired to a real project, as the cascade sees them
pub struct ProjectRepairs<'a, R: CommandRunner + ?Sized> {
    ctx: RepairContext<'a, R>,
    probe: &'a Probe<'a, R>,
}

impl<'a, R: CommandRunner + ?Sized> ProjectRepairs<'a, R> {
    /// Toolkit over `ctx`; `probe` supplies the JDK version on demand
    pub fn new(ctx: RepairContext<'a, R>, probe: &'a Probe<'a, R>) -> Self {
        Self { ctx, probe }
    }

    /// The context repairs run in
    pub fn context(&self) -> &RepairContext<'a, R> {
        &self.ctx
    }
}

impl<R: CommandRunner + ?Sized> RepairToolkit for ProjectRepairs<'_, R> {
    fn repair(&mut self, kind: RepairKind, output: &str) -> bool {
        let issues = classify_all(output);
        let detail = |wanted: IssueKind| {
            issues
                .iter()
                .find(|issue| issue.kind == wanted)
                .and_then(|issue| issue.detail.clone())
        };
        let report = match kind {
            RepairKind::Ndk => ndk::repair(&self.ctx, detail(IssueKind::NdkMismatch).as_deref()),
            RepairKind::KotlinDsl => kotlin_dsl::repair(&self.ctx),
            RepairKind::JavaGradle => {
                let java = self.probe.java_version_info();
                java_gradle::repair(&self.ctx, java.major)
            }
            RepairKind::Plugins => {
                plugins::repair(&self.ctx, detail(IssueKind::PluginIncompatible).as_deref())
            }
            RepairKind::GradleCache => cache::emergency_repair(&self.ctx),
        };
        report.summarize();
        report.changed()
    }

    fn has_problem_plugin(&mut self) -> bool {
        !plugins::check_plugins(&self.ctx).is_empty()
    }

    fn regenerate(&mut self) -> bool {
        let report = regenerate::regenerate(&self.ctx);
        report.summarize();
        report.changed()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::Scratch;
    use super::*;
    use emurun_core::process::FakeRunner;

    #[test]
    fn test_evict_removes_existing_only() {
        let scratch = Scratch::new();
        scratch.write("android/.gradle/8.0/lock", "x");
        scratch.write("android/app/build/out.txt", "x");
        let evicted = evict(&project_caches(&scratch.layout));
        assert_eq!(evicted.len(), 2);
        assert!(!scratch.exists("android/.gradle"));
        assert!(!scratch.exists("android/app/build"));
    }

    #[test]
    fn test_version_lt() {
        assert!(version_lt("1.9.0", "1.9.2"));
        assert!(version_lt("^1.9", "1.9.2"));
        assert!(!version_lt("3.1.3", "1.9.2"));
        assert!(version_lt("26.1.10909125", "27.0.12077973"));
        assert!(!version_lt("any", "1.0.0"));
    }

    #[test]
    fn test_report_changed() {
        let mut report = RepairReport::default();
        report.record_present("a", PatchOutcome::AnchorMissing);
        report.record("b", PatchOutcome::Unchanged);
        report.command("flutter pub get", true);
        assert!(!report.changed());
        assert_eq!(report.patched.len(), 1);
        report.record("c", PatchOutcome::Inserted);
        assert!(report.changed());
    }

    #[test]
    fn test_global_cache_respects_config() {
        let scratch = Scratch::new();
        let runner = FakeRunner::new();
        let driver = scratch.driver(&runner);
        let mut config = scratch.config.clone();
        let ctx = RepairContext::new(&scratch.layout, &config, &driver)
            .with_gradle_home(Some(PathBuf::from("/home/u/.gradle")));
        assert_eq!(ctx.global_cache(), Some(PathBuf::from("/home/u/.gradle/caches")));

        config.schema.cascade.evict_global_gradle_cache = false;
        let ctx = RepairContext::new(&scratch.layout, &config, &driver)
            .with_gradle_home(Some(PathBuf::from("/home/u/.gradle")));
        assert_eq!(ctx.global_cache(), None);
    }
}
