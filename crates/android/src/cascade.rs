//! The repair cascade
//!
//! Build; on failure walk [`RepairKind::ORDER`] once. A kind is selected when
//! the latest failure output classifies as its issue, and gets one repair and
//! (if the repair changed anything) one rebuild. Patches accumulate and are
//! never rolled back. After the ordered kinds, platform regeneration runs
//! once when allowed. The build and the repairs sit behind [`BuildStep`] and
//! [`RepairToolkit`] so the walk can be tested without a project.

use crate::classify::{classify_all, IssueKind};
use crate::driver::BuildReport;
use std::fmt;

/// Where the run is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Nothing done yet
    Init,
    /// Checking flutter, the SDK and the project
    ProbeEnv,
    /// Applying pre-build patches
    PreemptivePatch,
    /// Running the first build
    Build,
    /// Finding out why the build failed
    Classify,
    /// Picking the next repair
    SelectRepair,
    /// Running a repair
    Patch(RepairKind),
    /// Rebuilding after a repair
    Retry,
    /// Last resort
    RegeneratePlatform,
    /// Build succeeded
    Success,
    /// Every remedy was tried
    Exhausted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patch(kind) => write!(f, "patch({kind})"),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}

/// Targeted repairs, in the order they are attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepairKind {
    /// Pin the NDK the build asked for
    Ndk,
    /// Convert Kotlin DSL scripts to Groovy
    KotlinDsl,
    /// Match Gradle, AGP and Kotlin to the JDK
    JavaGradle,
    /// Pin or upgrade problematic plugins
    Plugins,
    /// Emergency Gradle repair
    GradleCache,
}

impl RepairKind {
    /// Every kind, in cascade order
    pub const ORDER: [RepairKind; 5] = [
        Self::Ndk,
        Self::KotlinDsl,
        Self::JavaGradle,
        Self::Plugins,
        Self::GradleCache,
    ];

    /// The classified issue that selects this repair
    pub fn issue(self) -> IssueKind {
        match self {
            Self::Ndk => IssueKind::NdkMismatch,
            Self::KotlinDsl => IssueKind::KotlinDsl,
            Self::JavaGradle => IssueKind::JavaGradle,
            Self::Plugins => IssueKind::PluginIncompatible,
            Self::GradleCache => IssueKind::GradleCache,
        }
    }

    /// Name used in logs and the error log
    pub fn label(self) -> &'static str {
        match self {
            Self::Ndk => "NDK version fix",
            Self::KotlinDsl => "Kotlin DSL conversion",
            Self::JavaGradle => "Java/Gradle compatibility fix",
            Self::Plugins => "plugin fix",
            Self::GradleCache => "emergency Gradle repair",
        }
    }
}

impl fmt::Display for RepairKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Something that was tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remedy {
    /// A targeted repair
    Repair(RepairKind),
    /// Regenerating the Android directory
    Regenerate,
}

impl fmt::Display for Remedy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repair(kind) => write!(f, "{kind}"),
            Self::Regenerate => f.write_str("platform regeneration"),
        }
    }
}

/// One remedy and what came of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairAttempt {
    /// What was tried
    pub remedy: Remedy,
    /// Whether it changed the project
    pub changed: bool,
    /// Outcome of the rebuild, `None` when nothing changed and no rebuild ran
    pub rebuilt: Option<bool>,
}

impl fmt::Display for RepairAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self.rebuilt {
            Some(true) => "build succeeded",
            Some(false) => "build still failing",
            None => "nothing to change",
        };
        write!(f, "{}: {result}", self.remedy)
    }
}

/// How the cascade ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeOutcome {
    /// A build succeeded
    Success {
        /// Remedies tried before it did
        attempts: Vec<RepairAttempt>,
    },
    /// Nothing worked
    Exhausted {
        /// Remedies tried
        attempts: Vec<RepairAttempt>,
        /// Output of the last failed build
        output: String,
    },
}

impl CascadeOutcome {
    /// Whether a build succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Remedies tried
    pub fn attempts(&self) -> &[RepairAttempt] {
        match self {
            Self::Success { attempts } | Self::Exhausted { attempts, .. } => attempts,
        }
    }
}

/// A build the cascade can repeat
pub trait BuildStep {
    /// Build once; `attempt` is 0 for the first build
    fn build(&mut self, attempt: usize) -> BuildReport;
}

/// The repairs the cascade can call
pub trait RepairToolkit {
    /// Run one repair given the latest failure output; true when the project changed
    fn repair(&mut self, kind: RepairKind, output: &str) -> bool;

    /// Whether a known problematic plugin is in the dependency graph
    fn has_problem_plugin(&mut self) -> bool;

    /// Regenerate the Android directory; true when it was recreated
    fn regenerate(&mut self) -> bool;
}

/// The cascade state machine
#[derive(Debug)]
pub struct RepairCascade {
    stage: Stage,
    allow_regenerate: bool,
    builds: usize,
}

impl Default for RepairCascade {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RepairCascade {
    /// New cascade; `allow_regenerate` enables the last resort
    pub fn new(allow_regenerate: bool) -> Self {
        Self {
            stage: Stage::Init,
            allow_regenerate,
            builds: 0,
        }
    }

    /// Current stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Move to `next`
    pub fn enter(&mut self, next: Stage) {
        tracing::debug!(from = %self.stage, to = %next, "cascade transition");
        self.stage = next;
    }

    fn build(&mut self, step: &mut impl BuildStep) -> BuildReport {
        let report = step.build(self.builds);
        self.builds += 1;
        report
    }

    /// Build, repairing until a build succeeds or every remedy was tried
    pub fn run(&mut self, step: &mut impl BuildStep, toolkit: &mut impl RepairToolkit) -> CascadeOutcome {
        let mut attempts = Vec::new();

        self.enter(Stage::Build);
        let first = self.build(step);
        if first.success {
            self.enter(Stage::Success);
            return CascadeOutcome::Success { attempts };
        }
        let mut output = first.output;

        for kind in RepairKind::ORDER {
            self.enter(Stage::Classify);
            let issues = classify_all(&output);
            self.enter(Stage::SelectRepair);
            let selected = issues.iter().any(|issue| issue.kind == kind.issue())
                || (kind == RepairKind::Plugins && toolkit.has_problem_plugin());
            if !selected {
                continue;
            }

            tracing::info!(repair = %kind, "attempting repair");
            self.enter(Stage::Patch(kind));
            let changed = toolkit.repair(kind, &output);
            if !changed {
                attempts.push(RepairAttempt {
                    remedy: Remedy::Repair(kind),
                    changed,
                    rebuilt: None,
                });
                continue;
            }

            self.enter(Stage::Retry);
            let report = self.build(step);
            attempts.push(RepairAttempt {
                remedy: Remedy::Repair(kind),
                changed,
                rebuilt: Some(report.success),
            });
            if report.success {
                self.enter(Stage::Success);
                return CascadeOutcome::Success { attempts };
            }
            output = report.output;
        }

        if self.allow_regenerate {
            self.enter(Stage::RegeneratePlatform);
            let changed = toolkit.regenerate();
            let rebuilt = changed.then(|| self.build(step));
            attempts.push(RepairAttempt {
                remedy: Remedy::Regenerate,
                changed,
                rebuilt: rebuilt.as_ref().map(|r| r.success),
            });
            if let Some(report) = rebuilt {
                if report.success {
                    self.enter(Stage::Success);
                    return CascadeOutcome::Success { attempts };
                }
                output = report.output;
            }
        }

        self.enter(Stage::Exhausted);
        CascadeOutcome::Exhausted { attempts, output }
    }
}
