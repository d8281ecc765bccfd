//! Build failure classification
//!
//! An ordered table of detectors over captured build output. [`classify`]
//! returns the first match, [`classify_all`] every match in table order.
//! Both are pure.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Kinds of known failures, in the order repairs are attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IssueKind {
    /// A plugin needs a different NDK than the project pins
    NdkMismatch,
    /// Kotlin DSL build scripts fail to compile
    KotlinDsl,
    /// Gradle cannot run on the installed JDK
    JavaGradle,
    /// A plugin uses a removed Android embedding API
    PluginIncompatible,
    /// Gradle's caches are corrupt or locked
    GradleCache,
}

impl IssueKind {
    /// Every kind, in repair order
    pub const ORDER: [IssueKind; 5] = [
        Self::NdkMismatch,
        Self::KotlinDsl,
        Self::JavaGradle,
        Self::PluginIncompatible,
        Self::GradleCache,
    ];

    /// Short label for logs and the error log
    pub fn label(self) -> &'static str {
        match self {
            Self::NdkMismatch => "NDK version mismatch",
            Self::KotlinDsl => "Kotlin DSL incompatibility",
            Self::JavaGradle => "Java/Gradle incompatibility",
            Self::PluginIncompatible => "plugin incompatibility",
            Self::GradleCache => "Gradle cache corruption",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A recognised failure with whatever detail the output carried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// What went wrong
    pub kind: IssueKind,
    /// NDK version required, or the plugin at fault
    pub detail: Option<String>,
}

impl Issue {
    /// NDK version the output asked for
    pub fn required_ndk(&self) -> Option<&str> {
        match self.kind {
            IssueKind::NdkMismatch => self.detail.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({detail})", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

struct Detector {
    kind: IssueKind,
    pattern: Regex,
}

fn detector(kind: IssueKind, pattern: &str) -> Detector {
    Detector {
        kind,
        pattern: Regex::new(pattern).expect("Invalid detector regex"),
    }
}

/// Detectors in priority order; a `detail` group, when present, is captured
static DETECTORS: Lazy<Vec<Detector>> = Lazy::new(|| {
    vec![
        detector(
            IssueKind::NdkMismatch,
            r"requires Android NDK (?P<detail>\d+(?:\.\d+)+)",
        ),
        detector(IssueKind::NdkMismatch, r"requires Android NDK"),
        detector(IssueKind::KotlinDsl, r"Kotlin DSL|Script compilation errors?|\.gradle\.kts\b"),
        detector(
            IssueKind::JavaGradle,
            r"Unsupported class file major version|incompatible with the Java|Unsupported Java\b|Could not initialize class org\.codehaus\.groovy\.runtime\.InvokerHelper",
        ),
        detector(
            IssueKind::PluginIncompatible,
            r"plugin `(?P<detail>[\w-]+)` uses a deprecated version of the Android embedding",
        ),
        detector(
            IssueKind::PluginIncompatible,
            r"Plugin project :(?P<detail>[\w-]+) not found|v1 embedding|Android embedding v1|PluginRegistry\.Registrar",
        ),
        detector(
            IssueKind::GradleCache,
            r"Could not open \S+ (?:generic class )?cache|Corrupted (?:FileHashCache|cache)|Timeout waiting to lock|Could not read workspace metadata|BUG! exception in phase 'semantic analysis'",
        ),
    ]
});

fn matches(text: &str) -> impl Iterator<Item = Issue> + '_ {
    DETECTORS.iter().filter_map(move |d| {
        let caps = d.pattern.captures(text)?;
        Some(Issue {
            kind: d.kind,
            detail: caps.name("detail").map(|m| m.as_str().to_string()),
        })
    })
}

/// First known issue in `output`
pub fn classify(output: &str) -> Option<Issue> {
    let issue = matches(output).next();
    if let Some(issue) = &issue {
        tracing::debug!(%issue, "build failure classified");
    }
    issue
}

/// Every known issue in `output`, one per kind, in repair order
pub fn classify_all(output: &str) -> Vec<Issue> {
    let mut issues: Vec<Issue> = Vec::new();
    for issue in matches(output) {
        if !issues.iter().any(|seen| seen.kind == issue.kind) {
            issues.push(issue);
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    const NDK_FAILURE: &str = "\
Your project is configured with Android NDK 26.1.10909125, but the following plugin(s) depend on a different Android NDK version:
- vibration requires Android NDK 27.0.12077973
Fix this issue by using the highest Android NDK version (they are backward compatible).
Add the following to /work/app/android/app/build.gradle.kts:";

    #[test]
    fn test_ndk_requirement_selects_ndk_exactly() {
        let issue = classify("requires Android NDK 27.0.12077973").unwrap();
        assert_eq!(issue.kind, IssueKind::NdkMismatch);
        assert_eq!(issue.required_ndk(), Some("27.0.12077973"));
    }

    #[test]
    fn test_ndk_wins_over_kts_mention() {
        assert_eq!(classify(NDK_FAILURE).unwrap().kind, IssueKind::NdkMismatch);
        let kinds: Vec<_> = classify_all(NDK_FAILURE).into_iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![IssueKind::NdkMismatch, IssueKind::KotlinDsl]);
    }

    #[test]
    fn test_ndk_without_version() {
        let issue = classify("this plugin requires Android NDK").unwrap();
        assert_eq!(issue.kind, IssueKind::NdkMismatch);
        assert_eq!(issue.required_ndk(), None);
    }

    #[test]
    fn test_java_gradle() {
        let out = "General error during conversion: Unsupported class file major version 65";
        assert_eq!(classify(out).unwrap().kind, IssueKind::JavaGradle);
        let out = "Your project's Gradle version is incompatible with the Java version that Flutter is using";
        assert_eq!(classify(out).unwrap().kind, IssueKind::JavaGradle);
    }

    #[test]
    fn test_plugin_embedding() {
        let out = "The plugin `vibration` uses a deprecated version of the Android embedding.";
        let issue = classify(out).unwrap();
        assert_eq!(issue.kind, IssueKind::PluginIncompatible);
        assert_eq!(issue.detail.as_deref(), Some("vibration"));
        assert_eq!(issue.required_ndk(), None);
    }

    #[test]
    fn test_gradle_cache() {
        let out = "Could not open cp_settings generic class cache for settings file";
        assert_eq!(classify(out).unwrap().kind, IssueKind::GradleCache);
        assert_eq!(classify("Timeout waiting to lock journal cache").unwrap().kind, IssueKind::GradleCache);
    }

    #[test]
    fn test_unknown_output() {
        assert!(classify("FAILURE: Build failed with an exception.").is_none());
        assert!(classify_all("").is_empty());
    }

    #[test]
    fn test_order_matches_repair_order() {
        let mut sorted = IssueKind::ORDER;
        sorted.sort();
        assert_eq!(sorted, IssueKind::ORDER);
    }
}
