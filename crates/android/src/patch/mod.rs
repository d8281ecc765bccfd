//! Configuration patcher
//!
//! Every build-script edit is a [`PatchRule`]: a field pattern with a named
//! `value` group, a replacement template and an ordered list of anchors to
//! insert after when the field is absent. [`patch_field`] applies any rule:
//!
//! - field present with another value: replaced in place
//! - field present with the requested value: file untouched
//! - field absent: inserted after the first anchor that matches
//! - no anchor matches: nothing written, [`PatchOutcome::AnchorMissing`]
//!
//! File-level helpers ([`rewrite`], [`write_file`]) cover the edits that are
//! not single fields. Nothing in this module returns an error: I/O failures
//! are logged and reported as [`PatchOutcome::Failed`]. Every write that
//! changes content is preceded by a backup (see [`backup`]).

pub mod backup;
pub mod rules;

use regex::Regex;
use std::fmt;
use std::path::Path;

/// An anchor to insert after when the field is missing
#[derive(Debug, Clone)]
pub struct Anchor {
    pattern: Regex,
    insert: String,
}

/// A declarative (file, field) edit
#[derive(Debug, Clone)]
pub struct PatchRule {
    /// Short identifier used in logs
    pub name: &'static str,
    field: Regex,
    replacement: String,
    anchors: Vec<Anchor>,
}

impl PatchRule {
    /// A rule whose `field` pattern has a `value` group
    ///
    /// `replacement` may reference any capture group as `${name}` and the new
    /// value as `{value}`.
    pub fn new(name: &'static str, field: &str, replacement: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            field: Regex::new(field)?,
            replacement: replacement.to_string(),
            anchors: Vec::new(),
        })
    }

    /// Add an anchor; `insert` is placed right after the anchor match
    pub fn anchor(mut self, pattern: &str, insert: &str) -> Result<Self, regex::Error> {
        self.anchors.push(Anchor {
            pattern: Regex::new(pattern)?,
            insert: insert.to_string(),
        });
        Ok(self)
    }

    /// Current values of every occurrence of the field, unquoted
    pub fn values<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.field
            .captures_iter(text)
            .filter_map(|caps| caps.name("value"))
            .map(|m| unquote(m.as_str()))
            .collect()
    }

    /// First current value of the field, unquoted
    pub fn value<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.values(text).into_iter().next()
    }
}

/// In-memory result of applying a rule to text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// Field replaced; `previous` is the first differing old value
    Replaced { text: String, previous: String },
    /// Field inserted after an anchor
    Inserted { text: String },
    /// Nothing to do
    Same,
    /// Field absent and no anchor found
    NoAnchor,
}

/// Apply `rule` so the field holds `value`
pub fn apply(text: &str, rule: &PatchRule, value: &str) -> Edit {
    apply_with(text, rule, value, false)
}

/// Insert the field only when it is absent; an existing value is kept
pub fn apply_if_absent(text: &str, rule: &PatchRule, value: &str) -> Edit {
    apply_with(text, rule, value, true)
}

fn apply_with(text: &str, rule: &PatchRule, value: &str, keep_existing: bool) -> Edit {
    let current = rule.values(text);
    if !current.is_empty() {
        if keep_existing {
            return Edit::Same;
        }
        let Some(previous) = current.iter().find(|v| **v != value) else {
            return Edit::Same;
        };
        let previous = (*previous).to_string();
        let rendered = rule.replacement.replace("{value}", &value.replace('$', "$$"));
        let text = rule.field.replace_all(text, rendered.as_str()).into_owned();
        return Edit::Replaced { text, previous };
    }

    for anchor in &rule.anchors {
        if let Some(found) = anchor.pattern.find(text) {
            let insert = anchor.insert.replace("{value}", value);
            let mut patched = String::with_capacity(text.len() + insert.len());
            patched.push_str(&text[..found.end()]);
            patched.push_str(&insert);
            patched.push_str(&text[found.end()..]);
            return Edit::Inserted { text: patched };
        }
    }
    Edit::NoAnchor
}

fn unquote(raw: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = raw.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            return inner;
        }
    }
    raw
}

/// What a file operation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Content changed; `previous` is the old field value when known
    Updated { previous: Option<String> },
    /// Field inserted after an anchor
    Inserted,
    /// File did not exist and was written
    Created,
    /// Already in the requested state
    Unchanged,
    /// Field absent and nowhere to insert it
    AnchorMissing,
    /// Target file does not exist
    FileMissing,
    /// I/O error while reading, backing up or writing
    Failed(String),
}

impl PatchOutcome {
    /// The file now differs from before
    pub fn changed(&self) -> bool {
        matches!(self, Self::Updated { .. } | Self::Inserted | Self::Created)
    }

    /// The file is in the requested state, whether or not it was touched
    pub fn is_ok(&self) -> bool {
        self.changed() || *self == Self::Unchanged
    }
}

impl fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Updated { previous: Some(p) } => write!(f, "updated (was {p})"),
            Self::Updated { previous: None } => write!(f, "updated"),
            Self::Inserted => write!(f, "inserted"),
            Self::Created => write!(f, "created"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::AnchorMissing => write!(f, "no insertion point"),
            Self::FileMissing => write!(f, "file missing"),
            Self::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// A tool version observed against the version a patch requires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionTriple {
    /// Tool name ("ndk", "gradle", "kotlin", ...)
    pub tool: &'static str,
    /// Version found in the project, if any
    pub current: Option<String>,
    /// Version the project is being moved to
    pub required: String,
}

impl VersionTriple {
    /// Whether the project already has the required version
    pub fn satisfied(&self) -> bool {
        self.current.as_deref() == Some(self.required.as_str())
    }
}

impl fmt::Display for VersionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {}",
            self.tool,
            self.current.as_deref().unwrap_or("unset"),
            self.required
        )
    }
}

/// Make the field of `rule` in `path` hold `value`
pub fn patch_field(path: &Path, rule: &PatchRule, value: &str) -> PatchOutcome {
    let outcome = edit_file(path, |text| apply(text, rule, value));
    log_outcome(path, rule.name, value, &outcome);
    outcome
}

/// Insert the field of `rule` in `path` only when it is absent
pub fn ensure_field(path: &Path, rule: &PatchRule, value: &str) -> PatchOutcome {
    let outcome = edit_file(path, |text| apply_if_absent(text, rule, value));
    log_outcome(path, rule.name, value, &outcome);
    outcome
}

/// Free-form edit of an existing file
pub fn rewrite(path: &Path, edit: impl FnOnce(&str) -> String) -> PatchOutcome {
    edit_file(path, |text| {
        let patched = edit(text);
        if patched == text {
            Edit::Same
        } else {
            Edit::Replaced {
                text: patched,
                previous: String::new(),
            }
        }
    })
}

/// Write a whole file, creating it (and its parent) when missing
pub fn write_file(path: &Path, content: &str) -> PatchOutcome {
    if !path.exists() {
        let created = path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| std::fs::write(path, content));
        return match created {
            Ok(()) => {
                tracing::info!(path = %path.display(), "created file");
                PatchOutcome::Created
            }
            Err(e) => failed(path, &e),
        };
    }
    rewrite(path, |_| content.to_string())
}

/// Put back content saved before a patch, without taking another backup
pub fn restore(path: &Path, content: &str) -> PatchOutcome {
    match std::fs::write(path, content) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "restored file");
            PatchOutcome::Updated { previous: None }
        }
        Err(e) => failed(path, &e),
    }
}

fn edit_file(path: &Path, edit: impl FnOnce(&str) -> Edit) -> PatchOutcome {
    let original = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "file to patch does not exist");
            return PatchOutcome::FileMissing;
        }
        Err(e) => return failed(path, &e),
    };

    let (patched, outcome) = match edit(&original) {
        Edit::Same => return PatchOutcome::Unchanged,
        Edit::NoAnchor => return PatchOutcome::AnchorMissing,
        Edit::Replaced { text, previous } => {
            let previous = (!previous.is_empty()).then_some(previous);
            (text, PatchOutcome::Updated { previous })
        }
        Edit::Inserted { text } => (text, PatchOutcome::Inserted),
    };

    if let Err(err) = backup::write_backup(path, &original) {
        tracing::warn!(path = %path.display(), code = %err.code, "backup failed; file left untouched");
        return PatchOutcome::Failed(err.to_string());
    }
    match std::fs::write(path, patched) {
        Ok(()) => outcome,
        Err(e) => failed(path, &e),
    }
}

fn failed(path: &Path, err: &std::io::Error) -> PatchOutcome {
    tracing::warn!(path = %path.display(), error = %err, "patch failed");
    PatchOutcome::Failed(err.to_string())
}

fn log_outcome(path: &Path, rule: &str, value: &str, outcome: &PatchOutcome) {
    match outcome {
        PatchOutcome::AnchorMissing => tracing::warn!(
            path = %path.display(),
            rule,
            "field missing and no anchor to insert after"
        ),
        o if o.changed() => tracing::info!(path = %path.display(), rule, value, %outcome, "patched"),
        _ => tracing::debug!(path = %path.display(), rule, %outcome, "patch not applied"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn ndk_rule() -> PatchRule {
        PatchRule::new(
            "ndk",
            r#"(?m)^(?P<indent>[ \t]*)ndkVersion\b[ \t]*=?[ \t]*(?P<value>"[^"\n]*"|'[^'\n]*'|[\w.$]+)"#,
            r#"${indent}ndkVersion "{value}""#,
        )
        .unwrap()
        .anchor(r"(?m)^[ \t]*android\s*\{", "\n    ndkVersion \"{value}\"")
        .unwrap()
    }

    #[test]
    fn test_replace_existing_value() {
        let text = "android {\n    ndkVersion '21.4.7075529'\n}\n";
        let Edit::Replaced { text, previous } = apply(text, &ndk_rule(), "23.1.7779620") else {
            panic!("expected replacement");
        };
        assert_eq!(previous, "21.4.7075529");
        assert_eq!(text, "android {\n    ndkVersion \"23.1.7779620\"\n}\n");
    }

    #[test]
    fn test_equal_value_ignores_quote_style() {
        let text = "android {\n    ndkVersion '23.1.7779620'\n}\n";
        assert_eq!(apply(text, &ndk_rule(), "23.1.7779620"), Edit::Same);
    }

    #[test]
    fn test_insert_after_anchor() {
        let text = "android {\n    compileSdkVersion 33\n}\n";
        let Edit::Inserted { text } = apply(text, &ndk_rule(), "27.0.12077973") else {
            panic!("expected insertion");
        };
        assert_eq!(
            text,
            "android {\n    ndkVersion \"27.0.12077973\"\n    compileSdkVersion 33\n}\n"
        );
        assert_eq!(apply(&text, &ndk_rule(), "27.0.12077973"), Edit::Same);
    }

    #[test]
    fn test_no_anchor() {
        assert_eq!(apply("plugins {}\n", &ndk_rule(), "27.0.1"), Edit::NoAnchor);
    }

    #[test]
    fn test_if_absent_keeps_existing() {
        let text = "android {\n    ndkVersion \"21.4.7075529\"\n}\n";
        assert_eq!(apply_if_absent(text, &ndk_rule(), "27.0.1"), Edit::Same);
    }

    #[test]
    fn test_dollar_in_value_is_literal() {
        let text = "android {\n    ndkVersion \"1\"\n}\n";
        let Edit::Replaced { text, .. } = apply(text, &ndk_rule(), "$x") else {
            panic!("expected replacement");
        };
        assert!(text.contains("ndkVersion \"$x\""));
    }

    #[test]
    fn test_patch_field_writes_backup_of_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.gradle");
        let original = "android {\n    ndkVersion \"21.4.7075529\"\n}\n";
        fs::write(&path, original).unwrap();

        let outcome = patch_field(&path, &ndk_rule(), "23.1.7779620");
        assert_eq!(
            outcome,
            PatchOutcome::Updated {
                previous: Some("21.4.7075529".to_string())
            }
        );
        assert_eq!(fs::read_to_string(dir.path().join("build.gradle.bak")).unwrap(), original);
        assert!(fs::read_to_string(&path).unwrap().contains("23.1.7779620"));
    }

    #[test]
    fn test_second_patch_is_unchanged_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.gradle");
        fs::write(&path, "android {\n}\n").unwrap();

        assert_eq!(patch_field(&path, &ndk_rule(), "27.0.12077973"), PatchOutcome::Inserted);
        let after_first = fs::read_to_string(&path).unwrap();
        assert_eq!(patch_field(&path, &ndk_rule(), "27.0.12077973"), PatchOutcome::Unchanged);
        assert_eq!(fs::read_to_string(&path).unwrap(), after_first);
        let backups = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".bak"))
            .count();
        assert_eq!(backups, 1);
    }

    #[test]
    fn test_missing_file_and_anchor_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.gradle");
        assert_eq!(patch_field(&path, &ndk_rule(), "1"), PatchOutcome::FileMissing);

        fs::write(&path, "// empty\n").unwrap();
        assert_eq!(patch_field(&path, &ndk_rule(), "1"), PatchOutcome::AnchorMissing);
        assert_eq!(fs::read_to_string(&path).unwrap(), "// empty\n");
    }

    #[test]
    fn test_write_file_creates_then_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gradle/wrapper/gradle-wrapper.properties");
        assert_eq!(write_file(&path, "a=1\n"), PatchOutcome::Created);
        assert_eq!(write_file(&path, "a=1\n"), PatchOutcome::Unchanged);
        assert!(write_file(&path, "a=2\n").changed());
        assert_eq!(
            fs::read_to_string(backup::first_backup_path(&path)).unwrap(),
            "a=1\n"
        );
    }

    #[test]
    fn test_restore_skips_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pubspec.yaml");
        fs::write(&path, "new").unwrap();
        assert!(restore(&path, "old").changed());
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
        assert!(!backup::first_backup_path(&path).exists());
    }

    #[test]
    fn test_version_triple_display() {
        let triple = VersionTriple {
            tool: "ndk",
            current: None,
            required: "27.0.12077973".to_string(),
        };
        assert_eq!(triple.to_string(), "ndk: unset -> 27.0.12077973");
        assert!(!triple.satisfied());
    }
}
