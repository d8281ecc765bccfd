//! Error log written when every remedy failed

use crate::cascade::RepairAttempt;
use chrono::{DateTime, Local};
use emurun_core::error::{Error, Result, ResultExt};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// `emurun_error_log_<YYYYmmdd_HHMMSS>.txt`
pub fn file_name(created: DateTime<Local>) -> String {
    format!("emurun_error_log_{}.txt", created.format("%Y%m%d_%H%M%S"))
}

/// Everything needed to reproduce a failed run
#[derive(Debug, Clone)]
pub struct ErrorLog {
    /// When the run failed
    pub created: DateTime<Local>,
    /// Telemetry session id
    pub session_id: String,
    /// Emulator the build targeted, if any
    pub emulator: Option<String>,
    /// Its Android version, if known
    pub android_version: Option<String>,
    /// First line of `flutter --version`
    pub flutter_version: Option<String>,
    /// Remedies tried, in order
    pub attempts: Vec<RepairAttempt>,
    /// Output of the last failed build
    pub output: String,
}

impl ErrorLog {
    /// Log stamped now with the current session
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            created: Local::now(),
            session_id: emurun_telemetry::session_id().to_string(),
            emulator: None,
            android_version: None,
            flutter_version: None,
            attempts: Vec::new(),
            output: output.into(),
        }
    }

    /// Text of the log
    pub fn render(&self) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "emurun error log");
        let _ = writeln!(text, "Date: {}", self.created.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(text, "Session: {}", self.session_id);
        match (&self.emulator, &self.android_version) {
            (Some(name), Some(version)) => {
                let _ = writeln!(text, "Emulator: {name} (Android {version})");
            }
            (Some(name), None) => {
                let _ = writeln!(text, "Emulator: {name}");
            }
            _ => {}
        }
        let _ = writeln!(
            text,
            "Flutter: {}",
            self.flutter_version.as_deref().unwrap_or("unknown")
        );

        let _ = writeln!(text, "\nAttempted fixes:");
        if self.attempts.is_empty() {
            let _ = writeln!(text, "  (none)");
        }
        for attempt in &self.attempts {
            let _ = writeln!(text, "  - {attempt}");
        }

        let _ = writeln!(text, "\nError output:\n{}", self.output.trim_end());
        text
    }

    /// Write the log into `dir`, returning its path
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .map_err(Error::from)
            .context(format!("creating {}", dir.display()))?;
        let path = dir.join(file_name(self.created));
        std::fs::write(&path, self.render())
            .map_err(Error::from)
            .context(format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "error log written");
        Ok(path)
    }
}
