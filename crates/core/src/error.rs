//! Error handling with codes, context and recovery suggestions
//!
//! Every fallible operation in the workspace returns [`Result`]. Errors carry:
//! - an [`ErrorCode`] for programmatic handling (`E2001`, `E4002`, ...)
//! - optional context describing what was being attempted
//! - an optional recovery suggestion shown to the user

use std::fmt;
use thiserror::Error;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // IO errors (2xxx)
    IoError = 2000,
    FileNotFound = 2001,
    PermissionDenied = 2002,

    // Configuration errors (3xxx)
    ConfigError = 3000,
    ConfigNotFound = 3001,

    // Toolchain errors (4xxx)
    SdkNotFound = 4001,
    FlutterNotFound = 4002,
    EmulatorNotFound = 4003,
    NoEmulators = 4004,
    InvalidSelection = 4005,
    NotAFlutterProject = 4006,

    // Process errors (5xxx)
    ProcessError = 5000,
    CommandNotFound = 5001,

    // Validation errors (6xxx)
    ValidationError = 6000,

    // Patch errors (7xxx)
    BackupFailed = 7002,

    // Build errors (8xxx)
    CascadeExhausted = 8003,
}

impl ErrorCode {
    /// Get the numeric code
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Get a human-readable category
    pub fn category(&self) -> &'static str {
        match self.code() / 1000 {
            2 => "IO",
            3 => "Configuration",
            4 => "Toolchain",
            5 => "Process",
            6 => "Validation",
            7 => "Patch",
            8 => "Build",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

/// Main error type with rich context
#[derive(Error, Debug)]
pub struct Error {
    /// Error code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Additional context
    pub context: Option<String>,
    /// Recovery suggestion
    pub suggestion: Option<String>,
    /// Source error
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ctx) = &self.context {
            write!(f, "\n  Context: {ctx}")?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n  Suggestion: {suggestion}")?;
        }
        Ok(())
    }
}

impl Error {
    /// Create a new error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            suggestion: None,
            source: None,
        }
    }

    /// Add context to the error
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a recovery suggestion
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add a source error
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors

    /// Configuration could not be loaded
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// An explicitly requested configuration file is missing
    pub fn config_not_found(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(
            ErrorCode::ConfigNotFound,
            format!("Configuration file not found: {}", path.as_ref().display()),
        )
        .with_suggestion("Create an emurun.toml file or use --config to specify a path")
    }

    /// No Android SDK could be located
    pub fn sdk_not_found() -> Self {
        Self::new(ErrorCode::SdkNotFound, "Android SDK not found")
            .with_suggestion("Install the Android SDK and set ANDROID_HOME or ANDROID_SDK_ROOT")
    }

    /// Working directory is not a Flutter project
    pub fn not_a_flutter_project(dir: impl AsRef<std::path::Path>) -> Self {
        Self::new(
            ErrorCode::NotAFlutterProject,
            format!("Not a Flutter project: {}", dir.as_ref().display()),
        )
        .with_suggestion("Run from the project root (the directory containing lib/main.dart)")
    }

    /// Process execution failure
    pub fn process(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProcessError, message)
    }

    /// A program could not be found or spawned
    pub fn command_not_found(cmd: &str) -> Self {
        Self::new(ErrorCode::CommandNotFound, format!("Command not found: {cmd}"))
            .with_suggestion(format!("Install {cmd} and ensure it's in your PATH"))
    }

    /// Invalid user input
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// `emulator -list-avds` reported nothing
    pub fn no_emulators() -> Self {
        Self::new(ErrorCode::NoEmulators, "No Android emulators available")
            .with_suggestion("Create one with Android Studio's Device Manager or avdmanager")
    }

    /// The emulator selector matched nothing, or the prompt was closed
    pub fn invalid_selection(selector: Option<&str>) -> Self {
        let message = match selector {
            Some(selector) => format!("No emulator matches '{selector}'"),
            None => "No emulator selected".to_string(),
        };
        Self::new(ErrorCode::InvalidSelection, message)
            .with_suggestion("Pass --emulator with a name or number from --list")
    }

    /// A backup could not be written, so the file was left alone
    pub fn backup_failed(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::new(
            ErrorCode::BackupFailed,
            format!("Could not back up {}: {source}", path.as_ref().display()),
        )
        .with_source(source)
    }

    /// Every repair was tried and the build still fails
    pub fn cascade_exhausted(attempts: usize) -> Self {
        Self::new(
            ErrorCode::CascadeExhausted,
            format!("Build still failing after {attempts} repair attempt(s)"),
        )
        .with_suggestion("Check the error log and fix the remaining issue by hand")
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Exit codes for the CLI
///
/// Every failure maps to [`FAILURE`](exit_codes::FAILURE); callers that only
/// check for non-zero exit rely on this.
pub mod exit_codes {
    /// Run completed successfully
    pub const SUCCESS: i32 = 0;
    /// Any failure: missing toolchain, bad selection, unrecovered build
    pub const FAILURE: i32 = 1;
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            _ => ErrorCode::IoError,
        };
        Error::new(code, err.to_string()).with_source(err)
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Attach context to the error, if any
    fn context(self, context: impl Into<String>) -> Result<T>;
    /// Attach a recovery suggestion to the error, if any
    fn with_suggestion(self, suggestion: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_suggestion(self, suggestion: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_suggestion(suggestion))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::FileNotFound.to_string(), "E2001");
        assert_eq!(ErrorCode::NoEmulators.to_string(), "E4004");
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::IoError.category(), "IO");
        assert_eq!(ErrorCode::SdkNotFound.category(), "Toolchain");
        assert_eq!(ErrorCode::BackupFailed.category(), "Patch");
        assert_eq!(ErrorCode::CascadeExhausted.category(), "Build");
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::config_not_found("/path/to/emurun.toml").with_context("While loading configuration");

        assert_eq!(err.code, ErrorCode::ConfigNotFound);
        assert!(err.context.is_some());
        assert!(err.suggestion.is_some());
    }

    #[test]
    fn test_invalid_selection_names_the_selector() {
        let err = Error::invalid_selection(Some("Nexus"));
        assert_eq!(err.code, ErrorCode::InvalidSelection);
        assert!(err.message.contains("'Nexus'"));
        assert_eq!(Error::invalid_selection(None).message, "No emulator selected");
    }

    #[test]
    fn test_backup_failed_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = Error::backup_failed("/p/build.gradle", io);
        assert!(err.to_string().starts_with("[E7002] Could not back up /p/build.gradle"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_display_includes_code_and_suggestion() {
        let rendered = Error::sdk_not_found().to_string();
        assert!(rendered.starts_with("[E4001]"));
        assert!(rendered.contains("ANDROID_HOME"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert_eq!(err.code, ErrorCode::FileNotFound);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_result_ext_context() {
        let result: Result<()> = Err(Error::process("boom"));
        let err = result.context("running flutter").unwrap_err();
        assert_eq!(err.context.as_deref(), Some("running flutter"));
    }
}
