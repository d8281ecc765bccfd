//! Progress indicators
//!
//! Spinners for long waits (emulator boot, builds). Hidden when disabled so
//! callers never branch on quiet mode themselves.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a spinner for indeterminate progress
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner:.blue} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// A spinner when `enabled`, otherwise a hidden bar with the same API
pub fn spinner_if(enabled: bool, message: &str) -> ProgressBar {
    if enabled {
        spinner(message)
    } else {
        ProgressBar::hidden()
    }
}

/// Finish a progress bar with a success message
pub fn finish_success(pb: &ProgressBar, message: &str) {
    pb.finish_with_message(format!("✓ {message}"));
}

/// Finish a progress bar with an error message
pub fn finish_error(pb: &ProgressBar, message: &str) {
    pb.finish_with_message(format!("✗ {message}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spinner_creation() {
        let pb = spinner("Waiting for boot...");
        finish_success(&pb, "booted");
    }

    #[test]
    fn test_disabled_spinner_is_hidden() {
        let pb = spinner_if(false, "quiet");
        assert!(pb.is_hidden());
        finish_error(&pb, "done");
    }
}
