//! Terminal helpers for emurun
//!
//! Provides shared CLI functionality:
//! - Status messages and formatting
//! - Progress spinners
//! - Line prompts

#![warn(missing_docs)]

pub mod output;
pub mod progress;
pub mod prompt;
