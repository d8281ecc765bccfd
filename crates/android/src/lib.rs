//! Flutter-on-Android build automation
//!
//! This crate provides the pieces behind the `emurun` command:
//! - Toolchain probing (Flutter, Android SDK, JDK)
//! - Emulator listing, selection and boot
//! - Build-file patching with backups
//! - Failure classification and the repair cascade
//! - The end-to-end [`workflow`]
//!
//! Every external command goes through
//! [`emurun_core::process::CommandRunner`], so the whole flow runs against a
//! scripted runner in tests.

#![warn(missing_docs)]

pub mod cascade;
pub mod classify;
pub mod driver;
pub mod emulator;
pub mod errorlog;
pub mod patch;
pub mod probe;
pub mod project;
pub mod reconcile;
pub mod repair;
pub mod workflow;

pub use cascade::{CascadeOutcome, RepairCascade, RepairKind, Stage};
pub use classify::{classify, Issue, IssueKind};
pub use workflow::{run, RunOptions};
