//! Core utilities for emurun
//!
//! This crate provides the shared plumbing used by the Android tooling:
//!
//! - **Error handling**: errors with codes, context, and recovery suggestions
//! - **Process execution**: the [`process::CommandRunner`] seam, with a real
//!   runner (timeouts, streaming, injected toolchain environment) and a
//!   scripted fake for tests
//! - **Configuration**: TOML-based configuration with serde defaults
//! - **File scanning**: build-script discovery that skips build output
//!
//! # Example
//!
//! ```rust,no_run
//! use emurun_core::process::{CommandRunner, Invocation, SystemRunner, ToolchainEnv};
//!
//! let runner = SystemRunner::new(ToolchainEnv::from_process());
//! let result = runner.run(&Invocation::new("flutter", ["--version"]))?;
//! if result.success {
//!     println!("{}", result.stdout);
//! }
//! # Ok::<(), emurun_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod file_scanner;
pub mod process;

pub use error::{Error, ErrorCode, Result, ResultExt};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, ConfigSchema};
    pub use crate::error::{exit_codes, Error, ErrorCode, Result, ResultExt};
    pub use crate::process::{
        run_lenient, CommandResult, CommandRunner, Invocation, OutputMode, SystemRunner,
        ToolchainEnv,
    };
}
