//! Configuration loading and schema definitions
//!
//! Configuration lives in an optional `emurun.toml` in the project root.

mod loader;
mod schema;

pub use loader::Config;
pub use schema::*;
