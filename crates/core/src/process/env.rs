//! Environment handed to child processes
//!
//! The process environment of emurun itself is never mutated; SDK variables
//! and PATH additions live in a [`ToolchainEnv`] that the runner applies to
//! each child it spawns.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

/// Extra variables and PATH entries applied to every spawned command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolchainEnv {
    base_path: Option<OsString>,
    path_prefix: Vec<PathBuf>,
    vars: BTreeMap<String, String>,
}

impl ToolchainEnv {
    /// Start from an explicit base PATH
    pub fn new(base_path: Option<OsString>) -> Self {
        Self {
            base_path,
            ..Self::default()
        }
    }

    /// Start from the current process PATH
    pub fn from_process() -> Self {
        Self::new(std::env::var_os("PATH"))
    }

    /// Set a variable for children
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Look up a variable set through [`set_var`](Self::set_var)
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Variables set for children, in key order
    pub fn vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Put `dir` at the front of PATH unless it is already anywhere in it
    ///
    /// Returns whether the entry was added. Repeated calls never duplicate.
    pub fn prepend_path(&mut self, dir: impl Into<PathBuf>) -> bool {
        let dir = dir.into();
        if self.path_entries().iter().any(|entry| *entry == dir) {
            return false;
        }
        self.path_prefix.insert(0, dir);
        true
    }

    /// Effective PATH entries: prepended directories first, then the base
    pub fn path_entries(&self) -> Vec<PathBuf> {
        let base = self
            .base_path
            .as_ref()
            .map(|p| std::env::split_paths(p).collect::<Vec<_>>())
            .unwrap_or_default();
        self.path_prefix.iter().cloned().chain(base).collect()
    }

    /// Effective PATH as a single OS string
    pub fn search_path(&self) -> Option<OsString> {
        let entries = self.path_entries();
        if entries.is_empty() {
            return None;
        }
        std::env::join_paths(entries).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_prepend_puts_entry_first() {
        let mut env = ToolchainEnv::new(Some(OsString::from("/usr/bin")));
        assert!(env.prepend_path("/sdk/platform-tools"));
        assert_eq!(
            env.path_entries(),
            vec![PathBuf::from("/sdk/platform-tools"), PathBuf::from("/usr/bin")]
        );
    }

    #[test]
    fn test_prepend_skips_entry_already_in_base() {
        let mut env = ToolchainEnv::new(Some(OsString::from("/sdk/emulator")));
        assert!(!env.prepend_path("/sdk/emulator"));
        assert_eq!(env.path_entries().len(), 1);
    }

    #[test]
    fn test_empty_env_has_no_search_path() {
        assert!(ToolchainEnv::new(None).search_path().is_none());
    }

    #[test]
    fn test_vars_are_sorted() {
        let mut env = ToolchainEnv::default();
        env.set_var("ANDROID_SDK_ROOT", "/sdk");
        env.set_var("ANDROID_HOME", "/sdk");
        let keys: Vec<_> = env.vars().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["ANDROID_HOME", "ANDROID_SDK_ROOT"]);
        assert_eq!(env.var("ANDROID_HOME"), Some("/sdk"));
    }

    proptest! {
        #[test]
        fn prop_prepend_never_duplicates(dirs in proptest::collection::vec("[a-c]{1,2}", 1..12)) {
            let mut env = ToolchainEnv::new(None);
            for dir in &dirs {
                env.prepend_path(format!("/sdk/{dir}"));
            }
            for dir in &dirs {
                env.prepend_path(format!("/sdk/{dir}"));
            }
            let entries = env.path_entries();
            let mut unique = entries.clone();
            unique.sort();
            unique.dedup();
            prop_assert_eq!(entries.len(), unique.len());
        }
    }
}
