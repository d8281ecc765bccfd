//! Configuration file loading

use super::schema::ConfigSchema;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

const CANDIDATES: [&str; 3] = [".emurun.toml", "emurun.toml", ".config/emurun.toml"];

/// Configuration wrapper
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed values
    pub schema: ConfigSchema,
    /// File the values came from, if any
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load an explicit file, or search `project_dir` for a candidate, or use defaults
    ///
    /// An explicit path that does not exist is an error; a missing candidate is not.
    pub fn load(explicit: Option<&Path>, project_dir: &Path) -> Result<Self> {
        let config_path = match explicit {
            Some(path) if !path.exists() => return Err(Error::config_not_found(path)),
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file(project_dir),
        };

        let schema = match &config_path {
            Some(path) => load_config_file(path)?,
            None => ConfigSchema::default(),
        };

        if let Some(path) = &config_path {
            tracing::debug!(path = %path.display(), "loaded configuration");
        }

        Ok(Self {
            schema,
            path: config_path,
        })
    }

    /// Error-log directory with `~` expanded, relative paths resolved against `project_dir`
    pub fn log_dir(&self, project_dir: &Path) -> PathBuf {
        resolve(&self.schema.logging.log_dir, project_dir)
    }

    /// Android platform directory, relative paths resolved against `project_dir`
    pub fn android_dir(&self, project_dir: &Path) -> PathBuf {
        resolve(&self.schema.project.android_dir, project_dir)
    }
}

fn resolve(raw: &str, base: &Path) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let path = Path::new(expanded.as_ref());
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Find configuration file in standard locations
fn find_config_file(project_dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|candidate| project_dir.join(candidate))
        .find(|path| path.is_file())
}

/// Load and parse a TOML configuration file
fn load_config_file(path: &Path) -> Result<ConfigSchema> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("Failed to read config file {}: {e}", path.display())).with_source(e)
    })?;

    toml::from_str(&content).map_err(|e| {
        Error::config(format!("Failed to parse config file {}: {e}", path.display())).with_source(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginStrategy;
    use crate::error::ErrorCode;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.path.is_none());
        assert_eq!(config.schema.versions.ndk, "27.0.12077973");
        assert_eq!(config.schema.emulator.boot_timeout_secs, 60);
        assert!(config.schema.cascade.allow_regenerate);
    }

    #[test]
    fn test_missing_candidates_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(None, dir.path()).unwrap();
        assert!(config.path.is_none());
        assert_eq!(config.schema.project.android_dir, "android");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml")), dir.path()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigNotFound);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("emurun.toml"),
            "[versions]\nndk = \"26.1.10909125\"\n\n[plugins]\nstrategy = \"pin\"\n",
        )
        .unwrap();
        let config = Config::load(None, dir.path()).unwrap();
        assert_eq!(config.schema.versions.ndk, "26.1.10909125");
        assert_eq!(config.schema.versions.kotlin, "1.7.10");
        assert_eq!(config.schema.plugins.strategy, PluginStrategy::Pin);
        assert_eq!(config.schema.plugins.known[0].name, "vibration");
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[versions\nndk = ").unwrap();
        let err = Config::load(Some(&path), dir.path()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigError);
    }

    #[test]
    fn test_relative_dirs_resolve_against_project() {
        let config = Config::default();
        let root = Path::new("/work/app");
        assert_eq!(config.android_dir(root), PathBuf::from("/work/app/android"));
        assert_eq!(config.log_dir(root), PathBuf::from("/work/app/."));
    }
}
