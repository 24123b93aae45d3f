//! Coordinator configuration
//!
//! Settings come from a `crac.toml` file and/or environment variables. The
//! environment wins over the file, so a deployment can pin the backend with
//! `CRAC_ENGINE=...` without editing anything.

use crate::backend::KNOWN_BACKENDS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "crac.toml";

/// Env var naming a config file to load
pub const ENV_CONFIG: &str = "CRAC_CONFIG";
/// Env var overriding the backend choice
pub const ENV_ENGINE: &str = "CRAC_ENGINE";
/// Env var giving the external engine executable
pub const ENV_ENGINE_PATH: &str = "CRAC_ENGINE_PATH";
/// Env var giving the checkpoint image directory
pub const ENV_CHECKPOINT_TO: &str = "CRAC_CHECKPOINT_TO";

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read or written
    #[error("failed to access config file '{path}': {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be rendered as TOML
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Backend override names no known backend
    #[error("unknown engine '{name}'; expected one of: {known}")]
    UnknownEngine {
        /// Name that was given
        name: String,
        /// Comma-separated known names
        known: String,
    },

    /// Sweep threshold must be positive
    #[error("sweep_threshold must be at least 1")]
    InvalidSweepThreshold,
}

/// Coordinator configuration
///
/// # Example
///
/// ```toml
/// # Backend override; when absent the known backends are probed in order
/// engine = "execengine"
/// engine_path = "/opt/crac/criuengine"
/// checkpoint_to = "/var/lib/app/cr"
/// sweep_threshold = 64
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CracConfig {
    /// Backend override; only this backend is probed when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// External engine executable used by `execengine`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_path: Option<PathBuf>,
    /// Directory the external engine writes the checkpoint image to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_to: Option<PathBuf>,
    /// Registry size that triggers an opportunistic sweep on register
    #[serde(default = "default_sweep_threshold")]
    pub sweep_threshold: usize,
}

fn default_sweep_threshold() -> usize {
    crac_context::DEFAULT_SWEEP_THRESHOLD
}

impl Default for CracConfig {
    fn default() -> Self {
        Self {
            engine: None,
            engine_path: None,
            checkpoint_to: None,
            sweep_threshold: default_sweep_threshold(),
        }
    }
}

impl CracConfig {
    /// Config selecting a specific backend, everything else default
    pub fn with_engine(engine: impl Into<String>) -> Self {
        Self {
            engine: Some(engine.into()),
            ..Self::default()
        }
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.engine {
            if !KNOWN_BACKENDS.iter().any(|c| c.name == name.as_str()) {
                return Err(ConfigError::UnknownEngine {
                    name: name.clone(),
                    known: KNOWN_BACKENDS
                        .iter()
                        .map(|c| c.name)
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
        }
        if self.sweep_threshold == 0 {
            return Err(ConfigError::InvalidSweepThreshold);
        }
        Ok(())
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: CracConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from the process environment
    ///
    /// Starts from the file named by `CRAC_CONFIG` (if any), then applies
    /// `CRAC_ENGINE`, `CRAC_ENGINE_PATH` and `CRAC_CHECKPOINT_TO`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(ENV_CONFIG).filter(|v| !v.is_empty()) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(engine) = lookup(ENV_ENGINE).filter(|v| !v.is_empty()) {
            config.engine = Some(engine);
        }
        if let Some(path) = lookup(ENV_ENGINE_PATH).filter(|v| !v.is_empty()) {
            config.engine_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup(ENV_CHECKPOINT_TO).filter(|v| !v.is_empty()) {
            config.checkpoint_to = Some(PathBuf::from(dir));
        }
        config.validate()?;
        Ok(config)
    }

    /// Default config file content with comments
    pub fn default_toml() -> &'static str {
        r#"# Checkpoint/restore coordinator configuration
#
# Backend override. When unset, known backends are probed in order:
#   "execengine" = run an external engine executable to checkpoint
#   "simengine"  = simulate a pause and resume (only when named here)
# engine = "execengine"

# External engine executable and image directory for "execengine".
# engine_path = "/opt/crac/criuengine"
# checkpoint_to = "/var/lib/app/cr"

# Registry size that triggers a sweep of dropped resources (default: 64)
sweep_threshold = 64
"#
    }

    /// Write the default config file if it does not already exist
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    /// Serialize to TOML and write to the given path
    pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = CracConfig::default();
        assert!(config.engine.is_none());
        assert_eq!(config.sweep_threshold, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_toml_parses_to_default() {
        let config = CracConfig::from_toml_str(CracConfig::default_toml()).unwrap();
        assert_eq!(config, CracConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let config = CracConfig::from_toml_str(
            r#"
engine = "execengine"
engine_path = "/opt/crac/engine"
checkpoint_to = "/tmp/cr"
sweep_threshold = 8
"#,
        )
        .unwrap();
        assert_eq!(config.engine.as_deref(), Some("execengine"));
        assert_eq!(config.engine_path, Some(PathBuf::from("/opt/crac/engine")));
        assert_eq!(config.checkpoint_to, Some(PathBuf::from("/tmp/cr")));
        assert_eq!(config.sweep_threshold, 8);
    }

    #[test]
    fn test_unknown_engine_rejected() {
        let err = CracConfig::from_toml_str(r#"engine = "warp""#).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEngine { .. }));
        let msg = err.to_string();
        assert!(msg.contains("warp"));
        assert!(msg.contains("simengine"));
    }

    #[test]
    fn test_zero_sweep_threshold_rejected() {
        let err = CracConfig::from_toml_str("sweep_threshold = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSweepThreshold));
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let err = CracConfig::from_toml_str("engine = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_overrides() {
        let config = CracConfig::from_vars(vars(&[
            (ENV_ENGINE, "simengine"),
            (ENV_CHECKPOINT_TO, "/tmp/images"),
        ]))
        .unwrap();
        assert_eq!(config.engine.as_deref(), Some("simengine"));
        assert_eq!(config.checkpoint_to, Some(PathBuf::from("/tmp/images")));
        assert!(config.engine_path.is_none());
    }

    #[test]
    fn test_empty_env_values_ignored() {
        let config = CracConfig::from_vars(vars(&[(ENV_ENGINE, "")])).unwrap();
        assert!(config.engine.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "engine = \"execengine\"\nsweep_threshold = 5\n").unwrap();

        let config = CracConfig::from_vars(vars(&[
            (ENV_CONFIG, path.to_str().unwrap()),
            (ENV_ENGINE, "simengine"),
        ]))
        .unwrap();
        assert_eq!(config.engine.as_deref(), Some("simengine"));
        assert_eq!(config.sweep_threshold, 5);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        let err = CracConfig::from_file(&temp.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_write_default_if_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        CracConfig::write_default_if_missing(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            CracConfig::default_toml()
        );

        // Existing file is left alone
        std::fs::write(&path, "sweep_threshold = 3\n").unwrap();
        CracConfig::write_default_if_missing(&path).unwrap();
        assert_eq!(CracConfig::from_file(&path).unwrap().sweep_threshold, 3);
    }

    #[test]
    fn test_write_and_read_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        let config = CracConfig {
            engine: Some("execengine".to_string()),
            engine_path: Some(PathBuf::from("/opt/engine")),
            checkpoint_to: Some(PathBuf::from("/tmp/cr")),
            sweep_threshold: 16,
        };
        config.write_to_file(&path).unwrap();
        assert_eq!(CracConfig::from_file(&path).unwrap(), config);
    }
}
