//! Configuration file loading.
//!
//! The configuration is a single TOML document. Its top level is the checker
//! settings: a shared `delay` and a `[[checkers]]` array of tables.
//!
//! ```toml
//! delay = 500
//!
//! [[checkers]]
//! command = "gcc"
//! display_name = "GCC"
//! arguments = ["-fsyntax-only", "-x", "c"]
//! language_ids = ["c"]
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::{env, fs, io};

use serde::Deserialize;
use syncheck_checker::CheckerSettings;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "SYNCHECK_CONFIG";

#[derive(Debug, Default, Deserialize)]
pub struct SyncheckConfig {
    #[serde(flatten)]
    pub checkers: CheckerSettings,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

impl SyncheckConfig {
    /// Load the configuration from [`config_path`].
    ///
    /// A missing file is not an error: it yields `Ok(None)` and the caller
    /// runs with defaults (no checkers).
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            tracing::debug!("No config file at {}", path.display());
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    /// Load the configuration from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|err| {
            tracing::warn!("Failed to read config at {}: {err}", path.display());
            ConfigError::Read {
                path: path.to_path_buf(),
                source: err,
            }
        })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| {
            tracing::warn!("Failed to parse config at {}: {err}", path.display());
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })
    }

    #[must_use]
    pub fn into_settings(self) -> CheckerSettings {
        self.checkers
    }
}

/// Per-user state directory, `~/.syncheck`.
#[must_use]
pub fn data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".syncheck"))
}

/// `$SYNCHECK_CONFIG` if set, otherwise `~/.syncheck/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    resolve_config_path(env::var_os(CONFIG_ENV_VAR), data_dir())
}

fn resolve_config_path(
    override_path: Option<OsString>,
    data_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    match override_path {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => data_dir.map(|dir| dir.join("config.toml")),
    }
}
