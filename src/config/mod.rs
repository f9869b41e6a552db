//! Persisted application settings.
//!
//! Settings live in `config.toml` inside the application directory. A missing
//! file yields defaults; unknown keys are ignored and missing sections fall
//! back to their defaults.

use std::path::PathBuf;

use thiserror::Error;

use crate::app_dirs;

mod io;
mod types;

#[cfg(test)]
mod tests;

/// Default filename used to store the settings.
pub const CONFIG_FILE_NAME: &str = "config.toml";

pub use io::{config_path, load_from_path, load_or_default, save, save_to_path};
pub use types::{BackendChoice, DatasetSettings, DatasetSourceKind, Settings, TrainingSettings};

/// Errors that may occur while loading or saving settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config directory unavailable: {0}")]
    Dir(#[from] app_dirs::AppDirError),
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
}
