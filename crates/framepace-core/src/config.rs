// SPDX-License-Identifier: CEPL-1.0
//! `framepace.toml` loading.
//!
//! Every field has a default, so an empty or partial file is valid. A missing
//! file is not an error; a malformed one is.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "framepace.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub present: PresentConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PresentConfig {
    /// Requested swapchain depth; raised to the surface minimum at create.
    #[serde(default = "default_depth")]
    pub buffering_depth: u32,
    #[serde(default = "default_vsync")]
    pub vsync: bool,
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    /// Bound on every fence/acquire wait.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
}

impl Default for PresentConfig {
    fn default() -> Self {
        PresentConfig {
            buffering_depth: default_depth(),
            vsync: default_vsync(),
            clear_color: default_clear(),
            wait_timeout_ms: default_wait_timeout_ms(),
        }
    }
}

fn default_depth() -> u32 {
    2
}
fn default_vsync() -> bool {
    true
}
fn default_clear() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}
fn default_wait_timeout_ms() -> u64 {
    33
}

impl AppConfig {
    pub fn from_toml_str(s: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }
}

/// Reads `path`, falling back to defaults when the file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(s) => AppConfig::from_toml_str(&s, path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("{} not found, using defaults", path.display());
            Ok(AppConfig::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
