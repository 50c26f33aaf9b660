//! Agent configuration: YAML config file plus flag-over-file resolution.
//!
//! [`Config`] mirrors the on-disk YAML shape; [`Settings`] is the immutable
//! value the rest of the agent consumes, produced once by applying
//! command-line overrides field by field (flag > config file > built-in
//! default). No component reads configuration from anywhere else.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "/etc/keywarden/config.yml";
pub const DEFAULT_CACHE_DIR: &str = "/var/cache/keywarden";
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unable to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// On-disk YAML config shape. All fields optional; `public_key` accepts a
/// single scalar or a sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cachedir: String,
    #[serde(default)]
    pub verify: bool,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub public_key: Vec<String>,
    #[serde(default)]
    pub timeout: u64,
    #[serde(
        default,
        rename = "hostname-prefix",
        skip_serializing_if = "String::is_empty"
    )]
    pub hostname_prefix: String,
    #[serde(
        default,
        rename = "hostname-suffix",
        skip_serializing_if = "String::is_empty"
    )]
    pub hostname_suffix: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

/// Command-line overrides, each taking precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub token: Option<String>,
    pub cache_dir: Option<PathBuf>,
    /// The flag can only turn verification on, never off.
    pub verify: bool,
    pub public_key: Option<String>,
    pub timeout_ms: Option<u64>,
    pub hostname_prefix: Option<String>,
    pub hostname_suffix: Option<String>,
}

/// Effective configuration for one invocation, resolved once and passed by
/// reference into every component that needs it.
#[derive(Debug, Clone)]
pub struct Settings {
    pub url: String,
    pub token: String,
    pub cache_dir: PathBuf,
    pub verify: bool,
    pub public_keys: Vec<String>,
    pub timeout_ms: u64,
    pub hostname_prefix: String,
    pub hostname_suffix: String,
}

impl Settings {
    pub fn resolve(config: Config, overrides: Overrides) -> Self {
        let cache_dir = overrides
            .cache_dir
            .or_else(|| (!config.cachedir.is_empty()).then(|| PathBuf::from(&config.cachedir)))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
        let timeout_ms = overrides
            .timeout_ms
            .or_else(|| (config.timeout > 0).then_some(config.timeout))
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        let public_keys = match overrides.public_key {
            Some(key) => vec![key],
            None => config.public_key,
        };
        Self {
            url: overrides.url.unwrap_or(config.url),
            token: overrides.token.unwrap_or(config.token),
            cache_dir,
            verify: overrides.verify || config.verify,
            public_keys,
            timeout_ms,
            hostname_prefix: overrides.hostname_prefix.unwrap_or(config.hostname_prefix),
            hostname_suffix: overrides.hostname_suffix.unwrap_or(config.hostname_suffix),
        }
    }
}
