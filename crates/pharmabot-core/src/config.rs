//! Typed configuration: optional TOML file overlaid with environment variables.
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `PHARMABOT_CONFIG` | Path of the TOML file when `--config` is not given |
//! | `PHARMABOT_API_KEY_1..N` | API keys, read until the first gap |
//! | `GOOGLE_API_KEY_1..N` | Fallback key names when no `PHARMABOT_API_KEY_*` is set |
//! | `PHARMABOT_MODELS` | Comma-separated models crossed with every key |
//! | `PHARMABOT_COOLDOWN_SECONDS` | Cooldown after quota/rate/auth failures |
//! | `PHARMABOT_CATALOG_PATH` | DuckDB catalog file |
//! | `PHARMABOT_API_BASE_URL` | Generation API base URL |

use std::fmt::{Debug, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pharmabot_catalog::CatalogConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::credential::{ApiKey, Credential};
use crate::generation::DEFAULT_GEMINI_BASE_URL;
use crate::pool::{PoolConfig, MAX_COOLDOWN};

pub const DEFAULT_MODELS: &[&str] = &["gemini-2.0-flash", "gemini-2.5-flash", "gemini-2.0-flash-001"];

const KEY_PREFIXES: &[&str] = &["PHARMABOT_API_KEY_", "GOOGLE_API_KEY_"];

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no API credentials configured; set PHARMABOT_API_KEY_1 or add [[credentials]] to the config file")]
    NoCredentials,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// One configured (key, model) pair.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub key: String,
    pub model: String,
}

impl Debug for CredentialConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("name", &self.name)
            .field("key", &"***")
            .field("model", &self.model)
            .finish()
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub credentials: Vec<CredentialConfig>,
    pub cooldown_seconds: u64,
    pub failure_threshold: u32,
    pub history_limit: usize,
    pub catalog_path: Option<PathBuf>,
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub max_results: usize,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            credentials: Vec::new(),
            cooldown_seconds: 300,
            failure_threshold: 3,
            history_limit: 32,
            catalog_path: None,
            api_base_url: String::from(DEFAULT_GEMINI_BASE_URL),
            request_timeout_ms: 30_000,
            max_results: 5,
            temperature: 0.3,
            max_output_tokens: 500,
        }
    }
}

impl AppConfig {
    /// Load from `explicit` (or `PHARMABOT_CONFIG`), overlay the process
    /// environment and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(explicit, |name| std::env::var(name).ok())
    }

    /// [`load`](Self::load) with an injectable environment lookup.
    pub fn load_with<F>(explicit: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::layered(explicit, &env)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load) but without requiring credentials, for
    /// commands that only touch the catalog.
    pub fn load_settings(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_settings_with(explicit, |name| std::env::var(name).ok())
    }

    pub fn load_settings_with<F>(explicit: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::layered(explicit, &env)?;
        config.validate_settings()?;
        Ok(config)
    }

    fn layered<F>(explicit: Option<&Path>, env: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| non_empty(env("PHARMABOT_CONFIG")).map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(env)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay environment variables. Keys found in the environment replace
    /// any credentials from the file.
    pub fn apply_env<F>(&mut self, env: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let keys = KEY_PREFIXES
            .iter()
            .map(|prefix| enumerate_keys(env, prefix))
            .find(|keys| !keys.is_empty())
            .unwrap_or_default();

        if !keys.is_empty() {
            let models = non_empty(env("PHARMABOT_MODELS"))
                .map(|raw| parse_models(&raw))
                .filter(|models| !models.is_empty())
                .unwrap_or_else(|| DEFAULT_MODELS.iter().map(|m| (*m).to_string()).collect());

            self.credentials = keys
                .iter()
                .enumerate()
                .flat_map(|(index, key)| {
                    models.iter().map(move |model| CredentialConfig {
                        name: Some(format!("key_{}", index + 1)),
                        key: key.clone(),
                        model: model.clone(),
                    })
                })
                .collect();
        }

        if let Some(raw) = non_empty(env("PHARMABOT_COOLDOWN_SECONDS")) {
            self.cooldown_seconds = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "PHARMABOT_COOLDOWN_SECONDS must be a whole number of seconds, got '{raw}'"
                ))
            })?;
        }
        if let Some(path) = non_empty(env("PHARMABOT_CATALOG_PATH")) {
            self.catalog_path = Some(PathBuf::from(path));
        }
        if let Some(url) = non_empty(env("PHARMABOT_API_BASE_URL")) {
            self.api_base_url = url;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_settings()?;
        if self.credentials.is_empty() {
            return Err(ConfigError::NoCredentials);
        }
        for (index, credential) in self.credentials.iter().enumerate() {
            if credential.key.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "credential #{} has an empty key",
                    index + 1
                )));
            }
            if credential.model.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "credential #{} has an empty model",
                    index + 1
                )));
            }
        }
        Ok(())
    }

    /// Validate everything except the presence of credentials.
    pub fn validate_settings(&self) -> Result<(), ConfigError> {
        if self.cooldown_seconds > MAX_COOLDOWN.as_secs() {
            return Err(ConfigError::Invalid(format!(
                "cooldown_seconds must be at most {}, got {}",
                MAX_COOLDOWN.as_secs(),
                self.cooldown_seconds
            )));
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid(String::from(
                "failure_threshold must be greater than zero",
            )));
        }
        if self.max_results == 0 {
            return Err(ConfigError::Invalid(String::from(
                "max_results must be greater than zero",
            )));
        }
        if self.max_output_tokens == 0 {
            return Err(ConfigError::Invalid(String::from(
                "max_output_tokens must be greater than zero",
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(String::from(
                "temperature must be between 0.0 and 2.0",
            )));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "api_base_url must not be empty",
            )));
        }
        Ok(())
    }

    /// Credentials in configuration order.
    pub fn credentials(&self) -> Vec<Credential> {
        self.credentials
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let name = entry
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("key_{}", index + 1));
                Credential::new(name, ApiKey::new(entry.key.trim()), entry.model.as_str())
            })
            .collect()
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            cooldown: Duration::from_secs(self.cooldown_seconds),
            failure_threshold: self.failure_threshold,
            history_limit: self.history_limit,
        }
    }

    pub fn catalog_config(&self) -> CatalogConfig {
        match &self.catalog_path {
            Some(path) => CatalogConfig::at_path(path.clone()),
            None => CatalogConfig::default(),
        }
    }
}

fn enumerate_keys<F>(env: &F, prefix: &str) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    (1..)
        .map(|index| non_empty(env(&format!("{prefix}{index}"))))
        .take_while(Option::is_some)
        .flatten()
        .map(|key| key.trim().to_string())
        .collect()
}

fn parse_models(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|model| !model.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
