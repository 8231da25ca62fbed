use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants;
use crate::error::ConfigError;
use crate::join::{JoinAnchor, KeyStrictness};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input: InputConfig,
    pub columns: ColumnNames,
    pub join: JoinConfig,
    pub aggregates: AggregateConfig,
    pub publish: PublishConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Directory scanned for `.json`, `.csv` and `.sqlite` sources
    pub dir: PathBuf,
    /// Zip archive path or http(s) URL; replaces the directory scan when set
    pub archive: Option<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            archive: None,
        }
    }
}

/// Names of the columns the pipeline reads by name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub business_id: String,
    pub review_id: String,
    pub user_id: String,
    pub stars: String,
    pub address: String,
    /// Business document attribute dropped on read
    pub business_name: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            business_id: constants::BUSINESS_ID.to_string(),
            review_id: constants::REVIEW_ID.to_string(),
            user_id: constants::USER_ID.to_string(),
            stars: constants::STARS.to_string(),
            address: constants::ADDRESS.to_string(),
            business_name: constants::BUSINESS_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    pub anchor: JoinAnchor,
    pub strictness: KeyStrictness,
    /// Appended to right-side columns whose name is already taken on the left
    pub right_suffix: String,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            anchor: JoinAnchor::default(),
            strictness: KeyStrictness::default(),
            right_suffix: "_right".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    pub top_zipcodes: usize,
    pub top_users: usize,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            top_zipcodes: constants::TOP_ZIPCODES,
            top_users: constants::TOP_USERS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Fs,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub backend: StoreBackend,
    /// Root directory for the `fs` backend
    pub root: PathBuf,
    /// Base URL for the `http` backend
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    /// Optional key prefix inside the bucket
    pub prefix: String,
    pub outputs: OutputNames,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Fs,
            root: PathBuf::from("output"),
            endpoint: None,
            bucket: None,
            prefix: String::new(),
            outputs: OutputNames::default(),
        }
    }
}

/// Destination names of the four artifacts. `merged` is the one that gets compressed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputNames {
    pub merged: String,
    pub mean_rating: String,
    pub top_zipcodes: String,
    pub top_users: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            merged: constants::MERGED_OUTPUT.to_string(),
            mean_rating: constants::MEAN_RATING_OUTPUT.to_string(),
            top_zipcodes: constants::TOP_ZIPCODE_OUTPUT.to_string(),
            top_users: constants::TOP_USERS_OUTPUT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub logs_dir: PathBuf,
    /// Where to write the Prometheus text snapshot at the end of a run
    pub metrics_file: Option<PathBuf>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
            metrics_file: None,
        }
    }
}

impl Config {
    /// Load from a TOML file. Every field has a default, so a partial file is fine.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.display().to_string(),
            error,
        })?;
        Self::from_toml(&content)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let o = &self.publish.outputs;
        let names = [&o.merged, &o.mean_rating, &o.top_zipcodes, &o.top_users];
        for (i, a) in names.iter().enumerate() {
            if a.is_empty() {
                return Err(ConfigError::Invalid("output names must not be empty".to_string()));
            }
            if names[i + 1..].contains(a) {
                return Err(ConfigError::Invalid(format!("output name '{}' is used twice", a)));
            }
        }
        if self.publish.backend == StoreBackend::Http
            && (self.publish.endpoint.is_none() || self.publish.bucket.is_none())
        {
            return Err(ConfigError::Invalid(
                "the http backend needs publish.endpoint and publish.bucket".to_string(),
            ));
        }
        if self.join.right_suffix.is_empty() {
            return Err(ConfigError::Invalid("join.right_suffix must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Object-store credentials. Only ever read from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_key = std::env::var(constants::ACCESS_KEY_ENV)
            .map_err(|_| ConfigError::Invalid(format!("{} is not set", constants::ACCESS_KEY_ENV)))?;
        let secret_key = std::env::var(constants::SECRET_KEY_ENV)
            .map_err(|_| ConfigError::Invalid(format!("{} is not set", constants::SECRET_KEY_ENV)))?;
        Ok(Self {
            access_key,
            secret_key,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}
