//! MongoDB connection settings.
//!
//! Resolution order (lowest to highest priority):
//! 1. the `mongo:` section of a YAML file (usually `application.yaml`)
//! 2. `.env` file (loaded into the process environment, never overwriting)
//! 3. environment variables `MONGO_URI`, `MONGO_DATABASE`, `MONGO_COLLECTION`,
//!    `MONGO_POOL_SIZE`, `MONGO_CONNECT_TIMEOUT_MS`, `MONGO_APP_NAME`
//!
//! ```yaml
//! mongo:
//!   uri: mongodb://localhost:27017
//!   database: shop
//!   collection: resources
//!   pool_size: 32
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Error type for configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O or YAML parsing error occurred while loading config files.
    #[error("Config load error: {0}")]
    Load(String),
    /// A value is present but unusable.
    #[error("Invalid config value for '{key}': {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
    /// Maximum concurrent connection leases, also the driver pool size.
    pub pool_size: u32,
    pub connect_timeout_ms: Option<u64>,
    pub app_name: Option<String>,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "docrest".to_string(),
            collection: "records".to_string(),
            pool_size: 16,
            connect_timeout_ms: None,
            app_name: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Root {
    #[serde(default)]
    mongo: Option<MongoConfig>,
}

impl MongoConfig {
    /// Load from a YAML file (skipped when missing), `.env` and the process
    /// environment, then validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let base = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Load(e.to_string()))?;
            Self::parse_yaml(&content)?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        // does NOT overwrite existing env vars
        let _ = dotenvy::dotenv();

        let config = base.overlay_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate the `mongo:` section of a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config = Self::parse_yaml(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let root: Root = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Load(e.to_string()))?;
        Ok(root.mongo.unwrap_or_default())
    }

    /// Apply `MONGO_*` variables on top of the current values.
    pub fn overlay_env<I>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "MONGO_URI" => self.uri = value,
                "MONGO_DATABASE" => self.database = value,
                "MONGO_COLLECTION" => self.collection = value,
                "MONGO_POOL_SIZE" => self.pool_size = parse_number("pool_size", &value)?,
                "MONGO_CONNECT_TIMEOUT_MS" => self.connect_timeout_ms = Some(parse_number("connect_timeout_ms", &value)?),
                "MONGO_APP_NAME" => self.app_name = Some(value),
                _ => {}
            }
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.uri.starts_with("mongodb://") && !self.uri.starts_with("mongodb+srv://") {
            return Err(invalid("uri", "expected a mongodb:// or mongodb+srv:// URI"));
        }
        if self.database.is_empty() || self.database.contains(['/', '\\', '.', ' ', '"', '$']) {
            return Err(invalid("database", format!("'{}' is not a valid database name", self.database)));
        }
        if self.collection.is_empty() || self.collection.contains('$') || self.collection.starts_with("system.") {
            return Err(invalid("collection", format!("'{}' is not a valid collection name", self.collection)));
        }
        if self.pool_size == 0 {
            return Err(invalid("pool_size", "must be at least 1"));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(key, format!("'{value}' is not a number")))
}

fn invalid(key: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.into(),
    }
}
