//! Configuration loading and representation.
//!
//! Everything is read from environment variables:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `CATALOG_LOW_STOCK_THRESHOLD` | `10` |
//! | `CATALOG_COMPENSATION_TIMEOUT_MS` | `5000` |
//! | `CATALOG_DEFAULT_DEADLINE_MS` | unset (no deadline) |
//! | `USE_PERSISTENT_STORES` | `false` |
//! | `DATABASE_URL` | required when persistent |
//! | `DATABASE_MAX_CONNECTIONS` | `5` |
//! | `LOG_FORMAT` | `json` |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use storefront_catalog::DEFAULT_LOW_STOCK_THRESHOLD;
use storefront_observability::LogFormat;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),
}

/// Tunables of the catalog engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub low_stock_threshold: u32,
    /// Upper bound for a creation's cleanup, independent of the caller.
    #[serde(with = "millis")]
    pub compensation_timeout: Duration,
    /// Deadline applied to contexts built by the engine when the caller sets none.
    #[serde(default, with = "opt_millis")]
    pub default_deadline: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            compensation_timeout: Duration::from_millis(5000),
            default_deadline: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    InMemory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub engine: EngineConfig,
    pub store: StoreConfig,
    pub log_format: LogFormat,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            store: StoreConfig::InMemory,
            log_format: LogFormat::Json,
        }
    }
}

impl CatalogConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = EngineConfig::default();

        let low_stock_threshold = parse(&lookup, "CATALOG_LOW_STOCK_THRESHOLD")?
            .unwrap_or(defaults.low_stock_threshold);
        let compensation_timeout = parse::<u64>(&lookup, "CATALOG_COMPENSATION_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.compensation_timeout);
        let default_deadline =
            parse::<u64>(&lookup, "CATALOG_DEFAULT_DEADLINE_MS")?.map(Duration::from_millis);

        let persistent = parse::<bool>(&lookup, "USE_PERSISTENT_STORES")?.unwrap_or(false);
        let store = if persistent {
            let database_url = lookup("DATABASE_URL")
                .filter(|s| !s.trim().is_empty())
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            StoreConfig::Postgres {
                database_url,
                max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS")?.unwrap_or(5),
            }
        } else {
            StoreConfig::InMemory
        };

        let log_format = parse(&lookup, "LOG_FORMAT")?.unwrap_or(LogFormat::Json);

        Ok(Self {
            engine: EngineConfig {
                low_stock_threshold,
                compensation_timeout,
                default_deadline,
            },
            store,
            log_format,
        })
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => {
            let trimmed = raw.trim();
            trimmed
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::Invalid {
                    var,
                    value: raw.clone(),
                    reason: e.to_string(),
                })
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|o| o.map(Duration::from_millis))
    }
}
