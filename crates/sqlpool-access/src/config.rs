//! Data access configuration.

use std::time::Duration;

use sqlpool::PoolConfig;
use sqlpool::config::{DEFAULT_MAINTENANCE_INTERVAL, DEFAULT_MAX_CONNECTIONS, DEFAULT_MIN_CONNECTIONS};

use crate::error::{Error, Result};

/// Construction parameters for [`DataAccess`](crate::DataAccess).
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct DataAccessConfig {
    /// Connection target handed to the driver. Required.
    pub connection_target: String,

    /// Upper bound on pooled connections.
    pub max_pool_size: u32,

    /// Connections kept open by the pool.
    pub min_pool_size: u32,

    /// Route operations through a pool (`true`) or open a private
    /// connection per operation (`false`).
    pub use_connection_pool: bool,

    /// How long a pooled operation waits for a connection. `None` waits
    /// indefinitely.
    pub acquire_timeout: Option<Duration>,

    /// Interval between pool maintenance passes.
    pub maintenance_interval: Duration,
}

impl DataAccessConfig {
    /// Create a configuration for a target with default pool settings.
    #[must_use]
    pub fn new(connection_target: impl Into<String>) -> Self {
        Self {
            connection_target: connection_target.into(),
            max_pool_size: DEFAULT_MAX_CONNECTIONS,
            min_pool_size: DEFAULT_MIN_CONNECTIONS,
            use_connection_pool: true,
            acquire_timeout: None,
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
        }
    }

    /// Parse a connection string that may carry pooling keywords.
    ///
    /// Recognized keywords (case-insensitive) are `Pooling`,
    /// `Min Pool Size`, `Max Pool Size` and `Acquire Timeout` (seconds,
    /// `0` waits indefinitely). They are removed; everything else is kept
    /// verbatim as the connection target.
    pub fn from_connection_string(conn_str: &str) -> Result<Self> {
        let mut config = Self::new(String::new());
        let mut target = Vec::new();

        for part in conn_str.split(';') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                target.push(trimmed);
                continue;
            };
            let value = value.trim();

            match key.trim().to_lowercase().as_str() {
                "pooling" => {
                    config.use_connection_pool = parse_bool(value)?;
                }
                "min pool size" => {
                    config.min_pool_size = value.parse().map_err(|_| {
                        Error::Configuration(format!("invalid min pool size: {value}"))
                    })?;
                }
                "max pool size" => {
                    config.max_pool_size = value.parse().map_err(|_| {
                        Error::Configuration(format!("invalid max pool size: {value}"))
                    })?;
                }
                "acquire timeout" => {
                    let secs: u64 = value.parse().map_err(|_| {
                        Error::Configuration(format!("invalid acquire timeout: {value}"))
                    })?;
                    config.acquire_timeout = (secs > 0).then(|| Duration::from_secs(secs));
                }
                _ => target.push(trimmed),
            }
        }

        config.connection_target = target.join(";");
        Ok(config)
    }

    /// Set the maximum pool size.
    #[must_use]
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Set the minimum pool size.
    #[must_use]
    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.min_pool_size = size;
        self
    }

    /// Enable or disable pooling.
    #[must_use]
    pub fn use_connection_pool(mut self, enabled: bool) -> Self {
        self.use_connection_pool = enabled;
        self
    }

    /// Set the acquire timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Set the maintenance interval.
    #[must_use]
    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// The pool configuration these settings describe.
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        let config = PoolConfig::new()
            .min_connections(self.min_pool_size)
            .max_connections(self.max_pool_size)
            .maintenance_interval(self.maintenance_interval);
        match self.acquire_timeout {
            Some(timeout) => config.acquire_timeout(timeout),
            None => config.no_acquire_timeout(),
        }
    }

    /// Validate the configuration.
    ///
    /// Pool sizes are only checked when pooling is enabled.
    pub fn validate(&self) -> Result<()> {
        if self.connection_target.trim().is_empty() {
            return Err(Error::Configuration("connection target is required".into()));
        }
        if self.use_connection_pool {
            self.pool_config().validate()?;
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(Error::Configuration(format!("invalid pooling value: {value}"))),
    }
}
