//! Application configuration module
//!
//! Configuration is read from environment variables with the
//! `EXCHANGE_BROKER` prefix, nested values separated by `__`, after loading
//! a `.env` file if one exists.
//!
//! ```no_run
//! use exchange_broker::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod negotiation;
mod profiles;
mod server;
mod sweeper;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use negotiation::NegotiationConfig;
pub use profiles::ProfilePoolConfig;
pub use server::{Environment, ServerConfig};
pub use sweeper::{SweeperConfig, MAX_SWEEP_INTERVAL_SECS, MIN_SWEEP_INTERVAL_SECS};

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// PostgreSQL storage; in-memory storage is used when absent
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub negotiation: NegotiationConfig,

    #[serde(default)]
    pub sweeper: SweeperConfig,

    #[serde(default)]
    pub profiles: ProfilePoolConfig,
}

impl AppConfig {
    /// Load configuration from the environment.
    ///
    /// - `EXCHANGE_BROKER__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `EXCHANGE_BROKER__DATABASE__URL=...` -> `database.url = ...`
    /// - `EXCHANGE_BROKER__SWEEPER__INTERVAL_SECS=60` -> `sweeper.interval_secs = 60`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("EXCHANGE_BROKER")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Semantic validation of every section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.negotiation.validate()?;
        self.sweeper.validate()?;
        self.profiles.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
