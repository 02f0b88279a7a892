//! Command line and configuration loading for parley-admin
//!
//! Sources, lowest precedence first:
//! 1. `conf/application.yml`, or the file given with `--config`
//! 2. `PARLEY_*` environment variables, `__` separating nested keys
//! 3. command line options

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use config::{Config, ConfigError, Environment, File};
use parley_persistence::{DatabaseConfig, LockDefaults};

use crate::logging::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";

const DEFAULT_MIGRATION_TIMEOUT_MS: u64 = 15_000;

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "parley-admin", version, about = "Operational tooling for Parley")]
pub struct Cli {
    /// Configuration file to load instead of conf/application.yml
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    #[arg(long = "db-url", env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply the database schema while holding the migration lock
    Migrate {
        /// Schema file; searched for as conf/mysql-schema.sql when omitted
        #[arg(long)]
        schema: Option<PathBuf>,
    },
    /// Report whether any database session holds a named lock
    LockStatus { name: String },
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => File::from(path.as_path()).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let mut config_builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix("parley")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(url) = &cli.database_url {
            config_builder = config_builder.set_override("db.url", url.as_str())?;
        }

        Ok(Configuration {
            config: config_builder.build()?,
        })
    }

    fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.config
            .get_int(key)
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(default)
    }

    fn get_u32(&self, key: &str, default: u32) -> u32 {
        self.config
            .get_int(key)
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(default)
    }

    // ========================================================================
    // Database Configuration
    // ========================================================================

    pub fn database_config(&self) -> Result<DatabaseConfig, ConfigError> {
        let url = self.config.get_string("db.url")?;
        let defaults = DatabaseConfig::new(url);

        Ok(DatabaseConfig {
            max_connections: self.get_u32("db.pool.max_connections", defaults.max_connections),
            min_connections: self.get_u32("db.pool.min_connections", defaults.min_connections),
            connect_timeout: Duration::from_secs(
                self.get_u64("db.pool.connect_timeout_secs", defaults.connect_timeout.as_secs()),
            ),
            acquire_timeout: Duration::from_secs(
                self.get_u64("db.pool.acquire_timeout_secs", defaults.acquire_timeout.as_secs()),
            ),
            idle_timeout: Duration::from_secs(
                self.get_u64("db.pool.idle_timeout_secs", defaults.idle_timeout.as_secs()),
            ),
            max_lifetime: Duration::from_secs(
                self.get_u64("db.pool.max_lifetime_secs", defaults.max_lifetime.as_secs()),
            ),
            query_logging: self
                .config
                .get_bool("db.query_logging")
                .unwrap_or(defaults.query_logging),
            ..defaults
        })
    }

    // ========================================================================
    // Lock Configuration
    // ========================================================================

    pub fn lock_defaults(&self) -> LockDefaults {
        let defaults = LockDefaults::default();

        LockDefaults {
            name: self.config.get_string("lock.name").unwrap_or(defaults.name),
            acquire_timeout: Duration::from_millis(self.get_u64(
                "lock.acquire_timeout_ms",
                defaults.acquire_timeout.as_millis() as u64,
            )),
            transaction_timeout: Duration::from_millis(self.get_u64(
                "lock.transaction_timeout_ms",
                defaults.transaction_timeout.as_millis() as u64,
            )),
        }
    }

    pub fn migration_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.get_u64("lock.migration_timeout_ms", DEFAULT_MIGRATION_TIMEOUT_MS))
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_env().with_overrides(
            self.config.get_string("logging.dir").ok(),
            self.config.get_bool("logging.console").ok(),
            self.config.get_bool("logging.file").ok(),
            self.config.get_string("logging.level").ok(),
        )
    }
}
