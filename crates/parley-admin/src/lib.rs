//! Parley Admin - operational tooling
//!
//! - `migrate`: apply the schema under the `SCHEMA_MIGRATION` distributed lock
//! - `lock-status`: report whether any session holds a named lock

pub mod config;
pub mod logging;
pub mod migrate;
pub mod status;

pub use config::{Cli, Command, Configuration};
pub use logging::{LoggingConfig, LoggingGuard, init_logging};
pub use migrate::{MIGRATION_LOCK_NAME, MigrationError, find_schema, migrate, schema_search_dirs};
pub use status::{LockStatus, lock_status};
