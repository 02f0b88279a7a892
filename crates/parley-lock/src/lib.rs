//! Parley Lock - distributed lock coordination
//!
//! Serializes named critical sections across concurrent tasks in one process
//! and across service instances that share one MySQL database:
//! - [`NamedMutexRegistry`]: process-local mutex per lock name
//! - [`AdvisoryLockClient`]: session-scoped database named locks
//! - [`DistributedLockCoordinator`]: composes both under one timeout budget
//! - [`LockReleaser`]: undoes an acquisition, database first, then mutex
//!
//! ```rust,ignore
//! let coordinator = DistributedLockCoordinator::new(Arc::new(MySqlLockClient::connect(options).await?));
//!
//! let mut releaser = coordinator.acquire("SCHEMA_MIGRATION", Duration::from_secs(15)).await?;
//! // run the migration
//! releaser.release().await;
//! ```

pub mod client;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod mysql;
pub mod registry;
pub mod runner;
pub mod timer;

pub use client::AdvisoryLockClient;
pub use coordinator::{DistributedLockCoordinator, LockReleaser, database_timeout_secs};
pub use error::LockError;
pub use memory::{InMemoryLockEngine, InMemoryLockSession};
pub use mysql::{MySqlLockClient, encode_lock_name, render_lock_query};
pub use registry::{NamedMutex, NamedMutexRegistry};
pub use timer::Timer;
