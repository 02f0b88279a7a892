//! Lock status probe

use parley_lock::{LockError, encode_lock_name};
use parley_persistence::{ComponentStatus, PersistenceService};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    pub name: String,
    /// Name as sent to the database
    pub encoded_name: String,
    pub held: bool,
    pub database: ComponentStatus,
}

/// Whether any session holds the lock `name`, plus application database health
pub async fn lock_status(service: &PersistenceService, name: &str) -> Result<LockStatus, LockError> {
    let encoded_name = encode_lock_name(name)?;
    let held = service.is_lock_used_by_any_session(name).await?;

    Ok(LockStatus {
        name: name.to_string(),
        encoded_name,
        held,
        database: service.health().await,
    })
}
