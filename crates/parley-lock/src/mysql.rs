//! MySQL named locks over a dedicated one-connection session
//!
//! `GET_LOCK`, `IS_USED_LOCK` and `RELEASE_LOCK` are tied to the connection that
//! issued them, so the client owns a pool capped at exactly one connection.
//! See <https://dev.mysql.com/doc/refman/8.0/en/locking-functions.html>.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, QueryResult,
    Statement,
};
use tracing::debug;

use crate::{AdvisoryLockClient, LockError};

/// Marks where the encoded lock name goes in a lock statement
pub const LOCK_NAME_PLACEHOLDER: &str = "'?'";

/// Longest lock name MySQL accepts
pub const MAX_LOCK_NAME_LEN: usize = 64;

const IS_USED_LOCK_QUERY: &str = "SELECT IS_USED_LOCK('?') IS NOT NULL AS is_used";
const RELEASE_LOCK_QUERY: &str = "SELECT RELEASE_LOCK('?') AS released";

fn acquire_lock_query(timeout_secs: u64) -> String {
    format!("SELECT GET_LOCK('?', {timeout_secs}) AS acquired")
}

/// Encode a lock name as unpadded base64url so it can be embedded in a SQL literal.
pub fn encode_lock_name(name: &str) -> Result<String, LockError> {
    if name.is_empty() {
        return Err(LockError::InvalidLockName {
            name: name.to_string(),
            reason: "lock name must not be empty".to_string(),
        });
    }

    let encoded = URL_SAFE_NO_PAD.encode(name);
    if encoded.len() > MAX_LOCK_NAME_LEN {
        return Err(LockError::InvalidLockName {
            name: name.to_string(),
            reason: format!(
                "encoded name is {} characters, at most {} are allowed",
                encoded.len(),
                MAX_LOCK_NAME_LEN
            ),
        });
    }

    Ok(encoded)
}

/// Substitute the encoded lock name into a statement template.
///
/// The template must contain exactly one [`LOCK_NAME_PLACEHOLDER`]; anything
/// else is a programming error and fails with [`LockError::MalformedLockQuery`].
pub fn render_lock_query(template: &str, name: &str) -> Result<String, LockError> {
    let placeholders = template.matches(LOCK_NAME_PLACEHOLDER).count();
    if placeholders != 1 {
        return Err(LockError::MalformedLockQuery(format!(
            "expected exactly one {LOCK_NAME_PLACEHOLDER} placeholder, found {placeholders} in `{template}`"
        )));
    }

    let encoded = encode_lock_name(name)?;
    Ok(template.replacen(LOCK_NAME_PLACEHOLDER, &format!("'{encoded}'"), 1))
}

/// Advisory lock client backed by MySQL `GET_LOCK` and friends
#[derive(Debug, Clone)]
pub struct MySqlLockClient {
    session: DatabaseConnection,
}

impl MySqlLockClient {
    /// Open the dedicated lock session.
    ///
    /// The pool size in `options` is overridden to exactly one connection.
    pub async fn connect(mut options: ConnectOptions) -> Result<Self, LockError> {
        options.max_connections(1).min_connections(1);
        let session = Database::connect(options).await?;
        debug!("Lock session connected");
        Ok(Self { session })
    }

    /// Wrap an existing connection, which must come from a pool of exactly one connection.
    pub fn from_connection(session: DatabaseConnection) -> Self {
        Self { session }
    }

    async fn execute_lock_query(&self, template: &str, name: &str) -> Result<QueryResult, LockError> {
        let sql = render_lock_query(template, name)?;
        debug!(lock = %name, query = %sql, "Executing lock query");

        self.session
            .query_one(Statement::from_string(DbBackend::MySql, sql))
            .await?
            .ok_or_else(|| LockError::UnexpectedLockResult(format!("no row returned for `{template}`")))
    }
}

fn decode_flag(row: &QueryResult, column: &str) -> Result<Option<i64>, LockError> {
    row.try_get::<Option<i64>>("", column)
        .map_err(|e| LockError::UnexpectedLockResult(format!("column `{column}`: {e}")))
}

#[async_trait]
impl AdvisoryLockClient for MySqlLockClient {
    async fn try_acquire(&self, name: &str, timeout_secs: u64) -> Result<bool, LockError> {
        let row = self
            .execute_lock_query(&acquire_lock_query(timeout_secs), name)
            .await?;
        let acquired = decode_flag(&row, "acquired")?;
        debug!(lock = %name, ?acquired, "GET_LOCK returned");

        // 1 = granted, 0 = timed out, NULL = error such as the thread being killed
        Ok(acquired == Some(1))
    }

    async fn is_held_by_any_session(&self, name: &str) -> Result<bool, LockError> {
        let row = self.execute_lock_query(IS_USED_LOCK_QUERY, name).await?;
        Ok(decode_flag(&row, "is_used")? == Some(1))
    }

    async fn release(&self, name: &str) -> Result<(), LockError> {
        let row = self.execute_lock_query(RELEASE_LOCK_QUERY, name).await?;

        // 0 = held by another session, NULL = not held at all. Both are fine.
        let released = decode_flag(&row, "released")?;
        debug!(lock = %name, ?released, "RELEASE_LOCK returned");
        Ok(())
    }

    async fn close(&self) -> Result<(), LockError> {
        debug!("Disconnecting lock session");
        self.session.clone().close().await?;
        Ok(())
    }
}
