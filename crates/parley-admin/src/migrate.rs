//! Lock-guarded schema migration
//!
//! Every service instance may run `parley-admin migrate` on startup. The
//! distributed lock `SCHEMA_MIGRATION` makes concurrent runs take turns, and
//! the schema file only holds idempotent statements, so the later runs are
//! no-ops.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parley_lock::LockError;
use parley_persistence::PersistenceService;
use sea_orm::{ConnectionTrait, DbErr};
use tracing::{debug, error, info};

pub const MIGRATION_LOCK_NAME: &str = "SCHEMA_MIGRATION";

/// Schema location relative to each search directory
pub const DEFAULT_SCHEMA_FILE: &str = "conf/mysql-schema.sql";

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("schema file not found, searched: {}", display_paths(.searched))]
    SchemaNotFound { searched: Vec<PathBuf> },

    #[error("failed to read schema file {}: {source}", .path.display())]
    ReadSchema {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not acquire the migration lock: {0}")]
    Lock(#[from] LockError),

    #[error("statement {index} failed: {source}")]
    Statement {
        index: usize,
        #[source]
        source: DbErr,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Directories searched for [`DEFAULT_SCHEMA_FILE`]: the working directory,
/// then the executable's directory and its parent.
pub fn schema_search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Ok(exe) = std::env::current_exe() {
        dirs.extend(exe.ancestors().skip(1).take(2).map(Path::to_path_buf));
    }
    dirs
}

/// Resolve the schema file: the explicit path if given, else the first
/// `search_dirs` entry containing [`DEFAULT_SCHEMA_FILE`].
pub fn find_schema(
    explicit: Option<&Path>,
    search_dirs: &[PathBuf],
) -> Result<PathBuf, MigrationError> {
    let candidates: Vec<PathBuf> = match explicit {
        Some(path) => vec![path.to_path_buf()],
        None => search_dirs
            .iter()
            .map(|dir| dir.join(DEFAULT_SCHEMA_FILE))
            .collect(),
    };

    for candidate in &candidates {
        debug!(path = %candidate.display(), "Probing schema file");
        if candidate.is_file() {
            return Ok(candidate.clone());
        }
    }

    Err(MigrationError::SchemaNotFound {
        searched: candidates,
    })
}

/// Split a schema script into statements on `;`.
///
/// Whole-line `--` comments are removed first. Semicolons inside string
/// literals are not supported.
pub fn split_statements(script: &str) -> Vec<String> {
    let without_comments = script
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(str::to_string)
        .collect()
}

/// Execute `statements` in order, stopping at the first failure.
pub async fn run_migration<C>(db: &C, statements: &[String]) -> Result<usize, MigrationError>
where
    C: ConnectionTrait,
{
    for (index, statement) in statements.iter().enumerate() {
        debug!(index, "Applying schema statement");
        db.execute_unprepared(statement)
            .await
            .map_err(|source| MigrationError::Statement { index, source })?;
    }
    Ok(statements.len())
}

/// Apply the schema at `schema` while holding [`MIGRATION_LOCK_NAME`].
///
/// Returns the number of statements applied. The lock is released on every
/// path once acquired.
pub async fn migrate(
    service: &PersistenceService,
    schema: &Path,
    lock_timeout: Duration,
) -> Result<usize, MigrationError> {
    let script = tokio::fs::read_to_string(schema)
        .await
        .map_err(|source| MigrationError::ReadSchema {
            path: schema.to_path_buf(),
            source,
        })?;
    let statements = split_statements(&script);

    info!(
        schema = %schema.display(),
        statements = statements.len(),
        lock_timeout_ms = lock_timeout.as_millis() as u64,
        "Waiting for the migration lock"
    );
    let mut releaser = service
        .acquire_distributed_lock(MIGRATION_LOCK_NAME, lock_timeout)
        .await?;

    let result = run_migration(service.db(), &statements).await;
    releaser.release().await;

    match &result {
        Ok(applied) => info!(applied, "Schema migration finished"),
        Err(e) => error!(error = %e, "Schema migration failed"),
    }
    result
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_split_statements() {
        let script = "-- users\nCREATE TABLE a (id INT);\n\n  CREATE TABLE b (id INT) ;\n-- trailing comment\n";
        assert_eq!(
            split_statements(script),
            vec!["CREATE TABLE a (id INT)", "CREATE TABLE b (id INT)"]
        );
    }

    #[test]
    fn test_split_ignores_semicolons_in_comments() {
        let script = "-- keys; one per user\nCREATE TABLE k (\n  id INT\n);";
        assert_eq!(split_statements(script), vec!["CREATE TABLE k (\n  id INT\n)"]);
    }

    #[test]
    fn test_split_empty_script() {
        assert!(split_statements("  \n-- nothing here\n;;").is_empty());
    }

    #[test]
    fn test_find_schema_searches_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::create_dir_all(second.path().join("conf")).unwrap();
        fs::write(second.path().join(DEFAULT_SCHEMA_FILE), "SELECT 1;").unwrap();

        let dirs = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let found = find_schema(None, &dirs).unwrap();
        assert_eq!(found, second.path().join(DEFAULT_SCHEMA_FILE));
    }

    #[test]
    fn test_find_schema_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("custom.sql");
        fs::write(&schema, "SELECT 1;").unwrap();

        assert_eq!(find_schema(Some(schema.as_path()), &[]).unwrap(), schema);

        // An explicit path that does not exist is not replaced by a search
        let missing = dir.path().join("missing.sql");
        let err = find_schema(Some(missing.as_path()), &[dir.path().to_path_buf()]).unwrap_err();
        match err {
            MigrationError::SchemaNotFound { searched } => assert_eq!(searched, vec![missing]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_find_schema_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_schema(None, &[dir.path().to_path_buf()]).unwrap_err();
        assert!(err.to_string().contains("conf/mysql-schema.sql"));
    }

    #[test]
    fn test_bundled_schema_is_idempotent() {
        let script = include_str!("../../../conf/mysql-schema.sql");
        let statements = split_statements(script);
        assert_eq!(statements.len(), 5);
        assert!(
            statements
                .iter()
                .all(|s| s.contains("CREATE TABLE IF NOT EXISTS"))
        );
    }
}
