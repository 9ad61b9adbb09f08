//! SQLite database module with schema migrations.

use std::path::PathBuf;
use std::time::Duration;

use rusqlite::Connection;
use tracing::info;

use crate::error::AppError;

/// Current schema version. Increment when adding new migrations.
const SCHEMA_VERSION: i32 = 2;

/// V1 schema: one row per upload task.
const V1_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS job_records (
    task_id TEXT PRIMARY KEY NOT NULL,
    file_name TEXT NOT NULL,
    file_size TEXT NOT NULL,
    total_rows INTEGER NOT NULL DEFAULT 0,
    selected_source TEXT NOT NULL,
    selected_source_id TEXT NOT NULL,
    current_step INTEGER NOT NULL,
    upload_completed INTEGER NOT NULL DEFAULT 0,
    status INTEGER NOT NULL DEFAULT 0,
    owner_id TEXT NOT NULL,
    owner_username TEXT NOT NULL,
    owner_email TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_job_records_owner_id ON job_records(owner_id);
CREATE INDEX IF NOT EXISTS idx_job_records_created_at ON job_records(created_at);
"#;

/// V2 migration: remembers where the file lives so a paused task can be re-parsed.
const V2_MIGRATION: &str = r#"
ALTER TABLE job_records ADD COLUMN file_path TEXT;
ALTER TABLE job_records ADD COLUMN sheet_name TEXT;
"#;

/// SQLite database handle.
///
/// Only the path is held; each operation opens its own connection on a
/// blocking thread.
#[derive(Debug)]
pub struct Database {
    db_path: PathBuf,
}

impl Database {
    /// Initializes the database at the given path.
    /// Creates parent directories if needed, opens the SQLite file, and runs migrations.
    pub async fn init(db_path: PathBuf) -> Result<Self, AppError> {
        let path = db_path.clone();

        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Storage(format!("Failed to create database directory: {e}"))
                })?;
            }

            let mut conn = Connection::open(&path)
                .map_err(|e| AppError::Storage(format!("Failed to open database: {e}")))?;

            configure_connection(&conn)?;
            run_migrations(&mut conn)?;

            Ok::<_, AppError>(())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Database init task failed: {e}")))??;

        Ok(Self { db_path })
    }

    /// Returns the database path for use by other storage modules.
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }
}

/// Opens and configures a connection to the database file.
pub(crate) fn open_connection(db_path: &PathBuf) -> Result<Connection, AppError> {
    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Storage(format!("Failed to open database: {e}")))?;
    configure_connection(&conn)?;
    Ok(conn)
}

/// Configures connection with busy timeout and WAL mode.
fn configure_connection(conn: &Connection) -> Result<(), AppError> {
    conn.busy_timeout(Duration::from_secs(10))
        .map_err(|e| AppError::Storage(format!("Failed to set busy timeout: {e}")))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| AppError::Storage(format!("Failed to set WAL mode: {e}")))?;

    Ok(())
}

/// Runs database migrations using PRAGMA user_version.
fn run_migrations(conn: &mut Connection) -> Result<(), AppError> {
    let current_version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| AppError::Storage(format!("Failed to get schema version: {e}")))?;

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .map_err(|e| AppError::Storage(format!("Failed to start migration transaction: {e}")))?;

    if current_version < 1 {
        tx.execute_batch(V1_SCHEMA)
            .map_err(|e| AppError::Storage(format!("V1 migration failed: {e}")))?;
    }

    if current_version < 2 {
        tx.execute_batch(V2_MIGRATION)
            .map_err(|e| AppError::Storage(format!("V2 migration failed: {e}")))?;
    }

    tx.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(|e| AppError::Storage(format!("Failed to update schema version: {e}")))?;

    tx.commit()
        .map_err(|e| AppError::Storage(format!("Failed to commit migration: {e}")))?;

    info!(
        "[DB] Migrated schema from v{} to v{}",
        current_version, SCHEMA_VERSION
    );

    Ok(())
}
