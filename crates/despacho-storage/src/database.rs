// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use despacho_core::DespachoError;
use rusqlite::TransactionBehavior;
use tracing::debug;

use crate::migrations;

/// Handle to the despacho SQLite database.
///
/// Cloning is cheap; every clone talks to the same background thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path` with WAL mode and run pending migrations.
    pub async fn open(path: &str) -> Result<Self, DespachoError> {
        Self::open_with(path, true).await
    }

    /// Open the database, choosing the journal mode explicitly.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, DespachoError> {
        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(DespachoError::storage)?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(DespachoError::storage)?;

        conn.call(move |conn| -> Result<Result<(), DespachoError>, rusqlite::Error> {
            if wal_mode {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            Ok(migrations::run_migrations(conn))
        })
        .await
        .map_err(map_tr_err)??;

        debug!(path = %path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and release this handle. The background thread
    /// exits once every clone has been dropped.
    pub async fn close(self) -> Result<(), DespachoError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("database closed");
        Ok(())
    }
}

/// Failure inside a write transaction.
///
/// `Sql` aborts the call as a storage error. `Domain` rolls the transaction
/// back and surfaces the business error unchanged.
pub(crate) enum TxError {
    Sql(rusqlite::Error),
    Domain(DespachoError),
}

impl From<rusqlite::Error> for TxError {
    fn from(e: rusqlite::Error) -> Self {
        TxError::Sql(e)
    }
}

impl From<DespachoError> for TxError {
    fn from(e: DespachoError) -> Self {
        TxError::Domain(e)
    }
}

impl Database {
    /// Run `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken up front, so two writers never interleave a
    /// read and a write on the same rows. Commits only when `f` succeeds.
    pub(crate) async fn write_tx<T, F>(&self, f: F) -> Result<T, DespachoError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, TxError> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn| -> Result<Result<T, DespachoError>, rusqlite::Error> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                match f(&tx) {
                    Ok(value) => {
                        tx.commit()?;
                        Ok(Ok(value))
                    }
                    Err(TxError::Sql(e)) => Err(e),
                    Err(TxError::Domain(e)) => Ok(Err(e)),
                }
            })
            .await
            .map_err(map_tr_err)?
    }
}

/// Convert tokio-rusqlite errors into [`DespachoError::Storage`].
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> DespachoError {
    DespachoError::Storage {
        source: Box::new(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_runs_migrations_and_seeds_movement_types() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();

        let (codes, mode): (i64, String) = db
            .connection()
            .call(|conn| -> Result<(i64, String), rusqlite::Error> {
                let codes =
                    conn.query_row("SELECT COUNT(*) FROM movement_types", [], |r| r.get(0))?;
                let mode = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))?;
                Ok((codes, mode))
            })
            .await
            .unwrap();
        assert_eq!(codes, 8);
        assert_eq!(mode.to_lowercase(), "wal");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopening_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let path = path.to_str().unwrap();
        Database::open(path).await.unwrap().close().await.unwrap();
        Database::open(path).await.unwrap().close().await.unwrap();
    }
}
