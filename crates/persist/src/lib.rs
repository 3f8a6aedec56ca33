//! Beacon persistence: SQLite-backed store for stateless-cluster
//! kubeconfig blobs.
//!
//! One table, auto-incrementing id, base64 blob per row. Every operation is
//! an async fn whose suspension point is the blocking-pool join; the
//! connection behind a mutex serializes writes. Read-modify-write sequences
//! (find, mutate, re-store) are not transactional across operations, so two
//! racing renames can lose an update.

#![forbid(unsafe_code)]

pub mod ident;
pub mod resolve;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use beacon_core::{Error, Result};
use metrics::{counter, histogram};
use rusqlite::Connection;
use tracing::debug;

/// Recorded via `PRAGMA user_version` on open.
pub const SCHEMA_VERSION: i64 = 1;

const SCAN_SQL: &str = "SELECT id, kubeconfig FROM kubeconfig_store ORDER BY id";

/// Handle to the kubeconfig store. Cheap to clone; all clones share one
/// serialized connection.
#[derive(Clone)]
pub struct KubeconfigStore {
    db: Arc<Mutex<Connection>>,
}

impl KubeconfigStore {
    /// Open the default database (`BEACON_DB_PATH`, else `~/.beacon/kubeconfigs.db`).
    pub async fn open_default() -> Result<Self> {
        let path = std::env::var("BEACON_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_db_path());
        Self::open(path).await
    }

    /// Open (creating the table if absent) a handle to the database.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let started = Instant::now();
        let db = tokio::task::spawn_blocking(move || open_connection(&path))
            .await
            .map_err(|e| Error::StoreUnavailable(format!("blocking task: {e}")))??;
        histogram!("store_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(Self { db: Arc::new(Mutex::new(db)) })
    }

    /// Insert a new record, returning its database-assigned id.
    pub async fn add(&self, kubeconfig: impl Into<String>) -> Result<i64> {
        let blob = kubeconfig.into();
        let started = Instant::now();
        let id = self
            .with_db(move |db| {
                db.execute("INSERT INTO kubeconfig_store(kubeconfig) VALUES (?1)", [&blob])
                    .map_err(tx_err)?;
                Ok(db.last_insert_rowid())
            })
            .await?;
        histogram!("store_add_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("store_add_total", 1u64);
        debug!(id, "kubeconfig added to store");
        Ok(id)
    }

    /// Snapshot of every record in cursor (id) order.
    pub async fn list_all(&self) -> Result<Vec<(i64, String)>> {
        self.with_db(|db| {
            let mut stmt = db.prepare(SCAN_SQL).map_err(tx_err)?;
            let mut rows = stmt.query([]).map_err(tx_err)?;
            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(tx_err)? {
                out.push((row.get(0).map_err(tx_err)?, row.get(1).map_err(tx_err)?));
            }
            Ok(out)
        })
        .await
    }

    /// Scan in cursor order, returning the first record whose blob satisfies
    /// `pred`. Stops scanning on the first match.
    pub async fn find_first_matching<F>(&self, pred: F) -> Result<Option<(i64, String)>>
    where
        F: Fn(&str) -> bool + Send + 'static,
    {
        self.with_db(move |db| {
            let mut stmt = db.prepare(SCAN_SQL).map_err(tx_err)?;
            let mut rows = stmt.query([]).map_err(tx_err)?;
            while let Some(row) = rows.next().map_err(tx_err)? {
                let id: i64 = row.get(0).map_err(tx_err)?;
                let blob: String = row.get(1).map_err(tx_err)?;
                if pred(&blob) {
                    return Ok(Some((id, blob)));
                }
            }
            Ok(None)
        })
        .await
    }

    /// Overwrite the blob for a given id.
    pub async fn update_record(&self, id: i64, kubeconfig: impl Into<String>) -> Result<()> {
        let blob = kubeconfig.into();
        self.with_db(move |db| {
            let n = db
                .execute(
                    "UPDATE kubeconfig_store SET kubeconfig = ?1 WHERE id = ?2",
                    rusqlite::params![blob, id],
                )
                .map_err(tx_err)?;
            if n == 0 {
                return Err(Error::RecordNotFound(id));
            }
            Ok(())
        })
        .await?;
        counter!("store_update_total", 1u64);
        debug!(id, "kubeconfig record updated");
        Ok(())
    }

    /// Scan and delete the first matching record within one transaction,
    /// returning the deleted blob.
    pub async fn delete_first_matching<F>(&self, pred: F) -> Result<Option<String>>
    where
        F: Fn(&str) -> bool + Send + 'static,
    {
        let deleted = self
            .with_db(move |db| {
                let tx = db.transaction().map_err(tx_err)?;
                let found = {
                    let mut stmt = tx.prepare(SCAN_SQL).map_err(tx_err)?;
                    let mut rows = stmt.query([]).map_err(tx_err)?;
                    let mut hit: Option<(i64, String)> = None;
                    while let Some(row) = rows.next().map_err(tx_err)? {
                        let id: i64 = row.get(0).map_err(tx_err)?;
                        let blob: String = row.get(1).map_err(tx_err)?;
                        if pred(&blob) {
                            hit = Some((id, blob));
                            break;
                        }
                    }
                    hit
                };
                match found {
                    Some((id, blob)) => {
                        tx.execute("DELETE FROM kubeconfig_store WHERE id = ?1", [id])
                            .map_err(tx_err)?;
                        tx.commit().map_err(tx_err)?;
                        Ok(Some(blob))
                    }
                    None => Ok(None),
                }
            })
            .await?;
        if deleted.is_some() {
            counter!("store_delete_total", 1u64);
            debug!("kubeconfig record deleted");
        }
        Ok(deleted)
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut guard = db
                .lock()
                .map_err(|_| Error::TransactionFailed("store mutex poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::TransactionFailed(format!("blocking task: {e}")))?
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let db = Connection::open(path)
        .map_err(|e| Error::StoreUnavailable(format!("opening sqlite db at {}: {e}", path.display())))?;
    db.pragma_update(None, "journal_mode", &"WAL").ok();
    db.pragma_update(None, "synchronous", &"NORMAL").ok();
    db.execute(
        "CREATE TABLE IF NOT EXISTS kubeconfig_store (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            kubeconfig TEXT NOT NULL
        )",
        [],
    )
    .map_err(|e| Error::StoreUnavailable(format!("creating kubeconfig_store table: {e}")))?;
    db.pragma_update(None, "user_version", &SCHEMA_VERSION).ok();
    Ok(db)
}

/// Data directory shared by the store and the identifier scope.
pub fn data_dir() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = PathBuf::from(home);
        p.push(".beacon");
        let _ = std::fs::create_dir_all(&p);
        return p;
    }
    // Fallback to current directory
    PathBuf::from(".")
}

fn default_db_path() -> PathBuf {
    let mut p = data_dir();
    p.push("kubeconfigs.db");
    p
}

fn tx_err(e: rusqlite::Error) -> Error {
    Error::TransactionFailed(e.to_string())
}
