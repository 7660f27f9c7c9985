use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use qre_core::{QreError, QreResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::schema::create_schema;

/// One `.db` file under the storage directory, as seen by [`StudyDbManager::list`].
#[derive(Debug, Clone)]
pub struct DbEntry {
    pub path: PathBuf,
    pub created_at: std::time::SystemTime,
}

/// Tracks which SQLite file is "active" and gates switching while a run is
/// in progress. Mirrors the multi-DB workflow: one process, one open pool,
/// any number of sibling `.db` files under `storage_dir`.
pub struct StudyDbManager {
    storage_dir: PathBuf,
    active_path: std::sync::Mutex<PathBuf>,
    active_pool: std::sync::Mutex<Option<SqlitePool>>,
    run_lock: Arc<AtomicBool>,
}

/// Held while an optimization or WFA run is executing; dropping it clears
/// the lock. `StudyDbManager::switch` refuses while any guard is alive.
pub struct RunLockGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl StudyDbManager {
    /// `storage_dir` is created if missing; `initial_db` becomes the active
    /// database (created with a fresh schema if it doesn't already exist).
    pub async fn new(storage_dir: impl Into<PathBuf>, initial_db_name: &str) -> QreResult<Self> {
        let storage_dir = storage_dir.into();
        std::fs::create_dir_all(&storage_dir).map_err(|e| QreError::StorageFailure(e.to_string()))?;
        let active_path = storage_dir.join(initial_db_name);

        let manager = Self {
            storage_dir,
            active_path: std::sync::Mutex::new(active_path.clone()),
            active_pool: std::sync::Mutex::new(None),
            run_lock: Arc::new(AtomicBool::new(false)),
        };
        manager.open(&active_path).await?;
        Ok(manager)
    }

    async fn open(&self, path: &Path) -> QreResult<()> {
        let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(8).connect_with(options).await.map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "failed to open study database");
            QreError::StorageFailure(e.to_string())
        })?;
        create_schema(&pool).await?;
        *self.active_pool.lock().unwrap() = Some(pool);
        *self.active_path.lock().unwrap() = path.to_path_buf();
        tracing::info!(path = %path.display(), "study database opened");
        Ok(())
    }

    /// The currently open pool. Panics if called before `new` completes,
    /// which cannot happen through the public API.
    pub fn pool(&self) -> SqlitePool {
        self.active_pool.lock().unwrap().clone().expect("database manager not initialized")
    }

    pub fn active_path(&self) -> PathBuf {
        self.active_path.lock().unwrap().clone()
    }

    /// Acquire the run lock; fails if a run is already in progress.
    pub fn acquire_run_lock(&self) -> QreResult<RunLockGuard> {
        if self.run_lock.swap(true, Ordering::SeqCst) {
            return Err(QreError::ExecutionFailure("a study is already running against this database".into()));
        }
        Ok(RunLockGuard { flag: self.run_lock.clone() })
    }

    fn is_running(&self) -> bool {
        self.run_lock.load(Ordering::SeqCst)
    }

    /// Sanitize `label` into a filesystem-safe stem, timestamp-prefix it,
    /// create the file with a fresh schema, but do not switch to it.
    pub async fn create_db(&self, label: &str) -> QreResult<PathBuf> {
        let sanitized: String = label.chars().map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' }).collect();
        let filename = format!("{}_{}.db", Utc::now().format("%Y%m%d_%H%M%S"), sanitized);
        let path = self.storage_dir.join(filename);

        let options = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await.map_err(|e| QreError::StorageFailure(e.to_string()))?;
        create_schema(&pool).await?;
        pool.close().await;
        Ok(path)
    }

    /// List every `*.db` file under the storage directory, oldest first.
    pub fn list(&self) -> QreResult<Vec<DbEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.storage_dir).map_err(|e| QreError::StorageFailure(e.to_string()))? {
            let entry = entry.map_err(|e| QreError::StorageFailure(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("db") {
                continue;
            }
            let created_at = entry.metadata().and_then(|m| m.created()).unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            entries.push(DbEntry { path, created_at });
        }
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    /// Switch the active database to `path`. Rejected while a run holds the
    /// run lock (an in-flight optimization writes against the pool the
    /// caller is about to swap out from under it).
    pub async fn switch(&self, path: &Path) -> QreResult<()> {
        if self.is_running() {
            tracing::warn!(path = %path.display(), "rejected database switch: a study is running");
            return Err(QreError::ExecutionFailure("cannot switch databases while a study is running".into()));
        }
        if let Some(pool) = self.active_pool.lock().unwrap().take() {
            pool.close().await;
        }
        self.open(path).await
    }
}
