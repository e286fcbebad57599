//! Project stores and the host-owned store cache
//!
//! A `Store` binds one project directory to its database. The host owns a
//! `StoreCache` — a bounded map of open stores with explicit close — instead
//! of a process-global handle registry.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::adapter::Db;
use crate::config::StoreConfig;
use crate::error::DbResult;
use crate::queries::{self, StoreStats};
use crate::schema;

/// One project's coordination store.
#[derive(Debug)]
pub struct Store {
    project_key: String,
    db: Db,
    config: StoreConfig,
}

impl Store {
    /// Open the persistent store for a project directory.
    ///
    /// The project key is the directory path itself.
    pub fn open(project_root: &Path, config: StoreConfig) -> DbResult<Self> {
        let db = Db::open(project_root, &config)?;
        Ok(Self {
            project_key: project_root.to_string_lossy().into_owned(),
            db,
            config,
        })
    }

    /// Open an in-memory store for tests, with the same schema and
    /// semantics as the persistent one.
    pub fn in_memory(project_key: &str) -> DbResult<Self> {
        Ok(Self {
            project_key: project_key.to_string(),
            db: Db::open_memory()?,
            config: StoreConfig::default(),
        })
    }

    /// The project scoping key for every row this store owns.
    #[must_use]
    pub fn project_key(&self) -> &str {
        &self.project_key
    }

    #[must_use]
    pub const fn db(&self) -> &Db {
        &self.db
    }

    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Cheap liveness round-trip.
    pub async fn is_healthy(&self, cancel: &CancellationToken) -> bool {
        self.db
            .with_conn(cancel, |conn| {
                let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
                Ok(one == 1)
            })
            .await
            .unwrap_or(false)
    }

    /// Row counts for this project.
    pub async fn stats(&self, cancel: &CancellationToken) -> DbResult<StoreStats> {
        let project_key = self.project_key.clone();
        self.db
            .with_conn(cancel, move |conn| queries::stats(conn, &project_key))
            .await
    }

    /// Drop and recreate every table — test support only.
    pub async fn reset(&self, cancel: &CancellationToken) -> DbResult<()> {
        self.db
            .with_conn(cancel, |conn| schema::reset_schema(conn))
            .await
    }
}

/// Bounded cache of open project stores.
///
/// Opening the same project twice yields the same `Arc<Store>`. When the
/// bound is reached the oldest store is evicted; its database closes once
/// the last reference drops.
#[derive(Debug)]
pub struct StoreCache {
    config: StoreConfig,
    max_open: usize,
    stores: Mutex<Vec<(String, Arc<Store>)>>,
}

impl StoreCache {
    #[must_use]
    pub fn new(config: StoreConfig, max_open: usize) -> Self {
        Self {
            config,
            max_open: max_open.max(1),
            stores: Mutex::new(Vec::new()),
        }
    }

    /// Get the open store for a project directory, opening it if needed.
    pub async fn get_or_open(&self, project_root: &Path) -> DbResult<Arc<Store>> {
        let key = project_root.to_string_lossy().into_owned();
        let mut stores = self.stores.lock().await;

        if let Some((_, store)) = stores.iter().find(|(k, _)| *k == key) {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(Store::open(project_root, self.config.clone())?);
        if stores.len() >= self.max_open {
            let (evicted, _) = stores.remove(0);
            tracing::debug!(project = %evicted, "store cache evicted oldest entry");
        }
        stores.push((key, Arc::clone(&store)));
        Ok(store)
    }

    /// Close one project's store. Returns whether it was open.
    pub async fn close(&self, project_key: &str) -> bool {
        let mut stores = self.stores.lock().await;
        let before = stores.len();
        stores.retain(|(k, _)| k != project_key);
        stores.len() < before
    }

    /// Close every open store.
    pub async fn close_all(&self) {
        self.stores.lock().await.clear();
    }

    /// Number of currently open stores.
    pub async fn open_count(&self) -> usize {
        self.stores.lock().await.len()
    }
}
