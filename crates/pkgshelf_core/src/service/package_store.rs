//! Package store façade.
//!
//! # Responsibility
//! - Own the catalog handle that every repository view borrows.
//! - Run the startup sequence: open the catalog, reconcile the declaration.

use crate::config::{IndexConfig, StoreConfig};
use crate::repo::catalog_repo::{CatalogStore, SqliteCatalogStore};
use crate::service::error::StoreResult;
use crate::service::reconcile::{reconcile, ReconcileReport};
use crate::service::repository_graph::Repository;
use log::info;
use std::path::Path;

/// Entry point for callers of the storage core.
pub struct PackageStore<S: CatalogStore> {
    store: S,
}

impl<S: CatalogStore> PackageStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Underlying catalog store.
    pub fn catalog(&self) -> &S {
        &self.store
    }

    /// Every persisted repository ordered by name.
    pub fn list_repositories(&self) -> StoreResult<Vec<Repository<'_, S>>> {
        Ok(self
            .store
            .list_repositories()?
            .into_iter()
            .map(|record| Repository::from_record(&self.store, record))
            .collect())
    }

    pub fn get_repository(&self, name: &str) -> StoreResult<Option<Repository<'_, S>>> {
        Ok(self
            .store
            .find_repository(name)?
            .map(|record| Repository::from_record(&self.store, record)))
    }

    /// See [`reconcile`].
    pub fn reconcile(
        &self,
        storage_root: &Path,
        declared: &[IndexConfig],
    ) -> StoreResult<ReconcileReport> {
        reconcile(&self.store, storage_root, declared)
    }
}

impl PackageStore<SqliteCatalogStore> {
    /// Opens the configured catalog and reconciles the declared indexes.
    ///
    /// Without `database.path` the catalog lives in memory for the lifetime
    /// of the returned store.
    pub fn bootstrap(config: &StoreConfig) -> StoreResult<(Self, ReconcileReport)> {
        config.validate()?;
        let store = match config.database.path.as_deref() {
            Some(path) => SqliteCatalogStore::open(path)?,
            None => SqliteCatalogStore::open_in_memory()?,
        };
        info!(
            "event=store_bootstrap module=store status=ok persistent={} indexes={}",
            config.database.path.is_some(),
            config.indexes.len()
        );

        let package_store = Self::new(store);
        let report = package_store.reconcile(&config.storage_path, &config.indexes)?;
        Ok((package_store, report))
    }
}
