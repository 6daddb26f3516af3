//! Storage core for pkgshelf, a self-hosted package index.
//! Repositories inherit projects from their bases; projects hold uploaded
//! files guarded by a catalog-level write lock and a SHA-256 checksum.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, DatabaseConfig, IndexConfig, LoggingConfig, StoreConfig};
pub use logging::{
    default_log_level, init_from_config, init_logging, logging_status, LogLevel, LoggingError,
};
pub use model::name::{normalize_project_name, validate_name, NameKind, NameValidationError};
pub use repo::catalog_repo::{CatalogError, CatalogResult, CatalogStore, SqliteCatalogStore};
pub use service::error::{ErrorKind, StoreError, StoreResult};
pub use service::file_object::{ProjectFile, StagedContent, VerifyOutcome, STAGING_PREFIX};
pub use service::package_store::PackageStore;
pub use service::project_catalog::Project;
pub use service::reconcile::{reconcile, ReconcileReport};
pub use service::repository_graph::Repository;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
