//! Storage-core services.
//!
//! # Responsibility
//! - Turn catalog records into repository, project and file views.
//! - Sequence multi-step operations (uploads, reconciliation) over the
//!   catalog store and the filesystem.

pub mod error;
pub mod file_object;
pub mod package_store;
pub mod project_catalog;
pub mod reconcile;
pub mod repository_graph;
