//! Startup reconciliation of declared repositories against the catalog.
//!
//! # Responsibility
//! - Create declared repositories that are not persisted yet.
//! - Bring persisted base lists in line with the declaration.
//!
//! # Invariants
//! - Running twice with the same declaration changes nothing the second time.
//! - Storage roots are never migrated; a mismatch is a conflict.
//! - Conflicts and unresolvable bases are detected before the first mutation.
//! - Persisted repositories missing from the declaration are left untouched.

use crate::config::{validate_indexes, IndexConfig};
use crate::model::repository::{RepositoryId, RepositoryRecord};
use crate::repo::catalog_repo::CatalogStore;
use crate::service::error::{StoreError, StoreResult};
use crate::service::repository_graph::Repository;
use log::{error, info};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::time::Instant;

/// What one reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Repositories created by this pass, in declaration order.
    pub created: Vec<String>,
    /// Pre-existing repositories whose base list was replaced.
    pub rebased: Vec<String>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.rebased.is_empty()
    }
}

/// Aligns the catalog with `declared` under the shared `storage_root`.
///
/// # Errors
/// - `Config` when the declaration itself is malformed.
/// - `StorageRootMismatch` when a persisted repository uses another root.
/// - `UnknownBase` when a base is neither declared nor persisted.
/// - `Io` / `Persistence` from directory creation or catalog writes; work
///   committed before the failure stays in place.
pub fn reconcile<S: CatalogStore>(
    store: &S,
    storage_root: &Path,
    declared: &[IndexConfig],
) -> StoreResult<ReconcileReport> {
    let started_at = Instant::now();
    info!(
        "event=reconcile module=reconcile status=start declared={}",
        declared.len()
    );

    match reconcile_inner(store, storage_root, declared) {
        Ok(report) => {
            info!(
                "event=reconcile module=reconcile status=ok duration_ms={} created={} rebased={}",
                started_at.elapsed().as_millis(),
                report.created.len(),
                report.rebased.len()
            );
            Ok(report)
        }
        Err(err) => {
            error!(
                "event=reconcile module=reconcile status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn reconcile_inner<S: CatalogStore>(
    store: &S,
    storage_root: &Path,
    declared: &[IndexConfig],
) -> StoreResult<ReconcileReport> {
    validate_indexes(declared)?;

    let mut persisted: BTreeMap<String, RepositoryRecord> = store
        .list_repositories()?
        .into_iter()
        .map(|record| (record.name.clone(), record))
        .collect();
    preflight(&persisted, storage_root, declared)?;

    std::fs::create_dir_all(storage_root)
        .map_err(|source| StoreError::io("create storage root", storage_root, source))?;

    let mut report = ReconcileReport::default();
    for index in declared {
        if persisted.contains_key(&index.name) {
            continue;
        }
        // Bases declared further down are attached by the second pass.
        let base_ids = resolve_known_bases(&persisted, &index.bases);
        let repository = Repository::create(store, &index.name, storage_root, &base_ids)?;
        info!(
            "event=repository_create module=reconcile status=ok repository={} bases={}",
            index.name,
            base_ids.len()
        );
        persisted.insert(index.name.clone(), repository.record().clone());
        report.created.push(index.name.clone());
    }

    let created = report.created.iter().cloned().collect::<HashSet<_>>();
    for index in declared {
        let Some(record) = persisted.get(&index.name) else {
            continue;
        };
        let repository = Repository::from_record(store, record.clone());
        let current = repository
            .bases()?
            .iter()
            .map(|base| base.name().to_string())
            .collect::<BTreeSet<_>>();
        let wanted = index.bases.iter().cloned().collect::<BTreeSet<_>>();
        if current == wanted {
            continue;
        }

        let base_ids = resolve_known_bases(&persisted, &index.bases);
        repository.set_base_ids(&base_ids)?;
        if !created.contains(&index.name) {
            report.rebased.push(index.name.clone());
        }
    }

    Ok(report)
}

fn preflight(
    persisted: &BTreeMap<String, RepositoryRecord>,
    storage_root: &Path,
    declared: &[IndexConfig],
) -> StoreResult<()> {
    let declared_names = declared
        .iter()
        .map(|index| index.name.as_str())
        .collect::<HashSet<_>>();

    for index in declared {
        if let Some(record) = persisted.get(&index.name) {
            if !record.uses_storage_root(storage_root) {
                return Err(StoreError::StorageRootMismatch {
                    repository: index.name.clone(),
                    configured: storage_root.to_path_buf(),
                    persisted: record.storage_root.clone(),
                });
            }
        }
        for base in &index.bases {
            if !declared_names.contains(base.as_str()) && !persisted.contains_key(base) {
                return Err(StoreError::UnknownBase {
                    repository: index.name.clone(),
                    base: base.clone(),
                });
            }
        }
    }
    Ok(())
}

fn resolve_known_bases(
    persisted: &BTreeMap<String, RepositoryRecord>,
    names: &[String],
) -> Vec<RepositoryId> {
    names
        .iter()
        .filter_map(|name| persisted.get(name).map(|record| record.uuid))
        .collect()
}
