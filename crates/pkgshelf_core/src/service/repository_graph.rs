//! Repository graph: identity, bases and inherited project resolution.
//!
//! # Responsibility
//! - Expose one repository's own projects and its ordered bases.
//! - Resolve the effective project set across the base chain.
//!
//! # Invariants
//! - Bases are re-read from the catalog on every call.
//! - `all_projects` is override-by-first-definition: own projects first,
//!   then each direct base depth-first in stored order; a name already
//!   collected is never replaced.
//! - `get_project` never consults bases.
//! - A base chain that loops back onto a repository still being resolved is
//!   reported as `BaseCycle` instead of recursing forever.
//!
//! Graph reads are not isolated from concurrent `set_bases`/`add_project`.

use crate::model::name::{validate_name, NameKind};
use crate::model::project::ProjectRecord;
use crate::model::repository::{RepositoryId, RepositoryRecord};
use crate::repo::catalog_repo::{CatalogError, CatalogStore};
use crate::service::error::{StoreError, StoreResult};
use crate::service::project_catalog::Project;
use log::info;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Catalog view of one repository.
pub struct Repository<'s, S: CatalogStore> {
    store: &'s S,
    record: RepositoryRecord,
}

impl<'s, S: CatalogStore> Repository<'s, S> {
    pub(crate) fn from_record(store: &'s S, record: RepositoryRecord) -> Self {
        Self { store, record }
    }

    /// Persists a new repository and creates its directory.
    pub(crate) fn create(
        store: &'s S,
        name: &str,
        storage_root: &Path,
        base_ids: &[RepositoryId],
    ) -> StoreResult<Self> {
        validate_name(NameKind::Repository, name)?;
        let record = RepositoryRecord::new(name, storage_root);
        let directory = record.repository_path();
        std::fs::create_dir_all(&directory)
            .map_err(|source| StoreError::io("create repository directory", &directory, source))?;
        store.create_repository(&record, base_ids)?;
        Ok(Self::from_record(store, record))
    }

    pub fn id(&self) -> RepositoryId {
        self.record.uuid
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn storage_root(&self) -> &Path {
        &self.record.storage_root
    }

    /// `storage_root/name`.
    pub fn repository_path(&self) -> PathBuf {
        self.record.repository_path()
    }

    pub fn record(&self) -> &RepositoryRecord {
        &self.record
    }

    /// Direct bases in stored order, read fresh from the catalog.
    pub fn bases(&self) -> StoreResult<Vec<Repository<'s, S>>> {
        Ok(self
            .store
            .repository_bases(self.record.uuid)?
            .into_iter()
            .map(|record| Repository::from_record(self.store, record))
            .collect())
    }

    /// Effective project set keyed by project name.
    ///
    /// Own projects shadow every base; among bases, the first one explored
    /// depth-first defines the name. A repository reached twice through
    /// different paths is only walked once.
    ///
    /// # Errors
    /// - `BaseCycle` when the base chain revisits a repository on the
    ///   current path.
    pub fn all_projects(&self) -> StoreResult<BTreeMap<String, Project<'s, S>>> {
        let mut resolved = BTreeMap::new();
        let mut walk = BaseWalk::default();
        walk.collect(self.store, &self.record, &mut resolved)?;
        Ok(resolved)
    }

    /// Inheritance-aware lookup: the project `name` as `all_projects` sees it.
    pub fn find_project(&self, name: &str) -> StoreResult<Option<Project<'s, S>>> {
        if let Some(own) = self.get_project(name)? {
            return Ok(Some(own));
        }
        Ok(self.all_projects()?.remove(name))
    }

    /// Looks up a project owned directly by this repository.
    pub fn get_project(&self, name: &str) -> StoreResult<Option<Project<'s, S>>> {
        Ok(self
            .store
            .find_project(self.record.uuid, name)?
            .map(|record| Project::from_record(self.store, record)))
    }

    /// Returns the own project `name`, creating it and its directory if absent.
    pub fn add_project(&self, name: &str) -> StoreResult<Project<'s, S>> {
        validate_name(NameKind::Project, name)?;
        if let Some(existing) = self.get_project(name)? {
            return Ok(existing);
        }

        let record = ProjectRecord::new_in(&self.record, name);
        std::fs::create_dir_all(&record.path)
            .map_err(|source| StoreError::io("create project directory", &record.path, source))?;

        match self.store.create_project(&record) {
            Ok(()) => {
                info!(
                    "event=project_add module=graph status=ok repository={} project={}",
                    self.record.name, name
                );
                Ok(Project::from_record(self.store, record))
            }
            Err(CatalogError::Duplicate { .. }) => {
                self.get_project(name)?.ok_or_else(|| StoreError::NotFound {
                    entity: "project",
                    key: name.to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Replaces the base list wholesale, keeping the given order.
    ///
    /// Repeated entries collapse onto their first position. No cycle check is
    /// made here; cycles surface from `all_projects`.
    pub fn set_bases(&self, bases: &[Repository<'_, S>]) -> StoreResult<()> {
        let ids = bases.iter().map(|base| base.id()).collect::<Vec<_>>();
        self.set_base_ids(&ids)
    }

    pub(crate) fn set_base_ids(&self, base_ids: &[RepositoryId]) -> StoreResult<()> {
        let mut seen = HashSet::new();
        let ordered = base_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect::<Vec<_>>();
        self.store.set_repository_bases(self.record.uuid, &ordered)?;
        info!(
            "event=bases_set module=graph status=ok repository={} base_count={}",
            self.record.name,
            ordered.len()
        );
        Ok(())
    }
}

impl<S: CatalogStore> fmt::Debug for Repository<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("record", &self.record)
            .finish()
    }
}

#[derive(Default)]
struct BaseWalk {
    on_path: HashSet<RepositoryId>,
    finished: HashSet<RepositoryId>,
}

impl BaseWalk {
    fn collect<'s, S: CatalogStore>(
        &mut self,
        store: &'s S,
        repository: &RepositoryRecord,
        resolved: &mut BTreeMap<String, Project<'s, S>>,
    ) -> StoreResult<()> {
        if self.finished.contains(&repository.uuid) {
            return Ok(());
        }
        if !self.on_path.insert(repository.uuid) {
            return Err(StoreError::BaseCycle {
                repository: repository.name.clone(),
            });
        }

        for project in store.list_projects(repository.uuid)? {
            if !resolved.contains_key(&project.name) {
                resolved.insert(project.name.clone(), Project::from_record(store, project));
            }
        }
        for base in store.repository_bases(repository.uuid)? {
            self.collect(store, &base, resolved)?;
        }

        self.on_path.remove(&repository.uuid);
        self.finished.insert(repository.uuid);
        Ok(())
    }
}
