//! Project catalog: the files of one project and the upload protocol.
//!
//! # Responsibility
//! - List and look up files owned by one project.
//! - Sequence create-or-overwrite uploads so every failure path leaves the
//!   catalog and the stored bytes consistent.
//!
//! # Invariants
//! - A locked file is never written by a second caller.
//! - A failed first upload leaves no catalog record behind.
//! - A failed overwrite leaves the previous bytes and checksum in place and
//!   the record unlocked.
//! - An upload is sequenced as stage, record checksum (still locked),
//!   install, unlock. Unlocked bytes always match the recorded checksum.
//! - A failed upload over a record that never completed a write deletes the
//!   record instead of unlocking it.
//! - Only when restoring the previous checksum after a failed install also
//!   fails does the record stay locked.

use crate::model::file::FileRecord;
use crate::model::name::{validate_name, NameKind};
use crate::model::project::{ProjectId, ProjectRecord};
use crate::model::repository::RepositoryId;
use crate::repo::catalog_repo::{CatalogError, CatalogStore};
use crate::service::error::{StoreError, StoreResult};
use crate::service::file_object::ProjectFile;
use log::{error, info, warn};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Catalog view of one project.
pub struct Project<'s, S: CatalogStore> {
    store: &'s S,
    record: ProjectRecord,
}

impl<'s, S: CatalogStore> Project<'s, S> {
    pub(crate) fn from_record(store: &'s S, record: ProjectRecord) -> Self {
        Self { store, record }
    }

    pub fn id(&self) -> ProjectId {
        self.record.uuid
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Repository that owns this project (never a base it is inherited from).
    pub fn repository_id(&self) -> RepositoryId {
        self.record.repository_uuid
    }

    pub fn project_path(&self) -> &Path {
        &self.record.path
    }

    pub fn record(&self) -> &ProjectRecord {
        &self.record
    }

    /// Lists all files of this project ordered by name.
    pub fn files(&self) -> StoreResult<Vec<ProjectFile<'s, S>>> {
        let records = self.store.list_files(self.record.uuid)?;
        Ok(records
            .into_iter()
            .map(|record| ProjectFile::from_record(self.store, record))
            .collect())
    }

    /// Looks up one file by name.
    pub fn get_file(&self, name: &str) -> StoreResult<Option<ProjectFile<'s, S>>> {
        Ok(self
            .store
            .find_file(self.record.uuid, name)?
            .map(|record| ProjectFile::from_record(self.store, record)))
    }

    /// Uploads `content` as file `name`, creating or overwriting it.
    ///
    /// Returns the unlocked file carrying the new checksum.
    ///
    /// # Errors
    /// - `FileLocked` when another upload of the same name is in progress.
    /// - `Io` when staging, streaming or installing fails; a new record is
    ///   rolled back, an existing one is unlocked with its prior checksum.
    /// - `Persistence` on catalog failures.
    pub fn add_file(&self, name: &str, content: impl Read) -> StoreResult<ProjectFile<'s, S>> {
        validate_name(NameKind::File, name)?;

        let (mut file, created) = match self.store.find_file(self.record.uuid, name)? {
            Some(existing) => (ProjectFile::from_record(self.store, existing), false),
            None => self.insert_file_record(name)?,
        };

        if !created && file.is_locked() {
            warn!(
                "event=file_upload module=catalog status=rejected reason=locked project={} file={}",
                self.record.name, name
            );
            return Err(StoreError::FileLocked {
                project: self.record.name.clone(),
                file: name.to_string(),
            });
        }

        if let Err(err) = file.lock() {
            // A lost lock race on a fresh record means another writer owns it now.
            if created && !matches!(err, StoreError::FileLocked { .. }) {
                self.discard_new_record(file);
            }
            warn!(
                "event=file_upload module=catalog status=rejected reason=lock_failed project={} file={} error={}",
                self.record.name, name, err
            );
            return Err(err);
        }

        // The view predates the lock; reload what the lock now protects.
        if let Err(err) = file.refresh() {
            self.abandon_upload(file, created, UploadStage::Refresh, &err);
            return Err(err);
        }
        let previous = file.checksum().map(str::to_string);

        let staged = match file.write(content) {
            Ok(staged) => staged,
            Err(err) => {
                self.abandon_upload(file, created, UploadStage::Write, &err);
                return Err(err);
            }
        };
        let checksum = staged.checksum().to_string();

        if let Err(err) = file.record_checksum(Some(&checksum)) {
            drop(staged);
            self.abandon_upload(file, created, UploadStage::Checksum, &err);
            return Err(err);
        }

        if let Err(err) = file.install(staged) {
            if !created {
                if let Err(restore_err) = file.record_checksum(previous.as_deref()) {
                    error!(
                        "event=file_upload module=catalog status=error stage=restore project={} file={} error={}",
                        self.record.name, name, restore_err
                    );
                    return Err(err);
                }
            }
            self.abandon_upload(file, created, UploadStage::Install, &err);
            return Err(err);
        }

        if let Err(err) = file.complete_write(&checksum) {
            self.abandon_upload(file, created, UploadStage::Commit, &err);
            return Err(err);
        }

        info!(
            "event=file_upload module=catalog status=ok created={} project={} file={} checksum={}",
            created, self.record.name, name, checksum
        );
        Ok(file)
    }

    fn insert_file_record(&self, name: &str) -> StoreResult<(ProjectFile<'s, S>, bool)> {
        let record = FileRecord::new_in(&self.record, name);
        match self.store.create_file(&record) {
            Ok(()) => Ok((ProjectFile::from_record(self.store, record), true)),
            Err(CatalogError::Duplicate { .. }) => {
                // Lost the insert race; continue as an overwrite of the winner's record.
                let existing = self
                    .store
                    .find_file(self.record.uuid, name)?
                    .ok_or_else(|| StoreError::NotFound {
                        entity: "file",
                        key: name.to_string(),
                    })?;
                Ok((ProjectFile::from_record(self.store, existing), false))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn abandon_upload(
        &self,
        mut file: ProjectFile<'s, S>,
        created: bool,
        stage: UploadStage,
        err: &StoreError,
    ) {
        error!(
            "event=file_upload module=catalog status=error stage={} created={} project={} file={} error={}",
            stage.as_str(),
            created,
            self.record.name,
            file.name(),
            err
        );
        if !created && file.checksum().is_some() {
            release_lock(&mut file);
            return;
        }
        if stage == UploadStage::Commit {
            if let Err(remove_err) = std::fs::remove_file(file.file_path()) {
                warn!(
                    "event=file_rollback module=catalog status=error project={} file={} error={}",
                    self.record.name,
                    file.name(),
                    remove_err
                );
            }
        }
        self.discard_new_record(file);
    }

    fn discard_new_record(&self, file: ProjectFile<'s, S>) {
        let name = file.name().to_string();
        if let Err(err) = file.delete() {
            warn!(
                "event=file_rollback module=catalog status=error project={} file={} error={}",
                self.record.name, name, err
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadStage {
    Refresh,
    Write,
    Checksum,
    Install,
    Commit,
}

impl UploadStage {
    fn as_str(self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::Write => "write",
            Self::Checksum => "checksum",
            Self::Install => "install",
            Self::Commit => "commit",
        }
    }
}

fn release_lock<S: CatalogStore>(file: &mut ProjectFile<'_, S>) {
    if let Err(err) = file.unlock() {
        warn!(
            "event=file_unlock module=catalog status=error file={} error={}",
            file.name(),
            err
        );
    }
}

impl<S: CatalogStore> fmt::Debug for Project<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("record", &self.record)
            .finish()
    }
}
