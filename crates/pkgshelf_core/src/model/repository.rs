//! Repository record.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Stable repository identifier.
pub type RepositoryId = Uuid;

/// Persisted repository row.
///
/// Bases are not part of the record; they live in the ordered
/// `repository_bases` relation and are always queried fresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub uuid: RepositoryId,
    /// Globally unique repository name.
    pub name: String,
    /// Shared storage root fixed at creation time.
    pub storage_root: PathBuf,
}

impl RepositoryRecord {
    /// Builds a new record with a generated id.
    pub fn new(name: impl Into<String>, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            storage_root: storage_root.into(),
        }
    }

    /// Directory holding this repository's projects: `storage_root/name`.
    pub fn repository_path(&self) -> PathBuf {
        self.storage_root.join(&self.name)
    }

    /// Returns whether this record was created under `storage_root`.
    pub fn uses_storage_root(&self, storage_root: &Path) -> bool {
        self.storage_root == storage_root
    }
}
