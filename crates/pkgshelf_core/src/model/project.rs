//! Project record.

use crate::model::repository::{RepositoryId, RepositoryRecord};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Stable project identifier.
pub type ProjectId = Uuid;

/// Persisted project row.
///
/// A project belongs to exactly the repository that created it; inherited
/// visibility through bases never changes `repository_uuid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub uuid: ProjectId,
    pub repository_uuid: RepositoryId,
    /// Unique within the owning repository.
    pub name: String,
    /// `storage_root/repository_name/project_name`.
    pub path: PathBuf,
}

impl ProjectRecord {
    /// Builds a record for `name` inside `repository`, deriving its path.
    pub fn new_in(repository: &RepositoryRecord, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            uuid: Uuid::new_v4(),
            repository_uuid: repository.uuid,
            path: repository.repository_path().join(&name),
            name,
        }
    }
}
