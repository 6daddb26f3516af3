//! File record.
//!
//! # Invariants
//! - `locked == true` marks a write in progress; `checksum` may be stale then.
//! - `checksum` is only ever the digest of a fully written content stream.

use crate::model::project::{ProjectId, ProjectRecord};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Stable file identifier.
pub type FileId = Uuid;

/// Persisted file row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub uuid: FileId,
    pub project_uuid: ProjectId,
    /// Unique within the owning project.
    pub name: String,
    /// Lowercase hex SHA-256 of the last completed write.
    pub checksum: Option<String>,
    pub locked: bool,
    /// `project_path/file_name`.
    pub path: PathBuf,
}

impl FileRecord {
    /// Builds an unlocked, checksum-less record for `name` inside `project`.
    pub fn new_in(project: &ProjectRecord, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            uuid: Uuid::new_v4(),
            project_uuid: project.uuid,
            path: project.path.join(&name),
            name,
            checksum: None,
            locked: false,
        }
    }
}
