//! Store-level error taxonomy.
//!
//! # Invariants
//! - Every `StoreError` maps to exactly one [`ErrorKind`].
//! - Absent lookups are `Ok(None)` and never become `NotFound` errors.

use crate::config::ConfigError;
use crate::model::name::NameValidationError;
use crate::repo::catalog_repo::CatalogError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};

/// Result type used by repository, project and file operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Coarse error category callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Invalid,
    IoFailure,
    PersistenceFailure,
}

/// Errors from the storage core.
#[derive(Debug)]
pub enum StoreError {
    /// A record targeted by a mutation disappeared.
    NotFound { entity: &'static str, key: String },
    /// File is currently locked by another writer.
    FileLocked { project: String, file: String },
    /// Persisted storage root differs from the configured one.
    StorageRootMismatch {
        repository: String,
        configured: PathBuf,
        persisted: PathBuf,
    },
    /// Declared base resolves to no declared or persisted repository.
    UnknownBase { repository: String, base: String },
    /// Base chain loops back onto a repository already being resolved.
    BaseCycle { repository: String },
    InvalidName(NameValidationError),
    Config(ConfigError),
    /// Filesystem failure while creating directories or streaming content.
    Io {
        action: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    /// Catalog operation failure.
    Persistence(CatalogError),
}

impl StoreError {
    pub(crate) fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Returns the taxonomy category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::FileLocked { .. } | Self::StorageRootMismatch { .. } => ErrorKind::Conflict,
            Self::UnknownBase { .. }
            | Self::BaseCycle { .. }
            | Self::InvalidName(_)
            | Self::Config(_) => ErrorKind::Invalid,
            Self::Io { .. } => ErrorKind::IoFailure,
            Self::Persistence(_) => ErrorKind::PersistenceFailure,
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { entity, key } => write!(f, "{entity} not found: {key}"),
            Self::FileLocked { project, file } => write!(
                f,
                "file `{file}` in project `{project}` is currently locked for uploading"
            ),
            Self::StorageRootMismatch {
                repository,
                configured,
                persisted,
            } => write!(
                f,
                "storage root of repository `{repository}` differs: configured `{}`, persisted `{}`; migrate the stored paths before changing it",
                configured.display(),
                persisted.display()
            ),
            Self::UnknownBase { repository, base } => write!(
                f,
                "repository `{repository}` declares unknown base `{base}`"
            ),
            Self::BaseCycle { repository } => {
                write!(f, "base chain of repository `{repository}` contains a cycle")
            }
            Self::InvalidName(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Io {
                action,
                path,
                source,
            } => write!(f, "failed to {action} `{}`: {source}", path.display()),
            Self::Persistence(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidName(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Persistence(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CatalogError> for StoreError {
    fn from(value: CatalogError) -> Self {
        match value {
            CatalogError::NotFound { entity, id } => Self::NotFound {
                entity,
                key: id.to_string(),
            },
            other => Self::Persistence(other),
        }
    }
}

impl From<NameValidationError> for StoreError {
    fn from(value: NameValidationError) -> Self {
        Self::InvalidName(value)
    }
}

impl From<ConfigError> for StoreError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, StoreError};
    use crate::repo::catalog_repo::CatalogError;
    use std::path::PathBuf;
    use uuid::Uuid;

    #[test]
    fn catalog_not_found_keeps_its_category() {
        let id = Uuid::new_v4();
        let err: StoreError = CatalogError::NotFound { entity: "file", id }.into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), format!("file not found: {id}"));

        let err: StoreError = CatalogError::Poisoned.into();
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
    }

    #[test]
    fn conflicts_cover_locks_and_storage_roots() {
        let locked = StoreError::FileLocked {
            project: "demo".to_string(),
            file: "demo-1.0.tar.gz".to_string(),
        };
        let moved = StoreError::StorageRootMismatch {
            repository: "base".to_string(),
            configured: PathBuf::from("/new"),
            persisted: PathBuf::from("/old"),
        };
        assert_eq!(locked.kind(), ErrorKind::Conflict);
        assert_eq!(moved.kind(), ErrorKind::Conflict);
        assert!(moved.to_string().contains("`/old`"));
    }
}
