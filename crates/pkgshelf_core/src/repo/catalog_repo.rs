//! Catalog store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide typed CRUD over `repositories`, `repository_bases`, `projects`
//!   and `files`.
//! - Offer the atomic lock primitives the file write protocol relies on.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Natural keys are unique: repository `name`, `(repository, project name)`,
//!   `(project, file name)`. Violations surface as `CatalogError::Duplicate`.
//! - `try_lock_file` is a single conditional update and the only way to set
//!   `locked = 1`.
//! - `set_file_checksum` never touches the lock. `complete_file_write` stores
//!   the checksum and clears the lock in one statement, so `locked = 0` is
//!   never observable with a stale checksum.
//! - Base lists are returned in the order they were stored.

use crate::db::migrations::{current_user_version, latest_version, REQUIRED_TABLES};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::file::{FileId, FileRecord};
use crate::model::project::{ProjectId, ProjectRecord};
use crate::model::repository::{RepositoryId, RepositoryRecord};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const REPOSITORY_SELECT_SQL: &str = "SELECT uuid, name, storage_root FROM repositories";

const PROJECT_SELECT_SQL: &str = "SELECT uuid, repository_uuid, name, path FROM projects";

const FILE_SELECT_SQL: &str =
    "SELECT uuid, project_uuid, name, path, checksum, locked FROM files";

/// Result type used by catalog store operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors from catalog store operations.
#[derive(Debug)]
pub enum CatalogError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// A previous holder of the connection lock panicked.
    Poisoned,
    /// Target row does not exist.
    NotFound { entity: &'static str, id: Uuid },
    /// Insert collided with an existing natural key.
    Duplicate { entity: &'static str, key: String },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted into a valid record.
    InvalidData(String),
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Poisoned => write!(f, "catalog connection lock poisoned"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Duplicate { entity, key } => write!(f, "{entity} already exists: {key}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "catalog requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "catalog requires table `{table}`"),
            Self::InvalidData(message) => write!(f, "invalid catalog data: {message}"),
        }
    }
}

impl Error for CatalogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for CatalogError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for CatalogError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persistence contract consumed by the repository graph and project catalog.
///
/// Implementations must make every method a single atomic catalog operation.
/// Views built on top of a store never cache bases or lock state.
pub trait CatalogStore {
    /// Inserts a repository together with its ordered base list.
    fn create_repository(
        &self,
        record: &RepositoryRecord,
        base_ids: &[RepositoryId],
    ) -> CatalogResult<()>;
    /// Loads one repository by id.
    fn get_repository(&self, id: RepositoryId) -> CatalogResult<Option<RepositoryRecord>>;
    /// Loads one repository by its unique name.
    fn find_repository(&self, name: &str) -> CatalogResult<Option<RepositoryRecord>>;
    /// Lists all repositories ordered by name.
    fn list_repositories(&self) -> CatalogResult<Vec<RepositoryRecord>>;
    /// Lists the direct bases of one repository in stored order.
    fn repository_bases(&self, id: RepositoryId) -> CatalogResult<Vec<RepositoryRecord>>;
    /// Replaces the base list of one repository wholesale.
    fn set_repository_bases(
        &self,
        id: RepositoryId,
        base_ids: &[RepositoryId],
    ) -> CatalogResult<()>;

    /// Inserts a project.
    fn create_project(&self, record: &ProjectRecord) -> CatalogResult<()>;
    /// Loads one project owned directly by `repository_id`.
    fn find_project(
        &self,
        repository_id: RepositoryId,
        name: &str,
    ) -> CatalogResult<Option<ProjectRecord>>;
    /// Lists projects owned directly by `repository_id`, ordered by name.
    fn list_projects(&self, repository_id: RepositoryId) -> CatalogResult<Vec<ProjectRecord>>;

    /// Inserts a file record.
    fn create_file(&self, record: &FileRecord) -> CatalogResult<()>;
    /// Loads one file by id.
    fn get_file(&self, id: FileId) -> CatalogResult<Option<FileRecord>>;
    /// Loads one file by name within a project.
    fn find_file(&self, project_id: ProjectId, name: &str) -> CatalogResult<Option<FileRecord>>;
    /// Lists files of one project ordered by name.
    fn list_files(&self, project_id: ProjectId) -> CatalogResult<Vec<FileRecord>>;
    /// Sets `locked = 1` only if it was `0`. Returns whether the lock was taken.
    fn try_lock_file(&self, id: FileId) -> CatalogResult<bool>;
    /// Clears the lock without touching the checksum.
    fn unlock_file(&self, id: FileId) -> CatalogResult<()>;
    /// Replaces the checksum (or clears it) and leaves the lock as it is.
    fn set_file_checksum(&self, id: FileId, checksum: Option<&str>) -> CatalogResult<()>;
    /// Stores `checksum` and clears the lock in one update.
    fn complete_file_write(&self, id: FileId, checksum: &str) -> CatalogResult<()>;
    /// Removes one file record.
    fn delete_file(&self, id: FileId) -> CatalogResult<()>;
}

/// SQLite-backed catalog store.
///
/// One connection guarded by a mutex; every trait call holds the guard for
/// exactly one statement or one transaction.
pub struct SqliteCatalogStore {
    conn: Mutex<Connection>,
}

impl SqliteCatalogStore {
    /// Wraps a migrated connection.
    pub fn try_new(conn: Connection) -> CatalogResult<Self> {
        ensure_catalog_connection_ready(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens (and migrates) the catalog database at `path`.
    pub fn open(path: impl AsRef<Path>) -> CatalogResult<Self> {
        Self::try_new(open_db(path)?)
    }

    /// Opens a fresh in-memory catalog.
    pub fn open_in_memory() -> CatalogResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    fn conn(&self) -> CatalogResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CatalogError::Poisoned)
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn create_repository(
        &self,
        record: &RepositoryRecord,
        base_ids: &[RepositoryId],
    ) -> CatalogResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO repositories (uuid, name, storage_root) VALUES (?1, ?2, ?3);",
            params![
                record.uuid.to_string(),
                record.name.as_str(),
                path_to_db(&record.storage_root)?,
            ],
        )
        .map_err(|err| map_insert_error(err, "repository", &record.name))?;
        insert_bases(&tx, record.uuid, base_ids)?;
        tx.commit()?;
        Ok(())
    }

    fn get_repository(&self, id: RepositoryId) -> CatalogResult<Option<RepositoryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{REPOSITORY_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_repository_row(row)?));
        }
        Ok(None)
    }

    fn find_repository(&self, name: &str) -> CatalogResult<Option<RepositoryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{REPOSITORY_SELECT_SQL} WHERE name = ?1;"))?;
        let mut rows = stmt.query([name])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_repository_row(row)?));
        }
        Ok(None)
    }

    fn list_repositories(&self) -> CatalogResult<Vec<RepositoryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{REPOSITORY_SELECT_SQL} ORDER BY name ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_repository_row(row)?);
        }
        Ok(items)
    }

    fn repository_bases(&self, id: RepositoryId) -> CatalogResult<Vec<RepositoryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT r.uuid AS uuid, r.name AS name, r.storage_root AS storage_root
             FROM repository_bases b
             INNER JOIN repositories r ON r.uuid = b.base_uuid
             WHERE b.repository_uuid = ?1
             ORDER BY b.position ASC;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_repository_row(row)?);
        }
        Ok(items)
    }

    fn set_repository_bases(
        &self,
        id: RepositoryId,
        base_ids: &[RepositoryId],
    ) -> CatalogResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE repositories
             SET updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(CatalogError::NotFound {
                entity: "repository",
                id,
            });
        }
        tx.execute(
            "DELETE FROM repository_bases WHERE repository_uuid = ?1;",
            [id.to_string()],
        )?;
        insert_bases(&tx, id, base_ids)?;
        tx.commit()?;
        Ok(())
    }

    fn create_project(&self, record: &ProjectRecord) -> CatalogResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO projects (uuid, repository_uuid, name, path) VALUES (?1, ?2, ?3, ?4);",
            params![
                record.uuid.to_string(),
                record.repository_uuid.to_string(),
                record.name.as_str(),
                path_to_db(&record.path)?,
            ],
        )
        .map_err(|err| map_insert_error(err, "project", &record.name))?;
        Ok(())
    }

    fn find_project(
        &self,
        repository_id: RepositoryId,
        name: &str,
    ) -> CatalogResult<Option<ProjectRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{PROJECT_SELECT_SQL} WHERE repository_uuid = ?1 AND name = ?2;"
        ))?;
        let mut rows = stmt.query(params![repository_id.to_string(), name])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_project_row(row)?));
        }
        Ok(None)
    }

    fn list_projects(&self, repository_id: RepositoryId) -> CatalogResult<Vec<ProjectRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{PROJECT_SELECT_SQL} WHERE repository_uuid = ?1 ORDER BY name ASC;"
        ))?;
        let mut rows = stmt.query([repository_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_project_row(row)?);
        }
        Ok(items)
    }

    fn create_file(&self, record: &FileRecord) -> CatalogResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO files (uuid, project_uuid, name, path, checksum, locked)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                record.uuid.to_string(),
                record.project_uuid.to_string(),
                record.name.as_str(),
                path_to_db(&record.path)?,
                record.checksum.as_deref(),
                bool_to_int(record.locked),
            ],
        )
        .map_err(|err| map_insert_error(err, "file", &record.name))?;
        Ok(())
    }

    fn get_file(&self, id: FileId) -> CatalogResult<Option<FileRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{FILE_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_file_row(row)?));
        }
        Ok(None)
    }

    fn find_file(&self, project_id: ProjectId, name: &str) -> CatalogResult<Option<FileRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{FILE_SELECT_SQL} WHERE project_uuid = ?1 AND name = ?2;"
        ))?;
        let mut rows = stmt.query(params![project_id.to_string(), name])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_file_row(row)?));
        }
        Ok(None)
    }

    fn list_files(&self, project_id: ProjectId) -> CatalogResult<Vec<FileRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{FILE_SELECT_SQL} WHERE project_uuid = ?1 ORDER BY name ASC;"
        ))?;
        let mut rows = stmt.query([project_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_file_row(row)?);
        }
        Ok(items)
    }

    fn try_lock_file(&self, id: FileId) -> CatalogResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE files
             SET locked = 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND locked = 0;",
            [id.to_string()],
        )?;
        if changed == 1 {
            return Ok(true);
        }
        if file_exists(&conn, id)? {
            Ok(false)
        } else {
            Err(CatalogError::NotFound { entity: "file", id })
        }
    }

    fn unlock_file(&self, id: FileId) -> CatalogResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE files
             SET locked = 0,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(CatalogError::NotFound { entity: "file", id });
        }
        Ok(())
    }

    fn set_file_checksum(&self, id: FileId, checksum: Option<&str>) -> CatalogResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE files
             SET checksum = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![id.to_string(), checksum],
        )?;
        if changed == 0 {
            return Err(CatalogError::NotFound { entity: "file", id });
        }
        Ok(())
    }

    fn complete_file_write(&self, id: FileId, checksum: &str) -> CatalogResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE files
             SET checksum = ?2,
                 locked = 0,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![id.to_string(), checksum],
        )?;
        if changed == 0 {
            return Err(CatalogError::NotFound { entity: "file", id });
        }
        Ok(())
    }

    fn delete_file(&self, id: FileId) -> CatalogResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM files WHERE uuid = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(CatalogError::NotFound { entity: "file", id });
        }
        Ok(())
    }
}

fn insert_bases(
    conn: &Connection,
    repository_id: RepositoryId,
    base_ids: &[RepositoryId],
) -> CatalogResult<()> {
    for (position, base_id) in base_ids.iter().enumerate() {
        conn.execute(
            "INSERT INTO repository_bases (repository_uuid, base_uuid, position)
             VALUES (?1, ?2, ?3);",
            params![
                repository_id.to_string(),
                base_id.to_string(),
                position as i64
            ],
        )
        .map_err(|err| map_insert_error(err, "repository base", &base_id.to_string()))?;
    }
    Ok(())
}

fn file_exists(conn: &Connection, id: FileId) -> CatalogResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM files WHERE uuid = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn map_insert_error(err: rusqlite::Error, entity: &'static str, key: &str) -> CatalogError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        let unique_violation = failure.code == ErrorCode::ConstraintViolation
            && matches!(
                failure.extended_code,
                rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            );
        if unique_violation {
            return CatalogError::Duplicate {
                entity,
                key: key.to_string(),
            };
        }
    }
    err.into()
}

fn parse_repository_row(row: &Row<'_>) -> CatalogResult<RepositoryRecord> {
    let uuid_text: String = row.get("uuid")?;
    let storage_root: String = row.get("storage_root")?;
    Ok(RepositoryRecord {
        uuid: parse_uuid(&uuid_text, "repositories.uuid")?,
        name: row.get("name")?,
        storage_root: PathBuf::from(storage_root),
    })
}

fn parse_project_row(row: &Row<'_>) -> CatalogResult<ProjectRecord> {
    let uuid_text: String = row.get("uuid")?;
    let repository_text: String = row.get("repository_uuid")?;
    let path: String = row.get("path")?;
    Ok(ProjectRecord {
        uuid: parse_uuid(&uuid_text, "projects.uuid")?,
        repository_uuid: parse_uuid(&repository_text, "projects.repository_uuid")?,
        name: row.get("name")?,
        path: PathBuf::from(path),
    })
}

fn parse_file_row(row: &Row<'_>) -> CatalogResult<FileRecord> {
    let uuid_text: String = row.get("uuid")?;
    let project_text: String = row.get("project_uuid")?;
    let path: String = row.get("path")?;

    let locked = match row.get::<_, i64>("locked")? {
        0 => false,
        1 => true,
        other => {
            return Err(CatalogError::InvalidData(format!(
                "invalid locked value `{other}` in files.locked"
            )));
        }
    };

    Ok(FileRecord {
        uuid: parse_uuid(&uuid_text, "files.uuid")?,
        project_uuid: parse_uuid(&project_text, "files.project_uuid")?,
        name: row.get("name")?,
        checksum: row.get("checksum")?,
        locked,
        path: PathBuf::from(path),
    })
}

fn parse_uuid(value: &str, column: &'static str) -> CatalogResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| CatalogError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn path_to_db(path: &Path) -> CatalogResult<&str> {
    path.to_str().ok_or_else(|| {
        CatalogError::InvalidData(format!("path `{}` is not valid UTF-8", path.display()))
    })
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn ensure_catalog_connection_ready(conn: &Connection) -> CatalogResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(CatalogError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &table in REQUIRED_TABLES {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(CatalogError::MissingRequiredTable(table));
        }
    }

    Ok(())
}
