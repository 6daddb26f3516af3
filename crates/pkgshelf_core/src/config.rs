//! Declared store configuration.
//!
//! # Responsibility
//! - Parse the YAML document that declares the storage root, the catalog
//!   database, logging and the repository ("index") list.
//! - Reject malformed declarations before anything touches the catalog.
//!
//! # Invariants
//! - Index names are valid path components and unique.
//! - An index never lists itself or the same base twice.
//! - A declared log level is one `init_logging` accepts.

use crate::logging::{LogLevel, LoggingError};
use crate::model::name::{validate_name, NameKind, NameValidationError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Shared storage root for every repository.
    pub storage_path: PathBuf,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub indexes: Vec<IndexConfig>,
}

/// Catalog database location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path. `None` keeps the catalog in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// File logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level_name")]
    pub level: String,
    /// Absolute directory for rolling log files. `None` disables file logging.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// One declared repository and the names of its bases, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub name: String,
    #[serde(default)]
    pub bases: Vec<String>,
}

impl IndexConfig {
    pub fn new<I, B>(name: impl Into<String>, bases: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<String>,
    {
        Self {
            name: name.into(),
            bases: bases.into_iter().map(Into::into).collect(),
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_yaml::Error),
    EmptyStoragePath,
    InvalidLogLevel(LoggingError),
    InvalidIndexName(NameValidationError),
    DuplicateIndex(String),
    DuplicateBase { index: String, base: String },
    SelfBase(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read configuration `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid configuration document: {err}"),
            Self::EmptyStoragePath => write!(f, "storagePath must not be empty"),
            Self::InvalidLogLevel(err) => write!(f, "logging.level: {err}"),
            Self::InvalidIndexName(err) => write!(f, "{err}"),
            Self::DuplicateIndex(name) => write!(f, "index `{name}` is declared more than once"),
            Self::DuplicateBase { index, base } => {
                write!(f, "index `{index}` lists base `{base}` more than once")
            }
            Self::SelfBase(name) => write!(f, "index `{name}` cannot be its own base"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::InvalidLogLevel(err) => Some(err),
            Self::InvalidIndexName(err) => Some(err),
            _ => None,
        }
    }
}

impl StoreConfig {
    /// Reads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parses and validates a configuration document.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyStoragePath);
        }
        if let Some(logging) = &self.logging {
            LogLevel::parse(&logging.level).map_err(ConfigError::InvalidLogLevel)?;
        }
        validate_indexes(&self.indexes)
    }
}

/// Checks a declared index list on its own, without consulting the catalog.
///
/// Base names are not resolved here: a base may be a repository that only
/// exists in the catalog.
pub fn validate_indexes(indexes: &[IndexConfig]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for index in indexes {
        validate_name(NameKind::Repository, &index.name).map_err(ConfigError::InvalidIndexName)?;
        if !names.insert(index.name.as_str()) {
            return Err(ConfigError::DuplicateIndex(index.name.clone()));
        }

        let mut bases = HashSet::new();
        for base in &index.bases {
            if base == &index.name {
                return Err(ConfigError::SelfBase(index.name.clone()));
            }
            if !bases.insert(base.as_str()) {
                return Err(ConfigError::DuplicateBase {
                    index: index.name.clone(),
                    base: base.clone(),
                });
            }
        }
    }
    Ok(())
}

fn default_level_name() -> String {
    crate::logging::default_log_level().to_string()
}

#[cfg(test)]
mod tests {
    use super::{validate_indexes, ConfigError, IndexConfig, StoreConfig};
    use std::path::Path;

    const FULL: &str = r#"
storagePath: /srv/pkgshelf
database:
  path: /srv/pkgshelf/catalog.sqlite3
logging:
  level: warn
  dir: /var/log/pkgshelf
indexes:
  - name: base
  - name: team
    bases: [base]
"#;

    #[test]
    fn full_document_parses() {
        let config = StoreConfig::from_yaml_str(FULL).unwrap();
        assert_eq!(config.storage_path, Path::new("/srv/pkgshelf"));
        assert_eq!(
            config.database.path.as_deref(),
            Some(Path::new("/srv/pkgshelf/catalog.sqlite3"))
        );
        let logging = config.logging.unwrap();
        assert_eq!(logging.level, "warn");
        assert_eq!(logging.dir.as_deref(), Some(Path::new("/var/log/pkgshelf")));
        assert_eq!(
            config.indexes,
            vec![
                IndexConfig::new("base", Vec::<String>::new()),
                IndexConfig::new("team", ["base"]),
            ]
        );
    }

    #[test]
    fn omitted_sections_default() {
        let config = StoreConfig::from_yaml_str("storagePath: /data\n").unwrap();
        assert!(config.database.path.is_none());
        assert!(config.logging.is_none());
        assert!(config.indexes.is_empty());
    }

    #[test]
    fn empty_storage_path_is_rejected() {
        let err = StoreConfig::from_yaml_str("storagePath: \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::EmptyStoragePath));
    }

    #[test]
    fn missing_storage_path_is_a_parse_error() {
        let err = StoreConfig::from_yaml_str("indexes: []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn index_list_rules_are_enforced() {
        let duplicate = [IndexConfig::new("a", Vec::<String>::new()), IndexConfig::new("a", ["b"])];
        assert!(matches!(
            validate_indexes(&duplicate),
            Err(ConfigError::DuplicateIndex(name)) if name == "a"
        ));

        let self_base = [IndexConfig::new("a", ["a"])];
        assert!(matches!(validate_indexes(&self_base), Err(ConfigError::SelfBase(_))));

        let repeated = [IndexConfig::new("a", ["b", "b"])];
        assert!(matches!(
            validate_indexes(&repeated),
            Err(ConfigError::DuplicateBase { .. })
        ));

        let unsafe_name = [IndexConfig::new("../etc", Vec::<String>::new())];
        assert!(matches!(
            validate_indexes(&unsafe_name),
            Err(ConfigError::InvalidIndexName(_))
        ));
    }

    #[test]
    fn unknown_log_level_is_rejected_at_load() {
        let err = StoreConfig::from_yaml_str("storagePath: /data\nlogging:\n  level: loud\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLogLevel(_)));
        assert!(err.to_string().contains("loud"));

        let config =
            StoreConfig::from_yaml_str("storagePath: /data\nlogging:\n  level: WARNING\n").unwrap();
        assert_eq!(config.logging.unwrap().level, "WARNING");
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = StoreConfig::load(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
