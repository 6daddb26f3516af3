//! Naming rules for catalog entities.
//!
//! Repository, project and file names each become one path component below
//! the storage root, so they must never be able to escape it.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static PROJECT_SEPARATOR_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-_.]+").expect("valid separator regex"));

/// Entity a name belongs to, used for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Repository,
    Project,
    File,
}

impl Display for NameKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repository => write!(f, "repository"),
            Self::Project => write!(f, "project"),
            Self::File => write!(f, "file"),
        }
    }
}

/// Name rejected by [`validate_name`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameValidationError {
    /// Empty or whitespace only.
    Blank(NameKind),
    /// `.` or `..`.
    Reserved { kind: NameKind, name: String },
    /// Contains a path separator or NUL.
    ForbiddenChar {
        kind: NameKind,
        name: String,
        found: char,
    },
}

impl Display for NameValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blank(kind) => write!(f, "{kind} name must not be blank"),
            Self::Reserved { kind, name } => write!(f, "{kind} name `{name}` is reserved"),
            Self::ForbiddenChar { kind, name, found } => {
                write!(f, "{kind} name `{name}` contains forbidden character {found:?}")
            }
        }
    }
}

impl Error for NameValidationError {}

/// Checks that `name` is usable as a single path component.
pub fn validate_name(kind: NameKind, name: &str) -> Result<(), NameValidationError> {
    if name.trim().is_empty() {
        return Err(NameValidationError::Blank(kind));
    }
    if name == "." || name == ".." {
        return Err(NameValidationError::Reserved {
            kind,
            name: name.to_string(),
        });
    }
    if let Some(found) = name.chars().find(|c| matches!(c, '/' | '\\' | '\0')) {
        return Err(NameValidationError::ForbiddenChar {
            kind,
            name: name.to_string(),
            found,
        });
    }
    Ok(())
}

/// Normalizes a package name the way package indexes compare them.
///
/// Runs of `-`, `_` and `.` collapse into one `-` and the result is
/// lowercased, so `Foo__Bar.baz` and `foo-bar-baz` name the same project.
pub fn normalize_project_name(name: &str) -> String {
    PROJECT_SEPARATOR_RUNS
        .replace_all(name.trim(), "-")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{normalize_project_name, validate_name, NameKind, NameValidationError};

    #[test]
    fn normalize_collapses_separator_runs() {
        assert_eq!(normalize_project_name("Foo__Bar.baz"), "foo-bar-baz");
        assert_eq!(normalize_project_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_project_name("a-_-.b"), "a-b");
    }

    #[test]
    fn validate_accepts_wheel_file_names() {
        validate_name(NameKind::File, "demo_pkg-1.0.0-py3-none-any.whl").unwrap();
        validate_name(NameKind::File, "test.app-15.13.37.42-py2.7.egg").unwrap();
    }

    #[test]
    fn validate_rejects_path_escapes() {
        assert_eq!(
            validate_name(NameKind::Project, "  "),
            Err(NameValidationError::Blank(NameKind::Project))
        );
        assert!(matches!(
            validate_name(NameKind::Repository, ".."),
            Err(NameValidationError::Reserved { .. })
        ));
        assert!(matches!(
            validate_name(NameKind::File, "../etc/passwd"),
            Err(NameValidationError::ForbiddenChar { found: '/', .. })
        ));
    }
}
