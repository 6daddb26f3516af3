//! Plain catalog records for repositories, projects and files.
//!
//! # Responsibility
//! - Define the persisted shape of every catalog entity.
//! - Own the naming rules that keep entity names safe as path components.
//!
//! # Invariants
//! - Every record is identified by a stable UUID that is never reused.
//! - Records carry no store handle; behavior lives in `crate::service`.

pub mod file;
pub mod name;
pub mod project;
pub mod repository;
