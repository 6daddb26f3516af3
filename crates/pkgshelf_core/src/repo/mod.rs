//! Catalog persistence contracts and implementations.
//!
//! # Responsibility
//! - Define the catalog store contract consumed by the service layer.
//! - Isolate SQLite query details from graph and write-protocol logic.
//!
//! # Invariants
//! - Absent rows on lookups are `Ok(None)`; `NotFound` errors are reserved
//!   for mutations that target a missing row.

pub mod catalog_repo;
