//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define row-store contracts consumed by the lineage services.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes validate rows before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod item_repo;
pub mod resource_repo;
