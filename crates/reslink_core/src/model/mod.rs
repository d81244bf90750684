//! Domain model for linkable project resources.
//!
//! # Responsibility
//! - Define canonical resource rows and per-kind schema descriptors.
//! - Keep one generic shape for variables, functions, objects and effects.
//!
//! # Invariants
//! - Every resource is identified by a stable `ResourceId`.
//! - Lineage pointers always name the root of the group.

pub mod item;
pub mod resource;
