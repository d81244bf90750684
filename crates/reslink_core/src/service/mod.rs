//! Lineage use-case services.
//!
//! # Responsibility
//! - Turn repository calls into import, propagation and cascade-delete
//!   operations.
//! - Own the session cache and keep it behind successful repository calls.

pub mod lineage;
pub mod resource_cache;
pub mod resource_service;
pub mod session;
