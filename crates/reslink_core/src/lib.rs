//! Core domain logic for linked project resources.
//! This crate is the single source of truth for lineage invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::item::{ItemCategory, ItemRef, ProjectId};
pub use model::resource::{
    ItemId, KindSchema, LineageRoot, Resource, ResourceChanges, ResourceDraft, ResourceId,
    ResourceKind, ResourceValidationError, SharedField,
};
pub use repo::item_repo::{ItemRepository, SqliteItemRepository};
pub use repo::resource_repo::{
    RepoError, RepoResult, ResourceRepository, SqliteResourceRepository,
};
pub use service::lineage::{resolve_root, LineageError};
pub use service::resource_cache::ResourceCollection;
pub use service::resource_service::{
    DeleteOutcome, PropagationMode, ResourceService, ResourceServiceError, UpdateOutcome,
};
pub use service::session::{ResourceSession, SessionOptions, SqliteResourceService};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
