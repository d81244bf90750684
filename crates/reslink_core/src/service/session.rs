//! Per-session entry point over all resource kinds.
//!
//! # Responsibility
//! - Own one lineage service (and so one cache) per resource kind.
//! - Route kind-tagged operations to the matching service.
//! - Register owner items so project-scoped refresh can find their rows.
//!
//! # Invariants
//! - A session is driven from one thread; every mutation takes `&mut self`.
//! - Caches belong to the session and are never shared between sessions.

use crate::model::item::{ItemRef, ProjectId};
use crate::model::resource::{
    ItemId, Resource, ResourceChanges, ResourceDraft, ResourceId, ResourceKind,
};
use crate::repo::item_repo::{ItemRepository, SqliteItemRepository};
use crate::repo::resource_repo::{RepoResult, SqliteResourceRepository};
use crate::service::resource_service::{
    DeleteOutcome, PropagationMode, ResourceService, ResourceServiceError, UpdateOutcome,
};
use log::info;
use rusqlite::Connection;

/// Session-wide options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub propagation: PropagationMode,
}

/// Lineage service over the SQLite store.
pub type SqliteResourceService<'conn> = ResourceService<SqliteResourceRepository<'conn>>;

/// One user session over a migrated connection.
pub struct ResourceSession<'conn> {
    items: SqliteItemRepository<'conn>,
    variables: SqliteResourceService<'conn>,
    functions: SqliteResourceService<'conn>,
    objects: SqliteResourceService<'conn>,
    effects: SqliteResourceService<'conn>,
}

impl<'conn> ResourceSession<'conn> {
    /// Opens a session with empty caches.
    ///
    /// # Errors
    /// - Returns `RepoError` when the connection is not migrated to the
    ///   latest schema or a resource table is missing columns.
    pub fn open(conn: &'conn Connection, options: SessionOptions) -> RepoResult<Self> {
        let service = |kind: ResourceKind| -> RepoResult<SqliteResourceService<'conn>> {
            Ok(ResourceService::with_propagation(
                SqliteResourceRepository::try_new(conn, kind)?,
                options.propagation,
            ))
        };

        Ok(Self {
            items: SqliteItemRepository::try_new(conn)?,
            variables: service(ResourceKind::Variable)?,
            functions: service(ResourceKind::Function)?,
            objects: service(ResourceKind::Object)?,
            effects: service(ResourceKind::Effect)?,
        })
    }

    pub fn service(&self, kind: ResourceKind) -> &SqliteResourceService<'conn> {
        match kind {
            ResourceKind::Variable => &self.variables,
            ResourceKind::Function => &self.functions,
            ResourceKind::Object => &self.objects,
            ResourceKind::Effect => &self.effects,
        }
    }

    fn service_mut(&mut self, kind: ResourceKind) -> &mut SqliteResourceService<'conn> {
        match kind {
            ResourceKind::Variable => &mut self.variables,
            ResourceKind::Function => &mut self.functions,
            ResourceKind::Object => &mut self.objects,
            ResourceKind::Effect => &mut self.effects,
        }
    }

    /// Registers or refreshes an owner item.
    pub fn register_item(&self, item: &ItemRef) -> Result<(), ResourceServiceError> {
        self.items
            .upsert_item(item)
            .map_err(ResourceServiceError::Storage)
    }

    pub fn item(&self, id: ItemId) -> Result<Option<ItemRef>, ResourceServiceError> {
        self.items.get_item(id).map_err(ResourceServiceError::Storage)
    }

    pub fn create_resource(
        &mut self,
        kind: ResourceKind,
        owner_item_id: ItemId,
        draft: ResourceDraft,
    ) -> Result<Resource, ResourceServiceError> {
        self.service_mut(kind).create_resource(owner_item_id, draft)
    }

    pub fn import_resource(
        &mut self,
        kind: ResourceKind,
        source_id: ResourceId,
        target_item_id: ItemId,
    ) -> Result<Resource, ResourceServiceError> {
        self.service_mut(kind).import_resource(source_id, target_item_id)
    }

    pub fn update_resource(
        &mut self,
        kind: ResourceKind,
        id: ResourceId,
        changes: ResourceChanges,
    ) -> Result<UpdateOutcome, ResourceServiceError> {
        self.service_mut(kind).update_resource(id, changes)
    }

    pub fn delete_resource(
        &mut self,
        kind: ResourceKind,
        id: ResourceId,
    ) -> Result<DeleteOutcome, ResourceServiceError> {
        self.service_mut(kind).delete_resource(id)
    }

    /// Reloads every kind's cache with the rows of one project.
    ///
    /// Returns the total number of rows loaded.
    pub fn refresh_project(&mut self, project_id: ProjectId) -> Result<usize, ResourceServiceError> {
        let mut loaded = 0;
        for kind in ResourceKind::ALL {
            loaded += self.service_mut(kind).refresh_project(project_id)?;
        }
        info!(
            "event=cache_refresh module=session status=ok scope=project project_id={} rows={}",
            project_id, loaded
        );
        Ok(loaded)
    }

    /// Reloads one kind's cache with every stored row.
    pub fn refresh_all(&mut self, kind: ResourceKind) -> Result<usize, ResourceServiceError> {
        self.service_mut(kind).refresh_all()
    }

    pub fn refresh_owner(
        &mut self,
        kind: ResourceKind,
        owner_item_id: ItemId,
    ) -> Result<usize, ResourceServiceError> {
        self.service_mut(kind).refresh_owner(owner_item_id)
    }

    pub fn get(&self, kind: ResourceKind, id: ResourceId) -> Option<&Resource> {
        self.service(kind).cache().get(id)
    }

    pub fn all(&self, kind: ResourceKind) -> &[Resource] {
        self.service(kind).cache().all()
    }

    pub fn by_owner(&self, kind: ResourceKind, owner_item_id: ItemId) -> Vec<&Resource> {
        self.service(kind).cache().by_owner(owner_item_id)
    }

    pub fn lineage_group(&self, kind: ResourceKind, root_id: ResourceId) -> Vec<&Resource> {
        self.service(kind).cache().lineage_group(root_id)
    }

    pub fn import_candidates(
        &self,
        kind: ResourceKind,
        target_item_id: ItemId,
        query: Option<&str>,
    ) -> Vec<&Resource> {
        self.service(kind).import_candidates(target_item_id, query)
    }
}
