//! Import, propagation and cascade deletion for one resource kind.
//!
//! # Responsibility
//! - Create originals and imported copies of resources.
//! - Fan shared-field edits out to every member of a lineage group.
//! - Delete roots together with every import derived from them.
//! - Keep the session cache in step with successful repository calls.
//!
//! # Invariants
//! - Imported rows always point at the lineage root (root flattening).
//! - `is_return` is written to the edited row only.
//! - A failed fan-out never rolls back the primary edit; it is reported as
//!   `SyncFailed`.
//! - Deleting an import never touches its root or sibling imports.

use crate::model::item::ProjectId;
use crate::model::resource::{
    ItemId, LineageRoot, Resource, ResourceChanges, ResourceDraft, ResourceId, ResourceKind,
    ResourceValidationError,
};
use crate::repo::resource_repo::{RepoError, ResourceRepository};
use crate::service::lineage::{resolve_root, LineageError};
use crate::service::resource_cache::ResourceCollection;
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// How an edit reaches the rest of its lineage group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PropagationMode {
    /// Primary write, then fan-out write. A reader may observe the window
    /// between them, and a failed fan-out leaves siblings stale.
    #[default]
    Sequential,
    /// Primary write and fan-out commit together or not at all.
    Transactional,
}

/// Errors from resource lineage operations.
#[derive(Debug)]
pub enum ResourceServiceError {
    /// Referenced resource does not exist.
    NotFound { kind: ResourceKind, id: ResourceId },
    /// Input violates the kind schema.
    Validation(ResourceValidationError),
    /// Imported resource without a lineage pointer.
    InvalidState { kind: ResourceKind, id: ResourceId },
    /// Repository call failed; no cache state was changed for it.
    Storage(RepoError),
    /// Primary edit persisted but the lineage fan-out failed.
    SyncFailed {
        kind: ResourceKind,
        id: ResourceId,
        root_id: ResourceId,
        source: RepoError,
    },
}

impl ResourceServiceError {
    fn from_repo(kind: ResourceKind, err: RepoError) -> Self {
        match err {
            RepoError::NotFound(id) => Self::NotFound { kind, id },
            RepoError::Validation(ResourceValidationError::ImportedWithoutSource(id)) => {
                Self::InvalidState { kind, id }
            }
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Storage(other),
        }
    }
}

impl Display for ResourceServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidState { kind, id } => {
                write!(f, "imported {kind} {id} has no lineage source")
            }
            Self::Storage(err) => write!(f, "{err}"),
            Self::SyncFailed {
                kind,
                id,
                root_id,
                source,
            } => write!(
                f,
                "{kind} {id} was saved but syncing lineage {root_id} failed: {source}"
            ),
        }
    }
}

impl Error for ResourceServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::SyncFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ResourceValidationError> for ResourceServiceError {
    fn from(value: ResourceValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<LineageError> for ResourceServiceError {
    fn from(value: LineageError) -> Self {
        match value {
            LineageError::ImportedWithoutSource { kind, id } => Self::InvalidState { kind, id },
        }
    }
}

/// Result of one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Other lineage members that received the shared changes.
    pub propagated: usize,
}

/// Result of one delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Row removed; `cascaded` imports went with it.
    Deleted { cascaded: usize },
    /// Nothing to delete. Not an error.
    AlreadyAbsent,
}

/// Lineage engine for one resource kind.
pub struct ResourceService<R: ResourceRepository> {
    repo: R,
    cache: ResourceCollection,
    propagation: PropagationMode,
}

impl<R: ResourceRepository> ResourceService<R> {
    /// Creates a service with sequential propagation and an empty cache.
    pub fn new(repo: R) -> Self {
        Self::with_propagation(repo, PropagationMode::default())
    }

    pub fn with_propagation(repo: R, propagation: PropagationMode) -> Self {
        Self {
            repo,
            cache: ResourceCollection::new(),
            propagation,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.repo.schema().kind
    }

    pub fn propagation(&self) -> PropagationMode {
        self.propagation
    }

    /// Session cache for this kind.
    pub fn cache(&self) -> &ResourceCollection {
        &self.cache
    }

    /// Creates an original resource owned by `owner_item_id`.
    pub fn create_resource(
        &mut self,
        owner_item_id: ItemId,
        draft: ResourceDraft,
    ) -> Result<Resource, ResourceServiceError> {
        let kind = self.kind();
        let resource = Resource::original(kind, owner_item_id, draft)?;
        let stored = self
            .repo
            .insert(&resource)
            .map_err(|err| ResourceServiceError::from_repo(kind, err))?;
        self.cache.prepend(stored.clone());

        info!(
            "event=resource_create module=service status=ok kind={} resource_id={} item_id={}",
            kind, stored.id, owner_item_id
        );
        Ok(stored)
    }

    /// Imports `source_id` into `target_item_id` as a new linked copy.
    ///
    /// # Contract
    /// - Missing source returns `NotFound` and inserts nothing.
    /// - The copy points at the source's root, even when the source is
    ///   itself an import.
    /// - The copy starts with `is_return = false`.
    /// - Duplicate imports into the same item are allowed.
    pub fn import_resource(
        &mut self,
        source_id: ResourceId,
        target_item_id: ItemId,
    ) -> Result<Resource, ResourceServiceError> {
        let kind = self.kind();
        let repo_err = move |err| ResourceServiceError::from_repo(kind, err);

        let source = self
            .repo
            .find_by_id(source_id)
            .map_err(repo_err)?
            .ok_or(ResourceServiceError::NotFound {
                kind,
                id: source_id,
            })?;
        let root = self.resolve(&source)?;

        let copy = Resource::import_copy(&source, root, target_item_id);
        let stored = self.repo.insert(&copy).map_err(repo_err)?;
        self.cache.prepend(stored.clone());

        info!(
            "event=resource_import module=service status=ok kind={} resource_id={} source_id={} root_id={} item_id={}",
            kind, stored.id, source_id, root.root_id, target_item_id
        );
        Ok(stored)
    }

    /// Updates one resource and fans shared changes out to its lineage group.
    ///
    /// # Contract
    /// - Missing target returns `NotFound`.
    /// - `is_return` lands on the edited row only.
    /// - With no shared changes nothing is propagated.
    /// - In sequential mode a fan-out failure returns `SyncFailed`; the edited
    ///   row stays updated in storage and in the cache.
    /// - Written rows are re-read so cached timestamps match storage.
    pub fn update_resource(
        &mut self,
        id: ResourceId,
        changes: ResourceChanges,
    ) -> Result<UpdateOutcome, ResourceServiceError> {
        let kind = self.kind();
        let repo_err = move |err| ResourceServiceError::from_repo(kind, err);
        changes.validate_for(self.repo.schema())?;

        let current = self
            .repo
            .find_by_id(id)
            .map_err(repo_err)?
            .ok_or(ResourceServiceError::NotFound { kind, id })?;
        let root_id = self.resolve(&current)?.root_id;
        let shared = changes.shared_subset();

        let propagated = match self.propagation {
            PropagationMode::Transactional => {
                let propagated = self
                    .repo
                    .update_with_lineage(id, &changes, root_id)
                    .map_err(repo_err)?;
                self.cache.apply_primary(&current, &changes);
                propagated
            }
            PropagationMode::Sequential => {
                self.repo.update_by_id(id, &changes).map_err(repo_err)?;
                self.cache.apply_primary(&current, &changes);
                if !shared.has_shared() {
                    0
                } else {
                    match self.repo.update_lineage(root_id, &shared, Some(id)) {
                        Ok(propagated) => propagated,
                        Err(source) => {
                            self.sync_cached(id, None);
                            error!(
                                "event=resource_propagate module=service status=error kind={} resource_id={} root_id={} error={}",
                                kind, id, root_id, source
                            );
                            return Err(ResourceServiceError::SyncFailed {
                                kind,
                                id,
                                root_id,
                                source,
                            });
                        }
                    }
                }
            }
        };

        if shared.has_shared() {
            self.cache.apply_fan_out(root_id, id, &shared);
            self.sync_cached(id, Some(root_id));
        } else {
            self.sync_cached(id, None);
        }

        info!(
            "event=resource_update module=service status=ok kind={} resource_id={} root_id={} propagated={}",
            kind, id, root_id, propagated
        );
        Ok(UpdateOutcome { propagated })
    }

    /// Deletes one resource, cascading to its imports when it is a root.
    ///
    /// # Contract
    /// - Missing target is a no-op (`AlreadyAbsent`), so deletes are idempotent.
    /// - Deleting an import removes that single row.
    /// - Deleting an original removes every row whose `source_id` is its id.
    pub fn delete_resource(
        &mut self,
        id: ResourceId,
    ) -> Result<DeleteOutcome, ResourceServiceError> {
        let kind = self.kind();
        let repo_err = move |err| ResourceServiceError::from_repo(kind, err);

        let Some(target) = self.repo.find_by_id(id).map_err(repo_err)? else {
            debug!(
                "event=resource_delete module=service status=noop kind={} resource_id={}",
                kind, id
            );
            return Ok(DeleteOutcome::AlreadyAbsent);
        };

        let cascaded = if target.is_original() {
            match self.propagation {
                PropagationMode::Transactional => {
                    let removed = self.repo.delete_lineage(id).map_err(repo_err)?;
                    self.cache.remove_lineage(id);
                    removed.saturating_sub(1)
                }
                PropagationMode::Sequential => {
                    // The root outlives its imports until both deletes succeed.
                    let removed = self.repo.delete_by_source(id).map_err(repo_err)?;
                    self.cache.remove_imports_of(id);
                    self.repo.delete_by_id(id).map_err(repo_err)?;
                    self.cache.remove(id);
                    removed
                }
            }
        } else {
            self.repo.delete_by_id(id).map_err(repo_err)?;
            self.cache.remove(id);
            0
        };

        info!(
            "event=resource_delete module=service status=ok kind={} resource_id={} original={} cascaded={}",
            kind,
            id,
            target.is_original(),
            cascaded
        );
        Ok(DeleteOutcome::Deleted { cascaded })
    }

    /// Reloads the cache with every row of this kind.
    pub fn refresh_all(&mut self) -> Result<usize, ResourceServiceError> {
        let kind = self.kind();
        let rows = self
            .repo
            .find_all()
            .map_err(|err| ResourceServiceError::from_repo(kind, err))?;
        Ok(self.replace_cache(rows, "all"))
    }

    /// Reloads the cache with the rows of one project.
    pub fn refresh_project(&mut self, project_id: ProjectId) -> Result<usize, ResourceServiceError> {
        let kind = self.kind();
        let rows = self
            .repo
            .find_by_project(project_id)
            .map_err(|err| ResourceServiceError::from_repo(kind, err))?;
        Ok(self.replace_cache(rows, "project"))
    }

    /// Reloads the cached rows of one owner item.
    pub fn refresh_owner(&mut self, owner_item_id: ItemId) -> Result<usize, ResourceServiceError> {
        let kind = self.kind();
        let rows = self
            .repo
            .find_by_owner_item(owner_item_id)
            .map_err(|err| ResourceServiceError::from_repo(kind, err))?;
        let loaded = rows.len();
        self.cache.replace_owner(owner_item_id, rows);
        info!(
            "event=cache_refresh module=service status=ok kind={} scope=owner rows={}",
            kind, loaded
        );
        Ok(loaded)
    }

    /// Loads the lineage group of `root_id` straight from storage.
    pub fn load_lineage(
        &self,
        root_id: ResourceId,
    ) -> Result<Vec<Resource>, ResourceServiceError> {
        let kind = self.kind();
        self.repo
            .find_lineage(root_id)
            .map_err(|err| ResourceServiceError::from_repo(kind, err))
    }

    /// Cached resources a user can import into `target_item_id`.
    ///
    /// Rows already owned by the target are excluded. `query` filters by a
    /// case-insensitive substring of name, code or description.
    pub fn import_candidates(&self, target_item_id: ItemId, query: Option<&str>) -> Vec<&Resource> {
        let needle = query
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty());
        self.cache
            .all()
            .iter()
            .filter(|row| row.owner_item_id != target_item_id)
            .filter(|row| needle.as_deref().map_or(true, |needle| row.matches_search(needle)))
            .collect()
    }

    fn resolve(&self, resource: &Resource) -> Result<LineageRoot, ResourceServiceError> {
        resolve_root(resource).map_err(|err| {
            error!(
                "event=lineage_invariant_breach module=service status=error kind={} resource_id={}",
                resource.kind, resource.id
            );
            err.into()
        })
    }

    /// Copies storage-assigned columns of written rows into the cache.
    ///
    /// A failed re-read only leaves cached timestamps stale, so it is logged
    /// and not returned.
    fn sync_cached(&mut self, id: ResourceId, root_id: Option<ResourceId>) {
        let fresh = match root_id {
            Some(root_id) => self.repo.find_lineage(root_id),
            None => self.repo.find_by_id(id).map(|row| row.into_iter().collect()),
        };
        match fresh {
            Ok(rows) => self.cache.sync_rows(rows),
            Err(err) => warn!(
                "event=cache_refresh module=service status=error kind={} resource_id={} error={}",
                self.kind(),
                id,
                err
            ),
        }
    }

    fn replace_cache(&mut self, rows: Vec<Resource>, scope: &'static str) -> usize {
        let loaded = rows.len();
        self.cache.replace_all(rows);
        info!(
            "event=cache_refresh module=service status=ok kind={} scope={} rows={}",
            self.kind(),
            scope,
            loaded
        );
        loaded
    }
}
