//! Lineage root resolution.
//!
//! # Invariants
//! - Resolution is O(1): an imported row's lineage pointer already names the
//!   root, because the import operation is the only writer of that pointer.
//! - An imported row without a pointer is an invariant breach and fails fast.

use crate::model::resource::{LineageRoot, Resource, ResourceId, ResourceKind};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Lineage resolution failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineageError {
    /// `is_imported = true` with a missing `source_id` or `source_item_id`.
    ImportedWithoutSource { kind: ResourceKind, id: ResourceId },
}

impl Display for LineageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ImportedWithoutSource { kind, id } => {
                write!(f, "imported {kind} {id} has no lineage source")
            }
        }
    }
}

impl Error for LineageError {}

/// Returns the root identity of the lineage group `resource` belongs to.
pub fn resolve_root(resource: &Resource) -> Result<LineageRoot, LineageError> {
    if !resource.is_imported {
        return Ok(LineageRoot {
            root_id: resource.id,
            root_owner_item_id: resource.owner_item_id,
        });
    }

    match (resource.source_id, resource.source_item_id) {
        (Some(root_id), Some(root_owner_item_id)) => Ok(LineageRoot {
            root_id,
            root_owner_item_id,
        }),
        _ => Err(LineageError::ImportedWithoutSource {
            kind: resource.kind,
            id: resource.id,
        }),
    }
}
