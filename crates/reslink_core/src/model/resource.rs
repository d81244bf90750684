//! Resource domain model.
//!
//! # Responsibility
//! - Define the row shape shared by variables, functions, objects and effects.
//! - Describe each kind with a static schema (table, shared fields, markers).
//! - Validate rows and partial changes before they reach storage.
//!
//! # Invariants
//! - `id` is stable and never reused for another resource.
//! - An imported row always carries `source_id` and `source_item_id`, and both
//!   point at the lineage root, never at an intermediate import.
//! - An original row carries neither lineage pointer.
//! - `is_return` is present exactly when the kind schema has the marker.
//!
//! # See also
//! - crate::service::lineage

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one resource row.
pub type ResourceId = Uuid;

/// Stable identifier of the item (screen/api/db/...) that owns resources.
pub type ItemId = Uuid;

/// Shared content of one resource, keyed by field. Absent key means NULL.
pub type SharedContent = BTreeMap<SharedField, String>;

/// Resource categories managed by the lineage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Variable,
    Function,
    Object,
    /// Side-effect declaration. Has no per-copy return marker.
    Effect,
}

impl ResourceKind {
    /// Every kind, in storage declaration order.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Variable,
        ResourceKind::Function,
        ResourceKind::Object,
        ResourceKind::Effect,
    ];

    /// Returns the static schema descriptor for this kind.
    pub fn schema(self) -> &'static KindSchema {
        match self {
            Self::Variable => &VARIABLE_SCHEMA,
            Self::Function => &FUNCTION_SCHEMA,
            Self::Object => &OBJECT_SCHEMA,
            Self::Effect => &EFFECT_SCHEMA,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Variable => "variable",
            Self::Function => "function",
            Self::Object => "object",
            Self::Effect => "effect",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content fields kept identical across one lineage group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedField {
    Name,
    /// Serialized as `type` to match the storage column.
    #[serde(rename = "type")]
    DataType,
    DefaultValue,
    ReturnType,
    Parameters,
    Properties,
    Dependencies,
    Code,
    Description,
}

impl SharedField {
    /// Storage column backing this field.
    pub fn column(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::DataType => "type",
            Self::DefaultValue => "default_value",
            Self::ReturnType => "return_type",
            Self::Parameters => "parameters",
            Self::Properties => "properties",
            Self::Dependencies => "dependencies",
            Self::Code => "code",
            Self::Description => "description",
        }
    }
}

impl Display for SharedField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// Static descriptor that specializes the generic engine for one kind.
#[derive(Debug)]
pub struct KindSchema {
    pub kind: ResourceKind,
    /// Storage table holding rows of this kind.
    pub table: &'static str,
    /// Shared content fields, in column order.
    pub shared_fields: &'static [SharedField],
    /// Shared fields that must be present and non-blank.
    pub required_fields: &'static [SharedField],
    /// Whether rows carry the per-copy `is_return` marker.
    pub has_return_marker: bool,
}

impl KindSchema {
    pub fn has_field(&self, field: SharedField) -> bool {
        self.shared_fields.contains(&field)
    }

    pub fn is_required(&self, field: SharedField) -> bool {
        self.required_fields.contains(&field)
    }
}

pub static VARIABLE_SCHEMA: KindSchema = KindSchema {
    kind: ResourceKind::Variable,
    table: "variables",
    shared_fields: &[
        SharedField::Name,
        SharedField::DataType,
        SharedField::DefaultValue,
        SharedField::Description,
    ],
    required_fields: &[SharedField::Name, SharedField::DataType],
    has_return_marker: true,
};

pub static FUNCTION_SCHEMA: KindSchema = KindSchema {
    kind: ResourceKind::Function,
    table: "functions",
    shared_fields: &[
        SharedField::Name,
        SharedField::ReturnType,
        SharedField::Parameters,
        SharedField::Description,
    ],
    required_fields: &[SharedField::Name, SharedField::ReturnType],
    has_return_marker: true,
};

pub static OBJECT_SCHEMA: KindSchema = KindSchema {
    kind: ResourceKind::Object,
    table: "objects",
    shared_fields: &[
        SharedField::Name,
        SharedField::DataType,
        SharedField::Properties,
        SharedField::Description,
    ],
    required_fields: &[SharedField::Name, SharedField::DataType],
    has_return_marker: true,
};

pub static EFFECT_SCHEMA: KindSchema = KindSchema {
    kind: ResourceKind::Effect,
    table: "effects",
    shared_fields: &[
        SharedField::Dependencies,
        SharedField::Code,
        SharedField::Description,
    ],
    required_fields: &[SharedField::Dependencies, SharedField::Code],
    has_return_marker: false,
};

/// Validation error for resource rows and partial changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceValidationError {
    NilId,
    MissingRequiredField {
        kind: ResourceKind,
        field: SharedField,
    },
    FieldNotInKind {
        kind: ResourceKind,
        field: SharedField,
    },
    ReturnMarkerUnsupported(ResourceKind),
    ReturnMarkerMissing(ResourceKind),
    /// Imported row without a lineage pointer. Breaks root flattening.
    ImportedWithoutSource(ResourceId),
    /// Original row that still carries a lineage pointer.
    OriginalWithSource(ResourceId),
}

impl Display for ResourceValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId => write!(f, "resource id must not be nil"),
            Self::MissingRequiredField { kind, field } => {
                write!(f, "{kind} requires non-blank `{field}`")
            }
            Self::FieldNotInKind { kind, field } => {
                write!(f, "{kind} has no shared field `{field}`")
            }
            Self::ReturnMarkerUnsupported(kind) => {
                write!(f, "{kind} does not support the is_return marker")
            }
            Self::ReturnMarkerMissing(kind) => write!(f, "{kind} requires the is_return marker"),
            Self::ImportedWithoutSource(id) => {
                write!(f, "imported resource {id} has no source pointer")
            }
            Self::OriginalWithSource(id) => {
                write!(f, "original resource {id} must not carry a source pointer")
            }
        }
    }
}

impl Error for ResourceValidationError {}

/// Root identity of a lineage group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineageRoot {
    pub root_id: ResourceId,
    pub root_owner_item_id: ItemId,
}

/// Canonical resource row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    /// Item that contains this row. Serialized as `item_id` like the column.
    #[serde(rename = "item_id")]
    pub owner_item_id: ItemId,
    pub content: SharedContent,
    /// Per-copy marker. `None` for kinds without the marker.
    pub is_return: Option<bool>,
    pub is_imported: bool,
    /// Owner item of the lineage root. Set only on imported rows.
    pub source_item_id: Option<ItemId>,
    /// Id of the lineage root. Set only on imported rows.
    pub source_id: Option<ResourceId>,
    /// Epoch ms, assigned by storage.
    pub created_at: i64,
    /// Epoch ms, assigned by storage.
    pub updated_at: i64,
}

impl Resource {
    /// Creates an original (non-imported) resource owned by `owner_item_id`.
    ///
    /// # Invariants
    /// - `is_return` starts as `false` for kinds with the marker.
    /// - Timestamps are zero until storage assigns them.
    pub fn original(
        kind: ResourceKind,
        owner_item_id: ItemId,
        draft: ResourceDraft,
    ) -> Result<Self, ResourceValidationError> {
        let schema = kind.schema();
        let resource = Self {
            id: Uuid::new_v4(),
            kind,
            owner_item_id,
            content: draft.content,
            is_return: schema.has_return_marker.then_some(false),
            is_imported: false,
            source_item_id: None,
            source_id: None,
            created_at: 0,
            updated_at: 0,
        };
        resource.validate()?;
        Ok(resource)
    }

    /// Builds the imported copy of `source` for `target_item_id`.
    ///
    /// Only the import operation writes lineage pointers, and it always
    /// passes the already-resolved root.
    pub(crate) fn import_copy(source: &Resource, root: LineageRoot, target_item_id: ItemId) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: source.kind,
            owner_item_id: target_item_id,
            content: source.content.clone(),
            is_return: source.kind.schema().has_return_marker.then_some(false),
            is_imported: true,
            source_item_id: Some(root.root_owner_item_id),
            source_id: Some(root.root_id),
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn schema(&self) -> &'static KindSchema {
        self.kind.schema()
    }

    /// Returns the value of one shared field, if set.
    pub fn field(&self, field: SharedField) -> Option<&str> {
        self.content.get(&field).map(String::as_str)
    }

    pub fn is_original(&self) -> bool {
        !self.is_imported
    }

    /// Whether this row is a member of the lineage group rooted at `root_id`.
    pub fn in_lineage_of(&self, root_id: ResourceId) -> bool {
        self.id == root_id || self.source_id == Some(root_id)
    }

    /// Checks row shape against the kind schema and lineage invariants.
    pub fn validate(&self) -> Result<(), ResourceValidationError> {
        if self.id.is_nil() {
            return Err(ResourceValidationError::NilId);
        }

        let schema = self.schema();
        for field in self.content.keys() {
            if !schema.has_field(*field) {
                return Err(ResourceValidationError::FieldNotInKind {
                    kind: self.kind,
                    field: *field,
                });
            }
        }
        for field in schema.required_fields {
            let present = self
                .content
                .get(field)
                .is_some_and(|value| !value.trim().is_empty());
            if !present {
                return Err(ResourceValidationError::MissingRequiredField {
                    kind: self.kind,
                    field: *field,
                });
            }
        }

        match (schema.has_return_marker, self.is_return) {
            (true, None) => return Err(ResourceValidationError::ReturnMarkerMissing(self.kind)),
            (false, Some(_)) => {
                return Err(ResourceValidationError::ReturnMarkerUnsupported(self.kind))
            }
            _ => {}
        }

        if self.is_imported {
            if self.source_id.is_none() || self.source_item_id.is_none() {
                return Err(ResourceValidationError::ImportedWithoutSource(self.id));
            }
        } else if self.source_id.is_some() || self.source_item_id.is_some() {
            return Err(ResourceValidationError::OriginalWithSource(self.id));
        }

        Ok(())
    }

    /// Applies a full change set to this row, per-copy marker included.
    pub fn apply_changes(&mut self, changes: &ResourceChanges) {
        self.apply_shared(changes);
        if let Some(is_return) = changes.is_return {
            self.is_return = Some(is_return);
        }
    }

    /// Applies only the shared subset, leaving `is_return` untouched.
    pub fn apply_shared(&mut self, changes: &ResourceChanges) {
        for (field, value) in &changes.shared {
            match value {
                Some(value) => {
                    self.content.insert(*field, value.clone());
                }
                None => {
                    self.content.remove(field);
                }
            }
        }
    }

    /// Case-insensitive substring match on name, code or description.
    ///
    /// `needle` must already be lowercase.
    pub fn matches_search(&self, needle: &str) -> bool {
        [SharedField::Name, SharedField::Code, SharedField::Description]
            .into_iter()
            .filter_map(|field| self.field(field))
            .any(|value| value.to_lowercase().contains(needle))
    }
}

/// Shared content for a new original resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceDraft {
    content: SharedContent,
}

impl ResourceDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self::new()
            .with(SharedField::Name, name)
            .with(SharedField::DataType, data_type)
    }

    pub fn function(name: impl Into<String>, return_type: impl Into<String>) -> Self {
        Self::new()
            .with(SharedField::Name, name)
            .with(SharedField::ReturnType, return_type)
    }

    pub fn object(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self::new()
            .with(SharedField::Name, name)
            .with(SharedField::DataType, data_type)
    }

    pub fn effect(dependencies: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new()
            .with(SharedField::Dependencies, dependencies)
            .with(SharedField::Code, code)
    }

    /// Sets one shared field.
    pub fn with(mut self, field: SharedField, value: impl Into<String>) -> Self {
        self.content.insert(field, value.into());
        self
    }
}

/// Partial update for one resource.
///
/// `shared` entries with `None` clear the field. `is_return` never leaves the
/// edited row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceChanges {
    pub shared: BTreeMap<SharedField, Option<String>>,
    pub is_return: Option<bool>,
}

impl ResourceChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: SharedField, value: impl Into<String>) -> Self {
        self.shared.insert(field, Some(value.into()));
        self
    }

    pub fn clear(mut self, field: SharedField) -> Self {
        self.shared.insert(field, None);
        self
    }

    pub fn with_return_marker(mut self, is_return: bool) -> Self {
        self.is_return = Some(is_return);
        self
    }

    /// Changes that fan out to the rest of the lineage group.
    pub fn shared_subset(&self) -> ResourceChanges {
        ResourceChanges {
            shared: self.shared.clone(),
            is_return: None,
        }
    }

    pub fn has_shared(&self) -> bool {
        !self.shared.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty() && self.is_return.is_none()
    }

    /// Checks the change set against one kind schema.
    pub fn validate_for(&self, schema: &KindSchema) -> Result<(), ResourceValidationError> {
        for (field, value) in &self.shared {
            if !schema.has_field(*field) {
                return Err(ResourceValidationError::FieldNotInKind {
                    kind: schema.kind,
                    field: *field,
                });
            }
            let blank = value.as_deref().map_or(true, |value| value.trim().is_empty());
            if blank && schema.is_required(*field) {
                return Err(ResourceValidationError::MissingRequiredField {
                    kind: schema.kind,
                    field: *field,
                });
            }
        }
        if self.is_return.is_some() && !schema.has_return_marker {
            return Err(ResourceValidationError::ReturnMarkerUnsupported(schema.kind));
        }
        Ok(())
    }
}
