//! Owner item references.
//!
//! Items (screens, APIs, tables, ...) are managed outside this crate. Core only
//! keeps the minimal registration needed to scope resources to a project.

use crate::model::resource::ItemId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable project identifier.
pub type ProjectId = Uuid;

/// Artifact category of an owner item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Screen,
    Api,
    Db,
    Sql,
    Hook,
    Query,
    Store,
    Util,
    Component,
}

impl ItemCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Screen => "screen",
            Self::Api => "api",
            Self::Db => "db",
            Self::Sql => "sql",
            Self::Hook => "hook",
            Self::Query => "query",
            Self::Store => "store",
            Self::Util => "util",
            Self::Component => "component",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "screen" => Some(Self::Screen),
            "api" => Some(Self::Api),
            "db" => Some(Self::Db),
            "sql" => Some(Self::Sql),
            "hook" => Some(Self::Hook),
            "query" => Some(Self::Query),
            "store" => Some(Self::Store),
            "util" => Some(Self::Util),
            "component" => Some(Self::Component),
            _ => None,
        }
    }
}

/// Registration of one owner item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
    pub id: ItemId,
    pub project_id: ProjectId,
    pub category: ItemCategory,
    pub title: String,
}

impl ItemRef {
    /// Creates a registration with a generated id.
    pub fn new(project_id: ProjectId, category: ItemCategory, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            category,
            title: title.into(),
        }
    }
}
