//! Owner item registry.
//!
//! # Responsibility
//! - Persist the minimal item registration used to scope resources by project.
//!
//! # Invariants
//! - Registration is an upsert keyed by item id.
//! - Item deletion is not handled here; resource rows survive unregistered
//!   owners and simply drop out of project-scoped reads.

use crate::model::item::{ItemCategory, ItemRef, ProjectId};
use crate::model::resource::ItemId;
use crate::repo::resource_repo::{ensure_schema_version, table_exists, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

/// Repository interface for owner item registration.
pub trait ItemRepository {
    /// Inserts or refreshes one registration.
    fn upsert_item(&self, item: &ItemRef) -> RepoResult<()>;
    fn get_item(&self, id: ItemId) -> RepoResult<Option<ItemRef>>;
    /// Lists items of one project ordered by title.
    fn list_project_items(&self, project_id: ProjectId) -> RepoResult<Vec<ItemRef>>;
}

/// SQLite-backed item registry.
pub struct SqliteItemRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteItemRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_version(conn)?;
        if !table_exists(conn, "items")? {
            return Err(RepoError::MissingRequiredTable("items"));
        }
        Ok(Self { conn })
    }
}

impl ItemRepository for SqliteItemRepository<'_> {
    fn upsert_item(&self, item: &ItemRef) -> RepoResult<()> {
        if item.title.trim().is_empty() {
            return Err(RepoError::InvalidData(format!(
                "item {} must have a non-blank title",
                item.id
            )));
        }

        self.conn.execute(
            "INSERT INTO items (id, project_id, category, title)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                project_id = excluded.project_id,
                category = excluded.category,
                title = excluded.title,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                item.id.to_string(),
                item.project_id.to_string(),
                item.category.as_str(),
                item.title.as_str(),
            ],
        )?;
        Ok(())
    }

    fn get_item(&self, id: ItemId) -> RepoResult<Option<ItemRef>> {
        let item = self
            .conn
            .query_row(
                "SELECT id, project_id, category, title
                 FROM items
                 WHERE id = ?1;",
                [id.to_string()],
                read_item_columns,
            )
            .optional()?;
        item.map(parse_item).transpose()
    }

    fn list_project_items(&self, project_id: ProjectId) -> RepoResult<Vec<ItemRef>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, category, title
             FROM items
             WHERE project_id = ?1
             ORDER BY title ASC, id ASC;",
        )?;
        let mut rows = stmt.query([project_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_item(read_item_columns(row)?)?);
        }
        Ok(items)
    }
}

struct ItemColumns {
    id: String,
    project_id: String,
    category: String,
    title: String,
}

fn read_item_columns(row: &Row<'_>) -> rusqlite::Result<ItemColumns> {
    Ok(ItemColumns {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        category: row.get("category")?,
        title: row.get("title")?,
    })
}

fn parse_item(columns: ItemColumns) -> RepoResult<ItemRef> {
    let category = ItemCategory::parse(&columns.category).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid item category `{}` in items.category",
            columns.category
        ))
    })?;
    Ok(ItemRef {
        id: parse_uuid(&columns.id, "items.id")?,
        project_id: parse_uuid(&columns.project_id, "items.project_id")?,
        category,
        title: columns.title,
    })
}

fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}
