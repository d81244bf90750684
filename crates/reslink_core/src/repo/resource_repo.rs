//! Resource repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide row CRUD over one resource table, selected by kind schema.
//! - Provide the lineage-scoped update/delete filters used by propagation and
//!   cascade deletion.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Write paths validate rows before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Lineage fan-out never writes the per-copy `is_return` column.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::item::ProjectId;
use crate::model::resource::{
    ItemId, KindSchema, Resource, ResourceChanges, ResourceId, ResourceKind, ResourceValidationError,
    SharedContent,
};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const TOUCH_UPDATED_AT: &str = "updated_at = (strftime('%s', 'now') * 1000)";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for resource and item persistence.
#[derive(Debug)]
pub enum RepoError {
    Validation(ResourceValidationError),
    Db(DbError),
    NotFound(Uuid),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "row not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "repository requires column `{column}` in table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceValidationError> for RepoError {
    fn from(value: ResourceValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Row store for one resource kind.
pub trait ResourceRepository {
    /// Schema descriptor of the kind this repository stores.
    fn schema(&self) -> &'static KindSchema;

    /// Inserts one row and returns it with storage-assigned timestamps.
    fn insert(&self, resource: &Resource) -> RepoResult<Resource>;

    /// Writes `changes` (shared fields and `is_return`) to one row.
    fn update_by_id(&self, id: ResourceId, changes: &ResourceChanges) -> RepoResult<()>;

    /// Writes the shared fields of `changes` to every row where
    /// `id = root_id OR source_id = root_id`, minus `exclude_id`.
    ///
    /// Returns the number of rows touched.
    fn update_lineage(
        &self,
        root_id: ResourceId,
        changes: &ResourceChanges,
        exclude_id: Option<ResourceId>,
    ) -> RepoResult<usize>;

    /// Primary write plus lineage fan-out.
    ///
    /// The default runs both writes in sequence. Transactional stores override
    /// it so both land or neither does.
    fn update_with_lineage(
        &self,
        id: ResourceId,
        changes: &ResourceChanges,
        root_id: ResourceId,
    ) -> RepoResult<usize> {
        self.update_by_id(id, changes)?;
        if !changes.has_shared() {
            return Ok(0);
        }
        self.update_lineage(root_id, changes, Some(id))
    }

    /// Deletes one row. Returns `false` when it was already absent.
    fn delete_by_id(&self, id: ResourceId) -> RepoResult<bool>;

    /// Deletes every row whose `source_id` equals `source_id`.
    fn delete_by_source(&self, source_id: ResourceId) -> RepoResult<usize>;

    /// Deletes a root and its imports. Returns the number of rows removed.
    ///
    /// The default deletes imports before the root, so a failure leaves the
    /// root in place for a retry. Transactional stores override it so both
    /// land or neither does.
    fn delete_lineage(&self, root_id: ResourceId) -> RepoResult<usize> {
        let imports_removed = self.delete_by_source(root_id)?;
        let root_removed = self.delete_by_id(root_id)?;
        Ok(usize::from(root_removed) + imports_removed)
    }

    fn find_by_id(&self, id: ResourceId) -> RepoResult<Option<Resource>>;

    fn find_by_owner_item(&self, owner_item_id: ItemId) -> RepoResult<Vec<Resource>>;

    fn find_all(&self) -> RepoResult<Vec<Resource>>;

    /// Rows whose owner item is registered under `project_id`.
    fn find_by_project(&self, project_id: ProjectId) -> RepoResult<Vec<Resource>>;

    /// Root row plus every import pointing at it.
    fn find_lineage(&self, root_id: ResourceId) -> RepoResult<Vec<Resource>>;
}

/// SQLite-backed resource repository for one kind.
pub struct SqliteResourceRepository<'conn> {
    conn: &'conn Connection,
    schema: &'static KindSchema,
    columns: Vec<&'static str>,
}

impl<'conn> SqliteResourceRepository<'conn> {
    /// Creates a repository for `kind` from a migrated connection.
    pub fn try_new(conn: &'conn Connection, kind: ResourceKind) -> RepoResult<Self> {
        let schema = kind.schema();
        let columns = table_columns(schema);
        ensure_resource_connection_ready(conn, schema, &columns)?;
        Ok(Self {
            conn,
            schema,
            columns,
        })
    }

    fn select_sql(&self, alias: &str) -> String {
        let projection = self
            .columns
            .iter()
            .map(|column| format!("{alias}.{column} AS {column}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("SELECT {projection} FROM {} {alias}", self.schema.table)
    }

    fn query_rows(&self, sql: &str, bind_values: Vec<Value>) -> RepoResult<Vec<Resource>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut resources = Vec::new();
        while let Some(row) = rows.next()? {
            resources.push(parse_resource_row(self.schema, row)?);
        }
        Ok(resources)
    }
}

impl ResourceRepository for SqliteResourceRepository<'_> {
    fn schema(&self) -> &'static KindSchema {
        self.schema
    }

    fn insert(&self, resource: &Resource) -> RepoResult<Resource> {
        if resource.kind != self.schema.kind {
            return Err(RepoError::InvalidData(format!(
                "{} repository cannot store {} rows",
                self.schema.kind, resource.kind
            )));
        }
        resource.validate()?;

        let mut columns = vec!["id", "item_id"];
        let mut bind_values = vec![
            Value::Text(resource.id.to_string()),
            Value::Text(resource.owner_item_id.to_string()),
        ];
        for field in self.schema.shared_fields {
            columns.push(field.column());
            bind_values.push(optional_text(resource.content.get(field).cloned()));
        }
        if let Some(is_return) = resource.is_return {
            columns.push("is_return");
            bind_values.push(Value::Integer(bool_to_int(is_return)));
        }
        columns.extend(["is_imported", "source_item_id", "source_id"]);
        bind_values.push(Value::Integer(bool_to_int(resource.is_imported)));
        bind_values.push(optional_text(resource.source_item_id.map(|id| id.to_string())));
        bind_values.push(optional_text(resource.source_id.map(|id| id.to_string())));

        let placeholders = (1..=columns.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders});",
            self.schema.table,
            columns.join(", ")
        );
        self.conn.execute(&sql, params_from_iter(bind_values))?;

        self.find_by_id(resource.id)?
            .ok_or(RepoError::NotFound(resource.id))
    }

    fn update_by_id(&self, id: ResourceId, changes: &ResourceChanges) -> RepoResult<()> {
        changes.validate_for(self.schema)?;

        let (assignments, mut bind_values) = assignments_for(changes, true);
        bind_values.push(Value::Text(id.to_string()));
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{};",
            self.schema.table,
            assignments,
            bind_values.len()
        );

        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn update_lineage(
        &self,
        root_id: ResourceId,
        changes: &ResourceChanges,
        exclude_id: Option<ResourceId>,
    ) -> RepoResult<usize> {
        if !changes.has_shared() {
            return Ok(0);
        }
        changes.validate_for(self.schema)?;
        fan_out(self.conn, self.schema, root_id, changes, exclude_id)
    }

    fn update_with_lineage(
        &self,
        id: ResourceId,
        changes: &ResourceChanges,
        root_id: ResourceId,
    ) -> RepoResult<usize> {
        changes.validate_for(self.schema)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let (assignments, mut bind_values) = assignments_for(changes, true);
        bind_values.push(Value::Text(id.to_string()));
        let changed = tx.execute(
            &format!(
                "UPDATE {} SET {} WHERE id = ?{};",
                self.schema.table,
                assignments,
                bind_values.len()
            ),
            params_from_iter(bind_values),
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        let propagated = if changes.has_shared() {
            fan_out(&tx, self.schema, root_id, changes, Some(id))?
        } else {
            0
        };
        tx.commit()?;
        Ok(propagated)
    }

    fn delete_by_id(&self, id: ResourceId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1;", self.schema.table),
            [id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn delete_by_source(&self, source_id: ResourceId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            &format!("DELETE FROM {} WHERE source_id = ?1;", self.schema.table),
            [source_id.to_string()],
        )?;
        Ok(changed)
    }

    fn delete_lineage(&self, root_id: ResourceId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE id = ?1 OR source_id = ?1;",
                self.schema.table
            ),
            [root_id.to_string()],
        )?;
        Ok(changed)
    }

    fn find_by_id(&self, id: ResourceId) -> RepoResult<Option<Resource>> {
        let sql = format!("{} WHERE r.id = ?1;", self.select_sql("r"));
        let mut rows = self.query_rows(&sql, vec![Value::Text(id.to_string())])?;
        Ok(rows.pop())
    }

    fn find_by_owner_item(&self, owner_item_id: ItemId) -> RepoResult<Vec<Resource>> {
        let sql = format!(
            "{} WHERE r.item_id = ?1 ORDER BY r.created_at DESC, r.id ASC;",
            self.select_sql("r")
        );
        self.query_rows(&sql, vec![Value::Text(owner_item_id.to_string())])
    }

    fn find_all(&self) -> RepoResult<Vec<Resource>> {
        let sql = format!(
            "{} ORDER BY r.created_at DESC, r.id ASC;",
            self.select_sql("r")
        );
        self.query_rows(&sql, Vec::new())
    }

    fn find_by_project(&self, project_id: ProjectId) -> RepoResult<Vec<Resource>> {
        let sql = format!(
            "{} INNER JOIN items i ON i.id = r.item_id
             WHERE i.project_id = ?1
             ORDER BY r.created_at DESC, r.id ASC;",
            self.select_sql("r")
        );
        self.query_rows(&sql, vec![Value::Text(project_id.to_string())])
    }

    fn find_lineage(&self, root_id: ResourceId) -> RepoResult<Vec<Resource>> {
        let sql = format!(
            "{} WHERE r.id = ?1 OR r.source_id = ?1
             ORDER BY r.is_imported ASC, r.created_at ASC, r.id ASC;",
            self.select_sql("r")
        );
        self.query_rows(&sql, vec![Value::Text(root_id.to_string())])
    }
}

fn fan_out(
    conn: &Connection,
    schema: &KindSchema,
    root_id: ResourceId,
    changes: &ResourceChanges,
    exclude_id: Option<ResourceId>,
) -> RepoResult<usize> {
    let (assignments, mut bind_values) = assignments_for(changes, false);
    bind_values.push(Value::Text(root_id.to_string()));
    let root_index = bind_values.len();
    let mut sql = format!(
        "UPDATE {} SET {} WHERE (id = ?{root_index} OR source_id = ?{root_index})",
        schema.table, assignments
    );
    if let Some(exclude_id) = exclude_id {
        bind_values.push(Value::Text(exclude_id.to_string()));
        sql.push_str(&format!(" AND id != ?{}", bind_values.len()));
    }
    sql.push(';');

    Ok(conn.execute(&sql, params_from_iter(bind_values))?)
}

/// Builds `col = ?n` assignments. `updated_at` is always touched.
fn assignments_for(changes: &ResourceChanges, include_marker: bool) -> (String, Vec<Value>) {
    let mut parts = Vec::new();
    let mut bind_values = Vec::new();
    for (field, value) in &changes.shared {
        bind_values.push(optional_text(value.clone()));
        parts.push(format!("{} = ?{}", field.column(), bind_values.len()));
    }
    if include_marker {
        if let Some(is_return) = changes.is_return {
            bind_values.push(Value::Integer(bool_to_int(is_return)));
            parts.push(format!("is_return = ?{}", bind_values.len()));
        }
    }
    parts.push(TOUCH_UPDATED_AT.to_string());
    (parts.join(", "), bind_values)
}

fn table_columns(schema: &KindSchema) -> Vec<&'static str> {
    let mut columns = vec!["id", "item_id"];
    columns.extend(schema.shared_fields.iter().map(|field| field.column()));
    if schema.has_return_marker {
        columns.push("is_return");
    }
    columns.extend([
        "is_imported",
        "source_item_id",
        "source_id",
        "created_at",
        "updated_at",
    ]);
    columns
}

fn parse_resource_row(schema: &'static KindSchema, row: &Row<'_>) -> RepoResult<Resource> {
    let table = schema.table;
    let id_text: String = row.get("id")?;
    let item_text: String = row.get("item_id")?;

    let mut content = SharedContent::new();
    for field in schema.shared_fields {
        if let Some(value) = row.get::<_, Option<String>>(field.column())? {
            content.insert(*field, value);
        }
    }

    let is_return = if schema.has_return_marker {
        Some(parse_flag(row.get("is_return")?, table, "is_return")?)
    } else {
        None
    };

    let resource = Resource {
        id: parse_uuid(&id_text, table, "id")?,
        kind: schema.kind,
        owner_item_id: parse_uuid(&item_text, table, "item_id")?,
        content,
        is_return,
        is_imported: parse_flag(row.get("is_imported")?, table, "is_imported")?,
        source_item_id: row
            .get::<_, Option<String>>("source_item_id")?
            .map(|value| parse_uuid(&value, table, "source_item_id"))
            .transpose()?,
        source_id: row
            .get::<_, Option<String>>("source_id")?
            .map(|value| parse_uuid(&value, table, "source_id"))
            .transpose()?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    resource.validate()?;
    Ok(resource)
}

fn parse_uuid(value: &str, table: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {table}.{column}")))
}

fn parse_flag(value: i64, table: &str, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {table}.{column}"
        ))),
    }
}

fn optional_text(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::Text)
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn ensure_resource_connection_ready(
    conn: &Connection,
    schema: &'static KindSchema,
    columns: &[&'static str],
) -> RepoResult<()> {
    ensure_schema_version(conn)?;

    if !table_exists(conn, schema.table)? {
        return Err(RepoError::MissingRequiredTable(schema.table));
    }
    for column in columns.iter().copied() {
        if !table_has_column(conn, schema.table, column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: schema.table,
                column,
            });
        }
    }
    Ok(())
}

pub(crate) fn ensure_schema_version(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
