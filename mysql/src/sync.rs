//! Schema synchronization from dictionary to database.
//!
//! Synchronization is split in two halves:
//!
//! - **planning**: [`plan`] compares a [`TableDescriptor`] with a
//!   [`LiveSchema`] snapshot and returns the DDL needed to reconcile them.
//!   It is pure and never touches a connection.
//! - **execution**: [`SchemaSync`] reads the snapshot from
//!   `information_schema` and `show index`, plans, and runs the statements.
//!
//! Synchronization is non-destructive: it creates missing tables, adds
//! missing columns, modifies columns whose type or comment differ and
//! creates missing indices. It never drops anything. Running it twice in a
//! row emits no DDL the second time.
//!
//! # Example
//!
//! ```
//! use rowbind_core::{FieldDescriptor, FieldFormat, TableDescriptor};
//! use rowbind_mysql::create_table_sql;
//!
//! let table = TableDescriptor::new("t")
//!     .with_field(FieldDescriptor::new("id", FieldFormat::UInt, 0).primary_key())
//!     .with_field(FieldDescriptor::new("name", FieldFormat::Ascii, 50).with_description("Name"))
//!     .with_field(FieldDescriptor::new("updsp", FieldFormat::DateTime, 0));
//!
//! assert_eq!(
//!     create_table_sql(&table),
//!     "create table t(id int unsigned, name varchar(50) comment 'Name', updsp datetime, \
//!      PRIMARY KEY(id DESC)) ENGINE InnoDB;"
//! );
//! ```

use rowbind_core::{FieldDescriptor, IndexDescriptor, TableDescriptor};
use tracing::{debug, info, warn};

use crate::client::QueryResult;
use crate::connection::Connection;
use crate::error::Result;

/// A column as reported by `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    pub name: String,
    pub column_type: String,
    pub comment: String,
}

impl LiveColumn {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            comment: comment.into(),
        }
    }
}

/// One row of `show index`: a column belonging to a named key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveIndexColumn {
    pub key_name: String,
    pub column: String,
}

/// Snapshot of a table's structure as the server sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSchema {
    pub exists: bool,
    pub columns: Vec<LiveColumn>,
    pub index_columns: Vec<LiveIndexColumn>,
}

impl LiveSchema {
    /// Snapshot of a table that does not exist.
    pub fn missing() -> Self {
        Self::default()
    }

    /// Looks up a column by name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&LiveColumn> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }

    /// Number of columns covered by the named key (case-insensitive).
    pub fn index_column_count(&self, key_name: &str) -> usize {
        self.index_columns
            .iter()
            .filter(|entry| entry.key_name.eq_ignore_ascii_case(key_name))
            .count()
    }
}

/// Kind of a schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    CreateTable,
    AddColumn(String),
    ModifyColumn(String),
    CreateIndex(String),
}

/// A DDL statement together with the change it makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdlStatement {
    pub change: SchemaChange,
    pub sql: String,
}

impl SchemaChange {
    fn kind(&self) -> &'static str {
        match self {
            Self::CreateTable => "table creation",
            Self::AddColumn(_) | Self::ModifyColumn(_) => "column alteration",
            Self::CreateIndex(_) => "index creation",
        }
    }
}

/// DDL emitted by one synchronization run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub table: String,
    /// Statements that ran successfully, in execution order.
    pub applied: Vec<DdlStatement>,
    /// Column alterations and index creations the server rejected.
    pub failed: Vec<DdlStatement>,
}

impl SyncReport {
    /// Returns `true` if no DDL was emitted.
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.failed.is_empty()
    }

    /// SQL text of every applied statement.
    pub fn sql(&self) -> impl Iterator<Item = &str> {
        self.applied.iter().map(|statement| statement.sql.as_str())
    }
}

// ---------------------------------------------------------------------------
// DDL rendering
// ---------------------------------------------------------------------------

fn column_definition(field: &FieldDescriptor) -> String {
    let mut sql = format!("{} {}", field.column_name(), field.column_type());

    if !field.format.is_blob() {
        if field.is_autoincrement() {
            sql.push_str(" not null auto_increment");
        } else if field.roles.default_zero {
            sql.push_str(" default '0'");
        }
    }
    if !field.description().is_empty() {
        sql.push_str(&format!(" comment '{}'", field.db_description()));
    }
    sql
}

fn descending_keys<'t>(fields: impl Iterator<Item = &'t FieldDescriptor>) -> String {
    fields
        .map(|field| format!("{} DESC", field.column_name()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `create table` statement for the whole table.
///
/// Primary-key columns form `PRIMARY KEY(... DESC)`; auto-increment columns
/// outside the primary key get a secondary `KEY(... DESC)`.
pub fn create_table_sql(table: &TableDescriptor) -> String {
    let columns: Vec<String> = table.fields().iter().map(column_definition).collect();
    let mut sql = format!("create table {}({}", table.name, columns.join(", "));

    let primary = descending_keys(table.primary_keys());
    if !primary.is_empty() {
        sql.push_str(&format!(", PRIMARY KEY({primary})"));
    }

    let auto = descending_keys(
        table
            .fields()
            .iter()
            .filter(|field| field.is_autoincrement() && !field.is_primary_key()),
    );
    if !auto.is_empty() {
        sql.push_str(&format!(", KEY({auto})"));
    }

    sql.push_str(") ENGINE InnoDB;");
    sql
}

/// `alter table ... add column`, placed after the preceding field.
pub fn add_column_sql(table: &TableDescriptor, field: &FieldDescriptor) -> String {
    let mut sql = format!("alter table {} add column {}", table.name, column_definition(field));

    if let Some(previous) = field.index().checked_sub(1).and_then(|i| table.field_at(i)) {
        sql.push_str(&format!(" after {}", previous.column_name()));
    }
    sql
}

/// `alter table ... modify column` with the declared type and comment.
pub fn modify_column_sql(table: &TableDescriptor, field: &FieldDescriptor) -> String {
    format!(
        "alter table {} modify column {} {} comment '{}'",
        table.name,
        field.column_name(),
        field.column_type(),
        field.db_description()
    )
}

/// `create index` statement, or `None` if no field of the index resolves.
pub fn create_index_sql(table: &TableDescriptor, index: &IndexDescriptor) -> Option<String> {
    let fields = table.index_fields(index);
    if fields.is_empty() {
        return None;
    }

    let columns: Vec<&str> = fields.iter().map(|field| field.column_name()).collect();
    Some(format!(
        "create index {} on {}({});",
        index.db_name(),
        table.name,
        columns.join(", ")
    ))
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Computes the DDL that reconciles `live` with `table`.
///
/// A missing table is created and indices are completed regardless of
/// `allow_alter`; adding and modifying columns of an existing table needs
/// `allow_alter`. Types and comments compare case-insensitively.
pub fn plan(table: &TableDescriptor, live: &LiveSchema, allow_alter: bool) -> Vec<DdlStatement> {
    let mut statements = Vec::new();

    if !live.exists {
        statements.push(DdlStatement {
            change: SchemaChange::CreateTable,
            sql: create_table_sql(table),
        });
    } else if allow_alter {
        for field in table.fields() {
            match live.column(field.column_name()) {
                None => statements.push(DdlStatement {
                    change: SchemaChange::AddColumn(field.column_name().to_string()),
                    sql: add_column_sql(table, field),
                }),
                Some(column)
                    if !column.column_type.eq_ignore_ascii_case(&field.column_type())
                        || !column.comment.eq_ignore_ascii_case(field.description()) =>
                {
                    statements.push(DdlStatement {
                        change: SchemaChange::ModifyColumn(field.column_name().to_string()),
                        sql: modify_column_sql(table, field),
                    })
                }
                Some(_) => {}
            }
        }
    }

    for index in &table.indices {
        let declared = table.index_fields(index).len();
        if declared == 0 {
            continue;
        }
        let existing = if live.exists {
            live.index_column_count(&index.db_name())
        } else {
            0
        };
        if existing != declared {
            if let Some(sql) = create_index_sql(table, index) {
                statements.push(DdlStatement {
                    change: SchemaChange::CreateIndex(index.db_name()),
                    sql,
                });
            }
        }
    }

    statements
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

const KEY_NAME_COLUMN: usize = 2;
const COLUMN_NAME_COLUMN: usize = 4;

fn quote(text: &str) -> String {
    text.replace('\'', "''")
}

fn cell(result: &QueryResult, row: &[Option<String>], name: &str, fallback: usize) -> String {
    let index = result.column_index(name).unwrap_or(fallback);
    row.get(index).cloned().flatten().unwrap_or_default()
}

/// Reads the live structure of a table and reconciles it with the
/// dictionary.
pub struct SchemaSync<'a> {
    conn: &'a Connection,
    table: &'a TableDescriptor,
}

impl<'a> SchemaSync<'a> {
    pub fn new(conn: &'a Connection, table: &'a TableDescriptor) -> Self {
        Self { conn, table }
    }

    /// Reads the table's columns and index entries.
    ///
    /// # Errors
    ///
    /// Returns the classified client error of the inspection queries.
    pub fn inspect(&self) -> Result<LiveSchema> {
        let name = &self.table.name;
        if !self.conn.table_exists(name)? {
            return Ok(LiveSchema::missing());
        }

        let sql = format!(
            "select column_name, column_type, column_comment, data_type, is_nullable, \
             character_maximum_length, column_default, numeric_precision \
             from information_schema.columns \
             where table_name = '{}' and table_schema = '{}'",
            quote(name),
            quote(&self.conn.config().database)
        );
        let result = self.conn.query("inspect columns", &sql)?;
        let columns = result
            .rows
            .iter()
            .map(|row| {
                LiveColumn::new(
                    cell(&result, row, "column_name", 0),
                    cell(&result, row, "column_type", 1),
                    cell(&result, row, "column_comment", 2),
                )
            })
            .collect();

        let result = self.conn.query("inspect indices", &format!("show index from {name}"))?;
        let index_columns = result
            .rows
            .iter()
            .map(|row| LiveIndexColumn {
                key_name: cell(&result, row, "Key_name", KEY_NAME_COLUMN),
                column: cell(&result, row, "Column_name", COLUMN_NAME_COLUMN),
            })
            .collect();

        Ok(LiveSchema {
            exists: true,
            columns,
            index_columns,
        })
    }

    /// Plans against the live structure without executing anything.
    ///
    /// # Errors
    ///
    /// Same as [`inspect`](Self::inspect).
    pub fn plan(&self, allow_alter: bool) -> Result<Vec<DdlStatement>> {
        Ok(plan(self.table, &self.inspect()?, allow_alter))
    }

    /// Brings the table in line with the dictionary.
    ///
    /// Failing column alterations and index creations are logged and
    /// recorded in [`SyncReport::failed`]; a failing `create table` or a lost
    /// connection aborts the run.
    ///
    /// # Errors
    ///
    /// Returns the classified client error of inspection or table creation,
    /// or the error that dropped the connection.
    pub fn synchronize(&self, allow_alter: bool) -> Result<SyncReport> {
        let mut report = SyncReport {
            table: self.table.name.clone(),
            ..Default::default()
        };

        for statement in self.plan(allow_alter)? {
            match &statement.change {
                SchemaChange::CreateTable => info!(table = %self.table.name, "creating table"),
                SchemaChange::AddColumn(column) => {
                    info!(table = %self.table.name, column = %column, "missing column, altering table")
                }
                SchemaChange::ModifyColumn(column) => {
                    info!(table = %self.table.name, column = %column, "column definition changed, altering table")
                }
                SchemaChange::CreateIndex(index) => info!(table = %self.table.name, index = %index, "creating index"),
            }
            debug!("{}", statement.sql);

            match self.conn.query("synchronize schema", &statement.sql) {
                Ok(_) => report.applied.push(statement),
                Err(err) if statement.change != SchemaChange::CreateTable && !err.is_connection_lost() => {
                    warn!(table = %self.table.name, %err, "{} failed, continuing", statement.change.kind());
                    report.failed.push(statement);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(report)
    }
}
