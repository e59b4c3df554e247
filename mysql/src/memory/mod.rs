//! In-process database engine implementing [`DbClient`].
//!
//! [`MemoryClient`] interprets the SQL dialect the persistence layer emits
//! (see the `parser` module) against tables held in memory. It behaves like
//! a MySQL server where it matters to callers:
//!
//! - primary keys are unique (`1062 Duplicate entry`)
//! - auto-increment columns are filled on insert and reported as last
//!   insert id
//! - updates report matched rows, as with `CLIENT_FOUND_ROWS`
//! - `information_schema.columns` and `show index` describe the tables
//! - text comparisons ignore case
//!
//! Clones share the same engine, so a test can keep a handle for
//! inspection while the [`Connection`](crate::Connection) owns another.
//!
//! # Example
//!
//! ```
//! use rowbind_dict::ConnectionConfig;
//! use rowbind_mysql::{DbClient, MemoryClient};
//!
//! let mut client = MemoryClient::new();
//! client.connect(&ConnectionConfig::new("epg")).unwrap();
//! client.query("create table t(id int, PRIMARY KEY(id))").unwrap();
//! client.query("insert into t set id = 1").unwrap();
//!
//! let result = client.query("select count(1) from t").unwrap();
//! assert_eq!(result.rows[0][0].as_deref(), Some("1"));
//! assert_eq!(client.ddl_log().len(), 1);
//! ```

mod parser;

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use rowbind_dict::ConnectionConfig;
use tracing::trace;

use crate::classify::{
    CR_PARAMS_NOT_BOUND, CR_SERVER_GONE_ERROR, ER_BAD_FIELD_ERROR, ER_DUP_ENTRY, ER_DUP_FIELDNAME,
    ER_DUP_KEYNAME, ER_NO_SUCH_TABLE, ER_PARSE_ERROR, ER_TABLE_EXISTS_ERROR,
};
use crate::client::{ClientError, DbClient, Execution, PreparedInfo, QueryResult, StatementHandle, WireValue};
use crate::wire::parse_datetime;

use parser::{Assignment, ColumnDef, Command, CreateTable, Parsed, Position, Predicate, Projection, Select};

const ER_UNKNOWN_STMT_HANDLER: u32 = 1243;

const INFORMATION_SCHEMA_COLUMNS: &str = "information_schema.columns";

const INFORMATION_SCHEMA_FIELDS: [&str; 11] = [
    "table_schema",
    "table_name",
    "column_name",
    "ordinal_position",
    "column_default",
    "is_nullable",
    "data_type",
    "character_maximum_length",
    "numeric_precision",
    "column_type",
    "column_comment",
];

const SHOW_INDEX_FIELDS: [&str; 5] = ["Table", "Non_unique", "Key_name", "Seq_in_index", "Column_name"];

/// Statements executed per kind, DDL excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionCounts {
    pub selects: usize,
    pub inserts: usize,
    pub updates: usize,
    pub deletes: usize,
}

/// In-memory MySQL stand-in. Cloning yields another handle to the same
/// engine.
#[derive(Clone, Default)]
pub struct MemoryClient {
    engine: Rc<RefCell<Engine>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every DDL statement executed successfully, in order.
    pub fn ddl_log(&self) -> Vec<String> {
        self.engine.borrow().ddl_log.clone()
    }

    pub fn clear_ddl_log(&self) {
        self.engine.borrow_mut().ddl_log.clear();
    }

    pub fn counts(&self) -> ExecutionCounts {
        self.engine.borrow().counts
    }

    /// Makes the next call (connect, query, prepare or execute) fail with
    /// the given error.
    pub fn fail_next(&self, code: u32, message: impl Into<String>) {
        self.engine.borrow_mut().pending_failure = Some(ClientError::new(code, message));
    }

    /// Makes the next query whose text starts with `prefix`
    /// (case-insensitive) fail with the given error.
    pub fn fail_statement(&self, prefix: impl Into<String>, code: u32, message: impl Into<String>) {
        self.engine.borrow_mut().statement_failure = Some((prefix.into(), ClientError::new(code, message)));
    }

    /// Drops the connection as if the server went away; prepared handles
    /// are lost, table contents are kept.
    pub fn disconnect(&self) {
        let mut engine = self.engine.borrow_mut();
        engine.connected = false;
        engine.statements.clear();
    }

    pub fn table_names(&self) -> Vec<String> {
        self.engine
            .borrow()
            .tables
            .iter()
            .map(|table| table.name.clone())
            .collect()
    }

    /// Column names of a table in storage order.
    pub fn column_names(&self, table: &str) -> Option<Vec<String>> {
        let engine = self.engine.borrow();
        let table = engine.table(table).ok()?;
        Some(table.columns.iter().map(|column| column.name.clone()).collect())
    }

    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.engine.borrow().table(table).ok().map(|table| table.rows.len())
    }
}

impl DbClient for MemoryClient {
    fn connect(&mut self, config: &ConnectionConfig) -> Result<(), ClientError> {
        let mut engine = self.engine.borrow_mut();
        engine.take_failure()?;
        engine.connected = true;
        engine.database = config.database.clone();
        engine.statements.clear();
        Ok(())
    }

    fn close(&mut self) {
        self.disconnect();
    }

    fn is_connected(&self) -> bool {
        self.engine.borrow().connected
    }

    fn query(&mut self, sql: &str) -> Result<QueryResult, ClientError> {
        let mut engine = self.engine.borrow_mut();
        engine.check_ready()?;
        engine.take_statement_failure(sql)?;

        let parsed = parser::parse(sql)?;
        if parsed.param_count > 0 {
            return Err(ClientError::new(
                ER_PARSE_ERROR,
                "You have an error in your SQL syntax near '?'",
            ));
        }

        let outcome = engine.run(&parsed.command, sql, &[])?;
        let affected_rows = if outcome.columns.is_empty() {
            outcome.affected
        } else {
            outcome.rows.len() as u64
        };
        Ok(QueryResult {
            columns: outcome.columns,
            rows: outcome
                .rows
                .iter()
                .map(|row| row.iter().map(WireValue::to_text).collect())
                .collect(),
            affected_rows,
        })
    }

    fn prepare(&mut self, sql: &str) -> Result<PreparedInfo, ClientError> {
        let mut engine = self.engine.borrow_mut();
        engine.check_ready()?;

        let parsed = parser::parse(sql)?;
        let column_count = engine.describe(&parsed.command)?;

        engine.next_handle += 1;
        let handle = StatementHandle(engine.next_handle);
        let param_count = parsed.param_count;
        engine.statements.insert(handle, (parsed, sql.to_string()));
        trace!(handle = handle.0, sql, "prepared");

        Ok(PreparedInfo {
            handle,
            param_count,
            column_count,
        })
    }

    fn execute(&mut self, handle: StatementHandle, params: &[WireValue]) -> Result<Execution, ClientError> {
        let mut engine = self.engine.borrow_mut();
        engine.check_ready()?;

        let (parsed, sql) = engine
            .statements
            .get(&handle)
            .cloned()
            .ok_or_else(|| ClientError::new(ER_UNKNOWN_STMT_HANDLER, "Unknown prepared statement handler"))?;
        if params.len() != parsed.param_count {
            return Err(ClientError::new(
                CR_PARAMS_NOT_BOUND,
                "No data supplied for parameters in prepared statement",
            ));
        }

        let outcome = engine.run(&parsed.command, &sql, params)?;
        let affected_rows = if outcome.columns.is_empty() {
            outcome.affected
        } else {
            outcome.rows.len() as u64
        };
        Ok(Execution {
            rows: outcome.rows,
            affected_rows,
            last_insert_id: outcome.last_insert_id,
        })
    }

    fn close_statement(&mut self, handle: StatementHandle) {
        self.engine.borrow_mut().statements.remove(&handle);
    }

    fn list_tables(&mut self, pattern: &str) -> Result<Vec<String>, ClientError> {
        let mut engine = self.engine.borrow_mut();
        engine.check_ready()?;
        Ok(engine
            .tables
            .iter()
            .filter(|table| like(pattern, &table.name))
            .map(|table| table.name.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct MemColumn {
    name: String,
    column_type: String,
    comment: String,
    auto_increment: bool,
    nullable: bool,
    default: WireValue,
}

impl MemColumn {
    fn from_def(def: &ColumnDef, primary_key: bool) -> Self {
        Self {
            name: def.name.clone(),
            column_type: def.column_type.clone(),
            comment: def.comment.clone(),
            auto_increment: def.auto_increment,
            nullable: !(primary_key || def.primary_key || def.auto_increment),
            default: def.default.clone(),
        }
    }
}

#[derive(Debug)]
struct MemTable {
    name: String,
    columns: Vec<MemColumn>,
    primary_key: Vec<String>,
    indexes: Vec<(String, Vec<String>)>,
    rows: Vec<Vec<WireValue>>,
    next_auto: u64,
}

impl MemTable {
    fn column_index(&self, name: &str) -> Result<usize, ClientError> {
        self.columns
            .iter()
            .position(|column| column.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| unknown_column(name))
    }
}

#[derive(Debug, Default)]
struct Outcome {
    columns: Vec<String>,
    rows: Vec<Vec<WireValue>>,
    affected: u64,
    last_insert_id: Option<u64>,
}

impl Outcome {
    fn affected(affected: u64) -> Self {
        Self {
            affected,
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct Engine {
    connected: bool,
    database: String,
    tables: Vec<MemTable>,
    statements: HashMap<StatementHandle, (Parsed, String)>,
    next_handle: u64,
    ddl_log: Vec<String>,
    counts: ExecutionCounts,
    pending_failure: Option<ClientError>,
    statement_failure: Option<(String, ClientError)>,
}

fn unknown_column(name: &str) -> ClientError {
    ClientError::new(ER_BAD_FIELD_ERROR, format!("Unknown column '{name}' in 'field list'"))
}

impl Engine {
    fn take_failure(&mut self) -> Result<(), ClientError> {
        match self.pending_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn take_statement_failure(&mut self, sql: &str) -> Result<(), ClientError> {
        let matches = self.statement_failure.as_ref().is_some_and(|(prefix, _)| {
            sql.get(..prefix.len()).is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        });
        match self.statement_failure.take_if(|_| matches) {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }

    fn check_ready(&mut self) -> Result<(), ClientError> {
        if !self.connected {
            return Err(ClientError::new(CR_SERVER_GONE_ERROR, "MySQL server has gone away"));
        }
        self.take_failure()
    }

    fn table(&self, name: &str) -> Result<&MemTable, ClientError> {
        self.tables
            .iter()
            .find(|table| table.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| self.no_such_table(name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemTable, ClientError> {
        let err = self.no_such_table(name);
        self.tables
            .iter_mut()
            .find(|table| table.name.eq_ignore_ascii_case(name))
            .ok_or(err)
    }

    fn no_such_table(&self, name: &str) -> ClientError {
        ClientError::new(ER_NO_SUCH_TABLE, format!("Table '{}.{name}' doesn't exist", self.database))
    }

    /// Checks that referenced tables and columns exist and returns the
    /// number of projected columns.
    fn describe(&self, command: &Command) -> Result<usize, ClientError> {
        match command {
            Command::Select(select) => {
                let (columns, _) = self.source(&select.table)?;
                for predicate in &select.filter {
                    position(&columns, predicate.column())?;
                }
                match &select.projection {
                    Projection::All => Ok(columns.len()),
                    Projection::Count => Ok(1),
                    Projection::Columns(names) => {
                        for name in names {
                            position(&columns, name)?;
                        }
                        Ok(names.len())
                    }
                }
            }
            Command::Insert { table, assignments } => {
                let table = self.table(table)?;
                for assignment in assignments {
                    table.column_index(&assignment.column)?;
                }
                Ok(0)
            }
            Command::Update {
                table,
                assignments,
                filter,
            } => {
                let table = self.table(table)?;
                for assignment in assignments {
                    table.column_index(&assignment.column)?;
                }
                for predicate in filter {
                    table.column_index(predicate.column())?;
                }
                Ok(0)
            }
            Command::Delete { table, filter } => {
                let table = self.table(table)?;
                for predicate in filter {
                    table.column_index(predicate.column())?;
                }
                Ok(0)
            }
            Command::ShowIndex { .. } => Ok(SHOW_INDEX_FIELDS.len()),
            Command::ShowTables { .. } => Ok(1),
            _ => Ok(0),
        }
    }

    fn run(&mut self, command: &Command, sql: &str, params: &[WireValue]) -> Result<Outcome, ClientError> {
        let outcome = match command {
            Command::Select(select) => self.select(select, params),
            Command::Insert { table, assignments } => self.insert(table, assignments, params),
            Command::Update {
                table,
                assignments,
                filter,
            } => self.update(table, assignments, filter, params),
            Command::Delete { table, filter } => self.delete(table, filter, params),
            Command::CreateTable(create) => self.create_table(create),
            Command::AddColumn {
                table,
                column,
                position,
            } => self.add_column(table, column, position),
            Command::ModifyColumn { table, column } => self.modify_column(table, column),
            Command::CreateIndex { name, table, columns } => self.create_index(name, table, columns),
            Command::ShowIndex { table } => self.show_index(table),
            Command::ShowTables { pattern } => Ok(self.show_tables(pattern.as_deref())),
            Command::SetNames => Ok(Outcome::default()),
        }?;

        if command.is_ddl() {
            self.ddl_log.push(sql.trim().to_string());
        }
        Ok(outcome)
    }

    /// Column names and rows of a table or virtual table.
    fn source(&self, name: &str) -> Result<(Vec<String>, Vec<Vec<WireValue>>), ClientError> {
        if name.eq_ignore_ascii_case(INFORMATION_SCHEMA_COLUMNS) {
            return Ok((
                INFORMATION_SCHEMA_FIELDS.iter().map(|f| f.to_string()).collect(),
                self.information_schema_rows(),
            ));
        }

        let table = self.table(name)?;
        Ok((
            table.columns.iter().map(|column| column.name.clone()).collect(),
            table.rows.clone(),
        ))
    }

    fn information_schema_rows(&self) -> Vec<Vec<WireValue>> {
        let text = |s: &str| WireValue::Bytes(s.as_bytes().to_vec());
        let mut rows = Vec::new();

        for table in &self.tables {
            for (ordinal, column) in table.columns.iter().enumerate() {
                let data_type = column
                    .column_type
                    .split(['(', ' '])
                    .next()
                    .unwrap_or_default()
                    .to_string();
                let length = if data_type == "varchar" || data_type == "char" {
                    type_argument(&column.column_type).map_or(WireValue::Null, WireValue::UInt)
                } else {
                    WireValue::Null
                };
                let precision = if data_type.ends_with("int") || data_type == "float" {
                    type_argument(&column.column_type).map_or(WireValue::Null, WireValue::UInt)
                } else {
                    WireValue::Null
                };

                rows.push(vec![
                    text(&self.database),
                    text(&table.name),
                    text(&column.name),
                    WireValue::UInt(ordinal as u64 + 1),
                    column.default.clone(),
                    text(if column.nullable { "YES" } else { "NO" }),
                    text(&data_type),
                    length,
                    precision,
                    text(&column.column_type),
                    text(&column.comment),
                ]);
            }
        }
        rows
    }

    fn select(&mut self, select: &Select, params: &[WireValue]) -> Result<Outcome, ClientError> {
        self.counts.selects += 1;
        let (columns, rows) = self.source(&select.table)?;
        let filter = resolve_filter(&columns, &select.filter, params)?;
        let matched: Vec<Vec<WireValue>> = rows.into_iter().filter(|row| matches_all(row, &filter)).collect();

        match &select.projection {
            Projection::Count => Ok(Outcome {
                columns: vec!["count".to_string()],
                rows: vec![vec![WireValue::Int(matched.len() as i64)]],
                ..Default::default()
            }),
            Projection::All => Ok(Outcome {
                columns,
                rows: matched,
                ..Default::default()
            }),
            Projection::Columns(names) => {
                let indexes = names
                    .iter()
                    .map(|name| position(&columns, name))
                    .collect::<Result<Vec<_>, _>>()?;
                let rows = matched
                    .into_iter()
                    .map(|row| indexes.iter().map(|&i| row[i].clone()).collect())
                    .collect();
                Ok(Outcome {
                    columns: names.clone(),
                    rows,
                    ..Default::default()
                })
            }
        }
    }

    fn insert(&mut self, table: &str, assignments: &[Assignment], params: &[WireValue]) -> Result<Outcome, ClientError> {
        self.counts.inserts += 1;
        let table = self.table_mut(table)?;

        let mut row: Vec<WireValue> = table.columns.iter().map(|column| column.default.clone()).collect();
        for assignment in assignments {
            let index = table.column_index(&assignment.column)?;
            row[index] = assignment.operand.value(params);
        }

        let mut generated = None;
        for (index, column) in table.columns.iter().enumerate() {
            if !column.auto_increment {
                continue;
            }
            match integer(&row[index]) {
                Some(value) if value > 0 => {
                    let value = u64::try_from(value).unwrap_or(u64::MAX);
                    table.next_auto = table.next_auto.max(value.saturating_add(1));
                }
                _ => {
                    let id = table.next_auto;
                    table.next_auto += 1;
                    row[index] = WireValue::UInt(id);
                    generated = Some(id);
                }
            }
        }

        let key: Vec<usize> = table
            .primary_key
            .iter()
            .map(|name| table.column_index(name))
            .collect::<Result<_, _>>()?;
        if !key.is_empty() {
            let duplicate = table
                .rows
                .iter()
                .any(|existing| key.iter().all(|&i| compare(&existing[i], &row[i]) == Some(Ordering::Equal)));
            if duplicate {
                let entry: Vec<String> = key.iter().filter_map(|&i| row[i].to_text()).collect();
                return Err(ClientError::new(
                    ER_DUP_ENTRY,
                    format!("Duplicate entry '{}' for key 'PRIMARY'", entry.join("-")),
                ));
            }
        }

        table.rows.push(row);
        Ok(Outcome {
            affected: 1,
            last_insert_id: generated,
            ..Default::default()
        })
    }

    fn update(
        &mut self,
        table: &str,
        assignments: &[Assignment],
        filter: &[Predicate],
        params: &[WireValue],
    ) -> Result<Outcome, ClientError> {
        self.counts.updates += 1;
        let table = self.table_mut(table)?;
        let columns: Vec<String> = table.columns.iter().map(|column| column.name.clone()).collect();
        let filter = resolve_filter(&columns, filter, params)?;
        let changes = assignments
            .iter()
            .map(|assignment| -> Result<(usize, WireValue), ClientError> {
                Ok((position(&columns, &assignment.column)?, assignment.operand.value(params)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut matched = 0;
        for row in table.rows.iter_mut().filter(|row| matches_all(row, &filter)) {
            for (index, value) in &changes {
                row[*index] = value.clone();
            }
            matched += 1;
        }
        Ok(Outcome::affected(matched))
    }

    fn delete(&mut self, table: &str, filter: &[Predicate], params: &[WireValue]) -> Result<Outcome, ClientError> {
        self.counts.deletes += 1;
        let table = self.table_mut(table)?;
        let columns: Vec<String> = table.columns.iter().map(|column| column.name.clone()).collect();
        let filter = resolve_filter(&columns, filter, params)?;

        let before = table.rows.len();
        table.rows.retain(|row| !matches_all(row, &filter));
        Ok(Outcome::affected((before - table.rows.len()) as u64))
    }

    fn create_table(&mut self, create: &CreateTable) -> Result<Outcome, ClientError> {
        if self.table(&create.name).is_ok() {
            return Err(ClientError::new(
                ER_TABLE_EXISTS_ERROR,
                format!("Table '{}' already exists", create.name),
            ));
        }

        let mut columns: Vec<MemColumn> = Vec::new();
        for def in &create.columns {
            if columns.iter().any(|c| c.name.eq_ignore_ascii_case(&def.name)) {
                return Err(ClientError::new(ER_DUP_FIELDNAME, format!("Duplicate column name '{}'", def.name)));
            }
            let in_key = create.primary_key.iter().any(|k| k.eq_ignore_ascii_case(&def.name));
            columns.push(MemColumn::from_def(def, in_key));
        }

        let mut table = MemTable {
            name: create.name.clone(),
            columns,
            primary_key: create.primary_key.clone(),
            indexes: Vec::new(),
            rows: Vec::new(),
            next_auto: 1,
        };
        for name in &table.primary_key {
            table.column_index(name)?;
        }
        for (name, key_columns) in &create.keys {
            for column in key_columns {
                table.column_index(column)?;
            }
            // unnamed keys take the name of their first column
            let name = name.clone().or_else(|| key_columns.first().cloned()).unwrap_or_default();
            table.indexes.push((name, key_columns.clone()));
        }

        self.tables.push(table);
        Ok(Outcome::default())
    }

    fn add_column(&mut self, table: &str, def: &ColumnDef, position: &Position) -> Result<Outcome, ClientError> {
        let table = self.table_mut(table)?;
        if table.column_index(&def.name).is_ok() {
            return Err(ClientError::new(ER_DUP_FIELDNAME, format!("Duplicate column name '{}'", def.name)));
        }

        let index = match position {
            Position::Last => table.columns.len(),
            Position::First => 0,
            Position::After(name) => table.column_index(name)? + 1,
        };
        let column = MemColumn::from_def(def, false);
        for row in &mut table.rows {
            row.insert(index, column.default.clone());
        }
        if def.primary_key {
            table.primary_key.push(def.name.clone());
        }
        table.columns.insert(index, column);
        Ok(Outcome::default())
    }

    fn modify_column(&mut self, table: &str, def: &ColumnDef) -> Result<Outcome, ClientError> {
        let table = self.table_mut(table)?;
        let index = table.column_index(&def.name)?;
        let in_key = table.primary_key.iter().any(|k| k.eq_ignore_ascii_case(&def.name));
        table.columns[index] = MemColumn::from_def(def, in_key);
        Ok(Outcome::default())
    }

    fn create_index(&mut self, name: &str, table: &str, columns: &[String]) -> Result<Outcome, ClientError> {
        let table = self.table_mut(table)?;
        if table.indexes.iter().any(|(existing, _)| existing.eq_ignore_ascii_case(name)) {
            return Err(ClientError::new(ER_DUP_KEYNAME, format!("Duplicate key name '{name}'")));
        }
        for column in columns {
            table.column_index(column)?;
        }
        table.indexes.push((name.to_string(), columns.to_vec()));
        Ok(Outcome::default())
    }

    fn show_index(&self, table: &str) -> Result<Outcome, ClientError> {
        let table = self.table(table)?;
        let text = |s: &str| WireValue::Bytes(s.as_bytes().to_vec());

        let primary = std::iter::once(("PRIMARY", 0u64, &table.primary_key)).filter(|(_, _, key)| !key.is_empty());
        let secondary = table.indexes.iter().map(|(name, columns)| (name.as_str(), 1u64, columns));

        let mut rows = Vec::new();
        for (name, non_unique, columns) in primary.chain(secondary) {
            for (seq, column) in columns.iter().enumerate() {
                rows.push(vec![
                    text(&table.name),
                    WireValue::UInt(non_unique),
                    text(name),
                    WireValue::UInt(seq as u64 + 1),
                    text(column),
                ]);
            }
        }

        Ok(Outcome {
            columns: SHOW_INDEX_FIELDS.iter().map(|f| f.to_string()).collect(),
            rows,
            ..Default::default()
        })
    }

    fn show_tables(&self, pattern: Option<&str>) -> Outcome {
        let rows = self
            .tables
            .iter()
            .filter(|table| pattern.is_none_or(|p| like(p, &table.name)))
            .map(|table| vec![WireValue::Bytes(table.name.as_bytes().to_vec())])
            .collect();
        Outcome {
            columns: vec![format!("Tables_in_{}", self.database)],
            rows,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation helpers
// ---------------------------------------------------------------------------

enum Resolved {
    Compare(usize, parser::CompareOp, WireValue),
    InSet(usize, WireValue),
}

fn position(columns: &[String], name: &str) -> Result<usize, ClientError> {
    columns
        .iter()
        .position(|column| column.eq_ignore_ascii_case(name))
        .ok_or_else(|| unknown_column(name))
}

fn resolve_filter(columns: &[String], filter: &[Predicate], params: &[WireValue]) -> Result<Vec<Resolved>, ClientError> {
    filter
        .iter()
        .map(|predicate| -> Result<Resolved, ClientError> {
            Ok(match predicate {
                Predicate::Compare { column, op, operand } => {
                    Resolved::Compare(position(columns, column)?, *op, operand.value(params))
                }
                Predicate::InSet { column, operand } => Resolved::InSet(position(columns, column)?, operand.value(params)),
            })
        })
        .collect()
}

fn matches_all(row: &[WireValue], filter: &[Resolved]) -> bool {
    filter.iter().all(|predicate| match predicate {
        Resolved::Compare(index, op, value) => compare(&row[*index], value).is_some_and(|ordering| op.matches(ordering)),
        Resolved::InSet(index, list) => match (row[*index].to_text(), list.to_text()) {
            (Some(cell), Some(list)) => list.split(',').any(|item| item.eq_ignore_ascii_case(&cell)),
            _ => false,
        },
    })
}

enum Number {
    Integer(i128),
    Real(f64),
}

fn number(value: &WireValue) -> Option<Number> {
    match value {
        WireValue::Int(v) => Some(Number::Integer(i128::from(*v))),
        WireValue::UInt(v) => Some(Number::Integer(i128::from(*v))),
        WireValue::Double(v) => Some(Number::Real(*v)),
        WireValue::Bytes(bytes) => {
            let text = std::str::from_utf8(bytes).ok()?.trim();
            text.parse::<i128>()
                .map(Number::Integer)
                .or_else(|_| text.parse::<f64>().map(Number::Real))
                .ok()
        }
        WireValue::Null | WireValue::DateTime(_) => None,
    }
}

fn integer(value: &WireValue) -> Option<i128> {
    match number(value)? {
        Number::Integer(v) => Some(v),
        Number::Real(v) => Some(v as i128),
    }
}

fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    match (a, b) {
        (Number::Integer(x), Number::Integer(y)) => Some(x.cmp(y)),
        (Number::Integer(x), Number::Real(y)) => (*x as f64).partial_cmp(y),
        (Number::Real(x), Number::Integer(y)) => x.partial_cmp(&(*y as f64)),
        (Number::Real(x), Number::Real(y)) => x.partial_cmp(y),
    }
}

/// SQL comparison: null never compares, text ignores case, numbers and
/// datetimes compare by value even when one side arrives as text.
fn compare(a: &WireValue, b: &WireValue) -> Option<Ordering> {
    match (a, b) {
        (WireValue::Null, _) | (_, WireValue::Null) => None,
        (WireValue::DateTime(x), WireValue::DateTime(y)) => Some(x.cmp(y)),
        (WireValue::DateTime(x), other) | (other, WireValue::DateTime(x)) => {
            let parsed = other.to_text().as_deref().and_then(parse_datetime)?;
            let ordering = x.cmp(&parsed);
            Some(if matches!(a, WireValue::DateTime(_)) { ordering } else { ordering.reverse() })
        }
        (WireValue::Bytes(x), WireValue::Bytes(y)) => {
            let x = String::from_utf8_lossy(x).to_lowercase();
            let y = String::from_utf8_lossy(y).to_lowercase();
            Some(x.cmp(&y))
        }
        _ => match (number(a), number(b)) {
            (Some(x), Some(y)) => compare_numbers(&x, &y),
            _ => {
                let x = a.to_text()?.to_lowercase();
                let y = b.to_text()?.to_lowercase();
                Some(x.cmp(&y))
            }
        },
    }
}

/// `LIKE` matching with `%` and `_`, ignoring case.
fn like(pattern: &str, text: &str) -> bool {
    fn matches(pattern: &[char], text: &[char]) -> bool {
        match pattern.split_first() {
            None => text.is_empty(),
            Some(('%', rest)) => (0..=text.len()).any(|skip| matches(rest, &text[skip..])),
            Some(('_', rest)) => !text.is_empty() && matches(rest, &text[1..]),
            Some((c, rest)) => text
                .split_first()
                .is_some_and(|(t, text)| t.eq_ignore_ascii_case(c) && matches(rest, text)),
        }
    }

    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    matches(&pattern, &text)
}

fn type_argument(column_type: &str) -> Option<u64> {
    let start = column_type.find('(')? + 1;
    let end = column_type[start..].find([')', ','])? + start;
    column_type[start..end].trim().parse().ok()
}
