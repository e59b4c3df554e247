//! Table-level persistence.
//!
//! A [`Table`] combines a [`TableDescriptor`], one [`Row`] of value
//! containers and three standing prepared statements:
//!
//! - select: every non-meta column, filtered by the primary key
//! - insert: every column except auto-increment ones
//! - update: every column except primary key, auto-increment and the
//!   insert stamp, filtered by the primary key
//!
//! [`Table::open`] brings the schema in line with the descriptor before the
//! statements are prepared. [`Table::store`] is the usual entry point: it
//! looks the primary key up and updates or inserts accordingly.
//!
//! # Example
//!
//! ```
//! use rowbind_core::{FieldDescriptor, FieldFormat, TableDescriptor};
//! use rowbind_dict::ConnectionConfig;
//! use rowbind_mysql::{Connection, MemoryClient, StoreOutcome, Table};
//!
//! let def = TableDescriptor::new("channels")
//!     .with_field(FieldDescriptor::new("id", FieldFormat::Ascii, 20).primary_key())
//!     .with_field(FieldDescriptor::new("name", FieldFormat::Ascii, 50));
//!
//! let conn = Connection::new(ConnectionConfig::new("epg"), MemoryClient::new());
//! let mut channels = Table::new(&conn, &def);
//! channels.open(true).unwrap();
//!
//! channels.set_value("id", "S19.2E-1-1019-10301").unwrap();
//! channels.set_value("name", "Das Erste HD").unwrap();
//! assert_eq!(channels.store().unwrap(), StoreOutcome::Inserted);
//!
//! channels.set_value("name", "Das Erste").unwrap();
//! assert_eq!(channels.store().unwrap(), StoreOutcome::Updated);
//! assert_eq!(channels.count_where(None, None).unwrap(), 1);
//! ```

use chrono::{Local, Timelike};
use rowbind_core::{FieldFormat, INSERT_STAMP_FIELD, Row, SharedValue, TableDescriptor, UPDATE_STAMP_FIELD, Value};
use rowbind_dict::Dictionary;
use tracing::{debug, error, trace};

use crate::connection::Connection;
use crate::error::{PersistError, Result};
use crate::statement::{BindMode, Statement};
use crate::sync::{SchemaSync, SyncReport};

/// Which branch [`Table::store`] took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted,
    Updated,
}

/// A table descriptor bound to a connection, with its current row.
pub struct Table<'a> {
    conn: &'a Connection,
    def: &'a TableDescriptor,
    row: Row<'a>,
    select: Option<Statement<'a>>,
    insert: Option<Statement<'a>>,
    update: Option<Statement<'a>>,
    attached: bool,
    last_insert_id: Option<u64>,
}

impl<'a> Table<'a> {
    pub fn new(conn: &'a Connection, def: &'a TableDescriptor) -> Self {
        Self {
            conn,
            def,
            row: Row::new(def),
            select: None,
            insert: None,
            update: None,
            attached: false,
            last_insert_id: None,
        }
    }

    /// Looks the table up in a dictionary.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::TableNotFound`] if the dictionary has no such
    /// table.
    pub fn from_dictionary(conn: &'a Connection, dictionary: &'a Dictionary, name: &str) -> Result<Self> {
        match dictionary.get_table(name) {
            Some(def) => Ok(Self::new(conn, def)),
            None => {
                error!(table = name, "table not found in dictionary");
                Err(PersistError::TableNotFound(name.to_string()))
            }
        }
    }

    pub fn name(&self) -> &'a str {
        &self.def.name
    }

    pub fn descriptor(&self) -> &'a TableDescriptor {
        self.def
    }

    pub fn connection(&self) -> &'a Connection {
        self.conn
    }

    /// The containers statements bind to.
    pub fn row(&self) -> &Row<'a> {
        &self.row
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Attaches to the connection, synchronizes the schema and prepares the
    /// standing statements.
    ///
    /// `allow_alter` permits adding and modifying columns; missing tables
    /// and indices are always created.
    ///
    /// # Errors
    ///
    /// Returns the first error of attaching, synchronizing or preparing.
    /// A table without a primary key cannot be opened.
    pub fn open(&mut self, allow_alter: bool) -> Result<SyncReport> {
        if self.is_open() {
            return Err(PersistError::StateError(format!("table '{}' is already open", self.def.name)));
        }

        if !self.attached {
            self.conn.attach()?;
            self.attached = true;
        }

        let report = SchemaSync::new(self.conn, self.def).synchronize(allow_alter)?;

        self.select = Some(self.prepare_select()?);
        self.insert = Some(self.prepare_insert()?);
        self.update = Some(self.prepare_update()?);
        debug!(table = %self.def.name, "table opened");
        Ok(report)
    }

    /// Drops the standing statements and detaches from the connection.
    pub fn close(&mut self) {
        self.select = None;
        self.insert = None;
        self.update = None;
        if self.attached {
            self.attached = false;
            self.conn.detach();
        }
    }

    pub fn is_open(&self) -> bool {
        self.select.is_some() && self.insert.is_some() && self.update.is_some()
    }

    /// Prepares the standing statements again after a reconnect.
    ///
    /// # Errors
    ///
    /// Returns the first preparation error.
    pub fn reprepare(&mut self) -> Result<()> {
        for statement in [&mut self.select, &mut self.insert, &mut self.update].into_iter().flatten() {
            statement.reprepare()?;
        }
        Ok(())
    }

    fn bind_primary_key(&self, statement: &mut Statement<'a>) -> Result<()> {
        let mut delimiter = None;
        for field in self.def.primary_keys() {
            statement.bind(self.row.value_at(field.index()), BindMode::InputSet, delimiter)?;
            delimiter = Some(" and ");
        }
        if delimiter.is_none() {
            error!(table = %self.def.name, "table has no primary key");
            return Err(PersistError::BuildError(format!("table '{}' has no primary key", self.def.name)));
        }
        Ok(())
    }

    fn prepare_select(&self) -> Result<Statement<'a>> {
        let mut statement = Statement::new(self.conn);
        statement.build("select ");
        statement.bind_all_out(&self.row, None)?;
        statement.build(&format!(" from {} where ", self.def.name));
        self.bind_primary_key(&mut statement)?;
        statement.prepare()?;
        Ok(statement)
    }

    fn prepare_insert(&self) -> Result<Statement<'a>> {
        let mut statement = Statement::new(self.conn);
        statement.build(&format!("insert into {} set ", self.def.name));
        let mut delimiter = None;
        for field in self.def.fields().iter().filter(|f| !f.is_autoincrement()) {
            statement.bind(self.row.value_at(field.index()), BindMode::InputSet, delimiter)?;
            delimiter = Some(", ");
        }
        statement.prepare()?;
        Ok(statement)
    }

    fn prepare_update(&self) -> Result<Statement<'a>> {
        let mut statement = Statement::new(self.conn);
        statement.build(&format!("update {} set ", self.def.name));
        let mut delimiter = None;
        for field in self.def.fields().iter().filter(|f| {
            !f.is_primary_key() && !f.is_autoincrement() && !f.name.eq_ignore_ascii_case(INSERT_STAMP_FIELD)
        }) {
            statement.bind(self.row.value_at(field.index()), BindMode::InputSet, delimiter)?;
            delimiter = Some(", ");
        }
        statement.build(" where ");
        self.bind_primary_key(&mut statement)?;
        statement.prepare()?;
        Ok(statement)
    }

    fn standing<'s>(statement: &'s mut Option<Statement<'a>>, table: &str) -> Result<&'s mut Statement<'a>> {
        statement
            .as_mut()
            .ok_or_else(|| PersistError::StateError(format!("table '{table}' is not open")))
    }

    // -----------------------------------------------------------------------
    // Values
    // -----------------------------------------------------------------------

    /// The container of a field by logical name, falling back to the column
    /// name.
    pub fn value(&self, name: &str) -> Option<&SharedValue<'a>> {
        self.row.value(name)
    }

    /// # Errors
    ///
    /// Returns [`PersistError::ValueError`] for unknown fields or values that
    /// do not fit the field's format.
    pub fn set_value(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        Ok(self.row.set(name, value)?)
    }

    /// # Errors
    ///
    /// Returns [`PersistError::ValueError`] for unknown fields.
    pub fn set_null(&self, name: &str) -> Result<()> {
        Ok(self.row.set_null(name)?)
    }

    /// Copy of a field's value, `None` when null or unknown.
    pub fn get_value(&self, name: &str) -> Option<Value> {
        self.row.get(name).and_then(|value| value.get().cloned())
    }

    /// Resets every container to null.
    pub fn clear_values(&self) {
        self.row.clear();
    }

    fn stamp(&self, name: &str) -> Result<()> {
        let Some(value) = self.row.value(name) else {
            return Ok(());
        };
        let now = Local::now();
        let local = now.naive_local();
        let mut value = value.borrow_mut();
        match value.field().format {
            FieldFormat::DateTime => value.set(local.with_nanosecond(0).unwrap_or(local))?,
            format if format.is_integer() => value.set(now.timestamp())?,
            _ => {}
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // CRUD
    // -----------------------------------------------------------------------

    /// Looks the row up by primary key and loads it into the containers.
    ///
    /// Returns `false` if no row matched; the containers then keep their
    /// values.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::StateError`] if the table is not open, or
    /// the execution error.
    pub fn find(&mut self) -> Result<bool> {
        let select = Self::standing(&mut self.select, &self.def.name)?;
        select.execute(false)?;
        Ok(select.affected() == 1)
    }

    /// Inserts the current row, stamping the update and insert stamp
    /// fields.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::CardinalityError`] unless exactly one row was
    /// inserted, or the execution error.
    pub fn insert(&mut self) -> Result<()> {
        self.stamp(UPDATE_STAMP_FIELD)?;
        self.stamp(INSERT_STAMP_FIELD)?;

        let insert = Self::standing(&mut self.insert, &self.def.name)?;
        insert.execute(false)?;
        let affected = insert.affected();
        let last_insert_id = insert.last_insert_id();
        if affected != 1 {
            return Err(self.cardinality("insert", affected));
        }

        if let Some(id) = last_insert_id {
            self.last_insert_id = Some(id);
            let generated = self.def.fields().iter().find(|f| f.is_autoincrement());
            if let Some(value) = generated.and_then(|field| self.row.value_at(field.index())) {
                value.borrow_mut().set(id)?;
            }
        }
        trace!(table = %self.def.name, "row inserted");
        Ok(())
    }

    /// Updates the row identified by the current primary key, stamping the
    /// update stamp field.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::CardinalityError`] unless exactly one row
    /// matched, or the execution error.
    pub fn update(&mut self) -> Result<()> {
        self.stamp(UPDATE_STAMP_FIELD)?;

        let update = Self::standing(&mut self.update, &self.def.name)?;
        update.execute(false)?;
        let affected = update.affected();
        if affected != 1 {
            return Err(self.cardinality("update", affected));
        }
        trace!(table = %self.def.name, "row updated");
        Ok(())
    }

    /// Updates the row if its primary key exists, otherwise inserts it.
    ///
    /// The lookup and the write are separate statements; a concurrent
    /// writer between the two surfaces as a duplicate-key error or a
    /// cardinality error.
    ///
    /// # Errors
    ///
    /// Same as [`insert`](Self::insert) and [`update`](Self::update).
    pub fn store(&mut self) -> Result<StoreOutcome> {
        let select = Self::standing(&mut self.select, &self.def.name)?;
        select.execute(true)?;
        let exists = select.affected() >= 1;
        select.free_result();

        if exists {
            self.update()?;
            Ok(StoreOutcome::Updated)
        } else {
            self.insert()?;
            Ok(StoreOutcome::Inserted)
        }
    }

    fn cardinality(&self, operation: &'static str, affected: u64) -> PersistError {
        error!(
            table = %self.def.name,
            affected,
            "{operation} affected {affected} rows instead of one"
        );
        PersistError::CardinalityError {
            operation,
            table: self.def.name.clone(),
            affected,
        }
    }

    /// Key generated by the last successful insert.
    pub fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    // -----------------------------------------------------------------------
    // Ad-hoc statements
    // -----------------------------------------------------------------------

    /// A new statement on this table's connection for custom lookups
    /// binding to [`row`](Self::row).
    pub fn statement(&self) -> Statement<'a> {
        Statement::new(self.conn)
    }

    /// Prepares `statement` if needed, executes it and loads the first
    /// row. Returns `false` if nothing matched.
    ///
    /// # Errors
    ///
    /// Returns the preparation or execution error.
    pub fn find_with(&self, statement: &mut Statement<'a>) -> Result<bool> {
        if !statement.is_prepared() || statement.is_stale() {
            statement.reprepare()?;
        }
        statement.find()
    }

    /// Loads the next row of a statement executed by
    /// [`find_with`](Self::find_with).
    ///
    /// # Errors
    ///
    /// Returns the conversion error of a cell.
    pub fn fetch(&self, statement: &mut Statement<'a>) -> Result<bool> {
        statement.fetch()
    }

    /// Discards the remaining rows of `statement`.
    pub fn reset(&self, statement: &mut Statement<'a>) {
        statement.free_result();
    }

    /// Deletes the rows matching a SQL predicate and returns their number.
    ///
    /// # Errors
    ///
    /// Returns the classified client error.
    pub fn delete_where(&self, predicate: &str) -> Result<u64> {
        let sql = format!("delete from {} where {predicate}", self.def.name);
        Ok(self.conn.query("delete where", &sql)?.affected_rows)
    }

    /// Evaluates an aggregate, `count(1)` by default, over the rows matching
    /// an optional predicate.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::StateError`] if the result is not a number,
    /// or the classified client error.
    pub fn count_where(&self, predicate: Option<&str>, what: Option<&str>) -> Result<u64> {
        let mut sql = format!("select {} from {}", what.unwrap_or("count(1)"), self.def.name);
        if let Some(predicate) = predicate {
            sql.push_str(" where ");
            sql.push_str(predicate);
        }

        let result = self.conn.query("count where", &sql)?;
        let cell = result.rows.first().and_then(|row| row.first()).cloned().flatten();
        match cell {
            None => Ok(0),
            Some(text) => text
                .trim()
                .parse()
                .map_err(|_| PersistError::StateError(format!("'{sql}' returned '{text}'"))),
        }
    }

    /// Deletes every row.
    ///
    /// # Errors
    ///
    /// Returns the classified client error.
    pub fn truncate(&self) -> Result<u64> {
        let sql = format!("delete from {}", self.def.name);
        Ok(self.conn.query("truncate", &sql)?.affected_rows)
    }
}

impl Drop for Table<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryClient;
    use rowbind_core::FieldDescriptor;
    use rowbind_dict::ConnectionConfig;

    fn recordings() -> TableDescriptor {
        TableDescriptor::new("recordings")
            .with_field(FieldDescriptor::new("id", FieldFormat::UInt, 10).primary_key().autoincrement())
            .with_field(FieldDescriptor::new("title", FieldFormat::Ascii, 100))
            .with_field(FieldDescriptor::new("inssp", FieldFormat::Int, 0))
            .with_field(FieldDescriptor::new("updsp", FieldFormat::DateTime, 0))
    }

    fn keyless() -> TableDescriptor {
        TableDescriptor::new("notes").with_field(FieldDescriptor::new("text", FieldFormat::Text, 0))
    }

    #[test]
    fn test_standing_statement_text() {
        let def = recordings();
        let conn = Connection::new(ConnectionConfig::new("test"), MemoryClient::new());
        let mut table = Table::new(&conn, &def);
        table.open(true).unwrap();

        assert_eq!(
            table.select.as_ref().unwrap().text(),
            "select id, title, inssp, updsp from recordings where id = ?"
        );
        assert_eq!(
            table.insert.as_ref().unwrap().text(),
            "insert into recordings set title = ?, inssp = ?, updsp = ?"
        );
        assert_eq!(
            table.update.as_ref().unwrap().text(),
            "update recordings set title = ?, updsp = ? where id = ?"
        );
    }

    #[test]
    fn test_standing_statements_use_storage_names() {
        let def = TableDescriptor::new("events")
            .with_field(FieldDescriptor::new("id", FieldFormat::UInt, 10).primary_key())
            .with_field(FieldDescriptor::new("title", FieldFormat::Ascii, 50).with_db_name("event_title"))
            .with_field(FieldDescriptor::new("inssp", FieldFormat::Int, 0).with_db_name("created"));
        let conn = Connection::new(ConnectionConfig::new("test"), MemoryClient::new());
        let mut table = Table::new(&conn, &def);
        table.open(true).unwrap();

        assert_eq!(
            table.select.as_ref().unwrap().text(),
            "select id, event_title, created from events where id = ?"
        );
        assert_eq!(
            table.insert.as_ref().unwrap().text(),
            "insert into events set id = ?, event_title = ?, created = ?"
        );
        assert_eq!(
            table.update.as_ref().unwrap().text(),
            "update events set event_title = ? where id = ?"
        );
    }

    #[test]
    fn test_open_attaches_and_close_detaches() {
        let def = recordings();
        let conn = Connection::new(ConnectionConfig::new("test"), MemoryClient::new());
        {
            let mut table = Table::new(&conn, &def);
            table.open(true).unwrap();
            assert_eq!(conn.attach_count(), 1);
            assert!(table.is_open());
        }
        assert_eq!(conn.attach_count(), 0);
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_table_without_primary_key_cannot_open() {
        let def = keyless();
        let conn = Connection::new(ConnectionConfig::new("test"), MemoryClient::new());
        let mut table = Table::new(&conn, &def);
        assert!(matches!(table.open(true), Err(PersistError::BuildError(_))));
    }

    #[test]
    fn test_operations_require_open_table() {
        let def = recordings();
        let conn = Connection::new(ConnectionConfig::new("test"), MemoryClient::new());
        let mut table = Table::new(&conn, &def);
        assert!(matches!(table.store(), Err(PersistError::StateError(_))));
    }

    #[test]
    fn test_insert_stamps_and_assigns_key() {
        let def = recordings();
        let conn = Connection::new(ConnectionConfig::new("test"), MemoryClient::new());
        let mut table = Table::new(&conn, &def);
        table.open(true).unwrap();

        table.set_value("title", "Tagesschau").unwrap();
        assert_eq!(table.store().unwrap(), StoreOutcome::Inserted);
        assert_eq!(table.last_insert_id(), Some(1));
        assert_eq!(table.get_value("id"), Some(Value::UInt(1)));
        assert!(matches!(table.get_value("inssp"), Some(Value::Int(stamp)) if stamp > 0));
        assert!(matches!(table.get_value("updsp"), Some(Value::DateTime(_))));

        table.set_value("title", "Tagesthemen").unwrap();
        assert_eq!(table.store().unwrap(), StoreOutcome::Updated);
        assert_eq!(table.count_where(Some("title = 'tagesthemen'"), None).unwrap(), 1);
    }

    #[test]
    fn test_unknown_table_in_dictionary() {
        let dictionary = Dictionary::new(vec![recordings()]);
        let conn = Connection::new(ConnectionConfig::new("test"), MemoryClient::new());
        assert!(matches!(
            Table::from_dictionary(&conn, &dictionary, "missing"),
            Err(PersistError::TableNotFound(name)) if name == "missing"
        ));
        assert!(Table::from_dictionary(&conn, &dictionary, "recordings").is_ok());
    }
}
