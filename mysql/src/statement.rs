//! Statement building, binding and lifecycle.
//!
//! A [`Statement`] accumulates SQL text and an ordered list of input and
//! output bindings. Each binding references the [`ValueContainer`] it reads a
//! parameter from or writes a result column into, so executing a prepared
//! statement many times only needs the containers to be refilled.
//!
//! ```text
//! Unprepared --prepare()--> Prepared --execute()--> Prepared (result buffered)
//!     ^                                                  |
//!     +--------------------- clear() --------------------+
//! ```
//!
//! # Example
//!
//! ```
//! use rowbind_core::{FieldDescriptor, FieldFormat, Row, TableDescriptor};
//! use rowbind_dict::ConnectionConfig;
//! use rowbind_mysql::{BindMode, Connection, MemoryClient, Statement};
//!
//! let table = TableDescriptor::new("channels")
//!     .with_field(FieldDescriptor::new("id", FieldFormat::Ascii, 20).primary_key())
//!     .with_field(FieldDescriptor::new("name", FieldFormat::Ascii, 50));
//! let row = Row::new(&table);
//!
//! let conn = Connection::new(ConnectionConfig::new("epg"), MemoryClient::new());
//! conn.connect().unwrap();
//! conn.query("setup", "create table channels(id varchar(20), name varchar(50), PRIMARY KEY(id))").unwrap();
//!
//! let mut insert = Statement::new(&conn);
//! insert.build("insert into channels set ");
//! insert.bind(row.value("id"), BindMode::InputSet, None).unwrap();
//! insert.bind(row.value("name"), BindMode::InputSet, Some(", ")).unwrap();
//! insert.prepare().unwrap();
//! assert_eq!(insert.text(), "insert into channels set id = ?, name = ?");
//!
//! row.set("id", "S19.2E-1-1019-10301").unwrap();
//! row.set("name", "Das Erste HD").unwrap();
//! insert.execute(false).unwrap();
//! assert_eq!(insert.affected(), 1);
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use rowbind_core::{Row, SharedValue, ValueContainer};
use tracing::{debug, error, info, trace};

use crate::client::{StatementHandle, WireValue};
use crate::connection::Connection;
use crate::error::{PersistError, Result};
use crate::wire::{WireBind, decode, encode, wire_bind};

/// Direction of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// Parameter rendered as ` ?`.
    Input,
    /// Parameter rendered as `column = ?`.
    InputSet,
    /// Result column rendered as `column`.
    Output,
}

/// Execution counters of a statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementStatistics {
    pub text: String,
    /// Executions in the current period.
    pub calls: u64,
    /// Time spent in the current period.
    pub duration: Duration,
    /// Executions since creation.
    pub total_calls: u64,
    pub total_duration: Duration,
}

impl StatementStatistics {
    fn record(&mut self, elapsed: Duration) {
        self.calls += 1;
        self.total_calls += 1;
        self.duration += elapsed;
        self.total_duration += elapsed;
    }

    /// Returns the current counters and starts a new period.
    pub(crate) fn take_period(&mut self) -> Self {
        let snapshot = self.clone();
        self.calls = 0;
        self.duration = Duration::ZERO;
        snapshot
    }

    /// Logs the period counters, if the statement ran at all.
    pub fn log(&self) {
        if self.calls > 0 {
            info!(
                calls = self.calls,
                ms = self.duration.as_millis() as u64,
                total_calls = self.total_calls,
                "statement '{}'",
                self.text
            );
        }
    }
}

struct Binding<'a> {
    value: Weak<RefCell<ValueContainer<'a>>>,
    wire: WireBind,
}

impl<'a> Binding<'a> {
    fn new(value: &SharedValue<'a>) -> Self {
        let wire = wire_bind(value.borrow().field());
        Self {
            value: Rc::downgrade(value),
            wire,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Prepared {
    handle: StatementHandle,
    generation: u64,
}

/// A SQL statement with its bindings and prepared handle.
pub struct Statement<'a> {
    conn: &'a Connection,
    text: String,
    bind_prefix: Option<String>,
    inputs: Vec<Binding<'a>>,
    outputs: Vec<Binding<'a>>,
    build_errors: usize,
    prepared: Option<Prepared>,
    result: Option<VecDeque<Vec<WireValue>>>,
    affected: u64,
    last_insert_id: Option<u64>,
    stats: Rc<RefCell<StatementStatistics>>,
}

impl<'a> Statement<'a> {
    /// Creates an empty statement on `conn`.
    pub fn new(conn: &'a Connection) -> Self {
        let stats = Rc::new(RefCell::new(StatementStatistics::default()));
        conn.register(&stats);
        Self {
            conn,
            text: String::new(),
            bind_prefix: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            build_errors: 0,
            prepared: None,
            result: None,
            affected: 0,
            last_insert_id: None,
            stats,
        }
    }

    /// Creates a statement with initial text.
    pub fn with_text(conn: &'a Connection, text: impl Into<String>) -> Self {
        let mut statement = Self::new(conn);
        statement.text = text.into();
        statement
    }

    pub fn connection(&self) -> &'a Connection {
        self.conn
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn build_errors(&self) -> usize {
        self.build_errors
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    /// Returns `true` if the statement was prepared before the connection's
    /// last reconnect.
    pub fn is_stale(&self) -> bool {
        self.prepared
            .is_some_and(|prepared| prepared.generation != self.conn.generation())
    }

    // -----------------------------------------------------------------------
    // Building
    // -----------------------------------------------------------------------

    /// Appends literal SQL text.
    pub fn build(&mut self, fragment: &str) -> &mut Self {
        self.text.push_str(fragment);
        self
    }

    /// Sets the text inserted before every bound column name, e.g. a table
    /// alias with its dot.
    pub fn set_bind_prefix(&mut self, prefix: Option<&str>) {
        self.bind_prefix = prefix.map(str::to_string);
    }

    /// Binds a container.
    ///
    /// `Input` appends ` ?`, `InputSet` appends `column = ?` and `Output`
    /// appends `column`, each preceded by `delimiter` and the bind prefix.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::BuildError`] and counts a build error when no
    /// value is given.
    pub fn bind(&mut self, value: Option<&SharedValue<'a>>, mode: BindMode, delimiter: Option<&str>) -> Result<()> {
        let Some(value) = value else {
            return Err(self.build_error("missing bind value"));
        };
        let column = value.borrow().column_name();

        if let Some(delimiter) = delimiter {
            self.text.push_str(delimiter);
        }
        if let Some(prefix) = &self.bind_prefix {
            self.text.push_str(prefix);
        }

        match mode {
            BindMode::Input | BindMode::InputSet => {
                if mode == BindMode::InputSet {
                    self.text.push_str(column);
                    self.text.push_str(" =");
                }
                self.text.push_str(" ?");
                self.inputs.push(Binding::new(value));
            }
            BindMode::Output => {
                self.text.push_str(column);
                self.outputs.push(Binding::new(value));
            }
        }
        Ok(())
    }

    /// Binds every non-meta field of `row` as output, in field order and
    /// separated by `, `.
    ///
    /// # Errors
    ///
    /// Propagates errors of [`bind`](Self::bind).
    pub fn bind_all_out(&mut self, row: &Row<'a>, delimiter: Option<&str>) -> Result<()> {
        if let Some(delimiter) = delimiter {
            self.text.push_str(delimiter);
        }

        let mut first = true;
        for value in row.values() {
            if value.borrow().field().is_meta() {
                continue;
            }
            let delimiter = if first { None } else { Some(", ") };
            self.bind(Some(value), BindMode::Output, delimiter)?;
            first = false;
        }
        Ok(())
    }

    /// Binds a comparison `<qualifier.>column op ?`.
    ///
    /// The parameter is read from `value` when given, otherwise from
    /// `column` itself.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::BuildError`] and counts a build error when no
    /// column is given.
    pub fn bind_cmp(
        &mut self,
        qualifier: Option<&str>,
        column: Option<&SharedValue<'a>>,
        value: Option<&SharedValue<'a>>,
        op: &str,
        delimiter: Option<&str>,
    ) -> Result<()> {
        let Some(column) = column else {
            return Err(self.build_error("missing compare column"));
        };
        let parameter = value.unwrap_or(column);
        let name = column.borrow().column_name();

        if let Some(delimiter) = delimiter {
            self.text.push_str(delimiter);
        }
        if let Some(qualifier) = qualifier {
            self.text.push_str(qualifier);
            self.text.push('.');
        }
        let prefix = self.bind_prefix.as_deref().unwrap_or("");
        self.text.push_str(&format!("{prefix}{name} {op} ?"));
        self.inputs.push(Binding::new(parameter));
        Ok(())
    }

    /// Binds a set membership test
    /// `find_in_set(cast(<qualifier.>column as char),?)`.
    ///
    /// The parameter, a comma-separated list, is read from `value` when
    /// given, otherwise from `column`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::BuildError`] and counts a build error when no
    /// column is given.
    pub fn bind_in_char(
        &mut self,
        qualifier: Option<&str>,
        column: Option<&SharedValue<'a>>,
        value: Option<&SharedValue<'a>>,
        delimiter: Option<&str>,
    ) -> Result<()> {
        let Some(column) = column else {
            return Err(self.build_error("missing set column"));
        };
        let parameter = value.unwrap_or(column);
        let name = column.borrow().column_name();

        let qualified = match qualifier {
            Some(qualifier) => format!("{qualifier}.{name}"),
            None => name.to_string(),
        };
        self.text.push_str(&format!(
            "{} find_in_set(cast({}{} as char),?)",
            delimiter.unwrap_or(""),
            self.bind_prefix.as_deref().unwrap_or(""),
            qualified
        ));
        self.inputs.push(Binding::new(parameter));
        Ok(())
    }

    fn build_error(&mut self, message: &str) -> PersistError {
        self.build_errors += 1;
        error!(statement = %self.text, "{message}");
        PersistError::BuildError(message.to_string())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Prepares the statement on the server.
    ///
    /// # Errors
    ///
    /// - [`PersistError::StateError`] if already prepared
    /// - [`PersistError::BuildError`] for empty text, pending build errors,
    ///   or placeholder/column counts that differ from the bindings
    /// - [`PersistError::NotConnected`] without an open connection
    /// - the classified client error
    pub fn prepare(&mut self) -> Result<()> {
        if self.prepared.is_some() {
            return Err(PersistError::StateError(format!(
                "statement '{}' is already prepared",
                self.text
            )));
        }
        if self.text.trim().is_empty() {
            return Err(PersistError::BuildError("empty statement".to_string()));
        }
        if self.build_errors > 0 {
            error!(statement = %self.text, errors = self.build_errors, "refusing to prepare statement with build errors");
            return Err(PersistError::BuildError(format!(
                "{} build error(s) pending in '{}'",
                self.build_errors, self.text
            )));
        }
        if !self.conn.is_connected() {
            return Err(PersistError::NotConnected);
        }

        let result = self.conn.with_client(|client| client.prepare(&self.text));
        let info = result.map_err(|err| self.conn.report("prepare", Some(&self.text), err))?;

        let mismatch = if info.param_count != self.inputs.len() {
            Some(format!(
                "statement has {} placeholders but {} input bindings",
                info.param_count,
                self.inputs.len()
            ))
        } else if !self.outputs.is_empty() && info.column_count != self.outputs.len() {
            Some(format!(
                "statement projects {} columns but has {} output bindings",
                info.column_count,
                self.outputs.len()
            ))
        } else {
            None
        };
        if let Some(message) = mismatch {
            self.conn.with_client(|client| client.close_statement(info.handle));
            error!(statement = %self.text, "{message}");
            return Err(PersistError::BuildError(message));
        }

        self.prepared = Some(Prepared {
            handle: info.handle,
            generation: self.conn.generation(),
        });
        self.stats.borrow_mut().text = self.text.clone();
        debug!(
            "statement '{}' with ({}) in parameters and ({}) out bindings prepared",
            self.text,
            self.inputs.len(),
            self.outputs.len()
        );
        Ok(())
    }

    /// Prepares the statement again after a reconnect, keeping text and
    /// bindings. A statement that is prepared and current is left alone.
    ///
    /// # Errors
    ///
    /// Same as [`prepare`](Self::prepare).
    pub fn reprepare(&mut self) -> Result<()> {
        match self.prepared {
            Some(_) if !self.is_stale() => Ok(()),
            _ => {
                // handles of an earlier generation died with their connection
                self.prepared = None;
                self.result = None;
                self.prepare()
            }
        }
    }

    /// Executes the prepared statement with the current values of the input
    /// containers.
    ///
    /// Projections are buffered completely; [`affected`](Self::affected) is
    /// then the row count, and the first row is written into the output
    /// containers unless `suppress_result` is set.
    ///
    /// # Errors
    ///
    /// - [`PersistError::StateError`] if not prepared, or a bound container
    ///   was dropped
    /// - [`PersistError::StaleStatement`] if prepared before a reconnect
    /// - the classified client error
    /// - [`PersistError::ValueError`] if the first row cannot be stored
    pub fn execute(&mut self, suppress_result: bool) -> Result<()> {
        self.affected = 0;
        self.last_insert_id = None;
        self.result = None;

        let Some(prepared) = self.prepared else {
            return Err(PersistError::StateError(format!(
                "statement '{}' executed before prepare",
                self.text
            )));
        };
        if prepared.generation != self.conn.generation() {
            return Err(PersistError::StaleStatement(self.text.clone()));
        }

        let params = self
            .inputs
            .iter()
            .map(|binding| {
                binding
                    .value
                    .upgrade()
                    .map(|value| encode(&value.borrow()))
                    .ok_or_else(|| PersistError::StateError(format!("bound value of '{}' was dropped", self.text)))
            })
            .collect::<Result<Vec<_>>>()?;

        let start = Instant::now();
        let result = self.conn.with_client(|client| client.execute(prepared.handle, &params));
        let elapsed = start.elapsed();
        self.stats.borrow_mut().record(elapsed);
        let execution = result.map_err(|err| self.conn.report("execute", Some(&self.text), err))?;

        trace!(statement = %self.text, ms = elapsed.as_millis() as u64, "executed");
        self.last_insert_id = execution.last_insert_id;

        if self.outputs.is_empty() {
            self.affected = execution.affected_rows;
            return Ok(());
        }

        self.affected = execution.rows.len() as u64;
        self.result = Some(execution.rows.into());
        if !suppress_result && self.affected > 0 {
            self.fetch()?;
        }
        Ok(())
    }

    /// Executes and reports whether at least one row was found; the first
    /// row is written into the output containers.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub fn find(&mut self) -> Result<bool> {
        self.execute(false)?;
        Ok(self.affected > 0)
    }

    /// Writes the next buffered row into the output containers.
    ///
    /// Returns `false` when no row is left.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::ValueError`] if a cell cannot be stored, or
    /// [`PersistError::StateError`] if a bound container was dropped.
    pub fn fetch(&mut self) -> Result<bool> {
        let Some(row) = self.result.as_mut().and_then(VecDeque::pop_front) else {
            return Ok(false);
        };

        for (binding, cell) in self.outputs.iter().zip(row) {
            let value = binding
                .value
                .upgrade()
                .ok_or_else(|| PersistError::StateError(format!("bound value of '{}' was dropped", self.text)))?;
            decode(&mut value.borrow_mut(), &binding.wire, cell)?;
        }
        Ok(true)
    }

    /// Discards any buffered result rows.
    pub fn free_result(&mut self) {
        self.result = None;
    }

    /// Releases the prepared handle, the text and all bindings.
    pub fn clear(&mut self) {
        if let Some(prepared) = self.prepared.take() {
            if prepared.generation == self.conn.generation() && self.conn.is_connected() {
                self.conn.with_client(|client| client.close_statement(prepared.handle));
            }
        }
        self.text.clear();
        self.inputs.clear();
        self.outputs.clear();
        self.build_errors = 0;
        self.result = None;
        self.affected = 0;
        self.last_insert_id = None;
    }

    /// Rows affected by the last execution, or rows found by a projection.
    pub fn affected(&self) -> u64 {
        self.affected
    }

    /// Rows still buffered for [`fetch`](Self::fetch).
    pub fn result_count(&self) -> usize {
        self.result.as_ref().map_or(0, VecDeque::len)
    }

    /// Key generated by the last execution, if it was an auto-increment
    /// insert.
    pub fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    pub fn statistics(&self) -> StatementStatistics {
        self.stats.borrow().clone()
    }

    /// Returns the counters and starts a new period.
    pub fn take_statistics(&self) -> StatementStatistics {
        self.stats.borrow_mut().take_period()
    }

    /// Logs the period counters and starts a new period.
    pub fn show_stat(&self) {
        self.take_statistics().log();
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryClient;
    use rowbind_core::{FieldDescriptor, FieldFormat, TableDescriptor};
    use rowbind_dict::ConnectionConfig;

    fn table() -> TableDescriptor {
        TableDescriptor::new("events")
            .with_field(FieldDescriptor::new("id", FieldFormat::UInt, 10).primary_key())
            .with_field(FieldDescriptor::new("title", FieldFormat::Ascii, 100).with_db_name("event_title"))
            .with_field(FieldDescriptor::new("genre", FieldFormat::Ascii, 20))
            .with_field(FieldDescriptor::new("score", FieldFormat::Int, 0).meta())
    }

    fn connected() -> (Connection, MemoryClient) {
        let client = MemoryClient::new();
        let conn = Connection::new(ConnectionConfig::new("test"), client.clone());
        conn.connect().unwrap();
        conn.query(
            "setup",
            "create table events(id int(10) unsigned, event_title varchar(100), genre varchar(20), score int, PRIMARY KEY(id))",
        )
        .unwrap();
        (conn, client)
    }

    #[test]
    fn test_bind_renders_text() {
        let def = table();
        let row = Row::new(&def);
        let (conn, _) = connected();

        let mut stmt = Statement::new(&conn);
        stmt.build("select ");
        stmt.bind_all_out(&row, None).unwrap();
        stmt.build(" from events where ");
        stmt.bind(row.value("id"), BindMode::InputSet, None).unwrap();
        stmt.bind_cmp(None, row.value("genre"), None, "<>", Some(" and ")).unwrap();

        assert_eq!(
            stmt.text(),
            "select id, event_title, genre from events where id = ? and genre <> ?"
        );
        assert_eq!(stmt.output_count(), 3);
        assert_eq!(stmt.input_count(), 2);
    }

    #[test]
    fn test_bind_prefix_and_qualifier() {
        let def = table();
        let row = Row::new(&def);
        let (conn, _) = connected();

        let mut stmt = Statement::new(&conn);
        stmt.set_bind_prefix(Some("e."));
        stmt.bind(row.value("title"), BindMode::Output, None).unwrap();
        stmt.bind_cmp(Some("x"), row.value("id"), None, ">=", Some(" where ")).unwrap();
        stmt.bind_in_char(Some("x"), row.value("genre"), None, Some(" and")).unwrap();

        assert_eq!(
            stmt.text(),
            "e.event_title where x.e.id >= ? and find_in_set(cast(e.x.genre as char),?)"
        );
    }

    #[test]
    fn test_missing_value_counts_build_error() {
        let (conn, _) = connected();
        let mut stmt = Statement::with_text(&conn, "select id from events where");

        assert!(matches!(
            stmt.bind(None, BindMode::InputSet, Some(" ")),
            Err(PersistError::BuildError(_))
        ));
        assert!(stmt.bind_cmp(None, None, None, "=", None).is_err());
        assert_eq!(stmt.build_errors(), 2);

        let err = stmt.prepare().unwrap_err();
        assert!(matches!(err, PersistError::BuildError(ref m) if m.contains("2 build error")));
        assert!(!stmt.is_prepared());
    }

    #[test]
    fn test_prepare_rejects_empty_and_double_prepare() {
        let (conn, _) = connected();
        let mut stmt = Statement::new(&conn);
        assert!(matches!(stmt.prepare(), Err(PersistError::BuildError(_))));

        let def = table();
        let row = Row::new(&def);
        let mut stmt = Statement::new(&conn);
        stmt.build("select ");
        stmt.bind(row.value("id"), BindMode::Output, None).unwrap();
        stmt.build(" from events");
        stmt.prepare().unwrap();
        assert!(matches!(stmt.prepare(), Err(PersistError::StateError(_))));
    }

    #[test]
    fn test_prepare_checks_placeholder_count() {
        let def = table();
        let row = Row::new(&def);
        let (conn, _) = connected();

        let mut stmt = Statement::new(&conn);
        stmt.build("select id from events where id = ? and genre = ?");
        stmt.bind(row.value("id"), BindMode::Input, None).unwrap();
        let err = stmt.prepare().unwrap_err();
        assert!(matches!(err, PersistError::BuildError(ref m) if m.contains("2 placeholders")));
    }

    #[test]
    fn test_execute_fetch_and_statistics() {
        let def = table();
        let row = Row::new(&def);
        let (conn, _) = connected();
        for (id, title) in [(1, "a"), (2, "b"), (3, "c")] {
            conn.query(
                "setup",
                &format!("insert into events set id = {id}, event_title = '{title}', genre = 'news'"),
            )
            .unwrap();
        }

        let mut stmt = Statement::new(&conn);
        stmt.build("select ");
        stmt.bind(row.value("title"), BindMode::Output, None).unwrap();
        stmt.build(" from events where ");
        stmt.bind_cmp(None, row.value("id"), None, ">", None).unwrap();
        stmt.prepare().unwrap();

        row.set("id", 1).unwrap();
        stmt.execute(false).unwrap();
        assert_eq!(stmt.affected(), 2);
        assert_eq!(row.get("title").unwrap().as_str(), Some("b"));
        assert_eq!(stmt.result_count(), 1);
        assert!(stmt.fetch().unwrap());
        assert_eq!(row.get("title").unwrap().as_str(), Some("c"));
        assert!(!stmt.fetch().unwrap());

        row.set("id", 3).unwrap();
        assert!(!stmt.find().unwrap());

        let stats = stmt.take_statistics();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.text, stmt.text());
        assert_eq!(stmt.statistics().calls, 0);
        assert_eq!(conn.statistics().len(), 1);
    }

    #[test]
    fn test_suppressed_result_leaves_outputs_untouched() {
        let def = table();
        let row = Row::new(&def);
        let (conn, _) = connected();
        conn.query("setup", "insert into events set id = 7, event_title = 'x'").unwrap();

        let mut stmt = Statement::new(&conn);
        stmt.build("select ");
        stmt.bind(row.value("title"), BindMode::Output, None).unwrap();
        stmt.build(" from events where ");
        stmt.bind(row.value("id"), BindMode::InputSet, None).unwrap();
        stmt.prepare().unwrap();

        row.set("id", 7).unwrap();
        stmt.execute(true).unwrap();
        assert_eq!(stmt.affected(), 1);
        assert!(row.get("title").unwrap().is_null());
    }

    #[test]
    fn test_execute_requires_prepare() {
        let (conn, _) = connected();
        let mut stmt = Statement::with_text(&conn, "delete from events");
        assert!(matches!(stmt.execute(false), Err(PersistError::StateError(_))));
    }

    #[test]
    fn test_reconnect_makes_statement_stale() {
        let def = table();
        let row = Row::new(&def);
        let (conn, _) = connected();

        let mut stmt = Statement::new(&conn);
        stmt.build("delete from events where ");
        stmt.bind(row.value("id"), BindMode::InputSet, None).unwrap();
        stmt.prepare().unwrap();

        conn.reconnect().unwrap();
        assert!(stmt.is_stale());
        assert!(matches!(stmt.execute(false), Err(PersistError::StaleStatement(_))));

        stmt.reprepare().unwrap();
        assert!(!stmt.is_stale());
        row.set("id", 1).unwrap();
        stmt.execute(false).unwrap();
        assert_eq!(stmt.affected(), 0);
    }

    #[test]
    fn test_clear_releases_everything() {
        let def = table();
        let row = Row::new(&def);
        let (conn, _) = connected();

        let mut stmt = Statement::new(&conn);
        stmt.build("delete from events where ");
        stmt.bind(row.value("id"), BindMode::InputSet, None).unwrap();
        stmt.prepare().unwrap();
        stmt.clear();

        assert!(!stmt.is_prepared());
        assert_eq!(stmt.text(), "");
        assert_eq!(stmt.input_count(), 0);
    }
}
