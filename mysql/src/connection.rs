//! Connection state shared by statements and tables.
//!
//! A [`Connection`] owns the client, the configuration it was created with
//! and the bookkeeping the persistence layer needs: the sticky
//! connection-dropped flag, the reconnect generation, the attach count of
//! tables using it and a registry of statement statistics.
//!
//! The type uses interior mutability and is deliberately `!Sync`: statements
//! and tables borrow it immutably and must be dropped before it.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use rowbind_dict::ConnectionConfig;
use tracing::{debug, error, info, warn};

use crate::classify::{ErrorClass, classify};
use crate::client::{ClientError, DbClient, QueryResult};
use crate::error::{PersistError, Result};
use crate::statement::StatementStatistics;

/// A database connection plus the state derived from its errors.
///
/// # Examples
///
/// ```
/// use rowbind_dict::ConnectionConfig;
/// use rowbind_mysql::{Connection, MemoryClient};
///
/// let conn = Connection::new(ConnectionConfig::new("epg"), MemoryClient::new());
/// conn.connect().unwrap();
/// assert!(conn.is_connected());
/// assert!(!conn.is_dropped());
/// ```
pub struct Connection {
    config: ConnectionConfig,
    client: RefCell<Box<dyn DbClient>>,
    dropped: Cell<bool>,
    lost_count: Cell<u32>,
    generation: Cell<u64>,
    attach_count: Cell<usize>,
    statements: RefCell<Vec<Weak<RefCell<StatementStatistics>>>>,
}

impl Connection {
    /// Creates an unconnected connection over `client`.
    pub fn new(config: ConnectionConfig, client: impl DbClient + 'static) -> Self {
        Self {
            config,
            client: RefCell::new(Box::new(client)),
            dropped: Cell::new(false),
            lost_count: Cell::new(0),
            generation: Cell::new(0),
            attach_count: Cell::new(0),
            statements: RefCell::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Opens the connection unless it is already open.
    ///
    /// # Errors
    ///
    /// Returns the classified client error if the server cannot be reached.
    pub fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let result = self.client.borrow_mut().connect(&self.config);
        result.map_err(|err| self.report("connect", None, err))?;
        info!(address = %self.config.address(), database = %self.config.database, "connected");
        Ok(())
    }

    /// Closes the connection. Prepared statements become unusable.
    pub fn close(&self) {
        if self.is_connected() {
            self.client.borrow_mut().close();
            debug!(address = %self.config.address(), "connection closed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.borrow().is_connected()
    }

    /// Re-establishes the connection after a loss.
    ///
    /// Clears the dropped flag and starts a new generation: every statement
    /// prepared before this call reports itself stale until re-prepared.
    ///
    /// # Errors
    ///
    /// Returns the classified client error if connecting fails.
    pub fn reconnect(&self) -> Result<()> {
        self.client.borrow_mut().close();
        self.dropped.set(false);
        self.generation.set(self.generation.get() + 1);
        self.connect()?;
        warn!(generation = self.generation.get(), "reconnected, prepared statements must be prepared again");
        Ok(())
    }

    /// Sticky flag raised by a connection-lost error, cleared by [`reconnect`](Self::reconnect).
    pub fn is_dropped(&self) -> bool {
        self.dropped.get()
    }

    /// Number of connection losses observed since creation.
    pub fn lost_count(&self) -> u32 {
        self.lost_count.get()
    }

    /// Reconnect generation, incremented by every [`reconnect`](Self::reconnect).
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Registers a user of the connection, connecting on first use.
    ///
    /// # Errors
    ///
    /// Returns the classified client error if connecting fails.
    pub fn attach(&self) -> Result<()> {
        self.connect()?;
        self.attach_count.set(self.attach_count.get() + 1);
        Ok(())
    }

    /// Releases a user of the connection, closing it after the last one.
    pub fn detach(&self) {
        let count = self.attach_count.get().saturating_sub(1);
        self.attach_count.set(count);
        if count == 0 {
            self.close();
        }
    }

    pub fn attach_count(&self) -> usize {
        self.attach_count.get()
    }

    /// Runs a statement through the text protocol.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::NotConnected`] without an open connection, or
    /// the classified client error.
    pub fn query(&self, context: &str, sql: &str) -> Result<QueryResult> {
        if !self.is_connected() {
            return Err(PersistError::NotConnected);
        }
        let result = self.client.borrow_mut().query(sql);
        result.map_err(|err| self.report(context, Some(sql), err))
    }

    /// Names of the tables matching a `LIKE` pattern.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::NotConnected`] without an open connection, or
    /// the classified client error.
    pub fn list_tables(&self, pattern: &str) -> Result<Vec<String>> {
        if !self.is_connected() {
            return Err(PersistError::NotConnected);
        }
        let result = self.client.borrow_mut().list_tables(pattern);
        result.map_err(|err| self.report("list tables", None, err))
    }

    /// Returns `true` if a table of this name exists (case-insensitive).
    ///
    /// # Errors
    ///
    /// Same as [`list_tables`](Self::list_tables).
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self
            .list_tables(name)?
            .iter()
            .any(|table| table.eq_ignore_ascii_case(name)))
    }

    /// Runs `f` with exclusive access to the client.
    pub(crate) fn with_client<R>(&self, f: impl FnOnce(&mut dyn DbClient) -> R) -> R {
        let mut client = self.client.borrow_mut();
        f(client.as_mut())
    }

    /// Logs a client error, updates the connection state and converts it.
    ///
    /// Connection-lost codes raise the sticky dropped flag and produce
    /// [`PersistError::ConnectionLost`]; anything else becomes
    /// [`PersistError::ClientError`].
    pub fn report(&self, context: &str, statement: Option<&str>, err: ClientError) -> PersistError {
        let class = classify(err.code).unwrap_or(ErrorClass::Generic);

        error!(
            context,
            code = err.code,
            statement = statement.unwrap_or(""),
            "SQL error in '{}': {}",
            context,
            err.message
        );

        let statement = statement.map(str::to_string);
        if class.is_connection_lost() {
            self.dropped.set(true);
            self.lost_count.set(self.lost_count.get() + 1);
            error!(
                address = %self.config.address(),
                losses = self.lost_count.get(),
                "fatal, lost connection to database server, aborting pending actions"
            );
            return PersistError::ConnectionLost {
                context: context.to_string(),
                statement,
                source: err,
            };
        }

        if class == ErrorClass::Retryable {
            warn!(code = err.code, "statement aborted by lock conflict, it may be retried");
        }
        PersistError::ClientError {
            context: context.to_string(),
            statement,
            source: err,
        }
    }

    pub(crate) fn register(&self, stats: &Rc<RefCell<StatementStatistics>>) {
        let mut statements = self.statements.borrow_mut();
        statements.retain(|weak| weak.strong_count() > 0);
        statements.push(Rc::downgrade(stats));
    }

    /// Number of live statements created on this connection.
    pub fn statement_count(&self) -> usize {
        self.statements
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Snapshot of the statistics of every live statement.
    pub fn statistics(&self) -> Vec<StatementStatistics> {
        self.statements
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .map(|stats| stats.borrow().clone())
            .collect()
    }

    /// Like [`statistics`](Self::statistics) but starts a new period for
    /// every statement.
    pub fn take_statistics(&self) -> Vec<StatementStatistics> {
        self.statements
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .map(|stats| stats.borrow_mut().take_period())
            .collect()
    }

    /// Logs one line per statement that ran during the current period and
    /// starts a new period.
    pub fn show_statistics(&self) {
        for stats in self.take_statistics() {
            stats.log();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
