//! Database client collaborator interface.
//!
//! [`DbClient`] is the narrow surface the persistence layer needs from a
//! MySQL client: connect, run text queries, prepare and execute statements
//! with positional parameters. Results are returned fully buffered.
//!
//! Two implementations ship with the crate: [`MysqlClient`](crate::MysqlClient)
//! talks to a real server, [`MemoryClient`](crate::MemoryClient) interprets
//! the generated SQL dialect in process.

use chrono::NaiveDateTime;
use rowbind_dict::ConnectionConfig;
use thiserror::Error;

/// Error reported by the client, carrying the engine's numeric error code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (error {code})")]
pub struct ClientError {
    pub code: u32,
    pub message: String,
}

impl ClientError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Opaque handle of a server-side prepared statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementHandle(pub u64);

/// What the client learned while preparing a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreparedInfo {
    pub handle: StatementHandle,
    /// Number of `?` placeholders.
    pub param_count: usize,
    /// Number of projected columns, zero for statements without a result.
    pub column_count: usize,
}

/// A single parameter or result cell as it travels to and from the client.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Bytes(Vec<u8>),
    Int(i64),
    UInt(u64),
    Double(f64),
    DateTime(NaiveDateTime),
}

impl WireValue {
    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }

    /// Text rendering as delivered by the text protocol, `None` for null.
    pub fn to_text(&self) -> Option<String> {
        match self {
            WireValue::Null => None,
            WireValue::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            WireValue::Int(v) => Some(v.to_string()),
            WireValue::UInt(v) => Some(v.to_string()),
            WireValue::Double(v) => Some(v.to_string()),
            WireValue::DateTime(v) => Some(v.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }
}

/// Outcome of executing a prepared statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Execution {
    /// Every result row, already transferred from the server.
    pub rows: Vec<Vec<WireValue>>,
    /// Rows changed (or matched) by a data-modifying statement.
    pub affected_rows: u64,
    /// Key generated by an auto-increment insert.
    pub last_insert_id: Option<u64>,
}

/// Outcome of a text query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub affected_rows: u64,
}

impl QueryResult {
    /// Position of a column by name (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }
}

/// Minimal blocking MySQL client surface.
pub trait DbClient {
    /// Opens the connection described by `config`.
    fn connect(&mut self, config: &ConnectionConfig) -> Result<(), ClientError>;

    /// Closes the connection; prepared handles become invalid.
    fn close(&mut self);

    fn is_connected(&self) -> bool;

    /// Runs a statement through the text protocol.
    fn query(&mut self, sql: &str) -> Result<QueryResult, ClientError>;

    /// Prepares a statement with `?` placeholders.
    fn prepare(&mut self, sql: &str) -> Result<PreparedInfo, ClientError>;

    /// Executes a prepared statement with positional parameters.
    fn execute(&mut self, handle: StatementHandle, params: &[WireValue]) -> Result<Execution, ClientError>;

    /// Releases a prepared statement. Unknown handles are ignored.
    fn close_statement(&mut self, handle: StatementHandle);

    /// Names of the tables matching a `LIKE` pattern.
    fn list_tables(&mut self, pattern: &str) -> Result<Vec<String>, ClientError>;
}
