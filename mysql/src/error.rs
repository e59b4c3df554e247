//! Error types for statement, table and schema operations.
//!
//! Provides a unified error type covering statement building, client
//! failures (already classified), row cardinality, lifecycle misuse and
//! value conversion.

use rowbind_core::ValueError;
use thiserror::Error;

use crate::client::ClientError;

/// Errors that can occur while talking to the database.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The statement text or bindings are unusable.
    #[error("build error: {0}")]
    BuildError(String),

    /// The client rejected a call with a non-fatal error.
    #[error("SQL error in '{context}': {source}")]
    ClientError {
        context: String,
        statement: Option<String>,
        #[source]
        source: ClientError,
    },

    /// The client reported that the connection to the server is gone.
    #[error("lost connection in '{context}': {source}")]
    ConnectionLost {
        context: String,
        statement: Option<String>,
        #[source]
        source: ClientError,
    },

    /// A write affected a row count other than exactly one.
    #[error("{operation} on '{table}' affected {affected} rows, expected exactly one")]
    CardinalityError {
        operation: &'static str,
        table: String,
        affected: u64,
    },

    /// An operation was called in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    StateError(String),

    /// The statement was prepared on a connection generation that no longer
    /// exists.
    #[error("statement prepared before reconnect, prepare it again: {0}")]
    StaleStatement(String),

    /// No open connection to the server.
    #[error("not connected to the database server")]
    NotConnected,

    /// The dictionary has no table of this name.
    #[error("table '{0}' missing in dictionary")]
    TableNotFound(String),

    /// A value could not be stored in its container.
    #[error("value error: {0}")]
    ValueError(#[from] ValueError),

    /// Runtime or file I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PersistError {
    /// The underlying client error, if this error came from the client.
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            PersistError::ClientError { source, .. } | PersistError::ConnectionLost { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Returns `true` if the error means the connection is unusable.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, PersistError::ConnectionLost { .. } | PersistError::NotConnected)
    }
}

/// Convenience alias for results with [`PersistError`].
pub type Result<T> = std::result::Result<T, PersistError>;
