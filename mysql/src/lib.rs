//! Typed MySQL persistence for dictionary-described tables.
//!
//! This crate binds the value containers of [`rowbind_core`] to prepared
//! statements and keeps the live schema in line with the dictionary.
//!
//! # Architecture
//!
//! - **`connection`**, [`Connection`]: client, sticky connection-lost flag,
//!   reconnect generation and statement statistics
//! - **`statement`**, [`Statement`]: SQL text builder, bindings and the
//!   prepare/execute/fetch lifecycle
//! - **`table`**, [`Table`]: standing select/insert/update statements and
//!   [`Table::store`]
//! - **`sync`**, [`SchemaSync`]: inspects a table and emits the DDL that
//!   brings it in line with its descriptor
//! - **`classify`**: maps client error codes to [`ErrorClass`]
//! - **`wire`**: field format to wire type dispatch, value encoding
//! - **`client`**: the [`DbClient`] seam, implemented by [`MysqlClient`]
//!   for a server and by [`MemoryClient`] in process
//!
//! # Quick start
//!
//! ```no_run
//! use rowbind_dict::{ConnectionConfig, Dictionary};
//! use rowbind_mysql::{Connection, MysqlClient, Table};
//!
//! let dictionary = Dictionary::from_file("epg.yaml").unwrap();
//! let config = ConnectionConfig::load("db.yaml").unwrap();
//! let conn = Connection::new(config, MysqlClient::new().unwrap());
//!
//! let mut events = Table::from_dictionary(&conn, &dictionary, "events").unwrap();
//! let report = events.open(true).unwrap();
//! for sql in report.sql() {
//!     println!("{sql}");
//! }
//!
//! events.set_value("eventid", 4711u64).unwrap();
//! events.set_value("title", "Tagesschau").unwrap();
//! events.store().unwrap();
//! ```
//!
//! # Connection loss
//!
//! Every client error passes through [`Connection::report`]. Codes that mean
//! the server is gone raise [`Connection::is_dropped`], which stays set until
//! [`Connection::reconnect`]. Statements prepared before a reconnect report
//! [`PersistError::StaleStatement`] until prepared again.

mod backend;
pub mod classify;
mod client;
mod connection;
mod error;
mod memory;
mod statement;
mod sync;
mod table;
mod wire;

pub use backend::MysqlClient;
pub use classify::{ErrorClass, classify};
pub use client::{ClientError, DbClient, Execution, PreparedInfo, QueryResult, StatementHandle, WireValue};
pub use connection::Connection;
pub use error::{PersistError, Result};
pub use memory::{ExecutionCounts, MemoryClient};
pub use statement::{BindMode, Statement, StatementStatistics};
pub use sync::{
    DdlStatement, LiveColumn, LiveIndexColumn, LiveSchema, SchemaChange, SchemaSync, SyncReport, add_column_sql,
    create_index_sql, create_table_sql, modify_column_sql, plan,
};
pub use table::{StoreOutcome, Table};
pub use wire::{WireBind, WireKind, decode, encode, wire_bind};
