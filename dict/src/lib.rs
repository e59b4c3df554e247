//! Dictionary loading and connection configuration.
//!
//! This crate loads the table dictionary an application persists and the
//! settings used to reach the database server:
//!
//! - [`Dictionary`]: ordered table definitions loaded from JSON or YAML,
//!   with a [`DictionaryBuilder`] for fallback chains.
//! - [`ConnectionConfig`]: host, port, credentials and encoding, loaded from
//!   YAML and passed explicitly to a connection.
//!
//! # Quick start
//!
//! ```no_run
//! use rowbind_dict::{ConnectionConfig, Dictionary};
//!
//! let dict = Dictionary::from_file("dictionary.yml").unwrap().validated().unwrap();
//! let config = ConnectionConfig::load("connection.yml").unwrap();
//!
//! for name in dict.table_names() {
//!     println!("{name} on {}", config.address());
//! }
//! ```

mod config;
mod dictionary;
mod error;

pub use config::{ConnectionConfig, DEFAULT_PORT};
pub use dictionary::{Dictionary, DictionaryBuilder, DictionarySource};
pub use error::{DictionaryError, Result};
