//! Core dictionary types and value containers for typed table rows.
//!
//! This crate defines the metadata and in-memory values the persistence layer
//! works with:
//!
//! - [`TableDescriptor`]: a table as an ordered list of fields plus indices.
//! - [`FieldDescriptor`]: a column with its [`FieldFormat`], size and
//!   [`FieldRoles`] (primary key, autoincrement, default zero, meta).
//! - [`IndexDescriptor`]: a secondary index over an ordered field list.
//! - [`ValueContainer`]: the current value and null flag of one field.
//! - [`Row`]: one container per field of a table, in declaration order.
//!
//! Validation ([`validate_table`], [`validate_tables`]) catches dictionary
//! errors such as duplicate columns or indices over unknown fields.
//!
//! # Example
//!
//! ```
//! use rowbind_core::*;
//!
//! let table = TableDescriptor::new("recordings")
//!     .with_field(FieldDescriptor::new("id", FieldFormat::UInt, 10).primary_key().autoincrement())
//!     .with_field(FieldDescriptor::new("title", FieldFormat::Ascii, 200))
//!     .with_field(FieldDescriptor::new("updsp", FieldFormat::DateTime, 0))
//!     .with_index(IndexDescriptor::new("title", ["title"]));
//! assert!(validate_table(&table).is_empty());
//!
//! let row = Row::new(&table);
//! row.set("title", "Evening news").unwrap();
//! assert_eq!(row.get("title").unwrap().as_str(), Some("Evening news"));
//! ```

mod types;
mod validate;
mod value;

pub use types::*;
pub use validate::{ValidationError, validate_table, validate_tables};
pub use value::{Row, SharedValue, Value, ValueContainer, ValueError};
