//! Dictionary validation.
//!
//! Catches structural problems in table definitions (duplicate columns,
//! indices over unknown fields, autoincrement on non-integer fields, tables
//! without a primary key) before they turn into failed DDL or unpreparable
//! statements.
//!
//! # Examples
//!
//! ```
//! use rowbind_core::*;
//!
//! let table = TableDescriptor::new("events")
//!     .with_field(FieldDescriptor::new("id", FieldFormat::UInt, 0).primary_key());
//! assert!(validate_table(&table).is_empty());
//!
//! // Index over a field that does not exist
//! let bad = table.clone().with_index(IndexDescriptor::new("x", ["missing"]));
//! assert!(!validate_table(&bad).is_empty());
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::types::{FieldFormat, TableDescriptor};

/// Dictionary validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Table name is empty or whitespace-only.
    #[error("table name cannot be empty")]
    EmptyTableName,
    /// Two tables share a name.
    #[error("duplicate table: {0}")]
    DuplicateTable(String),
    /// A table declares no fields.
    #[error("table '{0}' has no fields")]
    NoFields(String),
    /// A table declares no primary-key field.
    #[error("table '{0}' has no primary key")]
    NoPrimaryKey(String),
    /// A field name is empty.
    #[error("table '{0}' has a field without a name")]
    EmptyFieldName(String),
    /// Two fields map to the same column.
    #[error("duplicate column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },
    /// A varchar field has no size.
    #[error("field '{table}.{field}' of format ascii needs a size")]
    MissingSize { table: String, field: String },
    /// Autoincrement declared on a non-integer field.
    #[error("field '{table}.{field}' is autoincrement but has format {format}")]
    AutoincrementNotInteger {
        table: String,
        field: String,
        format: FieldFormat,
    },
    /// An index declares no fields.
    #[error("index '{index}' of table '{table}' has no fields")]
    EmptyIndex { table: String, index: String },
    /// An index names a field the table does not have.
    #[error("index '{index}' of table '{table}' references unknown field '{field}'")]
    UnknownIndexField {
        table: String,
        index: String,
        field: String,
    },
}

/// Validates a set of tables, including cross-table name uniqueness.
pub fn validate_tables<'t>(tables: impl IntoIterator<Item = &'t TableDescriptor>) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for table in tables {
        if !seen.insert(table.name.to_ascii_lowercase()) {
            errors.push(ValidationError::DuplicateTable(table.name.clone()));
        }
        errors.extend(validate_table(table));
    }

    errors
}

/// Validates a single table definition.
///
/// Returns every problem found; an empty vector means the table is usable.
pub fn validate_table(table: &TableDescriptor) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if table.name.trim().is_empty() {
        errors.push(ValidationError::EmptyTableName);
        return errors;
    }

    if table.field_count() == 0 {
        errors.push(ValidationError::NoFields(table.name.clone()));
        return errors;
    }

    if table.primary_keys().next().is_none() {
        errors.push(ValidationError::NoPrimaryKey(table.name.clone()));
    }

    let mut columns: HashSet<String> = HashSet::new();
    for field in table.fields() {
        if field.name.trim().is_empty() {
            errors.push(ValidationError::EmptyFieldName(table.name.clone()));
            continue;
        }
        if !columns.insert(field.column_name().to_ascii_lowercase()) {
            errors.push(ValidationError::DuplicateColumn {
                table: table.name.clone(),
                column: field.column_name().to_string(),
            });
        }
        if field.format == FieldFormat::Ascii && field.size == 0 {
            errors.push(ValidationError::MissingSize {
                table: table.name.clone(),
                field: field.name.clone(),
            });
        }
        if field.is_autoincrement() && !field.format.is_integer() {
            errors.push(ValidationError::AutoincrementNotInteger {
                table: table.name.clone(),
                field: field.name.clone(),
                format: field.format,
            });
        }
    }

    for index in &table.indices {
        if index.fields.is_empty() {
            errors.push(ValidationError::EmptyIndex {
                table: table.name.clone(),
                index: index.name.clone(),
            });
        }
        for name in &index.fields {
            if table.field(name).is_none() {
                errors.push(ValidationError::UnknownIndexField {
                    table: table.name.clone(),
                    index: index.name.clone(),
                    field: name.clone(),
                });
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldDescriptor, IndexDescriptor};

    fn events() -> TableDescriptor {
        TableDescriptor::new("events")
            .with_field(FieldDescriptor::new("id", FieldFormat::UInt, 0).primary_key().autoincrement())
            .with_field(FieldDescriptor::new("title", FieldFormat::Ascii, 100))
    }

    #[test]
    fn test_valid_table() {
        assert!(validate_table(&events()).is_empty());
    }

    #[test]
    fn test_empty_table_name() {
        let table = TableDescriptor::new("  ");
        assert_eq!(validate_table(&table), vec![ValidationError::EmptyTableName]);
    }

    #[test]
    fn test_no_primary_key() {
        let table = TableDescriptor::new("t").with_field(FieldDescriptor::new("a", FieldFormat::Int, 0));
        assert_eq!(validate_table(&table), vec![ValidationError::NoPrimaryKey("t".into())]);
    }

    #[test]
    fn test_duplicate_column_via_db_name() {
        let table = events().with_field(FieldDescriptor::new("caption", FieldFormat::Text, 0).with_db_name("TITLE"));
        let errors = validate_table(&table);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::DuplicateColumn { .. })));
    }

    #[test]
    fn test_ascii_without_size() {
        let table = events().with_field(FieldDescriptor::new("code", FieldFormat::Ascii, 0));
        let errors = validate_table(&table);
        assert_eq!(
            errors,
            vec![ValidationError::MissingSize {
                table: "events".into(),
                field: "code".into()
            }]
        );
    }

    #[test]
    fn test_autoincrement_on_text() {
        let table = events().with_field(FieldDescriptor::new("tag", FieldFormat::Text, 0).autoincrement());
        let errors = validate_table(&table);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::AutoincrementNotInteger { .. })));
    }

    #[test]
    fn test_index_problems() {
        let table = events()
            .with_index(IndexDescriptor::new("empty", Vec::<String>::new()))
            .with_index(IndexDescriptor::new("bad", ["title", "nope"]));
        let errors = validate_table(&table);
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ValidationError::EmptyIndex { .. }));
        assert!(matches!(errors[1], ValidationError::UnknownIndexField { ref field, .. } if field == "nope"));
    }

    #[test]
    fn test_duplicate_tables() {
        let tables = [events(), events()];
        let errors = validate_tables(&tables);
        assert_eq!(errors, vec![ValidationError::DuplicateTable("events".into())]);
    }
}
