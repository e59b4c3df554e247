//! Dictionary type definitions for table, field and index metadata.
//!
//! A dictionary describes every persisted table as an ordered list of
//! [`FieldDescriptor`]s plus optional [`IndexDescriptor`]s. Field order is a
//! contract: it is the column order of generated DDL and the positional order
//! of output bindings, so tables keep their fields in a `Vec`, never in a map.
//!
//! The types are designed for serialization with [`serde`] so a dictionary can
//! be written by hand in JSON or YAML.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field that is stamped with the current time on every insert and update.
pub const UPDATE_STAMP_FIELD: &str = "updsp";

/// Field that is stamped with the current time on insert only.
pub const INSERT_STAMP_FIELD: &str = "inssp";

/// Prefix prepended to declared index names when they are created.
pub const INDEX_NAME_PREFIX: &str = "idx";

/// Semantic format of a field.
///
/// This is the field's domain type, independent of how it travels over the
/// wire. The set is closed: every consumer matches it exhaustively.
///
/// # Examples
///
/// ```
/// use rowbind_core::FieldFormat;
///
/// let format: FieldFormat = "ubigint".parse().unwrap();
/// assert_eq!(format, FieldFormat::UBigInt);
/// assert!(format.is_unsigned());
///
/// assert!("varchar2".parse::<FieldFormat>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldFormat {
    /// Short text, stored as `varchar(size)`.
    Ascii,
    /// Text, stored as `text`.
    Text,
    /// Huge text, stored as `mediumtext`.
    MText,
    /// Binary large object, stored as `mediumblob`.
    MLob,
    /// Signed 32-bit integer.
    Int,
    /// Unsigned 32-bit integer.
    UInt,
    /// Signed 64-bit integer.
    BigInt,
    /// Unsigned 64-bit integer.
    UBigInt,
    /// Floating point, `size` encodes precision and scale as `PS` digits.
    Float,
    /// Date and time with second resolution.
    DateTime,
}

/// A format name that is not part of [`FieldFormat`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown field format: {0}")]
pub struct ParseFormatError(pub String);

impl FieldFormat {
    /// All formats in declaration order.
    pub const ALL: [FieldFormat; 10] = [
        FieldFormat::Ascii,
        FieldFormat::Text,
        FieldFormat::MText,
        FieldFormat::MLob,
        FieldFormat::Int,
        FieldFormat::UInt,
        FieldFormat::BigInt,
        FieldFormat::UBigInt,
        FieldFormat::Float,
        FieldFormat::DateTime,
    ];

    /// Dictionary name of the format.
    pub fn name(self) -> &'static str {
        match self {
            FieldFormat::Ascii => "ascii",
            FieldFormat::Text => "text",
            FieldFormat::MText => "mtext",
            FieldFormat::MLob => "mlob",
            FieldFormat::Int => "int",
            FieldFormat::UInt => "uint",
            FieldFormat::BigInt => "bigint",
            FieldFormat::UBigInt => "ubigint",
            FieldFormat::Float => "float",
            FieldFormat::DateTime => "datetime",
        }
    }

    /// Returns `true` for the character formats.
    pub fn is_text(self) -> bool {
        matches!(self, FieldFormat::Ascii | FieldFormat::Text | FieldFormat::MText)
    }

    /// Returns `true` for the binary format.
    pub fn is_blob(self) -> bool {
        self == FieldFormat::MLob
    }

    /// Returns `true` for the 32 and 64-bit integer formats.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            FieldFormat::Int | FieldFormat::UInt | FieldFormat::BigInt | FieldFormat::UBigInt
        )
    }

    /// Returns `true` for the unsigned integer formats.
    pub fn is_unsigned(self) -> bool {
        matches!(self, FieldFormat::UInt | FieldFormat::UBigInt)
    }
}

impl fmt::Display for FieldFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldFormat::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseFormatError(s.to_string()))
    }
}

/// Role flags of a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldRoles {
    /// Part of the primary key.
    pub primary_key: bool,
    /// Value assigned by the engine on insert.
    pub autoincrement: bool,
    /// Column defaults to `'0'`.
    pub default_zero: bool,
    /// Computed or meta field, never projected by a full select.
    pub meta: bool,
}

/// Definition of a single field (column).
///
/// # Examples
///
/// ```
/// use rowbind_core::{FieldDescriptor, FieldFormat};
///
/// let id = FieldDescriptor::new("id", FieldFormat::UInt, 10)
///     .primary_key()
///     .autoincrement();
/// assert_eq!(id.column_type(), "int(10) unsigned");
///
/// let title = FieldDescriptor::new("title", FieldFormat::Ascii, 200)
///     .with_db_name("event_title")
///     .with_description("Title of the event");
/// assert_eq!(title.column_name(), "event_title");
/// assert_eq!(title.column_type(), "varchar(200)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Logical name used by application code.
    pub name: String,
    /// Storage (column) name, defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
    /// Semantic format.
    pub format: FieldFormat,
    /// Size in bytes (text) or display width (numbers).
    #[serde(default)]
    pub size: u32,
    /// Role flags.
    #[serde(default)]
    pub roles: FieldRoles,
    /// Column comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip)]
    index: usize,
}

impl FieldDescriptor {
    /// Creates a plain data field.
    pub fn new(name: impl Into<String>, format: FieldFormat, size: u32) -> Self {
        Self {
            name: name.into(),
            db_name: None,
            format,
            size,
            roles: FieldRoles::default(),
            description: None,
            index: 0,
        }
    }

    /// Marks the field as part of the primary key.
    pub fn primary_key(mut self) -> Self {
        self.roles.primary_key = true;
        self
    }

    /// Marks the field as engine-assigned on insert.
    pub fn autoincrement(mut self) -> Self {
        self.roles.autoincrement = true;
        self
    }

    /// Gives the column a `default '0'` clause.
    pub fn default_zero(mut self) -> Self {
        self.roles.default_zero = true;
        self
    }

    /// Marks the field as computed/meta.
    pub fn meta(mut self) -> Self {
        self.roles.meta = true;
        self
    }

    /// Sets the storage name.
    pub fn with_db_name(mut self, db_name: impl Into<String>) -> Self {
        self.db_name = Some(db_name.into());
        self
    }

    /// Sets the column comment.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Storage name of the column.
    pub fn column_name(&self) -> &str {
        self.db_name.as_deref().unwrap_or(&self.name)
    }

    /// Ordinal position within the owning table.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Column comment, empty when none is declared.
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    /// Column comment with single quotes doubled for use inside `'...'`.
    pub fn db_description(&self) -> String {
        self.description().replace('\'', "''")
    }

    /// Returns `true` if the field is part of the primary key.
    pub fn is_primary_key(&self) -> bool {
        self.roles.primary_key
    }

    /// Returns `true` if the engine assigns the value on insert.
    pub fn is_autoincrement(&self) -> bool {
        self.roles.autoincrement
    }

    /// Returns `true` for computed/meta fields.
    pub fn is_meta(&self) -> bool {
        self.roles.meta
    }

    /// Column type as reported by `information_schema.columns.column_type`.
    pub fn column_type(&self) -> String {
        let width = |base: &str| {
            if self.size > 0 {
                format!("{base}({})", self.size)
            } else {
                base.to_string()
            }
        };

        match self.format {
            FieldFormat::Ascii => format!("varchar({})", self.size),
            FieldFormat::Text => "text".to_string(),
            FieldFormat::MText => "mediumtext".to_string(),
            FieldFormat::MLob => "mediumblob".to_string(),
            FieldFormat::Int => width("int"),
            FieldFormat::UInt => format!("{} unsigned", width("int")),
            FieldFormat::BigInt => width("bigint"),
            FieldFormat::UBigInt => format!("{} unsigned", width("bigint")),
            FieldFormat::Float => {
                if self.size > 0 {
                    format!("float({},{})", self.size / 10, self.size % 10)
                } else {
                    "float".to_string()
                }
            }
            FieldFormat::DateTime => "datetime".to_string(),
        }
    }
}

/// Secondary index over an ordered list of fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Declared name, created as `idx<name>`.
    pub name: String,
    /// Field names in key order.
    pub fields: Vec<String>,
}

impl IndexDescriptor {
    /// Creates an index over the named fields.
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Name of the index as created in the database.
    pub fn db_name(&self) -> String {
        format!("{INDEX_NAME_PREFIX}{}", self.name)
    }
}

/// Definition of a table: ordered fields plus indices.
///
/// Field indices are assigned from the insertion order and kept consistent
/// by every constructor, including deserialization.
///
/// # Examples
///
/// ```
/// use rowbind_core::{FieldDescriptor, FieldFormat, IndexDescriptor, TableDescriptor};
///
/// let table = TableDescriptor::new("events")
///     .with_field(FieldDescriptor::new("id", FieldFormat::UInt, 0).primary_key())
///     .with_field(FieldDescriptor::new("title", FieldFormat::Ascii, 100))
///     .with_index(IndexDescriptor::new("title", ["title"]));
///
/// assert_eq!(table.field("title").unwrap().index(), 1);
/// assert_eq!(table.primary_keys().count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawTable")]
pub struct TableDescriptor {
    /// Table name.
    pub name: String,
    fields: Vec<FieldDescriptor>,
    /// Declared secondary indices.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indices: Vec<IndexDescriptor>,
}

#[derive(Deserialize)]
struct RawTable {
    name: String,
    fields: Vec<FieldDescriptor>,
    #[serde(default)]
    indices: Vec<IndexDescriptor>,
}

impl From<RawTable> for TableDescriptor {
    fn from(raw: RawTable) -> Self {
        let mut table = TableDescriptor::new(raw.name);
        for field in raw.fields {
            table.push_field(field);
        }
        table.indices = raw.indices;
        table
    }
}

impl TableDescriptor {
    /// Creates a table without fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Appends a field, assigning its ordinal index.
    pub fn push_field(&mut self, mut field: FieldDescriptor) {
        field.index = self.fields.len();
        self.fields.push(field);
    }

    /// Builder variant of [`push_field`](Self::push_field).
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.push_field(field);
        self
    }

    /// Appends an index declaration.
    pub fn with_index(mut self, index: IndexDescriptor) -> Self {
        self.indices.push(index);
        self
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Number of fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Field at the given ordinal position.
    pub fn field_at(&self, index: usize) -> Option<&FieldDescriptor> {
        self.fields.get(index)
    }

    /// Looks up a field by logical name (case-insensitive).
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
    }

    /// Looks up a field by column name (case-insensitive).
    pub fn field_by_column(&self, column: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|field| field.column_name().eq_ignore_ascii_case(column))
    }

    /// Primary-key fields in declaration order.
    pub fn primary_keys(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|field| field.is_primary_key())
    }

    /// Resolves the fields of an index in key order, skipping unknown names.
    pub fn index_fields<'t>(&'t self, index: &'t IndexDescriptor) -> Vec<&'t FieldDescriptor> {
        index
            .fields
            .iter()
            .filter_map(|name| self.field(name))
            .collect()
    }
}
