//! Typed value containers and rows.
//!
//! A [`ValueContainer`] holds the current value of one field plus its null
//! flag, and keeps a reference to the [`FieldDescriptor`] it belongs to. A
//! [`Row`] owns one container per field of a table, in declaration order.
//!
//! Containers are shared as [`SharedValue`] (`Rc<RefCell<_>>`) so prepared
//! statements can hold weak references to exactly the storage they read
//! parameters from and write results into.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::types::{FieldDescriptor, FieldFormat, TableDescriptor};

/// A container shared between its row and the statements bound to it.
pub type SharedValue<'a> = Rc<RefCell<ValueContainer<'a>>>;

/// Errors raised when storing values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// The value kind cannot be stored in the field's format.
    #[error("cannot store {value} value in field '{field}' of format {format}")]
    FormatMismatch {
        field: String,
        format: FieldFormat,
        value: &'static str,
    },
    /// A numeric value does not fit the field's format.
    #[error("value {value} out of range for field '{field}' of format {format}")]
    OutOfRange {
        field: String,
        format: FieldFormat,
        value: String,
    },
    /// No field with this name exists in the row.
    #[error("unknown field: {0}")]
    UnknownField(String),
}

/// A value of one of the supported semantic formats.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Blob(Vec<u8>),
    Int(i32),
    UInt(u32),
    BigInt(i64),
    UBigInt(u64),
    Float(f64),
    DateTime(NaiveDateTime),
}

impl Value {
    /// Zero value of the variant matching `format`.
    pub fn default_for(format: FieldFormat) -> Self {
        match format {
            FieldFormat::Ascii | FieldFormat::Text | FieldFormat::MText => {
                Value::Text(String::new())
            }
            FieldFormat::MLob => Value::Blob(Vec::new()),
            FieldFormat::Int => Value::Int(0),
            FieldFormat::UInt => Value::UInt(0),
            FieldFormat::BigInt => Value::BigInt(0),
            FieldFormat::UBigInt => Value::UBigInt(0),
            FieldFormat::Float => Value::Float(0.0),
            FieldFormat::DateTime => Value::DateTime(NaiveDateTime::default()),
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::BigInt(_) => "bigint",
            Value::UBigInt(_) => "ubigint",
            Value::Float(_) => "float",
            Value::DateTime(_) => "datetime",
        }
    }

    fn integer(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(i128::from(*v)),
            Value::UInt(v) => Some(i128::from(*v)),
            Value::BigInt(v) => Some(i128::from(*v)),
            Value::UBigInt(v) => Some(i128::from(*v)),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UBigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

/// Current value of one field, plus its null flag.
///
/// # Examples
///
/// ```
/// use rowbind_core::{FieldDescriptor, FieldFormat, ValueContainer};
///
/// let field = FieldDescriptor::new("count", FieldFormat::UInt, 10);
/// let mut value = ValueContainer::new(&field);
/// assert!(value.is_null());
///
/// value.set(42i64).unwrap();
/// assert_eq!(value.as_i64(), Some(42));
///
/// // negative values do not fit an unsigned field
/// assert!(value.set(-1).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ValueContainer<'a> {
    field: &'a FieldDescriptor,
    value: Value,
    null: bool,
}

impl<'a> ValueContainer<'a> {
    /// Creates a null container for `field`.
    pub fn new(field: &'a FieldDescriptor) -> Self {
        Self {
            field,
            value: Value::default_for(field.format),
            null: true,
        }
    }

    /// The field this container belongs to.
    pub fn field(&self) -> &'a FieldDescriptor {
        self.field
    }

    /// Storage name of the column.
    pub fn column_name(&self) -> &'a str {
        self.field.column_name()
    }

    pub fn is_null(&self) -> bool {
        self.null
    }

    /// Current value, `None` when null.
    pub fn get(&self) -> Option<&Value> {
        if self.null { None } else { Some(&self.value) }
    }

    /// Stores a value, converting it to the field's format.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::FormatMismatch`] if the value kind is not
    /// compatible with the format, or [`ValueError::OutOfRange`] if an integer
    /// does not fit.
    pub fn set(&mut self, value: impl Into<Value>) -> Result<(), ValueError> {
        self.value = coerce(self.field, value.into())?;
        self.null = false;
        Ok(())
    }

    /// Sets the container to null.
    pub fn set_null(&mut self) {
        self.value = Value::default_for(self.field.format);
        self.null = true;
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.get()? {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self.get()? {
            Value::Text(s) => Some(s.as_bytes()),
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.get()?.integer().and_then(|v| i64::try_from(v).ok())
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.get()?.integer().and_then(|v| u64::try_from(v).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.get()? {
            Value::Float(v) => Some(*v),
            other => other.integer().map(|v| v as f64),
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self.get()? {
            Value::DateTime(v) => Some(*v),
            _ => None,
        }
    }
}

fn coerce(field: &FieldDescriptor, value: Value) -> Result<Value, ValueError> {
    let mismatch = |value: &Value| ValueError::FormatMismatch {
        field: field.name.clone(),
        format: field.format,
        value: value.kind(),
    };
    let out_of_range = |v: i128| ValueError::OutOfRange {
        field: field.name.clone(),
        format: field.format,
        value: v.to_string(),
    };

    match field.format {
        FieldFormat::Ascii | FieldFormat::Text | FieldFormat::MText => match value {
            Value::Text(_) => Ok(value),
            Value::Blob(bytes) => String::from_utf8(bytes)
                .map(Value::Text)
                .map_err(|_| mismatch(&Value::Blob(Vec::new()))),
            other => Err(mismatch(&other)),
        },
        FieldFormat::MLob => match value {
            Value::Blob(_) => Ok(value),
            Value::Text(s) => Ok(Value::Blob(s.into_bytes())),
            other => Err(mismatch(&other)),
        },
        FieldFormat::Int => {
            let v = value.integer().ok_or_else(|| mismatch(&value))?;
            i32::try_from(v).map(Value::Int).map_err(|_| out_of_range(v))
        }
        FieldFormat::UInt => {
            let v = value.integer().ok_or_else(|| mismatch(&value))?;
            u32::try_from(v).map(Value::UInt).map_err(|_| out_of_range(v))
        }
        FieldFormat::BigInt => {
            let v = value.integer().ok_or_else(|| mismatch(&value))?;
            i64::try_from(v).map(Value::BigInt).map_err(|_| out_of_range(v))
        }
        FieldFormat::UBigInt => {
            let v = value.integer().ok_or_else(|| mismatch(&value))?;
            u64::try_from(v).map(Value::UBigInt).map_err(|_| out_of_range(v))
        }
        FieldFormat::Float => match value {
            Value::Float(_) => Ok(value),
            other => other
                .integer()
                .map(|v| Value::Float(v as f64))
                .ok_or_else(|| mismatch(&other)),
        },
        FieldFormat::DateTime => match value {
            Value::DateTime(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
    }
}

/// One row of a table: a value container per field, in declaration order.
///
/// # Examples
///
/// ```
/// use rowbind_core::{FieldDescriptor, FieldFormat, Row, TableDescriptor};
///
/// let table = TableDescriptor::new("t")
///     .with_field(FieldDescriptor::new("id", FieldFormat::Int, 0).primary_key())
///     .with_field(FieldDescriptor::new("name", FieldFormat::Ascii, 20));
/// let row = Row::new(&table);
///
/// row.set("name", "abc").unwrap();
/// assert_eq!(row.get("name").unwrap().as_str(), Some("abc"));
/// assert!(row.set("missing", 1).is_err());
/// ```
#[derive(Debug)]
pub struct Row<'a> {
    table: &'a TableDescriptor,
    values: Vec<SharedValue<'a>>,
}

impl<'a> Row<'a> {
    /// Creates a row with a null container for every field of `table`.
    pub fn new(table: &'a TableDescriptor) -> Self {
        let values = table
            .fields()
            .iter()
            .map(|field| Rc::new(RefCell::new(ValueContainer::new(field))))
            .collect();
        Self { table, values }
    }

    pub fn table(&self) -> &'a TableDescriptor {
        self.table
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Container of a field by logical name, falling back to the column
    /// name (both case-insensitive).
    pub fn value(&self, name: &str) -> Option<&SharedValue<'a>> {
        self.table
            .field(name)
            .or_else(|| self.table.field_by_column(name))
            .and_then(|field| self.values.get(field.index()))
    }

    /// Container at the given field position.
    pub fn value_at(&self, index: usize) -> Option<&SharedValue<'a>> {
        self.values.get(index)
    }

    /// Containers in field order.
    pub fn values(&self) -> impl Iterator<Item = &SharedValue<'a>> {
        self.values.iter()
    }

    /// Borrows the named container.
    pub fn get(&self, name: &str) -> Option<Ref<'_, ValueContainer<'a>>> {
        self.value(name).map(|value| value.borrow())
    }

    /// Stores a value into the named field.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::UnknownField`] if the table has no such field, or
    /// the conversion error of [`ValueContainer::set`].
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), ValueError> {
        let container = self
            .value(name)
            .ok_or_else(|| ValueError::UnknownField(name.to_string()))?;
        container.borrow_mut().set(value)
    }

    /// Sets the named field to null.
    pub fn set_null(&self, name: &str) -> Result<(), ValueError> {
        let container = self
            .value(name)
            .ok_or_else(|| ValueError::UnknownField(name.to_string()))?;
        container.borrow_mut().set_null();
        Ok(())
    }

    /// Resets every field to null.
    pub fn clear(&self) {
        for value in &self.values {
            value.borrow_mut().set_null();
        }
    }
}
