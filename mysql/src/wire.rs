//! Type-directed mapping between value containers and wire values.
//!
//! Every [`FieldFormat`] maps to exactly one [`WireBind`]: the wire kind,
//! its buffer length, whether a length cell accompanies the value, and the
//! signedness of integers. [`encode`] reads a container into a parameter,
//! [`decode`] writes a result cell back into a container.

use std::mem::size_of;

use chrono::{NaiveDate, NaiveDateTime};
use rowbind_core::{FieldDescriptor, FieldFormat, Value, ValueContainer, ValueError};

use crate::client::WireValue;

/// Wire representation class of a bound slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireKind {
    String,
    Blob,
    Double,
    DateTime,
    LongLong,
    Long,
}

/// Wire descriptor of a single binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireBind {
    pub kind: WireKind,
    /// Buffer size in bytes; `0` means unbounded.
    pub buffer_length: usize,
    /// Variable-length values carry a separate length cell.
    pub has_length: bool,
    pub unsigned: bool,
}

impl WireBind {
    fn fixed(kind: WireKind, buffer_length: usize, unsigned: bool) -> Self {
        Self {
            kind,
            buffer_length,
            has_length: false,
            unsigned,
        }
    }

    fn variable(kind: WireKind, buffer_length: usize) -> Self {
        Self {
            kind,
            buffer_length,
            has_length: true,
            unsigned: false,
        }
    }
}

/// Wire descriptor for a field, derived from its format and size.
///
/// # Examples
///
/// ```
/// use rowbind_core::{FieldDescriptor, FieldFormat};
/// use rowbind_mysql::{WireKind, wire_bind};
///
/// let bind = wire_bind(&FieldDescriptor::new("id", FieldFormat::UBigInt, 20));
/// assert_eq!(bind.kind, WireKind::LongLong);
/// assert!(bind.unsigned);
/// assert_eq!(bind.buffer_length, 8);
/// ```
pub fn wire_bind(field: &FieldDescriptor) -> WireBind {
    let size = field.size as usize;

    match field.format {
        FieldFormat::Ascii | FieldFormat::Text | FieldFormat::MText => WireBind::variable(WireKind::String, size),
        FieldFormat::MLob => WireBind::variable(WireKind::Blob, size),
        FieldFormat::Float => WireBind::fixed(WireKind::Double, size_of::<f64>(), false),
        FieldFormat::DateTime => WireBind::fixed(WireKind::DateTime, size_of::<NaiveDateTime>(), false),
        FieldFormat::BigInt => WireBind::fixed(WireKind::LongLong, size_of::<i64>(), false),
        FieldFormat::UBigInt => WireBind::fixed(WireKind::LongLong, size_of::<u64>(), true),
        FieldFormat::Int => WireBind::fixed(WireKind::Long, size_of::<i32>(), false),
        FieldFormat::UInt => WireBind::fixed(WireKind::Long, size_of::<u32>(), true),
    }
}

/// Reads a container as a statement parameter; null becomes [`WireValue::Null`].
pub fn encode(container: &ValueContainer<'_>) -> WireValue {
    match container.get() {
        None => WireValue::Null,
        Some(Value::Text(s)) => WireValue::Bytes(s.as_bytes().to_vec()),
        Some(Value::Blob(b)) => WireValue::Bytes(b.clone()),
        Some(Value::Int(v)) => WireValue::Int(i64::from(*v)),
        Some(Value::UInt(v)) => WireValue::UInt(u64::from(*v)),
        Some(Value::BigInt(v)) => WireValue::Int(*v),
        Some(Value::UBigInt(v)) => WireValue::UInt(*v),
        Some(Value::Float(v)) => WireValue::Double(*v),
        Some(Value::DateTime(v)) => WireValue::DateTime(*v),
    }
}

/// Writes a result cell into a container.
///
/// Accepts any representation the client may deliver for the slot (numbers
/// as text, integers for a float column, ...). Strings and blobs longer than
/// the buffer are cut, strings at a character boundary.
///
/// # Errors
///
/// Returns [`ValueError::FormatMismatch`] when the cell cannot be read as the
/// slot's kind, or [`ValueError::OutOfRange`] when an integer does not fit
/// the field.
pub fn decode(container: &mut ValueContainer<'_>, bind: &WireBind, wire: WireValue) -> Result<(), ValueError> {
    if wire.is_null() {
        container.set_null();
        return Ok(());
    }

    let field = container.field();
    let mismatch = |wire: &WireValue| ValueError::FormatMismatch {
        field: field.name.clone(),
        format: field.format,
        value: wire_kind_name(wire),
    };

    let value = match bind.kind {
        WireKind::String => {
            let text = wire.to_text().unwrap_or_default();
            Value::Text(truncate_text(text, bind.buffer_length))
        }
        WireKind::Blob => {
            let mut bytes = match wire {
                WireValue::Bytes(bytes) => bytes,
                other => other.to_text().unwrap_or_default().into_bytes(),
            };
            if bind.buffer_length > 0 {
                bytes.truncate(bind.buffer_length);
            }
            Value::Blob(bytes)
        }
        WireKind::Double => match &wire {
            WireValue::Double(v) => Value::Float(*v),
            WireValue::Int(v) => Value::Float(*v as f64),
            WireValue::UInt(v) => Value::Float(*v as f64),
            WireValue::Bytes(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .map(Value::Float)
                .ok_or_else(|| mismatch(&wire))?,
            _ => return Err(mismatch(&wire)),
        },
        WireKind::DateTime => match &wire {
            WireValue::DateTime(v) => Value::DateTime(*v),
            WireValue::Bytes(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(parse_datetime)
                .map(Value::DateTime)
                .ok_or_else(|| mismatch(&wire))?,
            _ => return Err(mismatch(&wire)),
        },
        WireKind::LongLong | WireKind::Long => match &wire {
            WireValue::Int(v) => Value::BigInt(*v),
            WireValue::UInt(v) => Value::UBigInt(*v),
            WireValue::Double(v) if v.fract() == 0.0 && v.abs() < 9.2e18 => Value::BigInt(*v as i64),
            WireValue::Bytes(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(parse_integer)
                .ok_or_else(|| mismatch(&wire))?,
            _ => return Err(mismatch(&wire)),
        },
    };

    container.set(value)
}

fn wire_kind_name(wire: &WireValue) -> &'static str {
    match wire {
        WireValue::Null => "null",
        WireValue::Bytes(_) => "bytes",
        WireValue::Int(_) => "signed integer",
        WireValue::UInt(_) => "unsigned integer",
        WireValue::Double(_) => "double",
        WireValue::DateTime(_) => "datetime",
    }
}

fn truncate_text(mut text: String, limit: usize) -> String {
    if limit > 0 && text.len() > limit {
        let mut end = limit;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

fn parse_integer(text: &str) -> Option<Value> {
    let text = text.trim();
    text.parse::<i64>()
        .map(Value::BigInt)
        .or_else(|_| text.parse::<u64>().map(Value::UBigInt))
        .ok()
}

/// Parses `YYYY-MM-DD HH:MM:SS[.ffffff]` or a bare date.
pub(crate) fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
