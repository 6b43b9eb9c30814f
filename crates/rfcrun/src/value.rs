//! Host-side values, one case per catalog entry.
//!
//! `Value` is the currency of every container read and write. Reads
//! always produce the variant matching the field's remote type; writes
//! accept a small, documented set of coercions (text into date/time
//! fields, any integer width into an integer field) and reject the rest.

use chrono::NaiveDate;
use chrono::NaiveTime;

use rfcwire::Result;
use rfcwire::RfcError;
use rfcwire::RfcType;

use crate::container::Structure;
use crate::table::Table;

/// A single field or parameter value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Fixed-width text (trailing pad already stripped on read).
    Chars(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Time of day.
    Time(NaiveTime),
    /// Packed decimal, approximated as a float.
    Bcd(f64),
    /// Fixed-size raw bytes.
    Bytes(Vec<u8>),
    /// Digit string; leading zeros preserved.
    Num(String),
    /// 8-byte float.
    Float(f64),
    /// 4-byte signed integer.
    Int(i32),
    /// 2-byte signed integer.
    Int2(i16),
    /// 1-byte unsigned integer.
    Int1(u8),
    /// Decimal floating point, approximated as a float on read.
    Decf(f64),
    /// Variable-length text.
    Str(String),
    /// Variable-length raw bytes.
    XStr(Vec<u8>),
    /// Table view over a nested container.
    Table(Table),
    /// Structure view over a nested container.
    Structure(Structure),
}

impl Value {
    /// A short name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Chars(_) => "chars",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Bcd(_) => "bcd",
            Value::Bytes(_) => "bytes",
            Value::Num(_) => "num",
            Value::Float(_) => "float",
            Value::Int(_) => "int",
            Value::Int2(_) => "int2",
            Value::Int1(_) => "int1",
            Value::Decf(_) => "decf",
            Value::Str(_) => "string",
            Value::XStr(_) => "xstring",
            Value::Table(_) => "table",
            Value::Structure(_) => "structure",
        }
    }

    /// The text behind any string-like variant.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Chars(s) | Value::Num(s) | Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The bytes behind any byte-like variant.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) | Value::XStr(b) => Some(b),
            _ => None,
        }
    }

    /// The integer behind any integer variant, widened.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::Int2(v) => Some(i64::from(*v)),
            Value::Int1(v) => Some(i64::from(*v)),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Chars(a), Value::Chars(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Bcd(a), Value::Bcd(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int2(a), Value::Int2(b)) => a == b,
            (Value::Int1(a), Value::Int1(b)) => a == b,
            (Value::Decf(a), Value::Decf(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::XStr(a), Value::XStr(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a.handle() == b.handle(),
            (Value::Structure(a), Value::Structure(b)) => a.handle() == b.handle(),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Chars(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Chars(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int2(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Int1(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<Table> for Value {
    fn from(v: Table) -> Self {
        Value::Table(v)
    }
}

impl From<Structure> for Value {
    fn from(v: Structure) -> Self {
        Value::Structure(v)
    }
}

/// Forces text into exactly `width` wire characters, padding with
/// trailing spaces or truncating.
fn fit_text(text: &str, width: usize) -> Vec<u16> {
    let mut units: Vec<u16> = text.encode_utf16().take(width).collect();
    while units.len() < width {
        units.push(b' ' as u16);
    }
    units
}

fn mismatch(field: &str, expected: RfcType, value: &Value) -> RfcError {
    RfcError::ValueMismatch {
        field: field.to_string(),
        expected,
        found: value.kind(),
    }
}

/// Renders a value as the 8 wire characters of a date field.
///
/// A calendar date formats as `YYYYMMDD`; text is padded with trailing
/// spaces to 8 characters or truncated if longer.
pub(crate) fn to_date_field(field: &str, value: &Value) -> Result<[u16; 8]> {
    let text = match value {
        Value::Date(d) => d.format("%Y%m%d").to_string(),
        other => other
            .as_text()
            .ok_or_else(|| mismatch(field, RfcType::Date, value))?
            .to_string(),
    };
    let units = fit_text(&text, 8);
    let mut out = [0u16; 8];
    out.copy_from_slice(&units);
    Ok(out)
}

/// Renders a value as the 6 wire characters of a time field.
///
/// A time of day formats as `HHMMSS`; text is padded with trailing
/// spaces to 6 characters or truncated if longer.
pub(crate) fn to_time_field(field: &str, value: &Value) -> Result<[u16; 6]> {
    let text = match value {
        Value::Time(t) => t.format("%H%M%S").to_string(),
        other => other
            .as_text()
            .ok_or_else(|| mismatch(field, RfcType::Time, value))?
            .to_string(),
    };
    let units = fit_text(&text, 6);
    let mut out = [0u16; 6];
    out.copy_from_slice(&units);
    Ok(out)
}

/// Renders a value as decimal text for a packed-decimal field.
pub(crate) fn to_decimal_text(field: &str, value: &Value) -> Result<String> {
    match value {
        Value::Bcd(v) | Value::Float(v) => Ok(v.to_string()),
        Value::Int(v) => Ok(v.to_string()),
        Value::Int2(v) => Ok(v.to_string()),
        Value::Int1(v) => Ok(v.to_string()),
        other => other
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| mismatch(field, RfcType::Bcd, value)),
    }
}
