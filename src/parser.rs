//! Declarative fixed-width payload parsing.
//!
//! A payload layout is a table of [`FieldSpec`]s. Each spec names a
//! payload-relative byte range, the primitive used to read it, and an
//! optional default and validator. Specs without a name are markers: they
//! only check that a literal tag (such as `"09"`) sits where the layout says
//! it does.
//!
//! # Example
//!
//! ```
//! use openprotocol_client::parser::{parse_fields, FieldSpec, FieldTarget, Value};
//! use openprotocol_client::Result;
//!
//! #[derive(Default)]
//! struct Ack {
//!     mid: u16,
//! }
//!
//! impl FieldTarget for Ack {
//!     fn set_field(&mut self, name: &str, value: Value<'_>) -> Result<()> {
//!         match name {
//!             "mid" => self.mid = value.to_int(name)?,
//!             _ => {}
//!         }
//!         Ok(())
//!     }
//! }
//!
//! const FIELDS: &[FieldSpec] = &[FieldSpec::marker(0, 2, "01"), FieldSpec::integer("mid", 2, 6)];
//!
//! let mut ack = Ack::default();
//! parse_fields("010018", FIELDS, &mut ack).unwrap();
//! assert_eq!(ack.mid, 18);
//! ```

use crate::error::{OpenProtocolError, Result};
use crate::protocol::Frame;

/// A parsed field value. Text borrows from the payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    /// Trimmed text.
    Text(&'a str),
    /// Decimal integer.
    Integer(i64),
    /// Fixed-point decimal.
    Decimal(f64),
}

impl<'a> Value<'a> {
    /// Read as text.
    pub fn to_text(self, field: &str) -> Result<String> {
        match self {
            Value::Text(s) => Ok(s.to_string()),
            other => Err(OpenProtocolError::field_parse(
                field,
                format!("expected text, got {:?}", other),
            )),
        }
    }

    /// Read as an integer of the target width.
    pub fn to_int<T: TryFrom<i64>>(self, field: &str) -> Result<T> {
        match self {
            Value::Integer(v) => T::try_from(v).map_err(|_| {
                OpenProtocolError::field_parse(field, format!("{} out of range", v))
            }),
            other => Err(OpenProtocolError::field_parse(
                field,
                format!("expected integer, got {:?}", other),
            )),
        }
    }

    /// Read as a float. Integers widen.
    pub fn to_f64(self, field: &str) -> Result<f64> {
        match self {
            Value::Decimal(v) => Ok(v),
            Value::Integer(v) => Ok(v as f64),
            other => Err(OpenProtocolError::field_parse(
                field,
                format!("expected number, got {:?}", other),
            )),
        }
    }
}

/// Primitive used to read a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Trimmed string.
    Text,
    /// Signed decimal integer.
    Integer,
    /// Integer with two implied decimals (`000120` reads as `1.2`).
    Hundredths,
    /// Integer that must fall in `min..=max` (enum discriminants, status digits).
    Bounded { min: i64, max: i64 },
}

impl FieldKind {
    fn parse(self, raw: &str) -> std::result::Result<Value<'_>, String> {
        match self {
            FieldKind::Text => Ok(Value::Text(raw)),
            FieldKind::Integer => parse_integer(raw).map(Value::Integer),
            FieldKind::Hundredths => parse_integer(raw).map(|v| Value::Decimal(v as f64 / 100.0)),
            FieldKind::Bounded { min, max } => {
                let v = parse_integer(raw)?;
                if (min..=max).contains(&v) {
                    Ok(Value::Integer(v))
                } else {
                    Err(format!("{} not in {}..={}", v, min, max))
                }
            }
        }
    }
}

fn parse_integer(raw: &str) -> std::result::Result<i64, String> {
    if raw.is_empty() {
        return Err("empty field".to_string());
    }
    raw.parse::<i64>()
        .map_err(|e| format!("{:?} is not an integer: {}", raw, e))
}

/// Check applied to a parsed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Validator {
    /// Text must equal the literal.
    Literal(&'static str),
    /// Integer must fall in `min..=max`.
    Range { min: i64, max: i64 },
}

impl Validator {
    fn check(&self, value: &Value<'_>) -> bool {
        match (self, value) {
            (Validator::Literal(expected), Value::Text(actual)) => expected == actual,
            (Validator::Range { min, max }, Value::Integer(v)) => (*min..=*max).contains(v),
            _ => false,
        }
    }

    fn describe(&self) -> String {
        match self {
            Validator::Literal(expected) => format!("expected {:?}", expected),
            Validator::Range { min, max } => format!("expected {}..={}", min, max),
        }
    }
}

/// One fixed-width field in a payload layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    /// Target field name, `None` for markers.
    pub name: Option<&'static str>,
    /// Payload-relative start offset (inclusive).
    pub start: usize,
    /// Payload-relative end offset (exclusive).
    pub end: usize,
    /// How the trimmed slice is read.
    pub kind: FieldKind,
    /// Used when the trimmed slice is empty.
    pub default: Option<Value<'static>>,
    /// Checked after parsing.
    pub validator: Option<Validator>,
}

impl FieldSpec {
    const fn new(name: Option<&'static str>, start: usize, end: usize, kind: FieldKind) -> Self {
        Self {
            name,
            start,
            end,
            kind,
            default: None,
            validator: None,
        }
    }

    /// Trimmed string field.
    pub const fn text(name: &'static str, start: usize, end: usize) -> Self {
        Self::new(Some(name), start, end, FieldKind::Text)
    }

    /// Integer field.
    pub const fn integer(name: &'static str, start: usize, end: usize) -> Self {
        Self::new(Some(name), start, end, FieldKind::Integer)
    }

    /// Fixed-point field with two implied decimals.
    pub const fn hundredths(name: &'static str, start: usize, end: usize) -> Self {
        Self::new(Some(name), start, end, FieldKind::Hundredths)
    }

    /// Integer restricted to `min..=max`.
    pub const fn bounded(name: &'static str, start: usize, end: usize, min: i64, max: i64) -> Self {
        Self::new(Some(name), start, end, FieldKind::Bounded { min, max })
    }

    /// Literal tag that must appear at this offset. Writes nothing.
    pub const fn marker(start: usize, end: usize, literal: &'static str) -> Self {
        Self::new(None, start, end, FieldKind::Text).with_validator(Validator::Literal(literal))
    }

    /// Set the default used for blank fields.
    pub const fn with_default(mut self, default: Value<'static>) -> Self {
        self.default = Some(default);
        self
    }

    /// Set the validator.
    pub const fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Field name for diagnostics; markers are named by position.
    fn label(&self) -> String {
        match self.name {
            Some(name) => name.to_string(),
            None => format!("tag@{}..{}", self.start, self.end),
        }
    }
}

/// Receives parsed values by field name.
pub trait FieldTarget {
    /// Store one parsed value.
    fn set_field(&mut self, name: &str, value: Value<'_>) -> Result<()>;
}

/// Parse `payload` according to `fields`, writing into `target`.
///
/// Fields are processed in ascending start order. A field whose end lies
/// beyond the payload is skipped, so short frames from older revisions leave
/// those fields untouched.
pub fn parse_fields<T: FieldTarget + ?Sized>(
    payload: &str,
    fields: &[FieldSpec],
    target: &mut T,
) -> Result<()> {
    let mut ordered: Vec<&FieldSpec> = fields.iter().collect();
    ordered.sort_by_key(|f| f.start);

    for field in ordered {
        let Some(raw) = payload.get(field.start..field.end) else {
            continue;
        };
        let trimmed = raw.trim();

        let value = match field.default {
            Some(default) if trimmed.is_empty() => default,
            _ => field
                .kind
                .parse(trimmed)
                .map_err(|reason| OpenProtocolError::field_parse(&field.label(), reason))?,
        };

        if let Some(validator) = &field.validator {
            if !validator.check(&value) {
                return Err(OpenProtocolError::validation(
                    &field.label(),
                    format!("{}, got {:?}", validator.describe(), raw),
                ));
            }
        }

        if let Some(name) = field.name {
            target.set_field(name, value)?;
        }
    }

    Ok(())
}

/// Parse a frame's payload according to `fields`.
pub fn parse_frame<T: FieldTarget + ?Sized>(
    frame: &Frame,
    fields: &[FieldSpec],
    target: &mut T,
) -> Result<()> {
    parse_fields(frame.payload(), fields, target)
}
