//! Value representation and the scalar wire encoding.
//!
//! A zone stores one of five value shapes per key: nil, boolean, number,
//! string, or list. Scalars are stored as raw bytes next to the key
//! (booleans as one byte, numbers as an 8-byte IEEE-754 double, strings
//! verbatim); lists are a nested structure and never flow through the
//! scalar encoding. [`ValueType`] carries the wire discriminants bindings
//! rely on, so the gaps in the numbering are deliberate.

use crate::error::{Error, Result};

/// Wire-level type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    Nil = 0,
    Bool = 1,
    Number = 3,
    Str = 4,
    List = 5,
}

impl TryFrom<u8> for ValueType {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(ValueType::Nil),
            1 => Ok(ValueType::Bool),
            3 => Ok(ValueType::Number),
            4 => Ok(ValueType::Str),
            5 => Ok(ValueType::List),
            other => Err(Error::UnsupportedValueType(other)),
        }
    }
}

/// A value accepted by stores and returned by fetches.
///
/// [`Value::Nil`] as a store argument means deletion; list values are
/// reached through the list operations, never through this enum.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Str(Vec<u8>),
}

impl Value {
    /// Wire tag for this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Nil => ValueType::Nil,
            Value::Bool(_) => ValueType::Bool,
            Value::Number(_) => ValueType::Number,
            Value::Str(_) => ValueType::Str,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.as_bytes().to_vec())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// An element of a list-typed entry. Only numbers and strings are legal
/// list elements.
#[derive(Debug, Clone, PartialEq)]
pub enum ListValue {
    Number(f64),
    Str(Vec<u8>),
}

/// Which end of a list a push or pop operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEnd {
    Head,
    Tail,
}

/// Store behavior flags.
///
/// `add` and `replace` are mutually exclusive in practice; when both are
/// set, `replace` wins (checked first). `safe` suppresses forced eviction
/// on allocation failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreFlags {
    pub add: bool,
    pub replace: bool,
    pub safe: bool,
}

/// What an increment does to the entry's deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum TtlPolicy {
    /// Keep the existing deadline on an in-place increment; a freshly
    /// created or revived entry gets no deadline.
    #[default]
    Preserve,
    /// Drop any deadline.
    Clear,
    /// Set the deadline to now plus the given milliseconds.
    Set(u64),
}

// ---------------------------------------------------------------------------
// Scalar encoding
// ---------------------------------------------------------------------------

/// Stored representation tag for scalar payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScalarKind {
    Bool,
    Number,
    Str,
}

/// Encodes a non-nil value into its stored byte form. `None` for nil.
pub(crate) fn encode_scalar(value: &Value) -> Option<(ScalarKind, Box<[u8]>)> {
    match value {
        Value::Nil => None,
        Value::Bool(b) => Some((ScalarKind::Bool, Box::new([u8::from(*b)]))),
        Value::Number(n) => Some((ScalarKind::Number, Box::new(n.to_le_bytes()))),
        Value::Str(s) => Some((ScalarKind::Str, s.clone().into_boxed_slice())),
    }
}

/// Decodes stored scalar bytes, validating the fixed widths.
pub(crate) fn decode_scalar(kind: ScalarKind, bytes: &[u8]) -> Result<Value> {
    match kind {
        ScalarKind::Bool => {
            if bytes.len() != 1 {
                return Err(Error::corrupt("bad boolean value size"));
            }
            Ok(Value::Bool(bytes[0] != 0))
        }
        ScalarKind::Number => Ok(Value::Number(decode_number(bytes)?)),
        ScalarKind::Str => Ok(Value::Str(bytes.to_vec())),
    }
}

/// Decodes an 8-byte stored double.
pub(crate) fn decode_number(bytes: &[u8]) -> Result<f64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::corrupt("bad number value size"))?;
    Ok(f64::from_le_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tags_match_binding_layer() {
        assert_eq!(ValueType::Nil as u8, 0);
        assert_eq!(ValueType::Bool as u8, 1);
        assert_eq!(ValueType::Number as u8, 3);
        assert_eq!(ValueType::Str as u8, 4);
        assert_eq!(ValueType::List as u8, 5);
    }

    #[test]
    fn tags_round_trip_and_reject_unknowns() {
        for tag in [0u8, 1, 3, 4, 5] {
            assert_eq!(ValueType::try_from(tag).unwrap() as u8, tag);
        }
        for tag in [2u8, 6, 255] {
            assert_eq!(
                ValueType::try_from(tag),
                Err(Error::UnsupportedValueType(tag))
            );
        }
    }

    #[test]
    fn scalar_round_trip() {
        for value in [
            Value::Bool(true),
            Value::Bool(false),
            Value::Number(0.0),
            Value::Number(-1234.5),
            Value::Str(b"hello".to_vec()),
            Value::Str(Vec::new()),
        ] {
            let (kind, bytes) = encode_scalar(&value).unwrap();
            assert_eq!(decode_scalar(kind, &bytes).unwrap(), value);
        }
    }

    #[test]
    fn nil_has_no_encoding() {
        assert!(encode_scalar(&Value::Nil).is_none());
    }

    #[test]
    fn encoded_widths_are_fixed() {
        let (_, b) = encode_scalar(&Value::Bool(true)).unwrap();
        assert_eq!(b.len(), 1);
        let (_, n) = encode_scalar(&Value::Number(7.25)).unwrap();
        assert_eq!(n.len(), 8);
    }

    #[test]
    fn truncated_number_is_corrupt() {
        assert!(matches!(
            decode_scalar(ScalarKind::Number, &[0u8; 4]),
            Err(Error::CorruptData(_))
        ));
        assert!(matches!(
            decode_scalar(ScalarKind::Bool, &[0u8; 2]),
            Err(Error::CorruptData(_))
        ));
    }

    #[test]
    fn value_conversions() {
        assert_eq!(Value::from("abc"), Value::Str(b"abc".to_vec()));
        assert_eq!(Value::from(2.5), Value::Number(2.5));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(true).value_type(), ValueType::Bool);
    }
}
