//! # Typed Values and the Order-Preserving Codec
//!
//! A [`Value`] is a pair of a type tag and the canonical byte encoding of the
//! underlying scalar. Records are self-describing: every field carries its
//! own tag, and the raw bytes stored in the KV engine are exactly the bytes
//! held here.
//!
//! ## Encoding Invariants
//!
//! The encodings are the load-bearing contract of the whole system. For any
//! two values `a` and `b` of the same tag:
//!
//! ```text
//! a <= b  (natural order)   <=>   encode(a) <= encode(b)  (lexicographic)
//! ```
//!
//! This is what lets tables and indexes compare keys with a plain `memcmp`
//! and lets ordered scans return values in their natural order.
//!
//! | Tag | Encoding |
//! |-----|----------|
//! | Bytes, String | raw content |
//! | Bool | one byte, `0x00` or `0x01` |
//! | IntN | big-endian, sign bit flipped |
//! | UintN | big-endian |
//! | Float32/64 | IEEE bits; positives get the sign bit set, negatives are fully inverted |
//! | Null | empty |
//!
//! `Int` and `Uint` are the native-width tags of the original data model;
//! they are stored as 64-bit on disk.
//!
//! Decoders are exact inverses on well-formed input and fail with
//! [`Error::InvalidEncoding`] otherwise. Both directions are covered by the
//! round-trip and order-preservation tests at the bottom of this file.
//!
//! ## Comparison Lattice
//!
//! Mixed-type comparisons follow a small, explicit lattice:
//!
//! - integer-kind vs integer-kind compares exactly in the i128 domain
//! - any float operand switches the comparison to f64
//! - strings and bytes compare lexicographically with each other
//! - booleans compare with booleans
//! - Null compares with nothing; [`Comparison::NullInvolved`] lets the
//!   evaluator implement SQL's three-valued comparisons

use crate::errors::Error;
use eyre::{bail, Result};
use std::cmp::Ordering;
use std::fmt;

/// Closed enumeration of value types. The discriminant is the on-disk tag
/// byte written by the record codec and must never be reused.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Bytes = 0x01,
    String = 0x02,
    Bool = 0x03,
    Int8 = 0x10,
    Int16 = 0x11,
    Int32 = 0x12,
    Int64 = 0x13,
    Int = 0x14,
    Uint8 = 0x20,
    Uint16 = 0x21,
    Uint32 = 0x22,
    Uint64 = 0x23,
    Uint = 0x24,
    Float32 = 0x30,
    Float64 = 0x31,
    Null = 0x40,
}

impl Type {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Result<Type> {
        Ok(match tag {
            0x01 => Type::Bytes,
            0x02 => Type::String,
            0x03 => Type::Bool,
            0x10 => Type::Int8,
            0x11 => Type::Int16,
            0x12 => Type::Int32,
            0x13 => Type::Int64,
            0x14 => Type::Int,
            0x20 => Type::Uint8,
            0x21 => Type::Uint16,
            0x22 => Type::Uint32,
            0x23 => Type::Uint64,
            0x24 => Type::Uint,
            0x30 => Type::Float32,
            0x31 => Type::Float64,
            0x40 => Type::Null,
            _ => bail!(Error::InvalidEncoding("unknown type tag")),
        })
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Type::Int8 | Type::Int16 | Type::Int32 | Type::Int64 | Type::Int
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            Type::Uint8 | Type::Uint16 | Type::Uint32 | Type::Uint64 | Type::Uint
        )
    }

    pub fn is_integer(self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    pub fn is_float(self) -> bool {
        matches!(self, Type::Float32 | Type::Float64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Maps a SQL type name to a tag. Accepts the tag names plus the usual
    /// aliases (`INTEGER`, `TEXT`, `FLOAT`, `DOUBLE`).
    pub fn from_sql_name(name: &str) -> Option<Type> {
        Some(match name.to_ascii_uppercase().as_str() {
            "BYTES" => Type::Bytes,
            "STRING" | "TEXT" => Type::String,
            "BOOL" | "BOOLEAN" => Type::Bool,
            "INT8" => Type::Int8,
            "INT16" => Type::Int16,
            "INT32" => Type::Int32,
            "INT64" | "INTEGER" | "BIGINT" => Type::Int64,
            "INT" => Type::Int,
            "UINT8" => Type::Uint8,
            "UINT16" => Type::Uint16,
            "UINT32" => Type::Uint32,
            "UINT64" => Type::Uint64,
            "UINT" => Type::Uint,
            "FLOAT32" => Type::Float32,
            "FLOAT64" | "FLOAT" | "DOUBLE" => Type::Float64,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Type::Bytes => "bytes",
            Type::String => "string",
            Type::Bool => "bool",
            Type::Int8 => "int8",
            Type::Int16 => "int16",
            Type::Int32 => "int32",
            Type::Int64 => "int64",
            Type::Int => "int",
            Type::Uint8 => "uint8",
            Type::Uint16 => "uint16",
            Type::Uint32 => "uint32",
            Type::Uint64 => "uint64",
            Type::Uint => "uint",
            Type::Float32 => "float32",
            Type::Float64 => "float64",
            Type::Null => "null",
        }
    }

    fn encoded_size(self) -> Option<usize> {
        match self {
            Type::Bool | Type::Int8 | Type::Uint8 => Some(1),
            Type::Int16 | Type::Uint16 => Some(2),
            Type::Int32 | Type::Uint32 | Type::Float32 => Some(4),
            Type::Int64 | Type::Int | Type::Uint64 | Type::Uint | Type::Float64 => Some(8),
            Type::Null => Some(0),
            Type::Bytes | Type::String => None,
        }
    }
}

/// A typed value: a tag plus the canonical encoding of the scalar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub ty: Type,
    pub data: Vec<u8>,
}

/// Outcome of comparing two values under the coercion lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Ordered(Ordering),
    /// The kinds do not compare with each other (e.g. int vs string).
    Incomparable,
    /// At least one side is Null; every comparison operator yields false.
    NullInvolved,
}

pub(crate) fn f64_ordered_bytes(v: f64) -> [u8; 8] {
    let bits = v.to_bits();
    if bits & (1 << 63) != 0 {
        (!bits).to_be_bytes()
    } else {
        (bits ^ (1 << 63)).to_be_bytes()
    }
}

fn f64_from_ordered(raw: [u8; 8]) -> f64 {
    let enc = u64::from_be_bytes(raw);
    if enc & (1 << 63) != 0 {
        f64::from_bits(enc ^ (1 << 63))
    } else {
        f64::from_bits(!enc)
    }
}

fn f32_ordered_bytes(v: f32) -> [u8; 4] {
    let bits = v.to_bits();
    if bits & (1 << 31) != 0 {
        (!bits).to_be_bytes()
    } else {
        (bits ^ (1 << 31)).to_be_bytes()
    }
}

fn f32_from_ordered(raw: [u8; 4]) -> f32 {
    let enc = u32::from_be_bytes(raw);
    if enc & (1 << 31) != 0 {
        f32::from_bits(enc ^ (1 << 31))
    } else {
        f32::from_bits(!enc)
    }
}

impl Value {
    pub fn null() -> Value {
        Value {
            ty: Type::Null,
            data: Vec::new(),
        }
    }

    pub fn bytes(data: impl Into<Vec<u8>>) -> Value {
        Value {
            ty: Type::Bytes,
            data: data.into(),
        }
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value {
            ty: Type::String,
            data: s.into().into_bytes(),
        }
    }

    pub fn bool(v: bool) -> Value {
        Value {
            ty: Type::Bool,
            data: vec![v as u8],
        }
    }

    pub fn int8(v: i8) -> Value {
        Value {
            ty: Type::Int8,
            data: ((v as u8) ^ 0x80).to_be_bytes().to_vec(),
        }
    }

    pub fn int16(v: i16) -> Value {
        Value {
            ty: Type::Int16,
            data: ((v as u16) ^ (1 << 15)).to_be_bytes().to_vec(),
        }
    }

    pub fn int32(v: i32) -> Value {
        Value {
            ty: Type::Int32,
            data: ((v as u32) ^ (1 << 31)).to_be_bytes().to_vec(),
        }
    }

    pub fn int64(v: i64) -> Value {
        Value {
            ty: Type::Int64,
            data: ((v as u64) ^ (1 << 63)).to_be_bytes().to_vec(),
        }
    }

    /// Native-width signed integer, stored as 64-bit.
    pub fn int(v: i64) -> Value {
        Value {
            ty: Type::Int,
            data: ((v as u64) ^ (1 << 63)).to_be_bytes().to_vec(),
        }
    }

    pub fn uint8(v: u8) -> Value {
        Value {
            ty: Type::Uint8,
            data: vec![v],
        }
    }

    pub fn uint16(v: u16) -> Value {
        Value {
            ty: Type::Uint16,
            data: v.to_be_bytes().to_vec(),
        }
    }

    pub fn uint32(v: u32) -> Value {
        Value {
            ty: Type::Uint32,
            data: v.to_be_bytes().to_vec(),
        }
    }

    pub fn uint64(v: u64) -> Value {
        Value {
            ty: Type::Uint64,
            data: v.to_be_bytes().to_vec(),
        }
    }

    /// Native-width unsigned integer, stored as 64-bit.
    pub fn uint(v: u64) -> Value {
        Value {
            ty: Type::Uint,
            data: v.to_be_bytes().to_vec(),
        }
    }

    pub fn float32(v: f32) -> Value {
        Value {
            ty: Type::Float32,
            data: f32_ordered_bytes(v).to_vec(),
        }
    }

    pub fn float64(v: f64) -> Value {
        Value {
            ty: Type::Float64,
            data: f64_ordered_bytes(v).to_vec(),
        }
    }

    /// Types an integer literal with the smallest signed tag that fits.
    pub fn smallest_int(v: i64) -> Value {
        if let Ok(v) = i8::try_from(v) {
            Value::int8(v)
        } else if let Ok(v) = i16::try_from(v) {
            Value::int16(v)
        } else if let Ok(v) = i32::try_from(v) {
            Value::int32(v)
        } else {
            Value::int64(v)
        }
    }

    /// Rebuilds a value from a tag and raw bytes, validating the length for
    /// fixed-size tags.
    pub fn from_raw(ty: Type, data: Vec<u8>) -> Result<Value> {
        if let Some(size) = ty.encoded_size() {
            if data.len() != size {
                bail!(Error::InvalidEncoding("wrong length for fixed-size type"));
            }
        }
        if ty == Type::String && std::str::from_utf8(&data).is_err() {
            bail!(Error::InvalidEncoding("string is not valid UTF-8"));
        }
        Ok(Value { ty, data })
    }

    pub fn is_null(&self) -> bool {
        self.ty == Type::Null
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if self.data.len() != size {
            bail!(Error::InvalidEncoding("wrong length for fixed-size type"));
        }
        Ok(())
    }

    pub fn decode_bool(&self) -> Result<bool> {
        self.check_size(1)?;
        match self.data[0] {
            0 => Ok(false),
            1 => Ok(true),
            _ => bail!(Error::InvalidEncoding("bool byte out of range")),
        }
    }

    pub fn decode_string(&self) -> Result<&str> {
        std::str::from_utf8(&self.data)
            .map_err(|_| eyre::Report::new(Error::InvalidEncoding("string is not valid UTF-8")))
    }

    /// Decodes any integer-kind value into the i128 domain.
    pub fn to_i128(&self) -> Result<i128> {
        match self.ty {
            Type::Int8 => {
                self.check_size(1)?;
                Ok(((self.data[0] ^ 0x80) as i8) as i128)
            }
            Type::Int16 => {
                self.check_size(2)?;
                let raw = u16::from_be_bytes(self.data[..2].try_into().unwrap());
                Ok(((raw ^ (1 << 15)) as i16) as i128)
            }
            Type::Int32 => {
                self.check_size(4)?;
                let raw = u32::from_be_bytes(self.data[..4].try_into().unwrap());
                Ok(((raw ^ (1 << 31)) as i32) as i128)
            }
            Type::Int64 | Type::Int => {
                self.check_size(8)?;
                let raw = u64::from_be_bytes(self.data[..8].try_into().unwrap());
                Ok(((raw ^ (1 << 63)) as i64) as i128)
            }
            Type::Uint8 => {
                self.check_size(1)?;
                Ok(self.data[0] as i128)
            }
            Type::Uint16 => {
                self.check_size(2)?;
                Ok(u16::from_be_bytes(self.data[..2].try_into().unwrap()) as i128)
            }
            Type::Uint32 => {
                self.check_size(4)?;
                Ok(u32::from_be_bytes(self.data[..4].try_into().unwrap()) as i128)
            }
            Type::Uint64 | Type::Uint => {
                self.check_size(8)?;
                Ok(u64::from_be_bytes(self.data[..8].try_into().unwrap()) as i128)
            }
            _ => bail!(Error::TypeMismatch(format!(
                "{} is not an integer",
                self.ty.name()
            ))),
        }
    }

    /// Decodes any numeric value into f64. Lossy for integers beyond 2^53;
    /// callers that need exactness use [`Value::to_i128`].
    pub fn to_f64(&self) -> Result<f64> {
        match self.ty {
            Type::Float32 => {
                self.check_size(4)?;
                Ok(f32_from_ordered(self.data[..4].try_into().unwrap()) as f64)
            }
            Type::Float64 => {
                self.check_size(8)?;
                Ok(f64_from_ordered(self.data[..8].try_into().unwrap()))
            }
            _ if self.ty.is_integer() => Ok(self.to_i128()? as f64),
            _ => bail!(Error::TypeMismatch(format!(
                "{} is not numeric",
                self.ty.name()
            ))),
        }
    }

    /// Converts to the target tag. Identity conversions are free; numeric
    /// conversions go through i128/f64 with a range check; strings and bytes
    /// convert into each other. Everything else is a type mismatch.
    pub fn convert_to(&self, target: Type) -> Result<Value> {
        if self.ty == target {
            return Ok(self.clone());
        }
        match target {
            Type::Int8 => Ok(Value::int8(self.integer_in_range(i8::MIN as i128, i8::MAX as i128)? as i8)),
            Type::Int16 => Ok(Value::int16(self.integer_in_range(i16::MIN as i128, i16::MAX as i128)? as i16)),
            Type::Int32 => Ok(Value::int32(self.integer_in_range(i32::MIN as i128, i32::MAX as i128)? as i32)),
            Type::Int64 => Ok(Value::int64(self.integer_in_range(i64::MIN as i128, i64::MAX as i128)? as i64)),
            Type::Int => Ok(Value::int(self.integer_in_range(i64::MIN as i128, i64::MAX as i128)? as i64)),
            Type::Uint8 => Ok(Value::uint8(self.integer_in_range(0, u8::MAX as i128)? as u8)),
            Type::Uint16 => Ok(Value::uint16(self.integer_in_range(0, u16::MAX as i128)? as u16)),
            Type::Uint32 => Ok(Value::uint32(self.integer_in_range(0, u32::MAX as i128)? as u32)),
            Type::Uint64 => Ok(Value::uint64(self.integer_in_range(0, u64::MAX as i128)? as u64)),
            Type::Uint => Ok(Value::uint(self.integer_in_range(0, u64::MAX as i128)? as u64)),
            Type::Float32 => Ok(Value::float32(self.to_f64()? as f32)),
            Type::Float64 => Ok(Value::float64(self.to_f64()?)),
            Type::String if self.ty == Type::Bytes => {
                let s = std::str::from_utf8(&self.data).map_err(|_| {
                    eyre::Report::new(Error::InvalidEncoding("bytes are not valid UTF-8"))
                })?;
                Ok(Value::string(s))
            }
            Type::Bytes if self.ty == Type::String => Ok(Value::bytes(self.data.clone())),
            _ => bail!(Error::TypeMismatch(format!(
                "cannot convert {} to {}",
                self.ty.name(),
                target.name()
            ))),
        }
    }

    fn integer_in_range(&self, min: i128, max: i128) -> Result<i128> {
        if !self.ty.is_integer() {
            bail!(Error::TypeMismatch(format!(
                "cannot convert {} to an integer",
                self.ty.name()
            )));
        }
        let n = self.to_i128()?;
        if n < min || n > max {
            bail!(Error::TypeMismatch(format!(
                "integer {n} out of range for target type"
            )));
        }
        Ok(n)
    }

    /// Compares two values under the coercion lattice.
    pub fn compare(&self, other: &Value) -> Result<Comparison> {
        if self.is_null() || other.is_null() {
            return Ok(Comparison::NullInvolved);
        }
        if self.ty.is_integer() && other.ty.is_integer() {
            return Ok(Comparison::Ordered(self.to_i128()?.cmp(&other.to_i128()?)));
        }
        if self.ty.is_numeric() && other.ty.is_numeric() {
            return Ok(match self.to_f64()?.partial_cmp(&other.to_f64()?) {
                Some(ord) => Comparison::Ordered(ord),
                None => Comparison::Incomparable,
            });
        }
        let textual = |ty: Type| matches!(ty, Type::String | Type::Bytes);
        if textual(self.ty) && textual(other.ty) {
            return Ok(Comparison::Ordered(self.data.cmp(&other.data)));
        }
        if self.ty == Type::Bool && other.ty == Type::Bool {
            return Ok(Comparison::Ordered(
                self.decode_bool()?.cmp(&other.decode_bool()?),
            ));
        }
        Ok(Comparison::Incomparable)
    }

    /// Truthiness used by WHERE, AND and OR: non-zero, non-empty, or true.
    pub fn truthy(&self) -> Result<bool> {
        match self.ty {
            Type::Null => Ok(false),
            Type::Bool => self.decode_bool(),
            Type::Bytes | Type::String => Ok(!self.data.is_empty()),
            Type::Float32 | Type::Float64 => Ok(self.to_f64()? != 0.0),
            _ => Ok(self.to_i128()? != 0),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            Type::Null => write!(f, "NULL"),
            Type::Bool => match self.decode_bool() {
                Ok(v) => write!(f, "{v}"),
                Err(_) => write!(f, "<invalid bool>"),
            },
            Type::String | Type::Bytes => {
                write!(f, "{}", String::from_utf8_lossy(&self.data))
            }
            Type::Float32 | Type::Float64 => match self.to_f64() {
                Ok(v) => write!(f, "{v}"),
                Err(_) => write!(f, "<invalid {}>", self.ty.name()),
            },
            _ => match self.to_i128() {
                Ok(v) => write!(f, "{v}"),
                Err(_) => write!(f, "<invalid {}>", self.ty.name()),
            },
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::int64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::int32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Value {
        Value::uint64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::string(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::string(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Value {
        Value::bytes(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_ordered(values: &[Value]) {
        for (i, a) in values.iter().enumerate() {
            for (j, b) in values.iter().enumerate() {
                assert_eq!(
                    a.data.cmp(&b.data),
                    i.cmp(&j),
                    "encoding order mismatch between {a} and {b}"
                );
            }
        }
    }

    #[test]
    fn int64_roundtrip() {
        for v in [i64::MIN, -1_000_000, -1, 0, 1, 42, i64::MAX] {
            assert_eq!(Value::int64(v).to_i128().unwrap(), v as i128);
        }
    }

    #[test]
    fn int64_encoding_preserves_order() {
        assert_ordered(&[
            Value::int64(i64::MIN),
            Value::int64(-1_000_000),
            Value::int64(-1),
            Value::int64(0),
            Value::int64(1),
            Value::int64(1_000_000),
            Value::int64(i64::MAX),
        ]);
    }

    #[test]
    fn int8_encoding_preserves_order() {
        assert_ordered(&[
            Value::int8(i8::MIN),
            Value::int8(-1),
            Value::int8(0),
            Value::int8(1),
            Value::int8(i8::MAX),
        ]);
    }

    #[test]
    fn int16_and_int32_roundtrip() {
        for v in [i16::MIN, -1, 0, 1, i16::MAX] {
            assert_eq!(Value::int16(v).to_i128().unwrap(), v as i128);
        }
        for v in [i32::MIN, -1, 0, 1, i32::MAX] {
            assert_eq!(Value::int32(v).to_i128().unwrap(), v as i128);
        }
    }

    #[test]
    fn uint_encoding_preserves_order() {
        assert_ordered(&[
            Value::uint64(0),
            Value::uint64(1),
            Value::uint64(1 << 40),
            Value::uint64(u64::MAX),
        ]);
        for v in [0u64, 1, 255, u64::MAX] {
            assert_eq!(Value::uint64(v).to_i128().unwrap(), v as i128);
        }
    }

    #[test]
    fn float64_roundtrip() {
        for v in [
            f64::NEG_INFINITY,
            -1.5e300,
            -2.3,
            -0.0,
            0.0,
            2.3,
            1.5e300,
            f64::INFINITY,
        ] {
            assert_eq!(Value::float64(v).to_f64().unwrap(), v);
        }
    }

    #[test]
    fn float64_encoding_preserves_order() {
        assert_ordered(&[
            Value::float64(f64::NEG_INFINITY),
            Value::float64(-1.5e300),
            Value::float64(-2.3),
            Value::float64(-0.5),
            Value::float64(0.5),
            Value::float64(2.3),
            Value::float64(1.5e300),
            Value::float64(f64::INFINITY),
        ]);
    }

    #[test]
    fn float32_roundtrip_and_order() {
        for v in [-3.5f32, 0.0, 3.5] {
            assert_eq!(Value::float32(v).to_f64().unwrap(), v as f64);
        }
        assert_ordered(&[
            Value::float32(-10.0),
            Value::float32(-0.25),
            Value::float32(0.25),
            Value::float32(10.0),
        ]);
    }

    #[test]
    fn string_encoding_is_raw_content() {
        let v = Value::string("hello");
        assert_eq!(v.data, b"hello");
        assert_eq!(v.decode_string().unwrap(), "hello");
        assert_ordered(&[Value::string(""), Value::string("a"), Value::string("ab")]);
    }

    #[test]
    fn bool_roundtrip_and_order() {
        assert!(!Value::bool(false).decode_bool().unwrap());
        assert!(Value::bool(true).decode_bool().unwrap());
        assert_ordered(&[Value::bool(false), Value::bool(true)]);
    }

    #[test]
    fn malformed_encodings_are_rejected() {
        let v = Value {
            ty: Type::Int64,
            data: vec![0x00, 0x01],
        };
        assert!(Error::InvalidEncoding("wrong length for fixed-size type")
            .is(&v.to_i128().unwrap_err()));

        let v = Value {
            ty: Type::Bool,
            data: vec![7],
        };
        assert!(v.decode_bool().is_err());

        assert!(Value::from_raw(Type::Float64, vec![0; 4]).is_err());
        assert!(Value::from_raw(Type::String, vec![0xFF, 0xFE]).is_err());
    }

    #[test]
    fn smallest_int_picks_narrowest_signed_tag() {
        assert_eq!(Value::smallest_int(-1).ty, Type::Int8);
        assert_eq!(Value::smallest_int(127).ty, Type::Int8);
        assert_eq!(Value::smallest_int(128).ty, Type::Int16);
        assert_eq!(Value::smallest_int(40_000).ty, Type::Int32);
        assert_eq!(Value::smallest_int(1 << 40).ty, Type::Int64);
    }

    #[test]
    fn cross_width_integer_comparison_is_exact() {
        let a = Value::int8(2);
        let b = Value::int64(2);
        assert_eq!(
            a.compare(&b).unwrap(),
            Comparison::Ordered(Ordering::Equal)
        );
        let big = Value::uint64(u64::MAX);
        let neg = Value::int8(-1);
        assert_eq!(
            neg.compare(&big).unwrap(),
            Comparison::Ordered(Ordering::Less)
        );
    }

    #[test]
    fn float_and_integer_compare_through_f64() {
        let a = Value::int32(2);
        let b = Value::float64(2.5);
        assert_eq!(a.compare(&b).unwrap(), Comparison::Ordered(Ordering::Less));
    }

    #[test]
    fn null_comparisons_are_flagged() {
        assert_eq!(
            Value::null().compare(&Value::int8(1)).unwrap(),
            Comparison::NullInvolved
        );
    }

    #[test]
    fn mismatched_kinds_are_incomparable() {
        assert_eq!(
            Value::int8(1).compare(&Value::string("1")).unwrap(),
            Comparison::Incomparable
        );
    }

    #[test]
    fn conversion_widens_and_checks_range() {
        let v = Value::int8(2).convert_to(Type::Int64).unwrap();
        assert_eq!(v.ty, Type::Int64);
        assert_eq!(v.to_i128().unwrap(), 2);

        assert!(Value::int16(300).convert_to(Type::Int8).is_err());
        assert!(Value::int8(-1).convert_to(Type::Uint8).is_err());
        assert!(Value::string("a").convert_to(Type::Int64).is_err());
    }

    #[test]
    fn truthiness() {
        assert!(!Value::null().truthy().unwrap());
        assert!(!Value::bool(false).truthy().unwrap());
        assert!(Value::bool(true).truthy().unwrap());
        assert!(!Value::int8(0).truthy().unwrap());
        assert!(Value::int8(3).truthy().unwrap());
        assert!(!Value::string("").truthy().unwrap());
        assert!(Value::string("x").truthy().unwrap());
        assert!(!Value::float64(0.0).truthy().unwrap());
    }

    #[test]
    fn display_formats_for_csv() {
        assert_eq!(Value::int8(1).to_string(), "1");
        assert_eq!(Value::float64(2.3).to_string(), "2.3");
        assert_eq!(Value::bool(true).to_string(), "true");
        assert_eq!(Value::string("a").to_string(), "a");
        assert_eq!(Value::null().to_string(), "NULL");
    }
}
