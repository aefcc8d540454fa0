//! Self-describing binary encoding for keychain values
//!
//! Every encoded value starts with a one byte type tag followed by a
//! type-specific payload:
//!
//! | Type        | Tag | Payload                                              |
//! |-------------|-----|------------------------------------------------------|
//! | `Bytes`     | 1   | raw bytes (may be empty)                             |
//! | `String`    | 2   | UTF-8 bytes (may be empty)                           |
//! | `Boolean`   | 3   | 1 byte, `0` is false                                 |
//! | `Long`      | 4   | 8 bytes, big-endian two's complement                 |
//! | `Float`     | 5   | 4 bytes, big-endian IEEE-754                         |
//! | `StringSet` | 6   | `count:i32` then `count` x (`len:i32` + UTF-8 bytes) |
//!
//! Decoding with an accessor for a different tag is a `TypeMismatch`, never a
//! coercion.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{KeychainError, Result};

/// Type tag stored as the first byte of every encoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    Bytes = 1,
    String = 2,
    Boolean = 3,
    Long = 4,
    Float = 5,
    StringSet = 6,
}

impl ValueType {
    /// The tag byte for this type
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Map a tag byte back to its type
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ValueType::Bytes),
            2 => Some(ValueType::String),
            3 => Some(ValueType::Boolean),
            4 => Some(ValueType::Long),
            5 => Some(ValueType::Float),
            6 => Some(ValueType::StringSet),
            _ => None,
        }
    }

    /// Exact encoded length (tag included) for fixed-size types
    fn fixed_len(self) -> Option<usize> {
        match self {
            ValueType::Boolean => Some(1 + 1),
            ValueType::Long => Some(1 + 8),
            ValueType::Float => Some(1 + 4),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Bytes => "Bytes",
            ValueType::String => "String",
            ValueType::Boolean => "Boolean",
            ValueType::Long => "Long",
            ValueType::Float => "Float",
            ValueType::StringSet => "StringSet",
        };
        f.write_str(name)
    }
}

fn describe_tag(tag: u8) -> String {
    match ValueType::from_tag(tag) {
        Some(value_type) => value_type.to_string(),
        None => format!("Unknown({:#04x})", tag),
    }
}

/// A value that can be stored in a keychain
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Bytes(Vec<u8>),
    String(String),
    Boolean(bool),
    Long(i64),
    Float(f32),
    StringSet(BTreeSet<String>),
}

impl TypedValue {
    /// Type tag of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            TypedValue::Bytes(_) => ValueType::Bytes,
            TypedValue::String(_) => ValueType::String,
            TypedValue::Boolean(_) => ValueType::Boolean,
            TypedValue::Long(_) => ValueType::Long,
            TypedValue::Float(_) => ValueType::Float,
            TypedValue::StringSet(_) => ValueType::StringSet,
        }
    }

    /// Encode into the tagged byte representation
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(match self {
            TypedValue::Bytes(value) => encode_bytes(value),
            TypedValue::String(value) => encode_string(value),
            TypedValue::Boolean(value) => encode_bool(*value),
            TypedValue::Long(value) => encode_long(*value),
            TypedValue::Float(value) => encode_float(*value),
            TypedValue::StringSet(value) => encode_string_set(value)?,
        })
    }

    /// Decode any encoded value, whatever its tag
    pub fn decode(encoded: &[u8]) -> Result<Self> {
        match value_type_of(encoded)? {
            ValueType::Bytes => decode_bytes(encoded).map(TypedValue::Bytes),
            ValueType::String => decode_string(encoded).map(TypedValue::String),
            ValueType::Boolean => decode_bool(encoded).map(TypedValue::Boolean),
            ValueType::Long => decode_long(encoded).map(TypedValue::Long),
            ValueType::Float => decode_float(encoded).map(TypedValue::Float),
            ValueType::StringSet => decode_string_set(encoded).map(TypedValue::StringSet),
        }
    }
}

// Encode

pub fn encode_bytes(value: &[u8]) -> Vec<u8> {
    tagged(ValueType::Bytes, value)
}

pub fn encode_string(value: &str) -> Vec<u8> {
    tagged(ValueType::String, value.as_bytes())
}

pub fn encode_bool(value: bool) -> Vec<u8> {
    vec![ValueType::Boolean.tag(), u8::from(value)]
}

pub fn encode_long(value: i64) -> Vec<u8> {
    tagged(ValueType::Long, &value.to_be_bytes())
}

pub fn encode_float(value: f32) -> Vec<u8> {
    tagged(ValueType::Float, &value.to_be_bytes())
}

/// Encode a set of strings. Counts and lengths are written as big-endian
/// `i32`; a set or member longer than `i32::MAX` is `ValueTooLarge`.
pub fn encode_string_set(strings: &BTreeSet<String>) -> Result<Vec<u8>> {
    let payload_len: usize = strings.iter().map(|s| 4 + s.len()).sum();
    let mut encoded = Vec::with_capacity(1 + 4 + payload_len);
    encoded.push(ValueType::StringSet.tag());
    encoded.extend_from_slice(&length_prefix(strings.len())?);
    for string in strings {
        encoded.extend_from_slice(&length_prefix(string.len())?);
        encoded.extend_from_slice(string.as_bytes());
    }
    Ok(encoded)
}

fn length_prefix(len: usize) -> Result<[u8; 4]> {
    i32::try_from(len)
        .map(i32::to_be_bytes)
        .map_err(|_| KeychainError::ValueTooLarge {
            len,
            max: i32::MAX as usize,
        })
}

fn tagged(value_type: ValueType, payload: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(1 + payload.len());
    encoded.push(value_type.tag());
    encoded.extend_from_slice(payload);
    encoded
}

// Decode

/// Read the type tag of an encoded value
pub fn value_type_of(encoded: &[u8]) -> Result<ValueType> {
    let tag = *encoded
        .first()
        .ok_or_else(|| KeychainError::MalformedData("Invalid encoded keychain content".to_string()))?;
    ValueType::from_tag(tag)
        .ok_or_else(|| KeychainError::MalformedData(format!("Unknown type tag {:#04x}", tag)))
}

pub fn decode_bytes(encoded: &[u8]) -> Result<Vec<u8>> {
    Ok(payload(encoded, ValueType::Bytes)?.to_vec())
}

pub fn decode_string(encoded: &[u8]) -> Result<String> {
    let payload = payload(encoded, ValueType::String)?;
    String::from_utf8(payload.to_vec())
        .map_err(|e| KeychainError::MalformedData(format!("Invalid UTF-8 in String value: {}", e)))
}

pub fn decode_bool(encoded: &[u8]) -> Result<bool> {
    let payload = payload(encoded, ValueType::Boolean)?;
    Ok(payload[0] != 0)
}

pub fn decode_long(encoded: &[u8]) -> Result<i64> {
    let payload = payload(encoded, ValueType::Long)?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(payload);
    Ok(i64::from_be_bytes(bytes))
}

pub fn decode_float(encoded: &[u8]) -> Result<f32> {
    let payload = payload(encoded, ValueType::Float)?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(payload);
    Ok(f32::from_be_bytes(bytes))
}

pub fn decode_string_set(encoded: &[u8]) -> Result<BTreeSet<String>> {
    let mut reader = Reader::new(payload(encoded, ValueType::StringSet)?);
    let count = reader.read_len("Set<String> count")?;
    let mut strings = BTreeSet::new();
    for _ in 0..count {
        let len = reader.read_len("Set<String> entry length")?;
        let bytes = reader.read_bytes(len)?;
        let string = String::from_utf8(bytes.to_vec()).map_err(|e| {
            KeychainError::MalformedData(format!("Invalid UTF-8 in Set<String> entry: {}", e))
        })?;
        strings.insert(string);
    }
    Ok(strings)
}

/// Check the tag and size constraints, then return the payload
fn payload(encoded: &[u8], expected: ValueType) -> Result<&[u8]> {
    let tag = *encoded
        .first()
        .ok_or_else(|| KeychainError::MalformedData("Invalid encoded keychain content".to_string()))?;
    if tag != expected.tag() {
        return Err(KeychainError::TypeMismatch {
            expected,
            found: describe_tag(tag),
        });
    }
    if let Some(len) = expected.fixed_len() {
        if encoded.len() != len {
            return Err(KeychainError::MalformedData(format!(
                "Invalid length for {} value: expected {}, got {}",
                expected,
                len - 1,
                encoded.len() - 1
            )));
        }
    }
    if expected == ValueType::StringSet && encoded.len() < 1 + 4 {
        return Err(KeychainError::MalformedData(
            "Not enough bytes for Set<String> value".to_string(),
        ));
    }
    Ok(&encoded[1..])
}

/// Bounds-checked big-endian reader over a payload
struct Reader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(KeychainError::MalformedData(format!(
                "Not enough bytes for Set<String> value: need {}, have {}",
                len,
                self.remaining()
            )));
        }
        let bytes = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    fn read_len(&mut self, what: &str) -> Result<usize> {
        let bytes = self.read_bytes(4)?;
        let value = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        usize::try_from(value)
            .map_err(|_| KeychainError::MalformedData(format!("Negative {}: {}", what, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_roundtrip_all_types() {
        let values = vec![
            TypedValue::Bytes(vec![]),
            TypedValue::Bytes(b"Hello world!".to_vec()),
            TypedValue::String(String::new()),
            TypedValue::String("Příliš žluťoučký kůň".to_string()),
            TypedValue::Boolean(true),
            TypedValue::Boolean(false),
            TypedValue::Long(0),
            TypedValue::Long(7710177),
            TypedValue::Long(i64::MIN),
            TypedValue::Float(3.14159),
            TypedValue::Float(-99.0),
            TypedValue::StringSet(set(&[])),
            TypedValue::StringSet(set(&["", "a", "b"])),
        ];

        for value in values {
            let encoded = value.encode().unwrap();
            assert_eq!(encoded[0], value.value_type().tag());
            assert_eq!(TypedValue::decode(&encoded).unwrap(), value);
        }
    }

    #[test]
    fn test_long_is_big_endian() {
        let encoded = encode_long(1);
        assert_eq!(encoded, vec![4, 0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_string_set_layout() {
        let encoded = encode_string_set(&set(&["ab"])).unwrap();
        assert_eq!(encoded, vec![6, 0, 0, 0, 1, 0, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn test_length_prefix_overflow() {
        assert_eq!(length_prefix(258).unwrap(), [0, 0, 1, 2]);
        assert_eq!(length_prefix(i32::MAX as usize).unwrap(), [0x7f, 0xff, 0xff, 0xff]);
        assert!(matches!(
            length_prefix(i32::MAX as usize + 1),
            Err(KeychainError::ValueTooLarge { .. })
        ));
    }

    #[test]
    fn test_type_mismatch_is_never_coerced() {
        let encoded = encode_bool(true);

        let err = decode_long(&encoded).unwrap_err();
        match err {
            KeychainError::TypeMismatch { expected, found } => {
                assert_eq!(expected, ValueType::Long);
                assert_eq!(found, "Boolean");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(matches!(decode_string(&encoded), Err(KeychainError::TypeMismatch { .. })));
        assert!(matches!(decode_bytes(&encoded), Err(KeychainError::TypeMismatch { .. })));
        assert!(matches!(decode_float(&encoded), Err(KeychainError::TypeMismatch { .. })));
        assert!(matches!(decode_string_set(&encoded), Err(KeychainError::TypeMismatch { .. })));
    }

    #[test]
    fn test_fixed_size_length_is_validated() {
        assert!(matches!(decode_bool(&[3]), Err(KeychainError::MalformedData(_))));
        assert!(matches!(decode_bool(&[3, 1, 0]), Err(KeychainError::MalformedData(_))));
        assert!(matches!(decode_long(&[4, 0, 0, 0]), Err(KeychainError::MalformedData(_))));
        assert!(matches!(decode_float(&[5, 0, 0, 0, 0, 0]), Err(KeychainError::MalformedData(_))));
    }

    #[test]
    fn test_empty_input_is_malformed() {
        assert!(matches!(decode_bytes(&[]), Err(KeychainError::MalformedData(_))));
        assert!(matches!(TypedValue::decode(&[]), Err(KeychainError::MalformedData(_))));
    }

    #[test]
    fn test_unknown_tag() {
        assert!(matches!(TypedValue::decode(&[42, 1]), Err(KeychainError::MalformedData(_))));
        match decode_string(&[42]) {
            Err(KeychainError::TypeMismatch { found, .. }) => assert_eq!(found, "Unknown(0x2a)"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_string_set_underflow() {
        // Declares 2 entries but carries only one
        let mut encoded = encode_string_set(&set(&["one"])).unwrap();
        encoded[4] = 2;
        assert!(matches!(decode_string_set(&encoded), Err(KeychainError::MalformedData(_))));

        // Entry length exceeds the remaining buffer
        let encoded = vec![6, 0, 0, 0, 1, 0, 0, 0, 9, b'x'];
        assert!(matches!(decode_string_set(&encoded), Err(KeychainError::MalformedData(_))));

        // Missing count
        assert!(matches!(decode_string_set(&[6, 0, 0]), Err(KeychainError::MalformedData(_))));
    }

    #[test]
    fn test_string_set_negative_count() {
        let encoded = vec![6, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(matches!(decode_string_set(&encoded), Err(KeychainError::MalformedData(_))));
    }

    #[test]
    fn test_invalid_utf8_string() {
        assert!(matches!(decode_string(&[2, 0xC3]), Err(KeychainError::MalformedData(_))));
    }
}
