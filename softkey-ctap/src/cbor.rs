//! CBOR encoding helpers
//!
//! Thin wrappers over `ciborium` for building integer-keyed CBOR maps with
//! caller-controlled entry order. Relying parties verify signatures over the
//! exact bytes we emit, so map ordering is owned by the call site and never
//! left to a map container.

use crate::error::{EncodeError, Result};

use ciborium::value::Value;

/// Serialize a CBOR value to bytes
pub fn encode_value(value: &Value) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::into_writer(value, &mut buffer).map_err(|_| EncodeError::Cbor)?;
    Ok(buffer)
}

/// Build a CBOR map with integer keys in insertion order
pub struct MapBuilder {
    entries: Vec<(Value, Value)>,
}

impl MapBuilder {
    /// Create a new map builder
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert an integer key and value
    pub fn insert(mut self, key: i64, value: Value) -> Self {
        self.entries.push((Value::Integer(key.into()), value));
        self
    }

    /// Build the map as a CBOR Value
    pub fn build_value(self) -> Value {
        Value::Map(self.entries)
    }

    /// Build the map and encode to CBOR bytes
    pub fn build(self) -> Result<Vec<u8>> {
        encode_value(&self.build_value())
    }
}

impl Default for MapBuilder {
    fn default() -> Self {
        Self::new()
    }
}
