//! Runtime values carried by records on both sides of the codec.

use crate::bits::BitString;
use std::collections::HashMap;

/// A single codable value (scalar, sequence, or dynamic envelope).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Signed integer (two's-complement on the wire).
    Int(i64),
    /// Unsigned integer; also carries decoded UTF codepoints.
    Uint(u64),
    /// IEEE-754 float; 16- and 32-bit wire widths widen losslessly.
    Float(f64),
    /// Raw bits of arbitrary length.
    Bits(BitString),
    /// Whole bytes.
    Bytes(Vec<u8>),
    /// Text for the utf8/utf16/utf32 kinds.
    Str(String),
    /// Homogeneous element sequence (array segments).
    List(Vec<Value>),
    /// Envelope for dynamic-sized segments: the value plus its wire size.
    Dynamic(DynamicSegment),
    /// Absent value: skip segments, or a dynamic segment encoded as zero bits.
    Nil,
}

/// Value/size pair held by every dynamic segment field, on encode input and
/// decode output alike. `size_bits` is the intended on-wire size in bits.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicSegment {
    pub value: Box<Value>,
    pub size_bits: usize,
}

impl DynamicSegment {
    pub fn new(value: Value, size_bits: usize) -> Self {
        DynamicSegment {
            value: Box::new(value),
            size_bits,
        }
    }
}

impl Value {
    /// Wraps a value in a [DynamicSegment] envelope.
    pub fn dynamic(value: Value, size_bits: usize) -> Value {
        Value::Dynamic(DynamicSegment::new(value, size_bits))
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint(x) => Some(*x),
            Value::Int(x) => (*x).try_into().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(x) => Some(*x),
            Value::Uint(x) => (*x).try_into().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_bits(&self) -> Option<&BitString> {
        match self {
            Value::Bits(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_dynamic(&self) -> Option<&DynamicSegment> {
        match self {
            Value::Dynamic(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

/// One record of a block: a value per declared segment plus the `leftover`
/// suffix the decoder did not consume.
///
/// Field order lives in the [crate::block::Block] descriptor; the record
/// itself is just the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: HashMap<String, Value>,
    pub leftover: BitString,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Builder-style set, for assembling encode inputs inline.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }
}
