//! Capture arbitrary `Serialize` values into [`Value`].
//!
//! A small serde serializer that builds a `Value` tree directly. Unlike a
//! round trip through `serde_json::Value` it keeps non-finite floats, applies
//! the string-length and depth limits, and never fails: anything that cannot
//! be represented becomes a descriptive string.

use super::Value;
use crate::utils::config::{
    DEFAULT_MAX_DEPTH, DEFAULT_MAX_STRING_LEN, MAX_DEPTH_MARKER, TRUNCATION_SUFFIX,
};
use serde::ser::{self, Serialize};
use std::fmt;

/// Limits applied while capturing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureLimits {
    pub max_string_len: usize,
    pub max_depth: usize,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            max_string_len: DEFAULT_MAX_STRING_LEN,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Capture a value, falling back to a description if serialization fails
pub fn capture<T: Serialize + ?Sized>(value: &T, limits: CaptureLimits) -> Value {
    value
        .serialize(ValueSerializer { limits, depth: 0 })
        .unwrap_or_else(|e| Value::Str(format!("<unserializable: {}>", e)))
}

#[derive(Debug)]
pub struct CaptureError(String);

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CaptureError {}

impl ser::Error for CaptureError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        CaptureError(msg.to_string())
    }
}

#[derive(Clone, Copy)]
struct ValueSerializer {
    limits: CaptureLimits,
    depth: usize,
}

impl ValueSerializer {
    fn child(self) -> Self {
        Self {
            limits: self.limits,
            depth: self.depth + 1,
        }
    }

    fn at_limit(self) -> bool {
        self.depth >= self.limits.max_depth
    }

    fn string(self, s: &str) -> Value {
        if s.chars().count() > self.limits.max_string_len {
            let keep = self
                .limits
                .max_string_len
                .saturating_sub(TRUNCATION_SUFFIX.len());
            let mut truncated: String = s.chars().take(keep).collect();
            truncated.push_str(TRUNCATION_SUFFIX);
            Value::Str(truncated)
        } else {
            Value::Str(s.to_string())
        }
    }

    fn seq(self, variant: Option<&'static str>, len: Option<usize>) -> SeqCollector {
        SeqCollector {
            ser: self,
            variant,
            truncated: self.at_limit(),
            items: Vec::with_capacity(len.unwrap_or(0).min(1024)),
        }
    }

    fn map(self, variant: Option<&'static str>, len: Option<usize>) -> MapCollector {
        MapCollector {
            ser: self,
            variant,
            truncated: self.at_limit(),
            entries: Vec::with_capacity(len.unwrap_or(0).min(1024)),
            pending_key: None,
        }
    }
}

fn key_string(key: Value) -> String {
    match key {
        Value::Str(s) => s,
        other => other.canonical_key(),
    }
}

fn wrap_variant(variant: Option<&'static str>, inner: Value) -> Value {
    match variant {
        Some(name) => Value::Map(vec![(name.to_string(), inner)]),
        None => inner,
    }
}

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = CaptureError;
    type SerializeSeq = SeqCollector;
    type SerializeTuple = SeqCollector;
    type SerializeTupleStruct = SeqCollector;
    type SerializeTupleVariant = SeqCollector;
    type SerializeMap = MapCollector;
    type SerializeStruct = MapCollector;
    type SerializeStructVariant = MapCollector;

    fn serialize_bool(self, v: bool) -> Result<Value, CaptureError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, CaptureError> {
        Ok(Value::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, CaptureError> {
        Ok(Value::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, CaptureError> {
        Ok(Value::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, CaptureError> {
        Ok(Value::Int(v))
    }

    fn serialize_i128(self, v: i128) -> Result<Value, CaptureError> {
        Ok(i64::try_from(v).map_or(Value::Float(v as f64), Value::Int))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, CaptureError> {
        Ok(Value::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, CaptureError> {
        Ok(Value::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, CaptureError> {
        Ok(Value::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, CaptureError> {
        Ok(Value::from(v))
    }

    fn serialize_u128(self, v: u128) -> Result<Value, CaptureError> {
        Ok(i64::try_from(v).map_or(Value::Float(v as f64), Value::Int))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, CaptureError> {
        Ok(Value::Float(f64::from(v)))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, CaptureError> {
        Ok(Value::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<Value, CaptureError> {
        Ok(Value::Str(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, CaptureError> {
        Ok(self.string(v))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, CaptureError> {
        if self.at_limit() {
            return Ok(Value::Str(MAX_DEPTH_MARKER.to_string()));
        }
        Ok(Value::List(v.iter().map(|b| Value::from(*b)).collect()))
    }

    fn serialize_none(self) -> Result<Value, CaptureError> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value, CaptureError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, CaptureError> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, CaptureError> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value, CaptureError> {
        Ok(Value::Str(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, CaptureError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, CaptureError> {
        if self.at_limit() {
            return Ok(Value::Str(MAX_DEPTH_MARKER.to_string()));
        }
        let inner = value.serialize(self.child())?;
        Ok(wrap_variant(Some(variant), inner))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqCollector, CaptureError> {
        Ok(self.seq(None, len))
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqCollector, CaptureError> {
        Ok(self.seq(None, Some(len)))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqCollector, CaptureError> {
        Ok(self.seq(None, Some(len)))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SeqCollector, CaptureError> {
        Ok(self.seq(Some(variant), Some(len)))
    }

    fn serialize_map(self, len: Option<usize>) -> Result<MapCollector, CaptureError> {
        Ok(self.map(None, len))
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<MapCollector, CaptureError> {
        Ok(self.map(None, Some(len)))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<MapCollector, CaptureError> {
        Ok(self.map(Some(variant), Some(len)))
    }
}

struct SeqCollector {
    ser: ValueSerializer,
    variant: Option<&'static str>,
    truncated: bool,
    items: Vec<Value>,
}

impl SeqCollector {
    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CaptureError> {
        if !self.truncated {
            self.items.push(value.serialize(self.ser.child())?);
        }
        Ok(())
    }

    fn finish(self) -> Value {
        if self.truncated {
            return Value::Str(MAX_DEPTH_MARKER.to_string());
        }
        wrap_variant(self.variant, Value::List(self.items))
    }
}

impl ser::SerializeSeq for SeqCollector {
    type Ok = Value;
    type Error = CaptureError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CaptureError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, CaptureError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTuple for SeqCollector {
    type Ok = Value;
    type Error = CaptureError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CaptureError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, CaptureError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleStruct for SeqCollector {
    type Ok = Value;
    type Error = CaptureError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CaptureError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, CaptureError> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleVariant for SeqCollector {
    type Ok = Value;
    type Error = CaptureError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CaptureError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, CaptureError> {
        Ok(self.finish())
    }
}

struct MapCollector {
    ser: ValueSerializer,
    variant: Option<&'static str>,
    truncated: bool,
    entries: Vec<(String, Value)>,
    pending_key: Option<String>,
}

impl MapCollector {
    fn insert<T: Serialize + ?Sized>(&mut self, key: String, value: &T) -> Result<(), CaptureError> {
        if !self.truncated {
            let value = value.serialize(self.ser.child())?;
            self.entries.push((key, value));
        }
        Ok(())
    }

    fn finish(self) -> Value {
        if self.truncated {
            return Value::Str(MAX_DEPTH_MARKER.to_string());
        }
        wrap_variant(self.variant, Value::Map(self.entries))
    }
}

impl ser::SerializeMap for MapCollector {
    type Ok = Value;
    type Error = CaptureError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), CaptureError> {
        if !self.truncated {
            self.pending_key = Some(key_string(key.serialize(self.ser.child())?));
        }
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CaptureError> {
        if self.truncated {
            return Ok(());
        }
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| CaptureError("map value without key".to_string()))?;
        self.insert(key, value)
    }

    fn end(self) -> Result<Value, CaptureError> {
        Ok(self.finish())
    }
}

impl ser::SerializeStruct for MapCollector {
    type Ok = Value;
    type Error = CaptureError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), CaptureError> {
        self.insert(key.to_string(), value)
    }

    fn end(self) -> Result<Value, CaptureError> {
        Ok(self.finish())
    }
}

impl ser::SerializeStructVariant for MapCollector {
    type Ok = Value;
    type Error = CaptureError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), CaptureError> {
        self.insert(key.to_string(), value)
    }

    fn end(self) -> Result<Value, CaptureError> {
        Ok(self.finish())
    }
}
