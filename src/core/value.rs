// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Schema-less payload values.
//!
//! Tool arguments, tool results, and resource contents have no static shape.
//! `AnyValue` is a closed union over the JSON value kinds. Decoding tries the
//! kinds in a fixed order (integer, float, string, bool, array, object, null),
//! so an integral JSON number always lands in `Int` and never loses precision
//! through a floating-point path.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{self, SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use crate::core::errors::CodecError;

/// An untyped JSON value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AnyValue {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Array(Vec<AnyValue>),
    Object(BTreeMap<String, AnyValue>),
    #[default]
    Null,
}

impl AnyValue {
    /// Build an object from key/value pairs.
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<AnyValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        AnyValue::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Convert any serializable value into an `AnyValue`.
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self, CodecError> {
        let json = serde_json::to_value(value).map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(AnyValue::from(json))
    }

    /// Decode this value into a concrete type.
    pub fn decode_into<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        let json = serde_json::to_value(self).map_err(|e| CodecError::Encode(e.to_string()))?;
        serde_json::from_value(json).map_err(|e| CodecError::Decode(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnyValue::Int(_) => "int",
            AnyValue::Float(_) => "float",
            AnyValue::String(_) => "string",
            AnyValue::Bool(_) => "bool",
            AnyValue::Array(_) => "array",
            AnyValue::Object(_) => "object",
            AnyValue::Null => "null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AnyValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AnyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AnyValue::Int(i) => Some(*i as f64),
            AnyValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AnyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[AnyValue]> {
        match self {
            AnyValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, AnyValue>> {
        match self {
            AnyValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key when this value is an object.
    pub fn get(&self, key: &str) -> Option<&AnyValue> {
        self.as_object().and_then(|map| map.get(key))
    }
}

/// Integral floats that fit in `i64` canonicalize to `Int`.
fn number_from_f64(v: f64) -> AnyValue {
    // 2^63 is exactly representable and already out of range
    const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < I64_UPPER {
        AnyValue::Int(v as i64)
    } else {
        AnyValue::Float(v)
    }
}

impl Serialize for AnyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AnyValue::Int(i) => serializer.serialize_i64(*i),
            AnyValue::Float(f) => {
                if !f.is_finite() {
                    return Err(ser::Error::custom(format!(
                        "non-finite float {f} has no JSON representation"
                    )));
                }
                serializer.serialize_f64(*f)
            }
            AnyValue::String(s) => serializer.serialize_str(s),
            AnyValue::Bool(b) => serializer.serialize_bool(*b),
            AnyValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            AnyValue::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            AnyValue::Null => serializer.serialize_unit(),
        }
    }
}

struct AnyValueVisitor;

impl<'de> Visitor<'de> for AnyValueVisitor {
    type Value = AnyValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer, float, string, bool, array, object, or null")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<AnyValue, E> {
        Ok(AnyValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<AnyValue, E> {
        Ok(i64::try_from(v)
            .map(AnyValue::Int)
            .unwrap_or(AnyValue::Float(v as f64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<AnyValue, E> {
        Ok(number_from_f64(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<AnyValue, E> {
        Ok(AnyValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<AnyValue, E> {
        Ok(AnyValue::String(v))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<AnyValue, E> {
        Ok(AnyValue::Bool(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<AnyValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(AnyValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<AnyValue, A::Error> {
        let mut map = BTreeMap::new();
        while let Some((k, v)) = access.next_entry::<String, AnyValue>()? {
            map.insert(k, v);
        }
        Ok(AnyValue::Object(map))
    }

    fn visit_unit<E: de::Error>(self) -> Result<AnyValue, E> {
        Ok(AnyValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<AnyValue, E> {
        Ok(AnyValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<AnyValue, D::Error> {
        deserializer.deserialize_any(AnyValueVisitor)
    }
}

impl<'de> Deserialize<'de> for AnyValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AnyValueVisitor)
    }
}

impl From<serde_json::Value> for AnyValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => AnyValue::Null,
            Value::Bool(b) => AnyValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    AnyValue::Int(i)
                } else {
                    number_from_f64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => AnyValue::String(s),
            Value::Array(items) => AnyValue::Array(items.into_iter().map(AnyValue::from).collect()),
            Value::Object(map) => {
                AnyValue::Object(map.into_iter().map(|(k, v)| (k, AnyValue::from(v))).collect())
            }
        }
    }
}

impl From<i64> for AnyValue {
    fn from(v: i64) -> Self {
        AnyValue::Int(v)
    }
}

impl From<i32> for AnyValue {
    fn from(v: i32) -> Self {
        AnyValue::Int(i64::from(v))
    }
}

impl From<u32> for AnyValue {
    fn from(v: u32) -> Self {
        AnyValue::Int(i64::from(v))
    }
}

impl From<f64> for AnyValue {
    fn from(v: f64) -> Self {
        AnyValue::Float(v)
    }
}

impl From<bool> for AnyValue {
    fn from(v: bool) -> Self {
        AnyValue::Bool(v)
    }
}

impl From<&str> for AnyValue {
    fn from(v: &str) -> Self {
        AnyValue::String(v.to_string())
    }
}

impl From<String> for AnyValue {
    fn from(v: String) -> Self {
        AnyValue::String(v)
    }
}

impl From<Vec<AnyValue>> for AnyValue {
    fn from(v: Vec<AnyValue>) -> Self {
        AnyValue::Array(v)
    }
}

impl From<BTreeMap<String, AnyValue>> for AnyValue {
    fn from(v: BTreeMap<String, AnyValue>) -> Self {
        AnyValue::Object(v)
    }
}

impl<T: Into<AnyValue>> From<Option<T>> for AnyValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(AnyValue::Null)
    }
}
