//! Loosely-typed tree with the exact duplicate-key behavior the digest
//! depends on.
//!
//! Some upstream producers emit JSON objects with repeated member names.
//! The digest contract collapses repeats to the FIRST occurrence, and
//! checksum comparisons depend on that exact behavior. `serde_json::Value`
//! collapses to the last occurrence, so parsing goes through a hand-written
//! visitor that observes every member in order.

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<CanonicalValue>),
    /// Members in source order, duplicates already collapsed to the first.
    Object(Vec<(String, CanonicalValue)>),
}

impl CanonicalValue {
    pub fn member(&self, name: &str) -> Option<&CanonicalValue> {
        match self {
            CanonicalValue::Object(members) => members
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }
}

/// Parse JSON bytes, keeping the first occurrence of duplicate members.
pub fn parse(bytes: &[u8]) -> Result<CanonicalValue, serde_json::Error> {
    serde_json::from_slice(bytes)
}

impl From<&serde_json::Value> for CanonicalValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CanonicalValue::Null,
            serde_json::Value::Bool(b) => CanonicalValue::Bool(*b),
            serde_json::Value::Number(n) => CanonicalValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => CanonicalValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                CanonicalValue::Array(items.iter().map(CanonicalValue::from).collect())
            }
            serde_json::Value::Object(members) => CanonicalValue::Object(
                members
                    .iter()
                    .map(|(key, value)| (key.clone(), CanonicalValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl<'de> Deserialize<'de> for CanonicalValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(CanonicalVisitor)
    }
}

struct CanonicalVisitor;

impl<'de> Visitor<'de> for CanonicalVisitor {
    type Value = CanonicalValue;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("any JSON value")
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(CanonicalValue::Null)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E> {
        Ok(CanonicalValue::Null)
    }

    fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E> {
        Ok(CanonicalValue::Bool(value))
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E> {
        Ok(CanonicalValue::Number(value as f64))
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E> {
        Ok(CanonicalValue::Number(value as f64))
    }

    fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E> {
        Ok(CanonicalValue::Number(value))
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E> {
        Ok(CanonicalValue::String(value.to_string()))
    }

    fn visit_string<E>(self, value: String) -> Result<Self::Value, E> {
        Ok(CanonicalValue::String(value))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(CanonicalValue::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut members: Vec<(String, CanonicalValue)> = Vec::new();
        while let Some((key, value)) = map.next_entry::<String, CanonicalValue>()? {
            // First occurrence wins.
            if !members.iter().any(|(existing, _)| *existing == key) {
                members.push((key, value));
            }
        }
        Ok(CanonicalValue::Object(members))
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        de::Deserialize::deserialize(deserializer)
    }
}
