// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

/// A single scalar component of a logical partition key.
#[derive(Clone, Debug, PartialEq)]
pub enum PartitionKeyValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl PartitionKeyValue {
    pub(crate) fn to_json(&self) -> serde_json::Value {
        match self {
            PartitionKeyValue::Null => serde_json::Value::Null,
            PartitionKeyValue::Bool(b) => serde_json::Value::Bool(*b),
            PartitionKeyValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PartitionKeyValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl Serialize for PartitionKeyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for PartitionKeyValue {
    fn from(value: &str) -> Self {
        PartitionKeyValue::String(value.to_string())
    }
}

impl From<String> for PartitionKeyValue {
    fn from(value: String) -> Self {
        PartitionKeyValue::String(value)
    }
}

impl From<f64> for PartitionKeyValue {
    fn from(value: f64) -> Self {
        PartitionKeyValue::Number(value)
    }
}

impl From<i64> for PartitionKeyValue {
    fn from(value: i64) -> Self {
        PartitionKeyValue::Number(value as f64)
    }
}

impl From<bool> for PartitionKeyValue {
    fn from(value: bool) -> Self {
        PartitionKeyValue::Bool(value)
    }
}

/// A logical partition key: the ordered scalar components that place an item
/// within the container's partition scheme.
///
/// Most containers use a single component; hierarchical partition keys carry
/// one component per defined path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartitionKey(Vec<PartitionKeyValue>);

impl PartitionKey {
    pub fn new(components: Vec<PartitionKeyValue>) -> Self {
        Self(components)
    }

    pub fn components(&self) -> &[PartitionKeyValue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The single string component, when this key is exactly one string.
    pub(crate) fn as_single_string(&self) -> Option<&str> {
        match self.0.as_slice() {
            [PartitionKeyValue::String(s)] => Some(s.as_str()),
            _ => None,
        }
    }
}

impl Serialize for PartitionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for component in &self.0 {
            seq.serialize_element(component)?;
        }
        seq.end()
    }
}

macro_rules! partition_key_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for PartitionKey {
            fn from(value: $ty) -> Self {
                Self(vec![value.into()])
            }
        })*
    };
}

partition_key_from!(&str, String, f64, i64, bool);

impl From<Vec<PartitionKeyValue>> for PartitionKey {
    fn from(components: Vec<PartitionKeyValue>) -> Self {
        Self(components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_json_array() {
        let pk = PartitionKey::new(vec![
            PartitionKeyValue::String("tenant1".into()),
            PartitionKeyValue::Number(42.0),
            PartitionKeyValue::Bool(true),
            PartitionKeyValue::Null,
        ]);
        let json = serde_json::to_string(&pk).unwrap();
        assert_eq!(json, r#"["tenant1",42.0,true,null]"#);
    }

    #[test]
    fn single_string_accessor() {
        let pk: PartitionKey = "tenant1".into();
        assert_eq!(pk.as_single_string(), Some("tenant1"));

        let pk: PartitionKey = 5i64.into();
        assert_eq!(pk.as_single_string(), None);
    }
}
