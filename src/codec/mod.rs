//! Parameter codec.
//!
//! A [`ParameterMap`] maps parameter names to ordered value lists where each
//! value is a string or an explicit null. Maps are serialized as JSON and
//! wrapped in URL-safe, unpadded base64 so that a token can be embedded in a
//! query string. Names are kept sorted, which makes encoding deterministic.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HubError, Result};

/// Ordered, possibly multi-valued, possibly null-bearing parameter map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterMap(BTreeMap<String, Vec<Option<String>>>);

impl ParameterMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a dynamic value against the `name -> [string | null]` shape.
    ///
    /// `null` is accepted and yields an empty map.
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = match value {
            Value::Null => return Ok(Self::new()),
            Value::Object(object) => object,
            other => {
                return Err(HubError::InvalidParameters(format!(
                    "expected an object of value lists, got {}",
                    type_name(other)
                )))
            }
        };

        let mut map = BTreeMap::new();
        for (name, values) in object {
            let Value::Array(items) = values else {
                return Err(HubError::InvalidParameters(format!(
                    "parameter '{name}' must map to an array, got {}",
                    type_name(values)
                )));
            };
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => list.push(Some(s.clone())),
                    Value::Null => list.push(None),
                    other => {
                        return Err(HubError::InvalidParameters(format!(
                            "parameter '{name}' contains a {} value",
                            type_name(other)
                        )))
                    }
                }
            }
            map.insert(name.clone(), list);
        }
        Ok(Self(map))
    }

    /// Dynamic view of the map.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(name, values)| {
                    let items = values
                        .iter()
                        .map(|v| v.clone().map_or(Value::Null, Value::String))
                        .collect();
                    (name.clone(), Value::Array(items))
                })
                .collect(),
        )
    }

    /// All values of a parameter.
    pub fn get(&self, name: &str) -> Option<&[Option<String>]> {
        self.0.get(name).map(Vec::as_slice)
    }

    /// First value of a parameter, if present and non-null.
    pub fn get_value(&self, name: &str) -> Option<&str> {
        self.0.get(name)?.first()?.as_deref()
    }

    /// Replace the values of a parameter.
    pub fn set(&mut self, name: impl Into<String>, values: Vec<Option<String>>) {
        self.0.insert(name.into(), values);
    }

    /// Set a parameter to a single string value.
    pub fn set_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), vec![Some(value.into())]);
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        self.set(name, values);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<Option<String>>> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parameter names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Option<String>])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl FromIterator<(String, Vec<Option<String>>)> for ParameterMap {
    fn from_iter<I: IntoIterator<Item = (String, Vec<Option<String>>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ParameterMap {
    type Item = (String, Vec<Option<String>>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Vec<Option<String>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Encode a parameter map into a URL-embeddable token.
pub fn encode(map: &ParameterMap) -> Result<String> {
    encode_payload(map)
}

/// Decode a token produced by [`encode`].
pub fn decode(token: &str) -> Result<ParameterMap> {
    let value: Value = decode_payload(token)?;
    ParameterMap::from_value(&value).map_err(|e| HubError::InvalidToken(e.to_string()))
}

/// Serialize any payload as base64url-wrapped JSON.
pub(crate) fn encode_payload<T: Serialize + ?Sized>(payload: &T) -> Result<String> {
    let json = serde_json::to_vec(payload)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Inverse of [`encode_payload`].
pub(crate) fn decode_payload<T: DeserializeOwned>(token: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.as_bytes())
        .map_err(|e| HubError::InvalidToken(format!("bad base64: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| HubError::InvalidToken(format!("bad payload: {e}")))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
