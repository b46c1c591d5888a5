use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Data carried by a block
///
/// A closed set of JSON shapes. `null` is deliberately absent, so any
/// document containing it fails to deserialize.
///
/// Integers outside the `i64`/`u64` range are read as `f64` and lose
/// precision, so a block carrying one re-hashes differently from how it was
/// sealed elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Bool(bool),
    Number(Number),
    Text(String),
    List(Vec<Payload>),
    /// Keys are kept sorted, which the canonical encoding relies on
    Map(BTreeMap<String, Payload>),
}

impl Payload {
    /// Creates a numeric payload from a float
    ///
    /// Returns `None` for NaN and infinities, which JSON cannot represent.
    pub fn float(value: f64) -> Option<Self> {
        Number::from_f64(value).map(Payload::Number)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<bool> for Payload {
    fn from(value: bool) -> Self {
        Payload::Bool(value)
    }
}

impl From<i64> for Payload {
    fn from(value: i64) -> Self {
        Payload::Number(value.into())
    }
}

impl From<u64> for Payload {
    fn from(value: u64) -> Self {
        Payload::Number(value.into())
    }
}

impl From<Vec<Payload>> for Payload {
    fn from(value: Vec<Payload>) -> Self {
        Payload::List(value)
    }
}

impl From<BTreeMap<String, Payload>> for Payload {
    fn from(value: BTreeMap<String, Payload>) -> Self {
        Payload::Map(value)
    }
}
