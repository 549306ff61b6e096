//! Vendor-extra field passthrough.
//!
//! Wire structs that need to forward unrecognized JSON fields embed an
//! [`Extras`] via `#[serde(flatten)]` instead of round-tripping through a
//! loose `serde_json::Value` at each call site.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Arbitrary additional JSON fields carried alongside a typed struct.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extras(pub HashMap<String, Value>);

impl Extras {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Merge `other` into `self`, keeping `self`'s value on key collision.
    pub fn merge(&mut self, other: Extras) {
        for (k, v) in other.0 {
            self.0.entry(k).or_insert(v);
        }
    }

    pub fn into_map(self) -> HashMap<String, Value> {
        self.0
    }
}

impl From<HashMap<String, Value>> for Extras {
    fn from(map: HashMap<String, Value>) -> Self {
        Self(map)
    }
}
