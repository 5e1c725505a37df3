//! Per-call context
//!
//! A [`Context`] is an opaque key/value bag accumulated through a call.
//! Middleware may only add or override keys; every merge produces a new
//! value, so concurrent calls sharing a procedure never interfere.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Opaque key/value bag threaded through a single call.
///
/// Merging is shallow and right-biased: on key conflict the right-hand
/// side wins. Merge is associative in practice (later always wins) but
/// not commutative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(HashMap<String, Value>);

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a key, overriding any existing value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the context holds no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shallow right-biased merge: `other`'s keys win on conflict.
    ///
    /// If either side is empty the other is returned unchanged.
    pub fn merge(self, other: Context) -> Context {
        if other.is_empty() {
            return self;
        }
        if self.is_empty() {
            return other;
        }
        let mut merged = self.0;
        merged.extend(other.0);
        Context(merged)
    }

    /// Iterate over entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<HashMap<String, Value>> for Context {
    fn from(map: HashMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
