//! Orchestration context
//!
//! The context is the data a pipeline accumulates as it runs: the chosen
//! network, which clients were installed, and so on. It is stored as a
//! JSON-valued map so it persists verbatim in the state file, and read back
//! through typed [`ContextKey`]s.
//!
//! The Orchestrator only ever adds to a context. A step may remove keys it
//! owns through [`Context::remove`].

use crate::error::{KeeperError, KeeperResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

/// Typed name of a context entry
pub struct ContextKey<T> {
    name: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _type: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextKey<T> {}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextKey({})", self.name)
    }
}

/// Key-value data threaded through and persisted between steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Context::set`]
    pub fn with<T: Serialize>(mut self, key: ContextKey<T>, value: T) -> KeeperResult<Self> {
        self.set(key, value)?;
        Ok(self)
    }

    pub fn set<T: Serialize>(&mut self, key: ContextKey<T>, value: T) -> KeeperResult<()> {
        let value = serde_json::to_value(value)?;
        self.values.insert(key.name.to_string(), value);
        Ok(())
    }

    /// Read an entry; `Ok(None)` when absent, an error when present with the
    /// wrong shape.
    pub fn get<T: DeserializeOwned>(&self, key: ContextKey<T>) -> KeeperResult<Option<T>> {
        match self.values.get(key.name) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| KeeperError::ContextType {
                    key: key.name.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Read an entry a step cannot run without
    pub fn require<T: DeserializeOwned>(&self, step: &str, key: ContextKey<T>) -> KeeperResult<T> {
        self.get(key)?
            .ok_or_else(|| KeeperError::MissingContextVariable {
                step: step.to_string(),
                key: key.name.to_string(),
            })
    }

    /// Entry with a fallback for optional keys
    pub fn get_or<T: DeserializeOwned>(&self, key: ContextKey<T>, default: T) -> KeeperResult<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    pub fn remove<T>(&mut self, key: ContextKey<T>) -> Option<Value> {
        self.values.remove(key.name)
    }

    pub fn insert_raw(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get_raw(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// First name in `names` that has no entry
    pub fn first_missing<'a>(&self, names: &[&'a str]) -> Option<&'a str> {
        names.iter().copied().find(|name| !self.contains(name))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
