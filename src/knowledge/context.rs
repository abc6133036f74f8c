//! Stimulus context passed to knowledge.
//!
//! A [`Context`] is an open bag of named JSON values:
//! - the caller fills it with stimulus data before a pass
//! - knowledge reads it, and may write side effects back
//! - the caller (or a compose finalizer) reads the result afterwards
//!
//! An absent field and a field holding `null` are different things:
//! `get` returns `None` for the former and `Some(&Value::Null)` for the latter.
//!
//! # Example
//!
//! ```
//! use gi_engine::Context;
//! use serde_json::json;
//!
//! let mut ctx = Context::new().with("row", json!([3, 5, 8]));
//! ctx.append("accum", json!("step")).unwrap();
//!
//! assert!(ctx.contains("row"));
//! assert_eq!(ctx.get("accum"), Some(&json!(["step"])));
//! ```

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ContextError;

/// Mutable attribute bag handed to every callback of a pass.
///
/// # Thread Safety
///
/// `Context` has no internal locking. A pass borrows it mutably, so two
/// passes cannot share one without the caller wrapping it in its own lock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    fields: HashMap<String, Value>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON object, one field per key.
    pub fn from_json(value: Value) -> Result<Self, ContextError> {
        match value {
            Value::Object(map) => Ok(Self {
                fields: map.into_iter().collect(),
            }),
            _ => Err(ContextError::NotAnObject),
        }
    }

    /// Set a field and return the context (builder style).
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Whether the field is present (a `null` value counts as present).
    #[inline]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Get a field.
    #[inline]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Get a field for in-place mutation.
    #[inline]
    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    /// Read a field as `T`.
    ///
    /// Returns `Ok(None)` when the field is absent.
    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> Result<Option<T>, ContextError> {
        self.fields
            .get(field)
            .map(|v| {
                T::deserialize(v).map_err(|e| ContextError::Conversion {
                    field: field.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    /// Insert a raw value, returning the previous one.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Serialize `value` into a field, returning the previous value.
    pub fn set<T: Serialize>(
        &mut self,
        field: impl Into<String>,
        value: &T,
    ) -> Result<Option<Value>, ContextError> {
        let field = field.into();
        let value = serde_json::to_value(value).map_err(|e| ContextError::Conversion {
            field: field.clone(),
            message: e.to_string(),
        })?;
        Ok(self.fields.insert(field, value))
    }

    /// Remove a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Get a field, initializing it with `init` if absent.
    pub fn get_or_insert_with<F>(&mut self, field: impl Into<String>, init: F) -> &mut Value
    where
        F: FnOnce() -> Value,
    {
        self.fields.entry(field.into()).or_insert_with(init)
    }

    /// Push `value` onto an array field, creating the array on first use.
    ///
    /// Fails without modifying the context if the field holds a non-array.
    pub fn append(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), ContextError> {
        let field = field.into();
        match self
            .fields
            .entry(field.clone())
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(items) => {
                items.push(value.into());
                Ok(())
            }
            _ => Err(ContextError::NotAnArray { field }),
        }
    }

    /// Number of fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the context has no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over `(field, value)` pairs in arbitrary order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
