/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The variable environment a template is merged against.
//!
//! A [`Context`] may wrap one inner context. Lookups fall back to the inner
//! context, writes always land in the outer one. The empty key is never
//! stored: every operation on it is a no-op.

use std::collections::HashMap;
use std::sync::Arc;

use crate::events::EventHooks;
use crate::value::Value;

/// A chained key/value environment.
#[derive(Debug, Default)]
pub struct Context {
    /// Variable bindings at this level.
    vars: HashMap<String, Value>,

    /// Read-only fallback for lookups.
    inner: Option<Arc<Context>>,

    /// Hooks consulted while merging against this context.
    events: Option<Arc<EventHooks>>,
}

impl Context {
    /// Create a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that falls back to `inner` for lookups.
    pub fn with_inner(inner: Arc<Context>) -> Self {
        Self {
            vars: HashMap::new(),
            events: inner.events.clone(),
            inner: Some(inner),
        }
    }

    /// Attach event hooks.
    pub fn with_events(mut self, events: EventHooks) -> Self {
        self.events = Some(Arc::new(events));
        self
    }

    pub(crate) fn events(&self) -> Option<&Arc<EventHooks>> {
        self.events.as_ref()
    }

    /// Look up a value here, then in the inner context.
    pub fn get(&self, key: &str) -> Option<&Value> {
        if key.is_empty() {
            return None;
        }
        self.vars
            .get(key)
            .or_else(|| self.inner.as_ref().and_then(|inner| inner.get(key)))
    }

    /// Look up a value in this layer only.
    pub fn get_local(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Store a value in this layer, returning the value it replaced here.
    pub fn put(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        if key.is_empty() {
            return None;
        }
        self.vars.insert(key, value)
    }

    /// Whether the key is bound here or in the inner context.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove a value from this layer.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        if key.is_empty() {
            return None;
        }
        self.vars.remove(key)
    }

    /// Keys bound in this layer, not including the inner context.
    pub fn keys(&self) -> Vec<&str> {
        self.vars.keys().map(String::as_str).collect()
    }

    /// The inner context, if any.
    pub fn inner(&self) -> Option<&Arc<Context>> {
        self.inner.as_ref()
    }
}
