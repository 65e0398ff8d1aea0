/*
 * events.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Optional event hooks attached to a [`Context`](crate::Context).

use std::fmt;

use crate::value::Value;

type ReferenceInsertFn =
    dyn Fn(&[Value], &str, Option<Value>) -> Option<Value> + Send + Sync;
type NullSetFn = dyn Fn(&str, &str) -> bool + Send + Sync;
type MethodExceptionFn = dyn Fn(&str, &str, &anyhow::Error) -> Option<Value> + Send + Sync;

/// Handlers invoked at the three interception points of a merge.
///
/// Each hook is optional; an unset hook leaves the default behavior alone.
#[derive(Default)]
pub struct EventHooks {
    reference_insert: Option<Box<ReferenceInsertFn>>,
    null_set: Option<Box<NullSetFn>>,
    method_exception: Option<Box<MethodExceptionFn>>,
}

impl EventHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace values right before they are rendered.
    ///
    /// The handler receives the objects visited from the root of the reference
    /// to its leaf, the reference literal, and the value about to be written.
    pub fn on_reference_insert(
        mut self,
        handler: impl Fn(&[Value], &str, Option<Value>) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.reference_insert = Some(Box::new(handler));
        self
    }

    /// Decide whether a `#set` with a null right-hand side is logged.
    ///
    /// The handler receives the left and right literals and returns `false`
    /// to suppress the warning.
    pub fn on_null_set(
        mut self,
        handler: impl Fn(&str, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.null_set = Some(Box::new(handler));
        self
    }

    /// Supply a value in place of a failed method invocation.
    ///
    /// The handler receives the class name, the method name and the error.
    /// Returning `Some` renders that value in place of the call; returning
    /// `None` lets the failure abort the merge as if no hook were set.
    pub fn on_method_exception(
        mut self,
        handler: impl Fn(&str, &str, &anyhow::Error) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.method_exception = Some(Box::new(handler));
        self
    }

    pub(crate) fn reference_insert(
        &self,
        chain: &[Value],
        literal: &str,
        value: Option<Value>,
    ) -> Option<Value> {
        match &self.reference_insert {
            Some(handler) => handler(chain, literal, value),
            None => value,
        }
    }

    pub(crate) fn should_log_null_set(&self, lhs: &str, rhs: &str) -> bool {
        self.null_set.as_ref().is_none_or(|handler| handler(lhs, rhs))
    }

    /// Replacement value for a failed invocation. `None` when no handler is
    /// registered or the handler has no value, so the failure propagates.
    pub(crate) fn method_exception(
        &self,
        class_name: &str,
        method: &str,
        error: &anyhow::Error,
    ) -> Option<Value> {
        self.method_exception
            .as_ref()
            .and_then(|handler| handler(class_name, method, error))
    }
}

impl fmt::Debug for EventHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHooks")
            .field("reference_insert", &self.reference_insert.is_some())
            .field("null_set", &self.null_set.is_some())
            .field("method_exception", &self.method_exception.is_some())
            .finish()
    }
}
