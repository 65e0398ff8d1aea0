/*
 * reference.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Reference resolution and output.
//!
//! A chain such as `$order.customer.name()` is resolved left to right. Every
//! step first asks a duck-typed host object, then consults the resolution
//! cache of the node, and only then the introspector. The first null ends
//! the chain.

use std::sync::Arc;

use super::Renderer;
use crate::ast::{Accessor, NodeId, Reference, ReferenceKind, SourcePos};
use crate::context::Context;
use crate::error::{VtlError, VtlResult};
use crate::introspect::{MethodLookup, ValueType};
use crate::template::Member;
use crate::value::Value;

impl Renderer<'_> {
    /// Write a reference node.
    ///
    /// An odd number of leading backslashes escapes the reference: one
    /// backslash is dropped and the literal is written without evaluating
    /// anything. An even number is written as-is in front of the value.
    pub(super) fn render_reference(
        &mut self,
        reference: &Reference,
        ctx: &mut Context,
        out: &mut String,
    ) -> VtlResult<()> {
        if reference.is_escaped() {
            push_backslashes(out, reference.escapes - 1);
            out.push_str(&reference.literal);
            return Ok(());
        }

        push_backslashes(out, reference.escapes);
        if reference.kind == ReferenceKind::Runt {
            out.push_str(&reference.literal);
            return Ok(());
        }

        let mut visited = Vec::new();
        let value = self.resolve(reference, &reference.chain, ctx, Some(&mut visited))?;
        let value = match &self.events {
            Some(hooks) => hooks.reference_insert(&visited, &reference.literal, value),
            None => value,
        };

        match value {
            Some(value) => out.push_str(&value.to_string()),
            None if reference.kind == ReferenceKind::Quiet => {}
            None => {
                let literal = self
                    .literals
                    .last()
                    .and_then(|map| map.get(&reference.id))
                    .cloned()
                    .unwrap_or_else(|| reference.literal.clone());
                out.push_str(&literal);
                if self.services.config().log_invalid_references {
                    self.warn(
                        "invalid-reference",
                        format!("{literal} is not a valid reference"),
                        reference.pos,
                    );
                }
            }
        }
        Ok(())
    }

    /// Value of a reference in an expression.
    pub(super) fn reference_value(
        &mut self,
        reference: &Reference,
        ctx: &mut Context,
    ) -> VtlResult<Option<Value>> {
        self.resolve(reference, &reference.chain, ctx, None)
    }

    /// Resolve the root of `reference` followed by `accessors`. With
    /// `visited`, every non-null value along the way is recorded.
    pub(super) fn resolve(
        &mut self,
        reference: &Reference,
        accessors: &[Accessor],
        ctx: &mut Context,
        mut visited: Option<&mut Vec<Value>>,
    ) -> VtlResult<Option<Value>> {
        let Some(mut current) = ctx.get(&reference.root).cloned() else {
            return Ok(None);
        };

        for accessor in accessors {
            if let Some(visited) = visited.as_deref_mut() {
                visited.push(current.clone());
            }
            let next = match accessor {
                Accessor::Identifier { id, name, pos } => {
                    self.get_property(reference, &current, *id, name, *pos)?
                }
                Accessor::Method { id, name, args, pos } => {
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(self.evaluate(arg, ctx)?);
                    }
                    self.call_method(reference, &current, *id, name, values, *pos)?
                }
            };
            match next {
                Some(value) => current = value,
                None => return Ok(None),
            }
        }

        if let Some(visited) = visited {
            visited.push(current.clone());
        }
        Ok(Some(current))
    }

    fn get_property(
        &mut self,
        reference: &Reference,
        target: &Value,
        id: NodeId,
        name: &str,
        pos: SourcePos,
    ) -> VtlResult<Option<Value>> {
        if let Value::Object(object) = target {
            if let Some(duck) = object.duck() {
                return Ok(duck.get(name));
            }
        }
        if let Some(quoted) = quote_property(target, name) {
            return Ok(Some(quoted));
        }

        let ty = target.type_of();
        let property = match self.cache.get(id, &ty, &[]) {
            Some(Member::Property(property)) => property,
            _ => {
                let Some(found) = self.services.introspector().find_property(&ty, name) else {
                    return Ok(None);
                };
                let found = Arc::new(found);
                self.cache
                    .insert(id, ty.clone(), Vec::new(), Member::Property(found.clone()));
                found
            }
        };

        match property.get(target) {
            Ok(value) => Ok(value),
            Err(e) => self.invocation_failed(reference, property.class_name(), property.name(), e, pos),
        }
    }

    fn call_method(
        &mut self,
        reference: &Reference,
        target: &Value,
        id: NodeId,
        name: &str,
        args: Vec<Option<Value>>,
        pos: SourcePos,
    ) -> VtlResult<Option<Value>> {
        if let Value::Object(object) = target {
            if let Some(duck) = object.duck() {
                return match duck.invoke(name, &args) {
                    Ok(value) => Ok(value),
                    Err(e) => self.invocation_failed(reference, object.class_name(), name, e, pos),
                };
            }
        }

        let ty = target.type_of();
        let arg_types: Vec<Option<ValueType>> =
            args.iter().map(|arg| arg.as_ref().map(Value::type_of)).collect();
        let method = match self.cache.get(id, &ty, &arg_types) {
            Some(Member::Method(method)) => method,
            _ => match self.services.introspector().find_method(&ty, name, &arg_types) {
                MethodLookup::Found(method) => {
                    self.cache
                        .insert(id, ty.clone(), arg_types, Member::Method(method.clone()));
                    method
                }
                MethodLookup::NotFound => return Ok(None),
                MethodLookup::Ambiguous(candidates) => {
                    self.error(
                        "ambiguous-method",
                        format!(
                            "ambiguous method {}.{name}: {}",
                            ty.name(),
                            candidates.join(", ")
                        ),
                        pos,
                    );
                    return Ok(None);
                }
            },
        };

        match method.invoke(target, args) {
            Ok(value) => Ok(value),
            Err(e) => self.invocation_failed(reference, method.class_name(), method.name(), e, pos),
        }
    }

    /// Write `value` to the last accessor of `reference`, whose prefix
    /// resolved to `target`.
    pub(super) fn set_property(
        &mut self,
        reference: &Reference,
        target: &Value,
        id: NodeId,
        name: &str,
        value: Value,
        pos: SourcePos,
    ) -> VtlResult<()> {
        if let Value::Object(object) = target {
            if let Some(duck) = object.duck() {
                if !duck.set(name, value) {
                    self.error(
                        "set-failed",
                        format!("{} refused to set '{name}'", object.class_name()),
                        pos,
                    );
                }
                return Ok(());
            }
        }

        let ty = target.type_of();
        let value_ty = value.type_of();
        let arg_types = vec![Some(value_ty.clone())];
        let setter = match self.cache.get(id, &ty, &arg_types) {
            Some(Member::Setter(setter)) => setter,
            _ => {
                let Some(found) = self.services.introspector().find_setter(&ty, name, &value_ty)
                else {
                    self.error(
                        "set-failed",
                        format!(
                            "no writable property '{name}' on {} in {}",
                            ty.name(),
                            reference.literal
                        ),
                        pos,
                    );
                    return Ok(());
                };
                let found = Arc::new(found);
                self.cache
                    .insert(id, ty.clone(), arg_types, Member::Setter(found.clone()));
                found
            }
        };

        if let Err(e) = setter.set(target, value) {
            self.invocation_failed(reference, ty.name(), setter.name(), e, pos)?;
        }
        Ok(())
    }

    /// Hand a failed invocation to the method exception hook. Fails unless the
    /// hook supplies a value.
    fn invocation_failed(
        &self,
        reference: &Reference,
        class_name: &str,
        method: &str,
        error: anyhow::Error,
        pos: SourcePos,
    ) -> VtlResult<Option<Value>> {
        let replacement = self
            .events
            .as_ref()
            .and_then(|hooks| hooks.method_exception(class_name, method, &error));
        if let Some(value) = replacement {
            tracing::debug!(method, class = class_name, "method exception replaced by hook");
            return Ok(Some(value));
        }
        Err(VtlError::MethodInvocation {
            method: method.to_string(),
            reference: reference.literal.clone(),
            template: self.source.clone(),
            line: pos.line,
            column: pos.column,
            source: error,
        })
    }
}

/// `to_quote` and `to_squote` wrap strings and numbers in quotes.
fn quote_property(target: &Value, name: &str) -> Option<Value> {
    let quote = match name {
        "to_quote" => '"',
        "to_squote" => '\'',
        _ => return None,
    };
    if !matches!(target, Value::String(_)) && !target.is_number() {
        return None;
    }
    let text = target.to_string();
    let escaped = text.replace(quote, &format!("\\{quote}"));
    Some(Value::String(format!("{quote}{escaped}{quote}")))
}

fn push_backslashes(out: &mut String, count: usize) {
    out.extend(std::iter::repeat_n('\\', count));
}
