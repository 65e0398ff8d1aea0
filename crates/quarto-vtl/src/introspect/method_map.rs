/*
 * method_map.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Overload selection.
//!
//! Among the candidates applicable to the actual argument types, the most
//! specific one wins. A candidate is more specific than another when each of
//! its differing parameters could be passed to the other's parameter but not
//! the reverse. Several maximal candidates are a tie; a tie is broken in favor
//! of the single candidate not declared on an interface, otherwise the call
//! is ambiguous.

use std::cmp::Ordering;
use std::sync::Arc;

use super::registry::{MethodDef, TypeRegistry};
use super::types::ValueType;

/// Outcome of selecting among overloads.
#[derive(Debug, Clone)]
pub(crate) enum Selection {
    Found(Arc<MethodDef>),
    NotFound,
    Ambiguous(Vec<Arc<MethodDef>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Specificity {
    More,
    Less,
    Incomparable,
}

/// Select the most specific applicable candidate for `args`
/// (`None` entries are null arguments).
pub(crate) fn most_specific(
    registry: &TypeRegistry,
    candidates: &[Arc<MethodDef>],
    args: &[Option<ValueType>],
) -> Selection {
    let applicable: Vec<&Arc<MethodDef>> = candidates
        .iter()
        .filter(|method| is_applicable(registry, method, args))
        .collect();

    match applicable.len() {
        0 => return Selection::NotFound,
        1 => return Selection::Found(applicable[0].clone()),
        _ => {}
    }

    let mut maximals: Vec<&Arc<MethodDef>> = Vec::new();
    for app in applicable {
        let mut less_specific = false;
        let mut i = 0;
        while !less_specific && i < maximals.len() {
            match compare(registry, app, maximals[i], args.len()) {
                Specificity::More => {
                    maximals.remove(i);
                }
                Specificity::Less => less_specific = true,
                Specificity::Incomparable => i += 1,
            }
        }
        if !less_specific {
            maximals.push(app);
        }
    }

    if maximals.len() == 1 {
        return Selection::Found(maximals[0].clone());
    }

    let concrete: Vec<&Arc<MethodDef>> = maximals
        .iter()
        .copied()
        .filter(|method| !method.declared_on_interface)
        .collect();
    if concrete.len() == 1 {
        return Selection::Found(concrete[0].clone());
    }

    Selection::Ambiguous(maximals.into_iter().cloned().collect())
}

/// Whether `method` can be called with arguments of the given types.
pub(crate) fn is_applicable(
    registry: &TypeRegistry,
    method: &MethodDef,
    args: &[Option<ValueType>],
) -> bool {
    let fixed = method.params.len();
    let arity_ok = match method.rest {
        None => args.len() == fixed,
        Some(_) => args.len() >= fixed,
    };
    arity_ok
        && effective_params(method, args.len())
            .iter()
            .zip(args)
            .all(|(formal, actual)| registry.is_convertible(formal, actual.as_ref()))
}

/// Declared parameter types expanded to `count` arguments.
fn effective_params(method: &MethodDef, count: usize) -> Vec<ValueType> {
    let mut params = method.params.clone();
    if let Some(rest) = &method.rest {
        while params.len() < count {
            params.push(rest.clone());
        }
    }
    params
}

fn compare(registry: &TypeRegistry, a: &MethodDef, b: &MethodDef, count: usize) -> Specificity {
    let a_params = effective_params(a, count);
    let b_params = effective_params(b, count);

    let mut a_more = false;
    let mut b_more = false;
    for (pa, pb) in a_params.iter().zip(&b_params) {
        if pa != pb {
            a_more = a_more || registry.is_convertible(pb, Some(pa));
            b_more = b_more || registry.is_convertible(pa, Some(pb));
        }
    }

    match (a_more, b_more) {
        (true, true) => Specificity::Incomparable,
        (true, false) => Specificity::More,
        (false, true) => Specificity::Less,
        // Same effective signature: a fixed arity beats a rest parameter.
        (false, false) => match a.rest.is_some().cmp(&b.rest.is_some()) {
            Ordering::Less => Specificity::More,
            Ordering::Greater => Specificity::Less,
            Ordering::Equal => Specificity::Incomparable,
        },
    }
}
