/*
 * test_events.rs
 * Copyright (c) 2025 Posit, PBC
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;
use quarto_vtl::{ClassBuilder, Context, Engine, EventHooks, Value, ValueType, VtlError};

fn engine() -> Engine {
    Engine::builder()
        .register_class(ClassBuilder::new("Flaky").method("call", [ValueType::Int], |_, args| {
            match args.first().and_then(|a| a.as_ref()) {
                Some(Value::Int(n)) if *n > 0 => Ok(Some(Value::Int(*n))),
                _ => anyhow::bail!("non-positive input"),
            }
        }).property("state", |_| anyhow::bail!("offline")))
        .build()
        .expect("engine should build")
}

#[derive(Debug)]
struct Flaky;

impl quarto_vtl::HostObject for Flaky {
    fn class_name(&self) -> &str {
        "Flaky"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[test]
fn test_reference_insert_escapes_output() {
    let hooks = EventHooks::new().on_reference_insert(|_, _, value| match value {
        Some(Value::String(s)) => Some(Value::String(s.replace('<', "&lt;"))),
        other => other,
    });
    let mut ctx = Context::new().with_events(hooks);
    ctx.put("html", Value::from("<b>"));
    ctx.put("n", Value::Int(3));
    let out = engine()
        .evaluate(&mut ctx, "$html $n #foreach($c in ['<i>'])$c#end", "t.vm")
        .unwrap();
    assert_eq!(out, "&lt;b> 3 &lt;i>");
}

#[test]
fn test_reference_insert_can_fill_nulls() {
    let hooks = EventHooks::new().on_reference_insert(|_, literal, value| {
        value.or_else(|| Some(Value::String(format!("[{literal}]"))))
    });
    let mut ctx = Context::new().with_events(hooks);
    let out = engine().evaluate(&mut ctx, "$missing.name", "t.vm").unwrap();
    assert_eq!(out, "[$missing.name]");
}

#[test]
fn test_null_set_hook_decides_logging() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let hooks = EventHooks::new().on_null_set(move |lhs, rhs| {
        counter.fetch_add(1, Ordering::SeqCst);
        !(lhs == "$quiet" && rhs == "$nothing")
    });
    let mut ctx = Context::new().with_events(hooks);
    let engine = engine();
    let template = engine
        .parse("#set($quiet = $nothing)#set($loud = $nothing)", "t.vm")
        .unwrap();
    let (out, diagnostics) = engine.merge_with_diagnostics(&template, &mut ctx).unwrap();
    assert_eq!(out, "");
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    let null_sets = diagnostics.iter().filter(|d| d.code == "null-set").count();
    assert_eq!(null_sets, 1);
}

#[test]
fn test_method_exception_hook_supplies_value() {
    let hooks = EventHooks::new().on_method_exception(|class, method, err| {
        Some(Value::String(format!("{class}.{method}: {err}")))
    });
    let mut ctx = Context::new().with_events(hooks);
    ctx.put("f", Value::object(Flaky));
    let out = engine()
        .evaluate(&mut ctx, "$f.call(2) $f.call(0)", "t.vm")
        .unwrap();
    assert_eq!(out, "2 Flaky.call: non-positive input");
}

#[test]
fn test_method_exception_hook_sees_property_class() {
    let hooks = EventHooks::new()
        .on_method_exception(|class, method, err| Some(Value::String(format!("{class}.{method}: {err}"))));
    let mut ctx = Context::new().with_events(hooks);
    ctx.put("f", Value::object(Flaky));
    let out = engine().evaluate(&mut ctx, "$f.state", "t.vm").unwrap();
    assert_eq!(out, "Flaky.state: offline");
}

#[test]
fn test_method_exception_without_hook_fails() {
    let mut ctx = Context::new();
    ctx.put("f", Value::object(Flaky));
    assert!(engine().evaluate(&mut ctx, "$f.call(0)", "t.vm").is_err());
}

#[test]
fn test_method_exception_hook_can_decline() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let hooks = EventHooks::new().on_method_exception(move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        None
    });
    let mut ctx = Context::new().with_events(hooks);
    ctx.put("f", Value::object(Flaky));
    let err = engine()
        .evaluate(&mut ctx, "a $f.call(0) b", "t.vm")
        .unwrap_err();
    assert!(matches!(err, VtlError::MethodInvocation { ref method, .. } if method == "call"));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}
