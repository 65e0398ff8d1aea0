/*
 * test_introspection.rs
 * Copyright (c) 2025 Posit, PBC
 */

use std::any::Any;
use std::sync::Mutex;

use anyhow::Context as _;
use pretty_assertions::assert_eq;
use quarto_vtl::{ClassBuilder, Context, Engine, HostObject, Value, ValueType};

#[derive(Debug, Default)]
struct Report {
    label: Mutex<String>,
}

impl HostObject for Report {
    fn class_name(&self) -> &str {
        "Report"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn render(&self) -> String {
        "<report>".to_string()
    }
}

fn report(this: &Value) -> anyhow::Result<&Report> {
    this.downcast_ref::<Report>().context("not a Report")
}

fn report_class() -> ClassBuilder {
    ClassBuilder::new("Report")
        .method("describe", [ValueType::Object], |_, _| Ok(Some(Value::from("object"))))
        .method("describe", [ValueType::String], |_, _| Ok(Some(Value::from("string"))))
        .method("describe", [ValueType::Long], |_, _| Ok(Some(Value::from("long"))))
        .variadic_method("join", [ValueType::String], ValueType::String, |_, args| {
            let separator = args
                .first()
                .and_then(|a| a.as_ref())
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let Some(Some(Value::List(rest))) = args.get(1) else {
                anyhow::bail!("rest arguments missing");
            };
            let parts: Vec<String> = rest.read().iter().map(ToString::to_string).collect();
            Ok(Some(Value::String(parts.join(&separator))))
        })
        .property("Title", |_| Ok(Some(Value::from("Quarterly"))))
        .method("getAuthor", [], |_, _| Ok(Some(Value::from("Ada"))))
        .method("isReady", [], |_, _| Ok(Some(Value::Bool(true))))
        .method("getLabel", [], |this, _| {
            let label = report(this)?.label.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
            Ok(Some(Value::String(label.clone())))
        })
        .void_method("setLabel", [ValueType::String], |this, args| {
            let value = args
                .first()
                .and_then(|a| a.as_ref())
                .map(ToString::to_string)
                .unwrap_or_default();
            *report(this)?.label.lock().map_err(|_| anyhow::anyhow!("poisoned"))? = value;
            Ok(())
        })
        .method("fail", [], |_, _| anyhow::bail!("boom"))
}

fn engine() -> Engine {
    Engine::builder()
        .register_class(report_class())
        .build()
        .expect("engine should build")
}

fn render(source: &str) -> String {
    let mut ctx = Context::new();
    ctx.put("r", Value::object(Report::default()));
    engine()
        .evaluate(&mut ctx, source, "report.vm")
        .expect("render should succeed")
}

#[test]
fn test_most_specific_overload_wins() {
    assert_eq!(
        render("$r.describe('x') $r.describe(5) $r.describe($r) $r.describe($nothing)"),
        "string long object string"
    );
}

#[test]
fn test_variadic_arguments_are_packed() {
    assert_eq!(render("$r.join('-', 'a', 'b', 'c')"), "a-b-c");
    assert_eq!(render("[$r.join('-')]"), "[]");
}

#[test]
fn test_property_lookup_order() {
    assert_eq!(render("$r.title $r.TITLE $r.Title"), "Quarterly Quarterly Quarterly");
    assert_eq!(render("$r.author $r.ready"), "Ada true");
    assert_eq!(render("$r"), "<report>");
}

#[test]
fn test_set_through_setter_method() {
    assert_eq!(render("#set($r.label = 'draft')$r.label"), "draft");
}

#[test]
fn test_unknown_member_renders_literal() {
    assert_eq!(render("$r.missing $r.nope(1)"), "$r.missing $r.nope(1)");
}

#[test]
fn test_failed_method_aborts_merge() {
    let mut ctx = Context::new();
    ctx.put("r", Value::object(Report::default()));
    let err = engine()
        .evaluate(&mut ctx, "ok $r.fail()", "report.vm")
        .expect_err("method failure should abort");
    let message = err.to_string();
    assert!(message.contains("fail"), "{message}");
    assert!(message.contains("report.vm"), "{message}");
}
