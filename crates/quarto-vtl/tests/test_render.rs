/*
 * test_render.rs
 * Copyright (c) 2025 Posit, PBC
 */

use pretty_assertions::assert_eq;
use quarto_vtl::{Context, Engine, Value};

fn render(source: &str, ctx: &mut Context) -> String {
    let engine = Engine::builder().build().expect("engine should build");
    engine
        .evaluate(ctx, source, "test.vm")
        .expect("render should succeed")
}

#[test]
fn test_directive_lines_do_not_leave_blank_lines() {
    let source = "#set($x = 1)\n#if($x == 1)\none\n#else\nother\n#end\ndone";
    assert_eq!(render(source, &mut Context::new()), "one\ndone");
}

#[test]
fn test_crlf_after_directive_is_gobbled() {
    let source = "#set($x = 'a')\r\n$x\r\n";
    assert_eq!(render(source, &mut Context::new()), "a\r\n");
}

#[test]
fn test_escapes_and_quiet_references() {
    let mut ctx = Context::new();
    ctx.put("name", Value::from("n"));
    let source = r"\$name \\$name $!missing \$missing";
    assert_eq!(render(source, &mut ctx), r"$name \\n  $missing");
}

#[test]
fn test_unresolved_references_render_literally() {
    let mut ctx = Context::new();
    assert_eq!(render("$user.name", &mut ctx), "$user.name");
    assert_eq!(render("[$!{user.name}]", &mut ctx), "[]");
}

#[test]
fn test_comments_and_unparsed_content() {
    let source = "a## comment\nb#* block *#c#[[$raw #if]]#";
    assert_eq!(render(source, &mut Context::new()), "abc$raw #if");
}

#[test]
fn test_foreach_over_json_context() {
    let json = serde_json::json!({
        "books": [
            { "title": "A", "pages": 10 },
            { "title": "B", "pages": 20 },
            { "title": "C", "pages": null }
        ]
    });
    let Some(Value::Map(map)) = Value::from_json(&json) else {
        panic!("expected a map");
    };
    let mut ctx = Context::new();
    for (key, value) in map.read().iter() {
        ctx.put(key.clone(), value.clone());
    }

    let source = "#foreach($b in $books)$b.title#if($velocityHasNext), #end#end";
    assert_eq!(render(source, &mut ctx), "A, B, C");

    let source = "#foreach($b in $books)$!b.pages;#end";
    assert_eq!(render(source, &mut ctx), "10;20;;");
}

#[test]
fn test_loop_counter_and_range() {
    let source = "#foreach($i in [1..3])$velocityCount:$i #end";
    assert_eq!(render(source, &mut Context::new()), "1:1 2:2 3:3 ");
}

#[test]
fn test_list_mutation_is_visible_to_host() {
    let mut ctx = Context::new();
    let source = "#set($xs = [])$xs.add('a')$xs.add('b')$xs.size() $xs";
    assert_eq!(render(source, &mut ctx), "2 [a, b]");
    let Some(Value::List(list)) = ctx.get("xs") else {
        panic!("expected a list");
    };
    assert_eq!(list.read().len(), 2);
}

#[test]
fn test_string_methods_and_arithmetic() {
    let mut ctx = Context::new();
    ctx.put("word", Value::from(" Velocity "));
    let source = "#set($w = $word.trim())$w.toUpperCase() $w.length() #set($n = $w.length() * 2 + 1)$n";
    assert_eq!(render(source, &mut ctx), "VELOCITY 8 17");
}

#[test]
fn test_inner_context_is_read_through() {
    let mut base = Context::new();
    base.put("shared", Value::from("base"));
    let mut ctx = Context::with_inner(std::sync::Arc::new(base));
    assert_eq!(render("#set($local = 1)$shared $local", &mut ctx), "base 1");
    assert!(ctx.get_local("shared").is_none());
}

#[test]
fn test_parse_error_reports_position() {
    let engine = Engine::builder().build().expect("engine should build");
    let err = engine
        .evaluate(&mut Context::new(), "line one\n#foreach($x in $xs)\nbody", "broken.vm")
        .expect_err("missing #end should fail");
    let message = err.to_string();
    assert!(message.contains("broken.vm"), "{message}");
    assert!(message.contains("#end"), "{message}");
}
