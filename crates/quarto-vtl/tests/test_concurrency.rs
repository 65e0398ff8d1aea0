/*
 * test_concurrency.rs
 * Copyright (c) 2025 Posit, PBC
 */

use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;
use quarto_vtl::{Context, Engine, MemoryResourceLoader, Value};

#[test]
fn test_shared_template_with_separate_contexts() {
    let engine = Engine::builder().build().unwrap();
    let template = engine
        .parse("#foreach($i in [1..3])$name$i#end|$v.toString()", "shared.vm")
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let engine = engine.clone();
            let template = template.clone();
            thread::spawn(move || {
                let mut ctx = Context::new();
                ctx.put("name", Value::String(format!("t{n}-")));
                // Alternate runtime types so cached resolutions get replaced.
                if n % 2 == 0 {
                    ctx.put("v", Value::from("s"));
                } else {
                    ctx.put("v", Value::list([Value::Int(n)]));
                }
                let mut outputs = Vec::new();
                for _ in 0..20 {
                    outputs.push(engine.merge(&template, &mut ctx).unwrap());
                }
                (n, outputs)
            })
        })
        .collect();

    for handle in handles {
        let (n, outputs) = handle.join().unwrap();
        let tail = if n % 2 == 0 {
            "s".to_string()
        } else {
            format!("[{n}]")
        };
        let expected = format!("t{n}-1t{n}-2t{n}-3|{tail}");
        for output in outputs {
            assert_eq!(output, expected);
        }
    }
}

#[test]
fn test_concurrent_template_lookup_shares_one_parse() {
    let loader = Arc::new(
        MemoryResourceLoader::with_resources([("page.vm", "#macro(m $x)<$x>#end#m($who)")])
            .with_check_interval(None),
    );
    let engine = Engine::builder().loader(loader).build().unwrap();
    // Warm the cache so every thread hits the same resource.
    engine.get_template("page.vm").unwrap();

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let engine = engine.clone();
            thread::spawn(move || {
                let mut ctx = Context::new();
                ctx.put("who", Value::Int(n));
                let output = engine.merge_template("page.vm", &mut ctx).unwrap();
                let services = engine.services();
                let entry = services.get_velocimacro("m", "page.vm").unwrap();
                (output, services.macro_body(&entry).unwrap())
            })
        })
        .collect();

    let (mut outputs, bodies): (Vec<String>, Vec<_>) =
        handles.into_iter().map(|h| h.join().unwrap()).unzip();
    outputs.sort();
    let expected: Vec<String> = (0..8).map(|n| format!("<{n}>")).collect();
    assert_eq!(outputs, expected);

    let entry = engine.services().get_velocimacro("m", "page.vm").unwrap();
    assert!(entry.is_parsed());
    assert!(bodies.iter().all(|body| Arc::ptr_eq(body, &bodies[0])));
}
