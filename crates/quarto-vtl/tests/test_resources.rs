/*
 * test_resources.rs
 * Copyright (c) 2025 Posit, PBC
 */

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use pretty_assertions::assert_eq;
use quarto_vtl::{
    Context, Engine, FileResourceLoader, MemoryResourceLoader, Resource, ResourceKind,
    RuntimeConfig, Value, VtlError,
};

fn file_engine(dir: &Path, check_interval: Option<Duration>) -> Engine {
    let loader = FileResourceLoader::new([dir])
        .with_caching(true)
        .with_check_interval(check_interval);
    Engine::builder()
        .loader(Arc::new(loader))
        .build()
        .expect("engine should build")
}

fn template_resource(engine: &Engine, name: &str) -> Arc<Resource> {
    let services = engine.services();
    services
        .resources()
        .get(name, ResourceKind::Template, "UTF-8", &|text, name| {
            services.parse(text, name)
        })
        .expect("resource should load")
}

/// Rewrite a file and push its modification time forward so the change is
/// visible regardless of timestamp granularity.
fn rewrite(path: &Path, text: &str, offset: Duration) {
    fs::write(path, text).unwrap();
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + offset).unwrap();
}

#[test]
fn test_changed_file_is_reloaded_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("page.vm");
    fs::write(&path, "v1 $x").unwrap();

    let engine = file_engine(dir.path(), Some(Duration::ZERO));
    let mut ctx = Context::new();
    ctx.put("x", Value::Int(1));
    assert_eq!(engine.merge_template("page.vm", &mut ctx).unwrap(), "v1 1");
    assert_eq!(template_resource(&engine, "page.vm").load_count(), 1);

    rewrite(&path, "v2 $x", Duration::from_secs(10));
    assert_eq!(engine.merge_template("page.vm", &mut ctx).unwrap(), "v2 1");
    assert_eq!(template_resource(&engine, "page.vm").load_count(), 2);

    // Unchanged source: checked again, but not reparsed.
    assert_eq!(engine.merge_template("page.vm", &mut ctx).unwrap(), "v2 1");
    assert_eq!(template_resource(&engine, "page.vm").load_count(), 2);
}

#[test]
fn test_without_check_interval_cache_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("page.vm");
    fs::write(&path, "v1").unwrap();

    let engine = file_engine(dir.path(), None);
    assert_eq!(engine.merge_template("page.vm", &mut Context::new()).unwrap(), "v1");
    rewrite(&path, "v2", Duration::from_secs(10));
    assert_eq!(engine.merge_template("page.vm", &mut Context::new()).unwrap(), "v1");
}

#[test]
fn test_template_and_content_are_cached_separately() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("part.vm"), "#set($y = 2)$y").unwrap();
    fs::write(dir.path().join("page.vm"), "#include('part.vm')|#parse('part.vm')").unwrap();

    let engine = file_engine(dir.path(), None);
    assert_eq!(
        engine.merge_template("page.vm", &mut Context::new()).unwrap(),
        "#set($y = 2)$y|2"
    );
    let cache = engine.services().resources().cache();
    assert!(cache.contains("template:part.vm"));
    assert!(cache.contains("content:part.vm"));
    assert!(cache.contains("template:page.vm"));
}

#[test]
fn test_names_outside_the_search_path_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("templates");
    fs::create_dir(&nested).unwrap();
    fs::write(dir.path().join("secret.vm"), "secret").unwrap();

    let engine = file_engine(&nested, None);
    let err = engine
        .merge_template("../secret.vm", &mut Context::new())
        .expect_err("escape should fail");
    assert!(matches!(err, VtlError::ResourceNotFound { .. }));
}

#[test]
fn test_search_path_order() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    fs::write(second.path().join("a.vm"), "second a").unwrap();
    fs::write(second.path().join("b.vm"), "second b").unwrap();
    fs::write(first.path().join("a.vm"), "first a").unwrap();

    let loader = FileResourceLoader::new([first.path(), second.path()]);
    let engine = Engine::builder()
        .loader(Arc::new(loader))
        .build()
        .unwrap();
    assert_eq!(engine.merge_template("a.vm", &mut Context::new()).unwrap(), "first a");
    assert_eq!(engine.merge_template("b.vm", &mut Context::new()).unwrap(), "second b");
}

#[test]
fn test_loaders_are_tried_in_order() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("disk.vm"), "from disk").unwrap();
    let memory = Arc::new(MemoryResourceLoader::with_resources([("mem.vm", "from memory")]));

    let engine = Engine::builder()
        .loader(memory)
        .loader(Arc::new(FileResourceLoader::new([dir.path()])))
        .build()
        .unwrap();
    assert_eq!(engine.merge_template("mem.vm", &mut Context::new()).unwrap(), "from memory");
    assert_eq!(engine.merge_template("disk.vm", &mut Context::new()).unwrap(), "from disk");
    assert_eq!(
        engine.services().resources().loader_name_for("disk.vm").as_deref(),
        Some("file")
    );
}

#[test]
fn test_configuration_file_drives_the_file_loader() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("hello.vm"), "#foreach($i in [1..2])$n$i #end").unwrap();
    let config_path = dir.path().join("vtl.toml");
    fs::write(
        &config_path,
        format!(
            "file_resource_loader_path = [{:?}]\nforeach_counter_name = \"n\"\nforeach_counter_initial_value = 0\n",
            dir.path().display().to_string()
        ),
    )
    .unwrap();

    let config = RuntimeConfig::from_file(&config_path).unwrap();
    let engine = Engine::builder().config(config).build().unwrap();
    assert_eq!(
        engine.merge_template("hello.vm", &mut Context::new()).unwrap(),
        "01 12 "
    );
}
