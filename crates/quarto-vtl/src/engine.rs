/*
 * engine.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The embedder-facing entry point.
//!
//! ```
//! use quarto_vtl::{Context, Engine, Value};
//!
//! let engine = Engine::builder().build().unwrap();
//! let mut ctx = Context::new();
//! ctx.put("name", Value::from("world"));
//! let out = engine.evaluate(&mut ctx, "Hello $name!", "greeting").unwrap();
//! assert_eq!(out, "Hello world!");
//! ```

use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::context::Context;
use crate::diagnostics::Diagnostic;
use crate::error::VtlResult;
use crate::introspect::{ClassBuilder, TypeRegistry};
use crate::render;
use crate::resource::{FileResourceLoader, ResourceLoader};
use crate::services::RuntimeServices;
use crate::template::Template;

/// Configures and creates an [`Engine`].
#[derive(Debug)]
pub struct EngineBuilder {
    config: RuntimeConfig,
    registry: TypeRegistry,
    loaders: Vec<Arc<dyn ResourceLoader>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: RuntimeConfig::default(),
            registry: TypeRegistry::with_builtins(),
            loaders: Vec::new(),
        }
    }
}

impl EngineBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Describe a host class to templates.
    pub fn register_class(mut self, class: ClassBuilder) -> Self {
        self.registry.register(class);
        self
    }

    /// Add a resource loader. Loaders are tried in the order they were
    /// added. Without any, a file loader is built from the configuration.
    pub fn loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Create the engine and load the configured macro libraries.
    pub fn build(self) -> VtlResult<Engine> {
        let mut loaders = self.loaders;
        if loaders.is_empty() {
            loaders.push(Arc::new(FileResourceLoader::from_config(&self.config)));
        }
        let libraries = self.config.velocimacro_library.clone();
        let services = RuntimeServices::new(self.config, self.registry, loaders);

        for library in &libraries {
            if let Err(e) = services.load_library(library) {
                tracing::error!(library = %library, error = %e, "unable to load velocimacro library");
            }
        }

        Ok(Engine {
            services: Arc::new(services),
        })
    }
}

/// A template engine. Cloning is cheap and clones share all state.
#[derive(Debug, Clone)]
pub struct Engine {
    services: Arc<RuntimeServices>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn services(&self) -> &RuntimeServices {
        &self.services
    }

    /// Parse template text that does not come from a resource loader.
    pub fn parse(&self, source: &str, name: &str) -> VtlResult<Arc<Template>> {
        self.services.parse(source, name).map(Arc::new)
    }

    /// Parse and render template text in one go.
    pub fn evaluate(&self, ctx: &mut Context, source: &str, name: &str) -> VtlResult<String> {
        let template = self.services.parse(source, name)?;
        self.merge(&template, ctx)
    }

    /// A template from the resource loaders, cached per configuration.
    pub fn get_template(&self, name: &str) -> VtlResult<Arc<Template>> {
        self.services.get_template(name)
    }

    /// Raw text of a resource.
    pub fn get_content(&self, name: &str) -> VtlResult<Arc<str>> {
        self.services.get_content(name)
    }

    /// Render a parsed template.
    pub fn merge(&self, template: &Template, ctx: &mut Context) -> VtlResult<String> {
        self.merge_with_diagnostics(template, ctx).map(|(out, _)| out)
    }

    /// Render a parsed template and return what was reported along the way.
    pub fn merge_with_diagnostics(
        &self,
        template: &Template,
        ctx: &mut Context,
    ) -> VtlResult<(String, Vec<Diagnostic>)> {
        let mut out = String::new();
        let diagnostics = render::merge(&self.services, template, ctx, &mut out)?;
        Ok((out, diagnostics.into_diagnostics()))
    }

    /// Load (or reuse) the named template and render it.
    pub fn merge_template(&self, name: &str, ctx: &mut Context) -> VtlResult<String> {
        let template = self.get_template(name)?;
        self.merge(&template, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::MemoryResourceLoader;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_evaluate() {
        let engine = Engine::builder().build().unwrap();
        let mut ctx = Context::new();
        ctx.put("n", Value::Int(2));
        assert_eq!(engine.evaluate(&mut ctx, "#set($m = $n * 3)$m", "t").unwrap(), "6");
        assert_eq!(ctx.get("m"), Some(&Value::Int(6)));
    }

    #[test]
    fn test_libraries_loaded_at_build() {
        let loader = Arc::new(MemoryResourceLoader::with_resources([
            ("lib.vm", "#macro(greet $who)Hello $who#end"),
            ("page.vm", "#greet('you')"),
        ]));
        let mut config = RuntimeConfig::default();
        config.velocimacro_library = vec!["lib.vm".to_string()];
        let engine = Engine::builder().config(config).loader(loader).build().unwrap();
        assert!(engine.services().macros().is_library("lib.vm"));
        assert_eq!(engine.merge_template("page.vm", &mut Context::new()).unwrap(), "Hello you");
    }

    #[test]
    fn test_missing_library_is_not_fatal() {
        let mut config = RuntimeConfig::default();
        config.velocimacro_library = vec!["nowhere.vm".to_string()];
        let engine = Engine::builder()
            .config(config)
            .loader(Arc::new(MemoryResourceLoader::new()))
            .build();
        assert!(engine.is_ok());
    }

    #[test]
    fn test_merge_with_diagnostics_sorted() {
        let engine = Engine::builder().build().unwrap();
        let template = engine.parse("$b\n$a", "t.vm").unwrap();
        let (out, diagnostics) = engine
            .merge_with_diagnostics(&template, &mut Context::new())
            .unwrap();
        assert_eq!(out, "$b\n$a");
        let lines: Vec<usize> = diagnostics.iter().map(|d| d.line).collect();
        assert_eq!(lines, vec![1, 2]);
    }
}
