/*
 * services.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The capability object every template operation runs against.
//!
//! [`RuntimeServices`] bundles configuration, member resolution, the macro
//! registry and the resource manager. It is created once per engine and
//! passed by reference into parsing and rendering; there is no global
//! instance.

use std::sync::Arc;

use crate::ast::{MacroDef, SourcePos};
use crate::config::RuntimeConfig;
use crate::error::VtlResult;
use crate::introspect::{Introspector, TypeRegistry};
use crate::macros::{AddOutcome, MacroDefinition, MacroEntry, MacroManager, MacroPermissions};
use crate::parser;
use crate::resource::{ResourceKind, ResourceLoader, ResourceManager};
use crate::template::Template;

/// Shared runtime state of one engine.
#[derive(Debug)]
pub struct RuntimeServices {
    config: RuntimeConfig,
    introspector: Introspector,
    macros: MacroManager,
    resources: ResourceManager,
}

impl RuntimeServices {
    pub fn new(
        config: RuntimeConfig,
        registry: TypeRegistry,
        loaders: Vec<Arc<dyn ResourceLoader>>,
    ) -> Self {
        let macros = MacroManager::new(MacroPermissions {
            allow_inline: config.velocimacro_permissions_allow_inline,
            allow_inline_to_replace_global: config
                .velocimacro_permissions_allow_inline_to_replace_global,
            inline_local_scope: config.velocimacro_permissions_allow_inline_local_scope,
        });
        let resources = ResourceManager::new(
            loaders,
            config.resource_cache_size,
            config.resource_log_when_found,
        );
        Self {
            introspector: Introspector::new(Arc::new(registry)),
            macros,
            resources,
            config,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn introspector(&self) -> &Introspector {
        &self.introspector
    }

    pub fn macros(&self) -> &MacroManager {
        &self.macros
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn error(&self, message: &str) {
        tracing::error!("{message}");
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }

    pub fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!("{message}");
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.config.get_string(key, default)
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.config.get_int(key, default)
    }

    pub fn get_boolean(&self, key: &str, default: bool) -> bool {
        self.config.get_bool(key, default)
    }

    /// Parse and initialize a template, registering its inline macros.
    ///
    /// A template that is parsed again replaces its whole local macro
    /// namespace, so macros deleted from the source disappear.
    pub fn parse(&self, text: &str, name: &str) -> VtlResult<Template> {
        let block = parser::parse(text, name)?;
        if self.macros.dump_namespace(name) {
            tracing::debug!(template = name, "dumped macro namespace");
        }
        let (template, defs) = Template::init(name, block);
        self.register_macros(name, defs);
        Ok(template)
    }

    fn register_macros(&self, template: &str, defs: Vec<MacroDef>) {
        for def in defs {
            let pos = def.pos;
            let name = def.name.clone();
            let outcome = self.macros.add(MacroDefinition {
                name: def.name,
                params: def.params,
                body_text: def.body_text,
                body_pos: def.body_pos,
                source_template: template.to_string(),
            });
            match outcome {
                AddOutcome::Added => {
                    tracing::debug!(template, line = pos.line, "registered velocimacro #{name}");
                }
                AddOutcome::InlineNotAllowed => {
                    tracing::warn!(
                        template,
                        line = pos.line,
                        column = pos.column,
                        "inline velocimacro #{name} rejected: inline macros are not allowed"
                    );
                }
                AddOutcome::ReplacesLibrary => {
                    tracing::warn!(
                        template,
                        line = pos.line,
                        column = pos.column,
                        "inline velocimacro #{name} rejected: it would replace a library macro"
                    );
                }
            }
        }
    }

    /// Register a macro from source text. Returns whether it was accepted.
    pub fn add_velocimacro(
        &self,
        name: &str,
        body: &str,
        params: &[&str],
        source_template: &str,
    ) -> bool {
        let outcome = self.macros.add(MacroDefinition {
            name: name.to_string(),
            params: params.iter().map(|p| p.trim_start_matches('$').to_string()).collect(),
            body_text: body.to_string(),
            body_pos: SourcePos::new(1, 1),
            source_template: source_template.to_string(),
        });
        outcome == AddOutcome::Added
    }

    pub fn is_velocimacro(&self, name: &str, namespace: &str) -> bool {
        self.macros.is_macro(name, namespace)
    }

    /// Look up a macro as seen from template `namespace`. With library
    /// autoreload on, the defining library is refreshed first.
    pub fn get_velocimacro(&self, name: &str, namespace: &str) -> Option<Arc<MacroEntry>> {
        let entry = self.macros.get(name, namespace)?;
        if !self.config.velocimacro_library_autoreload || !entry.is_from_library() {
            return Some(entry);
        }

        let library = entry.source_template().to_string();
        if let Err(e) = self.get_template(&library) {
            tracing::warn!(library = %library, error = %e, "failed to reload velocimacro library");
            return Some(entry);
        }
        self.macros.get(name, namespace)
    }

    /// Parsed body of a macro. Macros defined inside the body are registered
    /// in the namespace of the template that defined the outer macro.
    pub fn macro_body(&self, entry: &MacroEntry) -> VtlResult<Arc<Template>> {
        entry
            .body(|text, source, start| {
                let block = parser::parse_at(text, source, start)?;
                let (template, defs) = Template::init(source, block);
                self.register_macros(source, defs);
                Ok(template)
            })
            .cloned()
    }

    /// Mark `library` as a macro library and load it.
    pub fn load_library(&self, library: &str) -> VtlResult<()> {
        self.macros.register_library(library);
        self.get_template(library)?;
        tracing::info!(library, "loaded velocimacro library");
        Ok(())
    }

    /// A template through the resource cache.
    pub fn get_template(&self, name: &str) -> VtlResult<Arc<Template>> {
        let resource = self.resources.get(
            name,
            ResourceKind::Template,
            &self.config.input_encoding,
            &|text, name| self.parse(text, name),
        )?;
        resource.template().ok_or_else(|| not_found(name))
    }

    /// Raw text of a resource through the resource cache.
    pub fn get_content(&self, name: &str) -> VtlResult<Arc<str>> {
        let resource = self.resources.get(
            name,
            ResourceKind::Content,
            &self.config.input_encoding,
            &|text, name| self.parse(text, name),
        )?;
        resource.content().ok_or_else(|| not_found(name))
    }
}

fn not_found(name: &str) -> crate::error::VtlError {
    crate::error::VtlError::ResourceNotFound {
        name: name.to_string(),
    }
}
