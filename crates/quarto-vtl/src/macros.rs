/*
 * macros.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Velocimacro registry.
//!
//! Macros live in namespaces. The global namespace (`""`) is shared by every
//! template; with inline local scope turned on, each template that defines
//! macros gets a namespace of its own, consulted before the global one.
//!
//! Definitions keep their body as source text. The body is parsed on first
//! invocation and the result is shared by every later call, from any thread.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::ast::SourcePos;
use crate::error::VtlResult;
use crate::template::Template;

/// Name of the namespace shared by all templates.
pub const GLOBAL_NAMESPACE: &str = "";

/// One macro definition.
#[derive(Debug)]
pub struct MacroEntry {
    name: String,
    params: Vec<String>,
    body_text: String,
    body_pos: SourcePos,
    source_template: String,
    from_library: bool,
    body: OnceCell<Arc<Template>>,
}

impl MacroEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter names without `$`.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn body_text(&self) -> &str {
        &self.body_text
    }

    /// Template the definition came from.
    pub fn source_template(&self) -> &str {
        &self.source_template
    }

    /// Whether the macro was registered from a macro library.
    pub fn is_from_library(&self) -> bool {
        self.from_library
    }

    /// Whether the body has been parsed yet.
    pub fn is_parsed(&self) -> bool {
        self.body.get().is_some()
    }

    /// The parsed body, parsing it with `parse` on first use. When several
    /// threads get here first at once, exactly one result is kept.
    pub(crate) fn body(
        &self,
        parse: impl FnOnce(&str, &str, SourcePos) -> VtlResult<Template>,
    ) -> VtlResult<&Arc<Template>> {
        self.body.get_or_try_init(|| {
            parse(&self.body_text, &self.source_template, self.body_pos).map(Arc::new)
        })
    }
}

/// A definition as handed to [`MacroManager::add`].
#[derive(Debug, Clone)]
pub struct MacroDefinition {
    pub name: String,
    pub params: Vec<String>,
    pub body_text: String,
    pub body_pos: SourcePos,
    pub source_template: String,
}

/// Permission flags for inline definitions.
#[derive(Debug, Clone, Copy)]
pub struct MacroPermissions {
    /// Inline `#macro` definitions are accepted at all.
    pub allow_inline: bool,
    /// An inline definition may replace a library macro of the same name.
    pub allow_inline_to_replace_global: bool,
    /// Inline definitions go to the defining template's own namespace.
    pub inline_local_scope: bool,
}

impl Default for MacroPermissions {
    fn default() -> Self {
        Self {
            allow_inline: true,
            allow_inline_to_replace_global: false,
            inline_local_scope: false,
        }
    }
}

/// Outcome of [`MacroManager::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// Inline definitions are turned off.
    InlineNotAllowed,
    /// The name belongs to a library macro that inline code may not replace.
    ReplacesLibrary,
}

/// Namespace-aware macro registry.
#[derive(Debug, Default)]
pub struct MacroManager {
    namespaces: RwLock<HashMap<String, HashMap<String, Arc<MacroEntry>>>>,
    libraries: RwLock<HashSet<String>>,
    permissions: MacroPermissions,
}

impl MacroManager {
    pub fn new(permissions: MacroPermissions) -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
            libraries: RwLock::new(HashSet::new()),
            permissions,
        }
    }

    pub fn permissions(&self) -> MacroPermissions {
        self.permissions
    }

    fn uses_local_namespace(&self, namespace: &str) -> bool {
        self.permissions.inline_local_scope
            && namespace != GLOBAL_NAMESPACE
            && !self.libraries.read().contains(namespace)
    }

    /// Mark a template as a macro library. Definitions from a library always
    /// go to the global namespace and keep their library flag.
    pub fn register_library(&self, library: &str) {
        self.libraries.write().insert(library.to_string());
    }

    /// Register a definition found in template `def.source_template`.
    pub fn add(&self, def: MacroDefinition) -> AddOutcome {
        if self.libraries.read().contains(&def.source_template) {
            self.insert_global(def, true);
            return AddOutcome::Added;
        }
        if !self.permissions.allow_inline {
            return AddOutcome::InlineNotAllowed;
        }

        if self.uses_local_namespace(&def.source_template) {
            let entry = Arc::new(new_entry(def, false));
            self.namespaces
                .write()
                .entry(entry.source_template.clone())
                .or_default()
                .insert(entry.name.clone(), entry);
            return AddOutcome::Added;
        }

        if !self.permissions.allow_inline_to_replace_global {
            let replaces_library = self
                .namespaces
                .read()
                .get(GLOBAL_NAMESPACE)
                .and_then(|global| global.get(&def.name))
                .is_some_and(|existing| existing.from_library);
            if replaces_library {
                return AddOutcome::ReplacesLibrary;
            }
        }

        self.insert_global(def, false);
        AddOutcome::Added
    }

    fn insert_global(&self, def: MacroDefinition, from_library: bool) {
        let mut namespaces = self.namespaces.write();
        let global = namespaces.entry(GLOBAL_NAMESPACE.to_string()).or_default();
        // An overwritten entry keeps its library flag so reloads still find it.
        let from_library = from_library
            || global
                .get(&def.name)
                .is_some_and(|existing| existing.from_library);
        let entry = Arc::new(new_entry(def, from_library));
        global.insert(entry.name.clone(), entry);
    }

    /// Look up `name` as seen from template `namespace`.
    pub fn get(&self, name: &str, namespace: &str) -> Option<Arc<MacroEntry>> {
        let namespaces = self.namespaces.read();
        if self.uses_local_namespace(namespace) {
            if let Some(entry) = namespaces.get(namespace).and_then(|local| local.get(name)) {
                return Some(entry.clone());
            }
        }
        namespaces
            .get(GLOBAL_NAMESPACE)
            .and_then(|global| global.get(name))
            .cloned()
    }

    pub fn is_macro(&self, name: &str, namespace: &str) -> bool {
        self.get(name, namespace).is_some()
    }

    /// Drop every macro of a template's local namespace. Returns whether a
    /// namespace was removed.
    pub fn dump_namespace(&self, namespace: &str) -> bool {
        if !self.uses_local_namespace(namespace) {
            return false;
        }
        self.namespaces.write().remove(namespace).is_some()
    }

    /// Library that defined the global macro `name`, if any.
    pub fn library_of(&self, name: &str, namespace: &str) -> Option<String> {
        self.get(name, namespace)
            .filter(|entry| entry.from_library)
            .map(|entry| entry.source_template.clone())
    }

    pub fn is_library(&self, name: &str) -> bool {
        self.libraries.read().contains(name)
    }
}

fn new_entry(def: MacroDefinition, from_library: bool) -> MacroEntry {
    MacroEntry {
        name: def.name,
        params: def.params,
        body_text: def.body_text,
        body_pos: def.body_pos,
        source_template: def.source_template,
        from_library,
        body: OnceCell::new(),
    }
}
