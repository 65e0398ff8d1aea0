/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Velocity Template Language engine.
//!
//! Templates are written in VTL:
//!
//! - References: `$name`, `$name.prop`, `$name.method(args)`, quiet `$!name`,
//!   formal `${name}`, escaped `\$name`
//! - Assignment: `#set($x = expr)`
//! - Conditionals: `#if(...)` / `#elseif(...)` / `#else` / `#end`
//! - Loops: `#foreach($item in $list) ... #end` with `#break` and the
//!   `#before`, `#odd`, `#between`, `#nodata`, ... sections
//! - Macros: `#macro(name $arg) ... #end`, called as `#name(value)`
//! - Resources: `#include(name)`, `#parse(name)`
//!
//! # Architecture
//!
//! An [`Engine`] owns one [`RuntimeServices`]: configuration, the
//! [`Introspector`] that maps member accesses to host callables, the
//! [`MacroManager`], and the [`ResourceManager`] with its LRU cache. Parsed
//! [`Template`]s are immutable and can be merged from many threads at once;
//! member resolutions are memoized per node in a concurrent side table.
//! Each merge runs against a caller-owned [`Context`].
//!
//! Host data enters templates as [`Value`]s. Host classes describe their
//! members to the [`TypeRegistry`] through [`ClassBuilder`].

pub mod ast;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod events;
pub mod introspect;
pub mod invoke;
pub mod macros;
pub mod parser;
mod render;
pub mod resource;
pub mod services;
pub mod template;
pub mod value;

pub use config::RuntimeConfig;
pub use context::Context;
pub use diagnostics::{Diagnostic, DiagnosticCollector, DiagnosticKind};
pub use engine::{Engine, EngineBuilder};
pub use error::{VtlError, VtlResult};
pub use events::EventHooks;
pub use introspect::{ClassBuilder, Introspector, MethodLookup, TypeRegistry, ValueType};
pub use macros::{MacroEntry, MacroManager};
pub use resource::{
    FileResourceLoader, MemoryResourceLoader, Resource, ResourceKind, ResourceLoader,
    ResourceManager,
};
pub use services::RuntimeServices;
pub use template::Template;
pub use value::{DuckObject, HostObject, Value};
