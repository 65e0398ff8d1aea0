/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Mapping template member accesses to host callables.

mod builtins;
pub mod introspector;
pub(crate) mod method_map;
pub mod registry;
pub mod types;

pub use introspector::{Introspector, MethodLookup};
pub use registry::{ClassBuilder, ClassDef, MethodDef, PropertyDef, TypeRegistry};
pub use types::ValueType;
