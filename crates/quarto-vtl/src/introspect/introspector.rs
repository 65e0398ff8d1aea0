/*
 * introspector.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Member lookup with a process-wide cache.
//!
//! One [`ClassMap`] is built per runtime type on first use. It indexes the
//! methods (by case-insensitive name) and properties of the type and all of
//! its ancestors, and memoizes every method resolution, including misses and
//! ambiguous results. Both maps tolerate concurrent first-time population:
//! two threads may build the same entry, and whichever lands first is kept.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use super::method_map::{self, Selection};
use super::registry::{MethodDef, PropertyDef, TypeRegistry};
use super::types::ValueType;
use crate::invoke::{MethodData, PropertyData, PropertyKind, SetterData};

/// Result of a method lookup.
#[derive(Debug, Clone)]
pub enum MethodLookup {
    Found(Arc<MethodData>),
    NotFound,
    /// More than one equally specific overload. Holds their signatures.
    Ambiguous(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MethodKey {
    name: String,
    args: Vec<Option<ValueType>>,
}

/// Members of one type, including inherited ones.
#[derive(Debug)]
pub struct ClassMap {
    methods: HashMap<String, Vec<Arc<MethodDef>>>,
    properties: Vec<Arc<PropertyDef>>,
    method_cache: DashMap<MethodKey, MethodLookup>,
}

impl ClassMap {
    fn build(registry: &TypeRegistry, ty: &ValueType) -> Self {
        let mut collected: Vec<Arc<MethodDef>> = Vec::new();
        let mut properties: Vec<Arc<PropertyDef>> = Vec::new();

        for class in registry.ancestors(ty.name()) {
            for method in &class.methods {
                // Overridden class methods disappear; interface declarations
                // stay so that ties can prefer the concrete one.
                let overridden = !class.is_interface
                    && collected.iter().any(|seen| seen.same_signature(method));
                if !overridden {
                    collected.push(method.clone());
                }
            }
            for property in &class.properties {
                if !properties.iter().any(|seen| seen.name == property.name) {
                    properties.push(property.clone());
                }
            }
        }

        let mut methods: HashMap<String, Vec<Arc<MethodDef>>> = HashMap::new();
        for method in collected {
            methods
                .entry(method.name.to_lowercase())
                .or_default()
                .push(method);
        }

        Self {
            methods,
            properties,
            method_cache: DashMap::new(),
        }
    }

    fn find_method(
        &self,
        registry: &TypeRegistry,
        name: &str,
        args: &[Option<ValueType>],
    ) -> MethodLookup {
        let key = MethodKey {
            name: name.to_lowercase(),
            args: args.to_vec(),
        };
        if let Some(cached) = self.method_cache.get(&key) {
            return cached.clone();
        }

        let lookup = match self.methods.get(&key.name) {
            None => MethodLookup::NotFound,
            Some(candidates) => match method_map::most_specific(registry, candidates, args) {
                Selection::Found(def) => MethodLookup::Found(Arc::new(MethodData::new(def))),
                Selection::NotFound => MethodLookup::NotFound,
                Selection::Ambiguous(defs) => {
                    MethodLookup::Ambiguous(defs.iter().map(ToString::to_string).collect())
                }
            },
        };

        self.method_cache.entry(key).or_insert(lookup).clone()
    }

    /// Exact name, then upper-first, then lower-first, then any case.
    fn find_property(&self, name: &str) -> Option<&Arc<PropertyDef>> {
        let exact = |candidate: &str| self.properties.iter().find(|p| p.name == candidate);
        exact(name)
            .or_else(|| exact(&upper_first(name)))
            .or_else(|| exact(&lower_first(name)))
            .or_else(|| {
                self.properties
                    .iter()
                    .find(|p| p.name.eq_ignore_ascii_case(name))
            })
    }
}

/// Resolves members of runtime types against the [`TypeRegistry`].
#[derive(Debug)]
pub struct Introspector {
    registry: Arc<TypeRegistry>,
    class_maps: DashMap<ValueType, Arc<ClassMap>>,
}

impl Introspector {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            class_maps: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    fn class_map(&self, ty: &ValueType) -> Arc<ClassMap> {
        if let Some(map) = self.class_maps.get(ty) {
            return map.clone();
        }
        let built = Arc::new(ClassMap::build(&self.registry, ty));
        self.class_maps.entry(ty.clone()).or_insert(built).clone()
    }

    /// Find the most specific method `name` of `ty` for arguments of the given
    /// runtime types (`None` for null).
    pub fn find_method(&self, ty: &ValueType, name: &str, args: &[Option<ValueType>]) -> MethodLookup {
        self.class_map(ty).find_method(&self.registry, name, args)
    }

    /// Resolve a property read.
    ///
    /// Map entries come first for maps. Otherwise: a declared property (exact
    /// case, upper-first, lower-first, any case), a zero-argument method
    /// `name()` or `getName()`, a keyed `get("name")`, and finally `isName()`.
    pub fn find_property(&self, ty: &ValueType, name: &str) -> Option<PropertyData> {
        if *ty == ValueType::Map {
            return Some(PropertyData::map_entry(name));
        }

        let class_map = self.class_map(ty);
        if let Some(property) = class_map
            .find_property(name)
            .and_then(|def| PropertyData::from_property(def))
        {
            return Some(property);
        }

        let upper = upper_first(name);
        for candidate in [name.to_string(), format!("get{upper}")] {
            if let MethodLookup::Found(method) = class_map.find_method(&self.registry, &candidate, &[]) {
                return Some(PropertyData::from_method(method, PropertyKind::Method));
            }
        }

        if let MethodLookup::Found(method) =
            class_map.find_method(&self.registry, "get", &[Some(ValueType::String)])
        {
            return Some(PropertyData::keyed(method, name));
        }

        if let MethodLookup::Found(method) =
            class_map.find_method(&self.registry, &format!("is{upper}"), &[])
        {
            return Some(PropertyData::from_method(method, PropertyKind::BooleanIs));
        }

        None
    }

    /// Resolve a property write of a value of type `value_ty`.
    ///
    /// Map entries for maps. Otherwise a writable property, a `setName(value)`
    /// method, or a keyed `put("name", value)`.
    pub fn find_setter(&self, ty: &ValueType, name: &str, value_ty: &ValueType) -> Option<SetterData> {
        if *ty == ValueType::Map {
            return Some(SetterData::map_entry(name));
        }

        let class_map = self.class_map(ty);
        if let Some(setter) = class_map
            .find_property(name)
            .and_then(|def| SetterData::from_property(def))
        {
            return Some(setter);
        }

        let arg = [Some(value_ty.clone())];
        let setter_name = format!("set{}", upper_first(name));
        if let MethodLookup::Found(method) = class_map.find_method(&self.registry, &setter_name, &arg) {
            return Some(SetterData::from_method(method));
        }

        let put_args = [Some(ValueType::String), Some(value_ty.clone())];
        if let MethodLookup::Found(method) = class_map.find_method(&self.registry, "put", &put_args) {
            return Some(SetterData::keyed(method, name));
        }

        None
    }
}

fn upper_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::registry::ClassBuilder;
    use crate::value::Value;

    fn introspector() -> Introspector {
        let mut registry = TypeRegistry::with_builtins();
        registry.register(
            ClassBuilder::new("Person")
                .property("FirstName", |_| Ok(Some(Value::from("hammett"))))
                .property("firstName", |_| Ok(Some(Value::from("lower"))))
                .method("getAge", [], |_, _| Ok(Some(Value::Int(33))))
                .method("isActive", [], |_, _| Ok(Some(Value::Bool(true))))
                .method("get", [ValueType::String], |_, args| {
                    Ok(Some(Value::String(format!("dyn:{}", args[0].as_ref().unwrap()))))
                })
                .void_method("setAge", [ValueType::Int], |_, _| Ok(())),
        );
        Introspector::new(Arc::new(registry))
    }

    fn person() -> ValueType {
        ValueType::named("Person")
    }

    fn read(intro: &Introspector, name: &str) -> (PropertyKind, Option<Value>) {
        let property = intro.find_property(&person(), name).unwrap();
        let value = property.get(&Value::Int(0)).unwrap();
        (property.kind(), value)
    }

    #[test]
    fn test_property_case_variants() {
        let intro = introspector();
        assert_eq!(read(&intro, "FirstName").1, Some(Value::from("hammett")));
        assert_eq!(read(&intro, "firstName").1, Some(Value::from("lower")));
        // No exact match: the upper-first variant wins.
        assert_eq!(read(&intro, "firstname").1, Some(Value::from("hammett")));
    }

    #[test]
    fn test_property_fallbacks() {
        let intro = introspector();
        assert_eq!(read(&intro, "age"), (PropertyKind::Method, Some(Value::Int(33))));
        assert_eq!(
            read(&intro, "active"),
            (PropertyKind::KeyedGet, Some(Value::from("dyn:active")))
        );
        assert_eq!(
            read(&intro, "anything"),
            (PropertyKind::KeyedGet, Some(Value::from("dyn:anything")))
        );
    }

    #[test]
    fn test_boolean_is_when_no_keyed_get() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register(
            ClassBuilder::new("Flag").method("isOn", [], |_, _| Ok(Some(Value::Bool(true)))),
        );
        let intro = Introspector::new(Arc::new(registry));
        let property = intro.find_property(&ValueType::named("Flag"), "on").unwrap();
        assert_eq!(property.kind(), PropertyKind::BooleanIs);
        assert!(intro.find_property(&ValueType::named("Flag"), "off").is_none());
    }

    #[test]
    fn test_method_names_case_insensitive_and_cached() {
        let intro = introspector();
        let first = intro.find_method(&person(), "GETAGE", &[]);
        let second = intro.find_method(&person(), "getage", &[]);
        match (first, second) {
            (MethodLookup::Found(a), MethodLookup::Found(b)) => assert!(Arc::ptr_eq(&a, &b)),
            other => panic!("expected cached method, got {other:?}"),
        }
    }

    #[test]
    fn test_inherited_methods() {
        let intro = introspector();
        assert!(matches!(
            intro.find_method(&person(), "toString", &[]),
            MethodLookup::Found(_)
        ));
        assert!(matches!(
            intro.find_method(&ValueType::String, "nope", &[]),
            MethodLookup::NotFound
        ));
    }

    #[test]
    fn test_setter_resolution() {
        let intro = introspector();
        let setter = intro.find_setter(&person(), "age", &ValueType::Int).unwrap();
        assert_eq!(setter.name(), "setAge");
        assert!(intro.find_setter(&person(), "age", &ValueType::String).is_none());
        let map_setter = intro.find_setter(&ValueType::Map, "k", &ValueType::Int).unwrap();
        assert_eq!(map_setter.name(), "k");
    }

    #[test]
    fn test_case_helpers() {
        assert_eq!(upper_first("name"), "Name");
        assert_eq!(lower_first("Name"), "name");
        assert_eq!(upper_first(""), "");
    }
}
