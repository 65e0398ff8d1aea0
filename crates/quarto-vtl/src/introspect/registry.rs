/*
 * registry.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Host class descriptions.
//!
//! Rust has no runtime reflection, so host types describe their members up
//! front. A [`ClassBuilder`] collects methods and properties together with the
//! closures that implement them, and the [`TypeRegistry`] records the class
//! hierarchy used for assignability checks.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use super::types::ValueType;
use crate::value::Value;

/// Implementation of a host method. Receives the target and the arguments.
pub type HostFn = Arc<dyn Fn(&Value, &[Option<Value>]) -> anyhow::Result<Option<Value>> + Send + Sync>;

/// Implementation of a property getter.
pub type GetterFn = Arc<dyn Fn(&Value) -> anyhow::Result<Option<Value>> + Send + Sync>;

/// Implementation of a property setter.
pub type SetterFn = Arc<dyn Fn(&Value, Value) -> anyhow::Result<()> + Send + Sync>;

/// A host method signature plus its implementation.
#[derive(Clone)]
pub struct MethodDef {
    pub(crate) name: String,
    pub(crate) params: Vec<ValueType>,
    /// Element type of a trailing rest parameter.
    pub(crate) rest: Option<ValueType>,
    pub(crate) returns_void: bool,
    pub(crate) declaring_class: Arc<str>,
    pub(crate) declared_on_interface: bool,
    pub(crate) func: HostFn,
}

impl MethodDef {
    pub fn new(
        name: impl Into<String>,
        params: impl IntoIterator<Item = ValueType>,
        func: impl Fn(&Value, &[Option<Value>]) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            params: params.into_iter().collect(),
            rest: None,
            returns_void: false,
            declaring_class: Arc::from(""),
            declared_on_interface: false,
            func: Arc::new(func),
        }
    }

    /// Accept any number of trailing arguments of `element` type. They reach
    /// the implementation packed into one list argument.
    pub fn variadic(mut self, element: ValueType) -> Self {
        self.rest = Some(element);
        self
    }

    /// Mark the method as returning nothing.
    pub fn void(mut self) -> Self {
        self.returns_void = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    pub fn rest(&self) -> Option<&ValueType> {
        self.rest.as_ref()
    }

    pub fn declaring_class(&self) -> &str {
        &self.declaring_class
    }

    pub(crate) fn same_signature(&self, other: &MethodDef) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.params == other.params
            && self.rest == other.rest
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.declaring_class, self.name)?;
        let mut first = true;
        for param in &self.params {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{param}")?;
        }
        if let Some(rest) = &self.rest {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{rest}...")?;
        }
        f.write_str(")")
    }
}

/// A host property with an optional getter and setter.
#[derive(Clone)]
pub struct PropertyDef {
    pub(crate) name: String,
    pub(crate) getter: Option<GetterFn>,
    pub(crate) setter: Option<SetterFn>,
    pub(crate) declaring_class: Arc<str>,
}

impl PropertyDef {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for PropertyDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDef")
            .field("name", &self.name)
            .field("readable", &self.getter.is_some())
            .field("writable", &self.setter.is_some())
            .finish()
    }
}

/// Description of one host class or interface.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub(crate) name: Arc<str>,
    pub(crate) parents: Vec<Arc<str>>,
    pub(crate) is_interface: bool,
    pub(crate) methods: Vec<Arc<MethodDef>>,
    pub(crate) properties: Vec<Arc<PropertyDef>>,
}

impl ClassDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_interface(&self) -> bool {
        self.is_interface
    }
}

/// Builder for a [`ClassDef`].
///
/// ```ignore
/// let person = ClassBuilder::new("Person")
///     .property("name", |this| {
///         let person = this.downcast_ref::<Person>().context("not a Person")?;
///         Ok(Some(Value::from(person.name.as_str())))
///     })
///     .method("greet", [ValueType::String], |this, args| { ... });
/// ```
#[derive(Debug)]
pub struct ClassBuilder {
    def: ClassDef,
}

impl ClassBuilder {
    /// Start describing a class. Classes extend `Object` unless they name
    /// other parents.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            def: ClassDef {
                name: Arc::from(name.as_ref()),
                parents: Vec::new(),
                is_interface: false,
                methods: Vec::new(),
                properties: Vec::new(),
            },
        }
    }

    /// Start describing an interface.
    pub fn interface(name: impl AsRef<str>) -> Self {
        let mut builder = Self::new(name);
        builder.def.is_interface = true;
        builder
    }

    /// Add a superclass or implemented interface.
    pub fn extends(mut self, parent: impl AsRef<str>) -> Self {
        self.def.parents.push(Arc::from(parent.as_ref()));
        self
    }

    /// Add a method returning a value.
    pub fn method(
        self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = ValueType>,
        func: impl Fn(&Value, &[Option<Value>]) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    ) -> Self {
        self.method_def(MethodDef::new(name, params, func))
    }

    /// Add a method whose result is ignored.
    pub fn void_method(
        self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = ValueType>,
        func: impl Fn(&Value, &[Option<Value>]) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.method_def(
            MethodDef::new(name, params, move |this, args| {
                func(this, args)?;
                Ok(None)
            })
            .void(),
        )
    }

    /// Add a method with a trailing rest parameter of `rest` element type.
    pub fn variadic_method(
        self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = ValueType>,
        rest: ValueType,
        func: impl Fn(&Value, &[Option<Value>]) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    ) -> Self {
        self.method_def(MethodDef::new(name, params, func).variadic(rest))
    }

    /// Add a fully described method.
    pub fn method_def(mut self, mut method: MethodDef) -> Self {
        method.declaring_class = self.def.name.clone();
        method.declared_on_interface = self.def.is_interface;
        self.def.methods.push(Arc::new(method));
        self
    }

    /// Add a read-only property.
    pub fn property(
        mut self,
        name: impl Into<String>,
        getter: impl Fn(&Value) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    ) -> Self {
        let property = PropertyDef {
            name: name.into(),
            getter: Some(Arc::new(getter)),
            setter: None,
            declaring_class: self.def.name.clone(),
        };
        self.def.properties.push(Arc::new(property));
        self
    }

    /// Add a read-write property.
    pub fn property_rw(
        mut self,
        name: impl Into<String>,
        getter: impl Fn(&Value) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
        setter: impl Fn(&Value, Value) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        let property = PropertyDef {
            name: name.into(),
            getter: Some(Arc::new(getter)),
            setter: Some(Arc::new(setter)),
            declaring_class: self.def.name.clone(),
        };
        self.def.properties.push(Arc::new(property));
        self
    }

    pub fn build(self) -> ClassDef {
        self.def
    }
}

/// All classes known to the engine.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    classes: HashMap<Arc<str>, ClassDef>,
}

impl TypeRegistry {
    /// An empty registry without even the built-in classes.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry describing `String`, `List`, `Map` and the number types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::builtins::register(&mut registry);
        registry
    }

    /// Add a class, replacing any previous class of the same name.
    pub fn register(&mut self, class: ClassBuilder) {
        let mut def = class.build();
        if def.parents.is_empty() && &*def.name != "Object" && !def.is_interface {
            def.parents.push(Arc::from("Object"));
        }
        self.classes.insert(def.name.clone(), def);
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    /// The class itself followed by all of its ancestors, nearest first.
    pub fn ancestors(&self, name: &str) -> Vec<&ClassDef> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([name]);
        let mut out = Vec::new();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(class) = self.classes.get(current) {
                queue.extend(class.parents.iter().map(|p| &**p));
                out.push(class);
            }
        }
        out
    }

    /// Whether a value of type `from` can be used where `to` is declared,
    /// through identity or inheritance.
    pub fn is_assignable(&self, from: &ValueType, to: &ValueType) -> bool {
        if to == &ValueType::Object || from == to {
            return true;
        }
        let target = to.name();
        self.ancestors(from.name())
            .iter()
            .any(|class| &*class.name == target)
    }

    /// Whether an argument of runtime type `actual` (`None` for null) can be
    /// passed to a parameter declared as `formal`.
    pub fn is_convertible(&self, formal: &ValueType, actual: Option<&ValueType>) -> bool {
        match actual {
            None => !formal.is_primitive(),
            Some(actual) => actual.widens_to(formal) || self.is_assignable(actual, formal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str) -> ValueType {
        ValueType::named(name)
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::with_builtins();
        registry.register(ClassBuilder::interface("Pet"));
        registry.register(ClassBuilder::new("Animal"));
        registry.register(ClassBuilder::new("Dog").extends("Animal").extends("Pet"));
        registry
    }

    #[test]
    fn test_inheritance_assignability() {
        let registry = registry();
        assert!(registry.is_assignable(&class("Dog"), &class("Animal")));
        assert!(registry.is_assignable(&class("Dog"), &class("Pet")));
        assert!(registry.is_assignable(&class("Dog"), &ValueType::Object));
        assert!(!registry.is_assignable(&class("Animal"), &class("Dog")));
        assert!(registry.is_assignable(&ValueType::String, &ValueType::Object));
    }

    #[test]
    fn test_convertibility() {
        let registry = registry();
        assert!(registry.is_convertible(&ValueType::Long, Some(&ValueType::Int)));
        assert!(!registry.is_convertible(&ValueType::Int, Some(&ValueType::Long)));
        assert!(registry.is_convertible(&ValueType::String, None));
        assert!(!registry.is_convertible(&ValueType::Int, None));
        assert!(registry.is_convertible(&ValueType::Object, Some(&ValueType::Int)));
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let registry = registry();
        let names: Vec<&str> = registry.ancestors("Dog").iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["Dog", "Animal", "Pet", "Object"]);
    }

    #[test]
    fn test_method_display() {
        let method = MethodDef::new("join", [ValueType::String], |_, _| Ok(None))
            .variadic(ValueType::String);
        assert_eq!(method.to_string(), ".join(String, String...)");
    }
}
