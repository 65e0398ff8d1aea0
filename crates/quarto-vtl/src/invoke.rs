/*
 * invoke.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Uniform call shapes for resolved members.
//!
//! A resolved method or property accessor is wrapped once into a closure with
//! a fixed `(target, args) -> result` shape. The closure adapts numeric
//! arguments to the declared parameter types, packs rest arguments into a
//! list, and turns a void return into an empty string so rendering treats
//! "no value" and "void" alike.

use std::fmt;
use std::sync::Arc;

use crate::introspect::registry::{MethodDef, PropertyDef};
use crate::introspect::ValueType;
use crate::value::Value;

type InvokerFn = dyn Fn(&Value, Vec<Option<Value>>) -> anyhow::Result<Option<Value>> + Send + Sync;
type GetFn = dyn Fn(&Value) -> anyhow::Result<Option<Value>> + Send + Sync;
type SetFn = dyn Fn(&Value, Value) -> anyhow::Result<()> + Send + Sync;

/// A method bound to one concrete signature.
pub struct MethodData {
    name: String,
    class_name: Arc<str>,
    invoker: Arc<InvokerFn>,
}

impl MethodData {
    pub(crate) fn new(def: Arc<MethodDef>) -> Self {
        let name = def.name.clone();
        let class_name = def.declaring_class.clone();
        let invoker = move |target: &Value, args: Vec<Option<Value>>| {
            let args = adapt_arguments(&def, args);
            let result = (def.func)(target, &args)?;
            if def.returns_void {
                Ok(Some(Value::String(String::new())))
            } else {
                Ok(result)
            }
        };
        Self {
            name,
            class_name,
            invoker: Arc::new(invoker),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class that declares the method.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Call the method on `target`.
    pub fn invoke(&self, target: &Value, args: Vec<Option<Value>>) -> anyhow::Result<Option<Value>> {
        (self.invoker)(target, args)
    }
}

impl fmt::Debug for MethodData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodData({}.{})", self.class_name, self.name)
    }
}

/// How a property read was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// A declared property getter.
    Property,
    /// A zero-argument method such as `name()` or `getName()`.
    Method,
    /// A keyed `get("name")` call.
    KeyedGet,
    /// A boolean `isName()` method.
    BooleanIs,
    /// A map entry.
    MapEntry,
}

/// A property read bound to one resolution strategy.
pub struct PropertyData {
    name: String,
    class_name: Arc<str>,
    kind: PropertyKind,
    getter: Arc<GetFn>,
}

impl PropertyData {
    pub(crate) fn from_property(def: &PropertyDef) -> Option<Self> {
        let getter = def.getter.clone()?;
        Some(Self {
            name: def.name.clone(),
            class_name: def.declaring_class.clone(),
            kind: PropertyKind::Property,
            getter: Arc::new(move |target: &Value| getter(target)),
        })
    }

    pub(crate) fn from_method(method: Arc<MethodData>, kind: PropertyKind) -> Self {
        Self {
            name: method.name().to_string(),
            class_name: Arc::from(method.class_name()),
            kind,
            getter: Arc::new(move |target: &Value| method.invoke(target, Vec::new())),
        }
    }

    pub(crate) fn keyed(method: Arc<MethodData>, key: &str) -> Self {
        let key = key.to_string();
        Self {
            name: method.name().to_string(),
            class_name: Arc::from(method.class_name()),
            kind: PropertyKind::KeyedGet,
            getter: Arc::new(move |target: &Value| {
                method.invoke(target, vec![Some(Value::String(key.clone()))])
            }),
        }
    }

    pub(crate) fn map_entry(key: &str) -> Self {
        let key = key.to_string();
        Self {
            name: key.clone(),
            class_name: Arc::from("Map"),
            kind: PropertyKind::MapEntry,
            getter: Arc::new(move |target: &Value| match target {
                Value::Map(map) => Ok(map.read().get(&key).cloned()),
                _ => Ok(None),
            }),
        }
    }

    /// Name of the member that is actually called.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class that declares the property or accessor method.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn get(&self, target: &Value) -> anyhow::Result<Option<Value>> {
        (self.getter)(target)
    }
}

impl fmt::Debug for PropertyData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyData({:?} {}.{})", self.kind, self.class_name, self.name)
    }
}

/// A property write bound to one resolution strategy.
pub struct SetterData {
    name: String,
    setter: Arc<SetFn>,
}

impl SetterData {
    pub(crate) fn from_property(def: &PropertyDef) -> Option<Self> {
        let setter = def.setter.clone()?;
        Some(Self {
            name: def.name.clone(),
            setter: Arc::new(move |target: &Value, value: Value| setter(target, value)),
        })
    }

    /// A one-argument `setName(value)` method.
    pub(crate) fn from_method(method: Arc<MethodData>) -> Self {
        Self {
            name: method.name().to_string(),
            setter: Arc::new(move |target: &Value, value: Value| {
                method.invoke(target, vec![Some(value)]).map(|_| ())
            }),
        }
    }

    /// A keyed `put("name", value)` method.
    pub(crate) fn keyed(method: Arc<MethodData>, key: &str) -> Self {
        let key = key.to_string();
        Self {
            name: method.name().to_string(),
            setter: Arc::new(move |target: &Value, value: Value| {
                method
                    .invoke(target, vec![Some(Value::String(key.clone())), Some(value)])
                    .map(|_| ())
            }),
        }
    }

    pub(crate) fn map_entry(key: &str) -> Self {
        let key = key.to_string();
        Self {
            name: key.clone(),
            setter: Arc::new(move |target: &Value, value: Value| {
                if let Value::Map(map) = target {
                    map.write().insert(key.clone(), value);
                }
                Ok(())
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set(&self, target: &Value, value: Value) -> anyhow::Result<()> {
        (self.setter)(target, value)
    }
}

impl fmt::Debug for SetterData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SetterData({})", self.name)
    }
}

/// Convert the actual arguments to the shapes the method declared.
fn adapt_arguments(def: &MethodDef, args: Vec<Option<Value>>) -> Vec<Option<Value>> {
    let mut args = args.into_iter();
    let mut adapted: Vec<Option<Value>> = def
        .params
        .iter()
        .map(|param| args.next().flatten().map(|value| coerce(value, param)))
        .collect();
    if let Some(element) = &def.rest {
        let rest: Vec<Value> = args.flatten().map(|value| coerce(value, element)).collect();
        adapted.push(Some(Value::list(rest)));
    }
    adapted
}

/// Numeric coercion of `value` to the declared parameter type. Values that
/// cannot be represented in the target type are passed unchanged.
pub fn coerce(value: Value, target: &ValueType) -> Value {
    if value.type_of() == *target {
        return value;
    }
    let integral = match &value {
        Value::Char(c) => Some(i64::from(u32::from(*c))),
        other => other.as_i64(),
    };
    let converted = match target {
        ValueType::Byte => integral.and_then(|n| i8::try_from(n).ok()).map(Value::Byte),
        ValueType::Short => integral.and_then(|n| i16::try_from(n).ok()).map(Value::Short),
        ValueType::Int => integral.and_then(|n| i32::try_from(n).ok()).map(Value::Int),
        ValueType::Long => integral.map(Value::Long),
        ValueType::Float => value.as_f64().map(|n| Value::Float(n as f32)),
        ValueType::Double => value.as_f64().map(Value::Double),
        _ => None,
    };
    converted.unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_args() -> Arc<MethodDef> {
        Arc::new(
            MethodDef::new("echo", [ValueType::Long], |_, args| {
                Ok(Some(Value::list(args.iter().flatten().cloned())))
            })
            .variadic(ValueType::Double),
        )
    }

    #[test]
    fn test_coerce_numbers() {
        assert_eq!(coerce(Value::Int(3), &ValueType::Long), Value::Long(3));
        assert_eq!(coerce(Value::Int(3), &ValueType::Double), Value::Double(3.0));
        assert_eq!(coerce(Value::Long(300), &ValueType::Byte), Value::Long(300));
        assert_eq!(coerce(Value::Char('A'), &ValueType::Int), Value::Int(65));
        assert_eq!(coerce(Value::from("x"), &ValueType::Int), Value::from("x"));
    }

    #[test]
    fn test_rest_arguments_are_packed() {
        let method = MethodData::new(echo_args());
        let result = method
            .invoke(
                &Value::Bool(true),
                vec![Some(Value::Int(1)), Some(Value::Int(2)), Some(Value::Float(0.5))],
            )
            .unwrap()
            .unwrap();
        assert_eq!(result.to_string(), "[1, [2, 0.5]]");
        let Value::List(items) = result else {
            panic!("expected list");
        };
        assert_eq!(items.read()[0], Value::Long(1));
    }

    #[test]
    fn test_missing_rest_arguments_become_empty_list() {
        let method = MethodData::new(echo_args());
        let result = method
            .invoke(&Value::Bool(true), vec![Some(Value::Int(1))])
            .unwrap()
            .unwrap();
        assert_eq!(result.to_string(), "[1, []]");
    }

    #[test]
    fn test_void_returns_empty_string() {
        let def = Arc::new(MethodDef::new("noop", [], |_, _| Ok(None)).void());
        let method = MethodData::new(def);
        assert_eq!(
            method.invoke(&Value::Int(1), Vec::new()).unwrap(),
            Some(Value::String(String::new()))
        );
    }

    #[test]
    fn test_errors_propagate() {
        let def = Arc::new(MethodDef::new("boom", [], |_, _| anyhow::bail!("kaboom")));
        let method = MethodData::new(def);
        let err = method.invoke(&Value::Int(1), Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "kaboom");
    }

    #[test]
    fn test_map_entry_accessors() {
        let map = Value::map([("a", Value::Int(1))]);
        let getter = PropertyData::map_entry("a");
        assert_eq!(getter.get(&map).unwrap(), Some(Value::Int(1)));
        SetterData::map_entry("b").set(&map, Value::Int(2)).unwrap();
        assert_eq!(PropertyData::map_entry("b").get(&map).unwrap(), Some(Value::Int(2)));
    }
}
