/*
 * value.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Host values exposed to templates.
//!
//! Templates see a closed set of built-in value kinds plus arbitrary host
//! objects. Null is not a value: it is represented as `Option<Value>::None`
//! everywhere in the engine.
//!
//! Lists and maps are shared and mutable so that `$list.add(...)` or
//! `#set($map.key = ...)` inside a template is visible to the host.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use hashlink::LinkedHashMap;
use parking_lot::RwLock;

use crate::introspect::ValueType;

/// Shared, mutable list.
pub type ListRef = Arc<RwLock<Vec<Value>>>;

/// Shared, mutable, insertion-ordered map with string keys.
pub type MapRef = Arc<RwLock<LinkedHashMap<String, Value>>>;

/// A non-null value visible to templates.
#[derive(Clone)]
pub enum Value {
    Bool(bool),
    Char(char),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    List(ListRef),
    Map(MapRef),
    Object(Arc<dyn HostObject>),
}

/// A host object whose members are described in the type registry.
pub trait HostObject: Any + Send + Sync + fmt::Debug {
    /// Name of the registered class describing this object's members.
    fn class_name(&self) -> &str;

    /// Downcasting support for host callables.
    fn as_any(&self) -> &dyn Any;

    /// Text written when the object itself is rendered.
    fn render(&self) -> String {
        format!("{self:?}")
    }

    /// Dynamic member access, consulted before the type registry.
    fn duck(&self) -> Option<&dyn DuckObject> {
        None
    }

    /// Elements produced when the object is the source of a `#foreach`.
    fn iterate(&self) -> Option<Vec<Value>> {
        None
    }
}

/// Objects that resolve members by name at runtime instead of through the
/// type registry.
pub trait DuckObject {
    /// Read a property. `None` renders as an unresolved reference.
    fn get(&self, name: &str) -> Option<Value>;

    /// Write a property. Returns false if the object refused the write.
    fn set(&self, name: &str, value: Value) -> bool;

    /// Call a method.
    fn invoke(&self, method: &str, args: &[Option<Value>]) -> anyhow::Result<Option<Value>>;
}

impl Value {
    /// Wrap a host object.
    pub fn object<T: HostObject>(object: T) -> Self {
        Value::Object(Arc::new(object))
    }

    /// Create a list value.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Arc::new(RwLock::new(items.into_iter().collect())))
    }

    /// Create a map value, keeping the given entry order.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        let map: LinkedHashMap<String, Value> =
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Value::Map(Arc::new(RwLock::new(map)))
    }

    /// Runtime type of this value.
    pub fn type_of(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Char(_) => ValueType::Char,
            Value::Byte(_) => ValueType::Byte,
            Value::Short(_) => ValueType::Short,
            Value::Int(_) => ValueType::Int,
            Value::Long(_) => ValueType::Long,
            Value::Float(_) => ValueType::Float,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::List(_) => ValueType::List,
            Value::Map(_) => ValueType::Map,
            Value::Object(obj) => ValueType::named(obj.class_name()),
        }
    }

    /// Borrow the host object as a concrete type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Value::Object(obj) => obj.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integral value of an integer-typed value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(n) => Some(i64::from(*n)),
            Value::Short(n) => Some(i64::from(*n)),
            Value::Int(n) => Some(i64::from(*n)),
            Value::Long(n) => Some(*n),
            _ => None,
        }
    }

    /// Any numeric value as `f64`. Floats widen through their shortest
    /// decimal form, so `1.2f32` becomes exactly `1.2f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(widen_f32(*f)),
            Value::Double(d) => Some(*d),
            other => other.as_i64().map(|n| n as f64),
        }
    }

    pub fn is_number(&self) -> bool {
        self.type_of().numeric_rank().is_some()
    }

    /// Elements produced when this value is iterated by `#foreach`.
    ///
    /// Lists yield their elements, maps their values. Host objects decide for
    /// themselves. Everything else is not iterable.
    pub fn iter_values(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(list) => Some(list.read().clone()),
            Value::Map(map) => Some(map.read().values().cloned().collect()),
            Value::Object(obj) => obj.iterate(),
            _ => None,
        }
    }

    /// Convert JSON to a value. JSON `null` (and null members) are dropped.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(match i32::try_from(i) {
                        Ok(small) => Value::Int(small),
                        Err(_) => Value::Long(i),
                    })
                } else {
                    n.as_f64().map(Value::Double)
                }
            }
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Array(items) => {
                Some(Value::list(items.iter().filter_map(Value::from_json)))
            }
            serde_json::Value::Object(members) => Some(Value::map(
                members
                    .iter()
                    .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v))),
            )),
        }
    }
}

/// Widen a float through its shortest round-trip decimal representation.
pub(crate) fn widen_f32(f: f32) -> f64 {
    f.to_string().parse().unwrap_or(f64::from(f))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Char(c) => write!(f, "{c}"),
            Value::Byte(n) => write!(f, "{n}"),
            Value::Short(n) => write!(f, "{n}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Long(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Double(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::List(list) => {
                f.write_str("[")?;
                for (i, item) in list.read().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.read().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}={value}")?;
                }
                f.write_str("}")
            }
            Value::Object(obj) => f.write_str(&obj.render()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Object(obj) => write!(f, "Object({obj:?})"),
            other => write!(f, "{}({other})", other.type_of()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b) || *a.read() == *b.read(),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b) || *a.read() == *b.read(),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<i8> for Value {
    fn from(n: i8) -> Self {
        Value::Byte(n)
    }
}

impl From<i16> for Value {
    fn from(n: i16) -> Self {
        Value::Short(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Float(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(1.2).to_string(), "1.2");
        assert_eq!(Value::Double(6.5).to_string(), "6.5");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(
            Value::list([Value::Int(1), Value::from("a")]).to_string(),
            "[1, a]"
        );
        assert_eq!(
            Value::map([("b", Value::Int(2)), ("a", Value::Int(1))]).to_string(),
            "{b=2, a=1}"
        );
    }

    #[test]
    fn test_widen_f32_is_decimal_exact() {
        assert_eq!(widen_f32(1.2), 1.2_f64);
        assert_eq!(Value::Float(0.1).as_f64(), Some(0.1));
    }

    #[test]
    fn test_from_json() {
        let value = Value::from_json(&json!({
            "name": "x",
            "count": 3,
            "big": 10_000_000_000_i64,
            "ratio": 0.5,
            "gone": null,
            "items": [1, null, 2]
        }))
        .unwrap();
        let Value::Map(map) = &value else {
            panic!("expected map");
        };
        let map = map.read();
        assert_eq!(map.get("count"), Some(&Value::Int(3)));
        assert_eq!(map.get("big"), Some(&Value::Long(10_000_000_000)));
        assert_eq!(map.get("ratio"), Some(&Value::Double(0.5)));
        assert!(map.get("gone").is_none());
        assert_eq!(
            map.get("items"),
            Some(&Value::list([Value::Int(1), Value::Int(2)]))
        );
    }

    #[test]
    fn test_shared_list_mutation_visible() {
        let list = Value::list([Value::Int(1)]);
        let alias = list.clone();
        if let Value::List(items) = &alias {
            items.write().push(Value::Int(2));
        }
        assert_eq!(list.to_string(), "[1, 2]");
    }

    #[test]
    fn test_iter_values() {
        let map = Value::map([("a", Value::Int(1)), ("b", Value::Int(2))]);
        assert_eq!(map.iter_values(), Some(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(Value::Int(3).iter_values(), None);
    }
}
