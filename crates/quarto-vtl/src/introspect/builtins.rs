/*
 * builtins.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Members of the built-in value types.
//!
//! The method names follow the Java collection and string APIs that
//! Velocity templates are usually written against.

use anyhow::{Context as _, anyhow, bail};

use super::registry::{ClassBuilder, TypeRegistry};
use super::types::ValueType;
use crate::value::{ListRef, MapRef, Value};

pub(super) fn register(registry: &mut TypeRegistry) {
    registry.register(object_class());
    registry.register(string_class());
    registry.register(list_class());
    registry.register(map_class());
    registry.register(ClassBuilder::new("Boolean"));
    registry.register(ClassBuilder::new("Character"));
    for name in ["Byte", "Short", "Integer", "Long", "Float", "Double"] {
        registry.register(number_class(name));
    }
}

fn object_class() -> ClassBuilder {
    ClassBuilder::new("Object")
        .method("toString", [], |this, _| Ok(Some(Value::String(this.to_string()))))
        .method("equals", [ValueType::Object], |this, args| {
            Ok(Some(Value::Bool(arg(args, 0).is_some_and(|other| other == this))))
        })
}

fn string_class() -> ClassBuilder {
    use ValueType::{Int, Object};
    ClassBuilder::new("String")
        .method("length", [], |this, _| {
            Ok(Some(Value::Int(char_len(this_str(this)?)?)))
        })
        .method("isEmpty", [], |this, _| Ok(Some(Value::Bool(this_str(this)?.is_empty()))))
        .method("toUpperCase", [], |this, _| {
            Ok(Some(Value::String(this_str(this)?.to_uppercase())))
        })
        .method("toLowerCase", [], |this, _| {
            Ok(Some(Value::String(this_str(this)?.to_lowercase())))
        })
        .method("trim", [], |this, _| {
            Ok(Some(Value::String(this_str(this)?.trim().to_string())))
        })
        .method("concat", [ValueType::String], |this, args| {
            Ok(Some(Value::String(format!("{}{}", this_str(this)?, arg_str(args, 0)?))))
        })
        .method("substring", [Int], |this, args| {
            let s = this_str(this)?;
            let len = s.chars().count();
            let start = arg_index(args, 0, len)?;
            Ok(Some(Value::String(s.chars().skip(start).collect())))
        })
        .method("substring", [Int, Int], |this, args| {
            let s = this_str(this)?;
            let len = s.chars().count();
            let start = arg_index(args, 0, len)?;
            let end = arg_index(args, 1, len)?;
            if start > end {
                bail!("begin {start} is greater than end {end}");
            }
            Ok(Some(Value::String(s.chars().skip(start).take(end - start).collect())))
        })
        .method("charAt", [Int], |this, args| {
            let s = this_str(this)?;
            let index = arg_index(args, 0, s.chars().count().saturating_sub(1))?;
            let c = s.chars().nth(index).context("index out of range")?;
            Ok(Some(Value::Char(c)))
        })
        .method("indexOf", [ValueType::String], |this, args| {
            Ok(Some(Value::Int(char_index_of(this_str(this)?, &arg_str(args, 0)?, 0)?)))
        })
        .method("indexOf", [ValueType::String, Int], |this, args| {
            let from = usize::try_from(arg_int(args, 1)?.max(0))?;
            Ok(Some(Value::Int(char_index_of(this_str(this)?, &arg_str(args, 0)?, from)?)))
        })
        .method("startsWith", [ValueType::String], |this, args| {
            Ok(Some(Value::Bool(this_str(this)?.starts_with(arg_str(args, 0)?.as_str()))))
        })
        .method("endsWith", [ValueType::String], |this, args| {
            Ok(Some(Value::Bool(this_str(this)?.ends_with(arg_str(args, 0)?.as_str()))))
        })
        .method("contains", [ValueType::String], |this, args| {
            Ok(Some(Value::Bool(this_str(this)?.contains(arg_str(args, 0)?.as_str()))))
        })
        .method("equalsIgnoreCase", [ValueType::String], |this, args| {
            let this = this_str(this)?.to_lowercase();
            let other = arg(args, 0).and_then(Value::as_str).map(str::to_lowercase);
            Ok(Some(Value::Bool(other.as_deref() == Some(this.as_str()))))
        })
        .method("replace", [ValueType::String, ValueType::String], |this, args| {
            let from = arg_str(args, 0)?;
            let to = arg_str(args, 1)?;
            Ok(Some(Value::String(this_str(this)?.replace(from.as_str(), &to))))
        })
        .method("split", [ValueType::String], |this, args| {
            let sep = arg_str(args, 0)?;
            let parts = this_str(this)?
                .split(sep.as_str())
                .map(|part| Value::String(part.to_string()));
            Ok(Some(Value::list(parts)))
        })
        .method("compareTo", [Object], |this, args| {
            let other = arg(args, 0).context("argument is null")?.to_string();
            Ok(Some(Value::Int(match this_str(this)?.cmp(other.as_str()) {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            })))
        })
}

fn list_class() -> ClassBuilder {
    use ValueType::{Int, Object};
    ClassBuilder::new("List")
        .method("size", [], |this, _| Ok(Some(Value::Int(len_i32(this_list(this)?.read().len())?))))
        .method("isEmpty", [], |this, _| Ok(Some(Value::Bool(this_list(this)?.read().is_empty()))))
        .method("get", [Int], |this, args| {
            let list = this_list(this)?.read();
            let index = arg_index(args, 0, list.len().saturating_sub(1))?;
            list.get(index)
                .cloned()
                .map(Some)
                .ok_or_else(|| anyhow!("index {index} out of bounds for length {}", list.len()))
        })
        .void_method("add", [Object], |this, args| {
            if let Some(value) = arg(args, 0) {
                this_list(this)?.write().push(value.clone());
            }
            Ok(())
        })
        .void_method("add", [Int, Object], |this, args| {
            let mut list = this_list(this)?.write();
            let index = arg_index(args, 0, list.len())?;
            if let Some(value) = arg(args, 1) {
                list.insert(index, value.clone());
            }
            Ok(())
        })
        .method("set", [Int, Object], |this, args| {
            let mut list = this_list(this)?.write();
            let index = arg_index(args, 0, list.len().saturating_sub(1))?;
            let value = arg(args, 1).context("cannot store null in a list")?.clone();
            let slot = list.get_mut(index).context("index out of bounds")?;
            Ok(Some(std::mem::replace(slot, value)))
        })
        .method("remove", [Int], |this, args| {
            let mut list = this_list(this)?.write();
            let index = arg_index(args, 0, list.len().saturating_sub(1))?;
            if index >= list.len() {
                bail!("index {index} out of bounds for length {}", list.len());
            }
            Ok(Some(list.remove(index)))
        })
        .method("contains", [Object], |this, args| {
            let list = this_list(this)?.read();
            Ok(Some(Value::Bool(arg(args, 0).is_some_and(|v| list.contains(v)))))
        })
        .method("indexOf", [Object], |this, args| {
            let list = this_list(this)?.read();
            let position = arg(args, 0).and_then(|v| list.iter().position(|item| item == v));
            Ok(Some(Value::Int(match position {
                Some(i) => len_i32(i)?,
                None => -1,
            })))
        })
        .void_method("clear", [], |this, _| {
            this_list(this)?.write().clear();
            Ok(())
        })
}

fn map_class() -> ClassBuilder {
    use ValueType::Object;
    ClassBuilder::new("Map")
        .method("get", [Object], |this, args| {
            let key = arg_key(args, 0)?;
            Ok(this_map(this)?.read().get(&key).cloned())
        })
        .method("put", [Object, Object], |this, args| {
            let key = arg_key(args, 0)?;
            let mut map = this_map(this)?.write();
            Ok(match arg(args, 1) {
                Some(value) => map.insert(key, value.clone()),
                None => map.remove(&key),
            })
        })
        .method("containsKey", [Object], |this, args| {
            let key = arg_key(args, 0)?;
            Ok(Some(Value::Bool(this_map(this)?.read().contains_key(&key))))
        })
        .method("remove", [Object], |this, args| {
            let key = arg_key(args, 0)?;
            Ok(this_map(this)?.write().remove(&key))
        })
        .method("size", [], |this, _| Ok(Some(Value::Int(len_i32(this_map(this)?.read().len())?))))
        .method("isEmpty", [], |this, _| Ok(Some(Value::Bool(this_map(this)?.read().is_empty()))))
        .method("keySet", [], |this, _| {
            let keys = this_map(this)?.read().keys().cloned().map(Value::String).collect::<Vec<_>>();
            Ok(Some(Value::list(keys)))
        })
        .method("values", [], |this, _| {
            let values = this_map(this)?.read().values().cloned().collect::<Vec<_>>();
            Ok(Some(Value::list(values)))
        })
}

fn number_class(name: &str) -> ClassBuilder {
    ClassBuilder::new(name)
        .method("intValue", [], |this, _| {
            let n = this.as_f64().context("receiver is not a number")?;
            Ok(Some(Value::Int(n as i32)))
        })
        .method("longValue", [], |this, _| {
            let n = this.as_f64().context("receiver is not a number")?;
            Ok(Some(Value::Long(n as i64)))
        })
        .method("doubleValue", [], |this, _| {
            Ok(Some(Value::Double(this.as_f64().context("receiver is not a number")?)))
        })
}

fn arg(args: &[Option<Value>], index: usize) -> Option<&Value> {
    args.get(index).and_then(Option::as_ref)
}

fn arg_str(args: &[Option<Value>], index: usize) -> anyhow::Result<String> {
    match arg(args, index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => bail!("argument {index} is null"),
    }
}

fn arg_key(args: &[Option<Value>], index: usize) -> anyhow::Result<String> {
    arg(args, index)
        .map(ToString::to_string)
        .ok_or_else(|| anyhow!("map keys cannot be null"))
}

fn arg_int(args: &[Option<Value>], index: usize) -> anyhow::Result<i64> {
    arg(args, index)
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow!("argument {index} is not an integer"))
}

/// An integer argument checked against `0..=max`.
fn arg_index(args: &[Option<Value>], index: usize, max: usize) -> anyhow::Result<usize> {
    let n = arg_int(args, index)?;
    match usize::try_from(n) {
        Ok(i) if i <= max => Ok(i),
        _ => bail!("index {n} out of range 0..={max}"),
    }
}

fn this_str(this: &Value) -> anyhow::Result<&str> {
    this.as_str().context("receiver is not a String")
}

fn this_list(this: &Value) -> anyhow::Result<&ListRef> {
    match this {
        Value::List(list) => Ok(list),
        _ => bail!("receiver is not a List"),
    }
}

fn this_map(this: &Value) -> anyhow::Result<&MapRef> {
    match this {
        Value::Map(map) => Ok(map),
        _ => bail!("receiver is not a Map"),
    }
}

fn len_i32(len: usize) -> anyhow::Result<i32> {
    Ok(i32::try_from(len)?)
}

fn char_len(s: &str) -> anyhow::Result<i32> {
    len_i32(s.chars().count())
}

fn char_index_of(haystack: &str, needle: &str, from: usize) -> anyhow::Result<i32> {
    let Some((start, _)) = haystack.char_indices().nth(from) else {
        return Ok(if from == haystack.chars().count() && needle.is_empty() {
            len_i32(from)?
        } else {
            -1
        });
    };
    match haystack[start..].find(needle) {
        Some(byte_offset) => len_i32(from + haystack[start..start + byte_offset].chars().count()),
        None => Ok(-1),
    }
}
