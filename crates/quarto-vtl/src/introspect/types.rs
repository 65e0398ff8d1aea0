/*
 * types.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Runtime and declared types used by member resolution.

use std::fmt;
use std::sync::Arc;

/// The type of a runtime value, or the declared type of a parameter.
///
/// `Object` only appears as a declared type: it is the root of every class
/// hierarchy and accepts any argument, including null.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Object,
    Bool,
    Char,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    List,
    Map,
    /// A host class registered in the [`TypeRegistry`](super::TypeRegistry).
    Class(Arc<str>),
}

impl ValueType {
    /// Map a class name to a type, recognising the built-in names.
    pub fn named(name: &str) -> Self {
        match name {
            "Object" => ValueType::Object,
            "Boolean" => ValueType::Bool,
            "Character" => ValueType::Char,
            "Byte" => ValueType::Byte,
            "Short" => ValueType::Short,
            "Integer" => ValueType::Int,
            "Long" => ValueType::Long,
            "Float" => ValueType::Float,
            "Double" => ValueType::Double,
            "String" => ValueType::String,
            "List" => ValueType::List,
            "Map" => ValueType::Map,
            other => ValueType::Class(Arc::from(other)),
        }
    }

    /// Class name of this type as registered in the type registry.
    pub fn name(&self) -> &str {
        match self {
            ValueType::Object => "Object",
            ValueType::Bool => "Boolean",
            ValueType::Char => "Character",
            ValueType::Byte => "Byte",
            ValueType::Short => "Short",
            ValueType::Int => "Integer",
            ValueType::Long => "Long",
            ValueType::Float => "Float",
            ValueType::Double => "Double",
            ValueType::String => "String",
            ValueType::List => "List",
            ValueType::Map => "Map",
            ValueType::Class(name) => name,
        }
    }

    /// Primitive types never accept null.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            ValueType::Bool
                | ValueType::Char
                | ValueType::Byte
                | ValueType::Short
                | ValueType::Int
                | ValueType::Long
                | ValueType::Float
                | ValueType::Double
        )
    }

    /// Position in the numeric promotion order, `None` for non-numbers.
    pub fn numeric_rank(&self) -> Option<u8> {
        match self {
            ValueType::Byte => Some(0),
            ValueType::Short => Some(1),
            ValueType::Int => Some(2),
            ValueType::Long => Some(3),
            ValueType::Float => Some(4),
            ValueType::Double => Some(5),
            _ => None,
        }
    }

    /// Primitive widening conversion from `self` to `target`.
    pub fn widens_to(&self, target: &ValueType) -> bool {
        use ValueType::*;
        match self {
            Byte => matches!(target, Short | Int | Long | Float | Double),
            Short | Char => matches!(target, Int | Long | Float | Double),
            Int => matches!(target, Long | Float | Double),
            Long => matches!(target, Float | Double),
            Float => matches!(target, Double),
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_round_trips_builtins() {
        for ty in [
            ValueType::Object,
            ValueType::Int,
            ValueType::String,
            ValueType::Map,
        ] {
            assert_eq!(ValueType::named(ty.name()), ty);
        }
        assert_eq!(
            ValueType::named("Person"),
            ValueType::Class(Arc::from("Person"))
        );
    }

    #[test]
    fn test_widening() {
        assert!(ValueType::Byte.widens_to(&ValueType::Double));
        assert!(ValueType::Int.widens_to(&ValueType::Long));
        assert!(ValueType::Char.widens_to(&ValueType::Int));
        assert!(!ValueType::Long.widens_to(&ValueType::Int));
        assert!(!ValueType::Double.widens_to(&ValueType::Float));
        assert!(!ValueType::Int.widens_to(&ValueType::Int));
    }
}
