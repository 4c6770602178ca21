//! Static types used while compiling conditions.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Nil,
    Bool,
    Int,
    Float,
    String,
    List(Box<Type>),
    /// Dynamically typed; checked during evaluation.
    Any,
}

impl Type {
    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// `self` can be used where a value of type `expected` is required.
    pub fn fits(&self, expected: &Type) -> bool {
        self.is_any() || expected.is_any() || self == expected
    }

    /// Whether `==` between the two types can ever be true.
    pub fn comparable(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Any, _) | (_, Type::Any) | (Type::Nil, _) | (_, Type::Nil) => true,
            (a, b) if a.is_numeric() && b.is_numeric() => true,
            (Type::List(a), Type::List(b)) => a.comparable(b),
            (a, b) => a == b,
        }
    }

    /// Element type when iterating over a value of this type.
    pub fn element(&self) -> Option<Type> {
        match self {
            Type::List(elem) => Some((**elem).clone()),
            Type::Any => Some(Type::Any),
            _ => None,
        }
    }

    /// The narrowest type covering both `self` and `other`.
    pub fn unify(&self, other: &Type) -> Type {
        if self == other {
            self.clone()
        } else if self.is_numeric() && other.is_numeric() {
            Type::Float
        } else {
            Type::Any
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Nil => write!(f, "nil"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
            Type::List(elem) => write!(f, "[]{}", elem),
            Type::Any => write!(f, "interface {{}}"),
        }
    }
}
