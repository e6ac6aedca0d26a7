use std::{fmt::Display, fmt::Formatter};

use serde::{Deserialize, Serialize};
use vela_core::Ident;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntWidth {
    I1,
    I8,
    I16,
    I32,
    I64,
}

impl IntWidth {
    pub const ALL: [IntWidth; 5] = [
        IntWidth::I1,
        IntWidth::I8,
        IntWidth::I16,
        IntWidth::I32,
        IntWidth::I64,
    ];

    pub fn bits(self) -> u32 {
        match self {
            IntWidth::I1 => 1,
            IntWidth::I8 => 8,
            IntWidth::I16 => 16,
            IntWidth::I32 => 32,
            IntWidth::I64 => 64,
        }
    }

    /// `i1` is a boolean and holds `0` or `1`; the other widths are signed.
    pub fn min(self) -> i128 {
        match self {
            IntWidth::I1 => 0,
            _ => -(1i128 << (self.bits() - 1)),
        }
    }

    pub fn max(self) -> i128 {
        match self {
            IntWidth::I1 => 1,
            _ => (1i128 << (self.bits() - 1)) - 1,
        }
    }

    pub fn contains(self, value: i128) -> bool {
        (self.min()..=self.max()).contains(&value)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            IntWidth::I1 => "i1",
            IntWidth::I8 => "i8",
            IntWidth::I16 => "i16",
            IntWidth::I32 => "i32",
            IntWidth::I64 => "i64",
        }
    }
}

impl Display for IntWidth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Int(IntWidth),
    Unit,
    /// Address of a memory location holding the inner type.
    Address(Box<Type>),
    /// Reference to an instance of a class.
    Object(Ident),
    /// A function value, as produced by `function_ref` or a method lookup.
    Function,
}

impl Type {
    pub fn is_unit(&self) -> bool {
        matches!(self, Type::Unit)
    }

    pub fn is_address(&self) -> bool {
        matches!(self, Type::Address(_))
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int(width) => write!(f, "{width}"),
            Type::Unit => write!(f, "()"),
            Type::Address(inner) => write!(f, "*{inner}"),
            Type::Object(class) => write!(f, "${class}"),
            Type::Function => write!(f, "func"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_ranges() {
        assert!(IntWidth::I8.contains(127));
        assert!(!IntWidth::I8.contains(128));
        assert!(IntWidth::I8.contains(-128));
        assert!(!IntWidth::I1.contains(2));
        assert_eq!(IntWidth::I64.max(), i64::MAX as i128);
        assert_eq!(IntWidth::from_name("i16"), Some(IntWidth::I16));
        assert_eq!(IntWidth::from_name("i128"), None);
    }

    #[test]
    fn test_type_display() {
        let ty = Type::Address(Box::new(Type::Object(Ident::new("Circle"))));
        assert_eq!(ty.to_string(), "*$Circle");
        assert_eq!(Type::Int(IntWidth::I1).to_string(), "i1");
        assert_eq!(Type::Unit.to_string(), "()");
    }
}
