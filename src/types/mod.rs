//! Concrete type descriptors embedded in `cast` and `width_slice`
//! instructions and attached to function parameters.

use std::fmt;
use std::rc::Rc;

use crate::ast::EnumDef;

#[derive(Debug, Clone, PartialEq)]
pub enum ConcreteType {
    Bits { signed: bool, width: usize },
    /// `element[size]`; nested arrays read inside-out, so `u8[4][2]` is two
    /// arrays of four bytes.
    Array { element: Box<ConcreteType>, size: usize },
    Tuple(Vec<ConcreteType>),
    Enum(Rc<EnumDef>),
    Token,
}

impl ConcreteType {
    pub fn ubits(width: usize) -> Self {
        ConcreteType::Bits { signed: false, width }
    }

    pub fn sbits(width: usize) -> Self {
        ConcreteType::Bits { signed: true, width }
    }

    pub fn array(element: ConcreteType, size: usize) -> Self {
        ConcreteType::Array { element: Box::new(element), size }
    }

    pub fn unit() -> Self {
        ConcreteType::Tuple(Vec::new())
    }

    /// Width of the flattened form; `None` when it does not fit in `usize`.
    pub fn total_bit_count(&self) -> Option<usize> {
        match self {
            ConcreteType::Bits { width, .. } => Some(*width),
            ConcreteType::Array { element, size } => element.total_bit_count()?.checked_mul(*size),
            ConcreteType::Tuple(members) => members
                .iter()
                .try_fold(0usize, |acc, m| acc.checked_add(m.total_bit_count()?)),
            ConcreteType::Enum(def) => Some(def.width),
            ConcreteType::Token => Some(0),
        }
    }

    pub fn is_signed(&self) -> bool {
        match self {
            ConcreteType::Bits { signed, .. } => *signed,
            ConcreteType::Enum(def) => def.signed,
            _ => false,
        }
    }

    pub fn is_bits(&self) -> bool {
        matches!(self, ConcreteType::Bits { .. })
    }
}

impl fmt::Display for ConcreteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcreteType::Bits { signed, width } => {
                write!(f, "{}{}", if *signed { 's' } else { 'u' }, width)
            }
            ConcreteType::Array { element, size } => write!(f, "{element}[{size}]"),
            ConcreteType::Tuple(members) => {
                write!(f, "(")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{m}")?;
                }
                write!(f, ")")
            }
            ConcreteType::Enum(def) => write!(f, "{}", def.name),
            ConcreteType::Token => write!(f, "token"),
        }
    }
}
