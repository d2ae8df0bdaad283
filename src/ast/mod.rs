//! The slice of the front-end AST the interpreter depends on: modules,
//! function signatures and enum definitions. Bodies live in compiled
//! bytecode, never here.

use std::rc::Rc;

use serde::Serialize;

use crate::types::ConcreteType;
use crate::value::bits::Bits;

pub mod source_map;
pub use source_map::{Pos, SourceMap};

/// Byte range within source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const UNKNOWN: Span = Span { start: 0, end: 0 };

    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn is_unknown(&self) -> bool {
        *self == Span::UNKNOWN
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(range: std::ops::Range<usize>) -> Self {
        Span { start: range.start, end: range.end }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: ConcreteType,
}

/// A function signature. Identity is `(module, name)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub module: String,
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<ConcreteType>,
    /// Zero-parameter functions that the test runner executes.
    pub is_test: bool,
    pub span: Span,
}

impl Function {
    pub fn identifier(&self) -> String {
        format!("{}::{}", self.module, self.name)
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    pub name: String,
    pub value: Bits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: String,
    pub signed: bool,
    pub width: usize,
    pub members: Vec<EnumMember>,
}

impl EnumDef {
    pub fn underlying_type(&self) -> ConcreteType {
        ConcreteType::Bits { signed: self.signed, width: self.width }
    }

    pub fn member(&self, name: &str) -> Option<&Bits> {
        self.members.iter().find(|m| m.name == name).map(|m| &m.value)
    }

    pub fn member_name(&self, bits: &Bits) -> Option<&str> {
        self.members.iter().find(|m| &m.value == bits).map(|m| m.name.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Rc<Function>>,
    pub enums: Vec<Rc<EnumDef>>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module { name: name.into(), functions: Vec::new(), enums: Vec::new() }
    }

    pub fn get_function(&self, name: &str) -> Option<&Rc<Function>> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn get_enum(&self, name: &str) -> Option<&Rc<EnumDef>> {
        self.enums.iter().find(|e| e.name == name)
    }

    pub fn tests(&self) -> impl Iterator<Item = &Rc<Function>> {
        self.functions.iter().filter(|f| f.is_test)
    }
}
