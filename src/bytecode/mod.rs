//! Stack-machine instruction set consumed by the interpreter.
//!
//! Every instruction is an opcode with at most one inline operand plus the
//! span of the source construct it was emitted for. The text form produced by
//! `Display` is the syntax accepted by the assembler.

use std::fmt;
use std::rc::Rc;

use crate::ast::{Function, Span};
use crate::cache::{SymbolicBindings, TypeInfo};
use crate::types::ConcreteType;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Add,
    And,
    Call,
    Cast,
    Concat,
    CreateArray,
    CreateTuple,
    Div,
    Eq,
    ExpandTuple,
    Ge,
    Gt,
    Index,
    Invert,
    JumpDest,
    JumpRel,
    JumpRelIf,
    Le,
    Literal,
    Load,
    LogicalAnd,
    LogicalOr,
    Lt,
    Mul,
    Ne,
    Negate,
    Or,
    Shll,
    Shrl,
    Slice,
    Store,
    Sub,
    WidthSlice,
    Xor,
}

/// The shape of the inline operand an opcode carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    Value,
    NumElements,
    SlotIndex,
    JumpTarget,
    Type,
    /// `call` may carry the caller's parametric bindings.
    OptionalBindings,
}

impl Op {
    pub const ALL: [Op; 34] = [
        Op::Add, Op::And, Op::Call, Op::Cast, Op::Concat, Op::CreateArray,
        Op::CreateTuple, Op::Div, Op::Eq, Op::ExpandTuple, Op::Ge, Op::Gt,
        Op::Index, Op::Invert, Op::JumpDest, Op::JumpRel, Op::JumpRelIf, Op::Le,
        Op::Literal, Op::Load, Op::LogicalAnd, Op::LogicalOr, Op::Lt, Op::Mul,
        Op::Ne, Op::Negate, Op::Or, Op::Shll, Op::Shrl, Op::Slice, Op::Store,
        Op::Sub, Op::WidthSlice, Op::Xor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::And => "and",
            Op::Call => "call",
            Op::Cast => "cast",
            Op::Concat => "concat",
            Op::CreateArray => "create_array",
            Op::CreateTuple => "create_tuple",
            Op::Div => "div",
            Op::Eq => "eq",
            Op::ExpandTuple => "expand_tuple",
            Op::Ge => "ge",
            Op::Gt => "gt",
            Op::Index => "index",
            Op::Invert => "invert",
            Op::JumpDest => "jump_dest",
            Op::JumpRel => "jump_rel",
            Op::JumpRelIf => "jump_rel_if",
            Op::Le => "le",
            Op::Literal => "literal",
            Op::Load => "load",
            Op::LogicalAnd => "logical_and",
            Op::LogicalOr => "logical_or",
            Op::Lt => "lt",
            Op::Mul => "mul",
            Op::Ne => "ne",
            Op::Negate => "negate",
            Op::Or => "or",
            Op::Shll => "shll",
            Op::Shrl => "shrl",
            Op::Slice => "slice",
            Op::Store => "store",
            Op::Sub => "sub",
            Op::WidthSlice => "width_slice",
            Op::Xor => "xor",
        }
    }

    pub fn from_name(name: &str) -> Option<Op> {
        Op::ALL.iter().copied().find(|op| op.name() == name)
    }

    pub fn operand(self) -> OperandKind {
        match self {
            Op::Literal => OperandKind::Value,
            Op::CreateArray | Op::CreateTuple => OperandKind::NumElements,
            Op::Load | Op::Store => OperandKind::SlotIndex,
            Op::JumpRel | Op::JumpRelIf => OperandKind::JumpTarget,
            Op::Cast | Op::WidthSlice => OperandKind::Type,
            Op::Call => OperandKind::OptionalBindings,
            _ => OperandKind::None,
        }
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Op::JumpRel | Op::JumpRelIf)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Value(Value),
    NumElements(usize),
    SlotIndex(usize),
    JumpTarget(isize),
    Type(ConcreteType),
    Bindings(SymbolicBindings),
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Data::Value(v) => write!(f, "{v}"),
            Data::NumElements(n) | Data::SlotIndex(n) => write!(f, "{n}"),
            Data::JumpTarget(offset) => write!(f, "{offset:+}"),
            Data::Type(ty) => write!(f, "{ty}"),
            Data::Bindings(b) => write!(f, "{b}"),
        }
    }
}

/// Raised when an instruction lacks the operand its opcode needs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("`{op}` bytecode has no {expected} operand")]
pub struct OperandError {
    pub op: Op,
    pub expected: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    pub span: Span,
    pub op: Op,
    pub data: Option<Data>,
}

impl Bytecode {
    pub fn new(span: Span, op: Op) -> Self {
        Bytecode { span, op, data: None }
    }

    pub fn with_data(span: Span, op: Op, data: Data) -> Self {
        Bytecode { span, op, data: Some(data) }
    }

    fn missing(&self, expected: &'static str) -> OperandError {
        OperandError { op: self.op, expected }
    }

    pub fn value_data(&self) -> Result<&Value, OperandError> {
        match &self.data {
            Some(Data::Value(v)) => Ok(v),
            _ => Err(self.missing("value")),
        }
    }

    pub fn num_elements(&self) -> Result<usize, OperandError> {
        match self.data {
            Some(Data::NumElements(n)) => Ok(n),
            _ => Err(self.missing("element count")),
        }
    }

    pub fn slot_index(&self) -> Result<usize, OperandError> {
        match self.data {
            Some(Data::SlotIndex(n)) => Ok(n),
            _ => Err(self.missing("slot index")),
        }
    }

    pub fn jump_target(&self) -> Result<isize, OperandError> {
        match self.data {
            Some(Data::JumpTarget(offset)) => Ok(offset),
            _ => Err(self.missing("jump target")),
        }
    }

    pub fn type_data(&self) -> Result<&ConcreteType, OperandError> {
        match &self.data {
            Some(Data::Type(ty)) => Ok(ty),
            _ => Err(self.missing("type")),
        }
    }

    pub fn bindings(&self) -> Option<&SymbolicBindings> {
        match &self.data {
            Some(Data::Bindings(b)) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            Some(data) => write!(f, "{} {}", self.op, data),
            None => write!(f, "{}", self.op),
        }
    }
}

/// A compiled function body. Shared read-only between the cache and every
/// frame executing it.
#[derive(Debug, Clone)]
pub struct BytecodeFunction {
    function: Option<Rc<Function>>,
    type_info: Option<Rc<TypeInfo>>,
    bytecodes: Vec<Bytecode>,
}

impl BytecodeFunction {
    pub fn new(function: Rc<Function>, type_info: Option<Rc<TypeInfo>>, bytecodes: Vec<Bytecode>) -> Self {
        BytecodeFunction { function: Some(function), type_info, bytecodes }
    }

    /// A body with no owning function, e.g. a constant expression.
    pub fn anonymous(bytecodes: Vec<Bytecode>) -> Self {
        BytecodeFunction { function: None, type_info: None, bytecodes }
    }

    pub fn function(&self) -> Option<&Rc<Function>> {
        self.function.as_ref()
    }

    pub fn type_info(&self) -> Option<&Rc<TypeInfo>> {
        self.type_info.as_ref()
    }

    pub fn bytecodes(&self) -> &[Bytecode] {
        &self.bytecodes
    }

    pub fn param_count(&self) -> usize {
        self.function.as_ref().map_or(0, |f| f.param_count())
    }

    pub fn name(&self) -> String {
        self.function
            .as_ref()
            .map_or_else(|| "<anonymous>".to_string(), |f| f.identifier())
    }

    pub fn with_type_info(mut self, type_info: Rc<TypeInfo>) -> Self {
        self.type_info = Some(type_info);
        self
    }
}

impl fmt::Display for BytecodeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pc, bc) in self.bytecodes.iter().enumerate() {
            writeln!(f, "{pc:03} {bc}")?;
        }
        Ok(())
    }
}
