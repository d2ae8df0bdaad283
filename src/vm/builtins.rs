//! Built-in functions callable through `call` without a new frame.
//!
//! A builtin runs directly against the operand stack. The set of names is
//! closed; whether a name has a handler is decided by the `BuiltinTable` the
//! interpreter runs with.

use std::collections::HashMap;
use std::fmt;

use crate::bytecode::Bytecode;
use crate::value::{Bits, Value};
use super::stack::Stack;
use super::{VmError, VmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    AndReduce,
    AssertEq,
    AssertLt,
    BitSlice,
    Clz,
    Ctz,
    Enumerate,
    Fail,
    Map,
    OneHot,
    OneHotSel,
    OrReduce,
    Range,
    Rev,
    SignEx,
    Slice,
    Trace,
    Update,
    XorReduce,
}

impl Builtin {
    pub const ALL: [Builtin; 19] = [
        Builtin::AndReduce, Builtin::AssertEq, Builtin::AssertLt, Builtin::BitSlice,
        Builtin::Clz, Builtin::Ctz, Builtin::Enumerate, Builtin::Fail, Builtin::Map,
        Builtin::OneHot, Builtin::OneHotSel, Builtin::OrReduce, Builtin::Range,
        Builtin::Rev, Builtin::SignEx, Builtin::Slice, Builtin::Trace,
        Builtin::Update, Builtin::XorReduce,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::AndReduce => "and_reduce",
            Builtin::AssertEq => "assert_eq",
            Builtin::AssertLt => "assert_lt",
            Builtin::BitSlice => "bit_slice",
            Builtin::Clz => "clz",
            Builtin::Ctz => "ctz",
            Builtin::Enumerate => "enumerate",
            Builtin::Fail => "fail!",
            Builtin::Map => "map",
            Builtin::OneHot => "one_hot",
            Builtin::OneHotSel => "one_hot_sel",
            Builtin::OrReduce => "or_reduce",
            Builtin::Range => "range",
            Builtin::Rev => "rev",
            Builtin::SignEx => "signex",
            Builtin::Slice => "slice",
            Builtin::Trace => "trace!",
            Builtin::Update => "update",
            Builtin::XorReduce => "xor_reduce",
        }
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        Builtin::ALL.iter().copied().find(|b| b.name() == name)
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A builtin's implementation. Receives the `call` instruction for its span.
pub type BuiltinFn = fn(&Bytecode, &mut Stack) -> VmResult<()>;

#[derive(Clone)]
pub struct BuiltinTable {
    handlers: HashMap<Builtin, BuiltinFn>,
}

impl BuiltinTable {
    pub fn empty() -> Self {
        BuiltinTable { handlers: HashMap::new() }
    }

    /// The handlers this crate ships.
    pub fn standard() -> Self {
        let mut table = BuiltinTable::empty();
        table
            .register(Builtin::AssertEq, assert_eq)
            .register(Builtin::AssertLt, assert_lt)
            .register(Builtin::Fail, fail)
            .register(Builtin::Rev, rev)
            .register(Builtin::Clz, clz)
            .register(Builtin::Ctz, ctz)
            .register(Builtin::AndReduce, and_reduce)
            .register(Builtin::OrReduce, or_reduce)
            .register(Builtin::XorReduce, xor_reduce);
        table
    }

    pub fn register(&mut self, builtin: Builtin, handler: BuiltinFn) -> &mut Self {
        self.handlers.insert(builtin, handler);
        self
    }

    pub fn contains(&self, builtin: Builtin) -> bool {
        self.handlers.contains_key(&builtin)
    }

    pub fn run(&self, builtin: Builtin, bytecode: &Bytecode, stack: &mut Stack) -> VmResult<()> {
        match self.handlers.get(&builtin) {
            Some(handler) => handler(bytecode, stack),
            None => Err(VmError::Unimplemented(format!(
                "builtin function \"{}\" not yet implemented",
                builtin.name()
            ))),
        }
    }
}

impl Default for BuiltinTable {
    fn default() -> Self {
        BuiltinTable::standard()
    }
}

impl fmt::Debug for BuiltinTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().map(|b| b.name()).collect();
        names.sort_unstable();
        f.debug_struct("BuiltinTable").field("handlers", &names).finish()
    }
}

/// Leaves the 1-bit comparison result on the stack, as `eq` would.
fn assert_eq(bytecode: &Bytecode, stack: &mut Stack) -> VmResult<()> {
    let lhs = stack.peek(1)?.clone();
    let rhs = stack.peek(0)?.clone();
    stack.binop(|l, r| Ok(l.eq_value(r)))?;
    if !stack.peek(0)?.is_true() {
        return Err(VmError::Failure {
            span: bytecode.span,
            message: format!("\n  lhs: {lhs}\n  rhs: {rhs}\n  were not equal"),
        });
    }
    Ok(())
}

fn assert_lt(bytecode: &Bytecode, stack: &mut Stack) -> VmResult<()> {
    let lhs = stack.peek(1)?.clone();
    let rhs = stack.peek(0)?.clone();
    stack.binop(|l, r| l.lt(r))?;
    if !stack.peek(0)?.is_true() {
        return Err(VmError::Failure {
            span: bytecode.span,
            message: format!("\n  want: {lhs} < {rhs}"),
        });
    }
    Ok(())
}

fn fail(bytecode: &Bytecode, stack: &mut Stack) -> VmResult<()> {
    let value = stack.pop()?;
    Err(VmError::Failure { span: bytecode.span, message: value.to_string() })
}

fn operand_bits(value: &Value, builtin: Builtin) -> VmResult<Bits> {
    value.as_bits().cloned().ok_or_else(|| {
        VmError::InvalidArgument(format!("{} expects a bits argument, got {}", builtin.name(), value.kind()))
    })
}

fn rev(_bytecode: &Bytecode, stack: &mut Stack) -> VmResult<()> {
    let value = stack.pop()?;
    let bits = operand_bits(&value, Builtin::Rev)?;
    stack.push(Value::from_bits(value.is_signed(), bits.reverse()));
    Ok(())
}

fn count_result(value: &Value, count: usize) -> Value {
    let width = value.as_bits().map_or(0, |b| b.width());
    Value::from_bits(false, Bits::from_u64(width, count as u64))
}

fn clz(_bytecode: &Bytecode, stack: &mut Stack) -> VmResult<()> {
    let value = stack.pop()?;
    let bits = operand_bits(&value, Builtin::Clz)?;
    stack.push(count_result(&value, bits.leading_zeros()));
    Ok(())
}

fn ctz(_bytecode: &Bytecode, stack: &mut Stack) -> VmResult<()> {
    let value = stack.pop()?;
    let bits = operand_bits(&value, Builtin::Ctz)?;
    stack.push(count_result(&value, bits.trailing_zeros()));
    Ok(())
}

fn and_reduce(_bytecode: &Bytecode, stack: &mut Stack) -> VmResult<()> {
    let bits = operand_bits(&stack.pop()?, Builtin::AndReduce)?;
    stack.push(Value::make_bool(bits == Bits::all_ones(bits.width())));
    Ok(())
}

fn or_reduce(_bytecode: &Bytecode, stack: &mut Stack) -> VmResult<()> {
    let bits = operand_bits(&stack.pop()?, Builtin::OrReduce)?;
    stack.push(Value::make_bool(!bits.is_zero()));
    Ok(())
}

fn xor_reduce(_bytecode: &Bytecode, stack: &mut Stack) -> VmResult<()> {
    let bits = operand_bits(&stack.pop()?, Builtin::XorReduce)?;
    let ones = (0..bits.width()).filter(|&i| bits.bit(i)).count();
    stack.push(Value::make_bool(ones % 2 == 1));
    Ok(())
}
