//! Stack-machine interpreter for compiled bytecode.
//!
//! One operand stack is shared by every frame. A frame owns the slots of one
//! function invocation and its program counter; a frame is popped when its
//! PC runs off the end of its bytecode, leaving the return value on the stack.

use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::{Function, Module, Span};
use crate::bytecode::{Bytecode, BytecodeFunction, Op, OperandError};
use crate::cache::{ImportData, SymbolicBindings};
use crate::value::{FnRef, Value, ValueError};

pub mod builtins;
mod cast;
mod slice;
pub mod stack;

use builtins::BuiltinTable;
use stack::Stack;

#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("internal error: {0}")]
    Internal(String),
    #[error("internal error: {0}")]
    Operand(#[from] OperandError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid argument: {0}")]
    Value(#[from] ValueError),
    #[error("unimplemented: {0}")]
    Unimplemented(String),
    #[error("the program being interpreted failed:{message}")]
    Failure { span: Span, message: String },
}

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed bytecode or a broken interpreter invariant.
    Internal,
    /// Ill-typed operands or misuse of the API.
    InvalidArgument,
    Unimplemented,
    /// The interpreted program asserted or called `fail!`.
    Failure,
}

impl VmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VmError::Internal(_) | VmError::Operand(_) => ErrorKind::Internal,
            VmError::InvalidArgument(_) | VmError::Value(_) => ErrorKind::InvalidArgument,
            VmError::Unimplemented(_) => ErrorKind::Unimplemented,
            VmError::Failure { .. } => ErrorKind::Failure,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            VmError::Failure { span, .. } => Some(*span),
            _ => None,
        }
    }
}

pub type VmResult<T> = Result<T, VmError>;

struct Frame {
    pc: usize,
    slots: Vec<Value>,
    bf: Rc<BytecodeFunction>,
}

impl Frame {
    fn new(bf: Rc<BytecodeFunction>, args: Vec<Value>) -> Self {
        Frame { pc: 0, slots: args, bf }
    }

    /// Slots grow by exactly one when storing just past the end.
    fn store(&mut self, slot: usize, value: Value) -> VmResult<()> {
        match slot.cmp(&self.slots.len()) {
            std::cmp::Ordering::Less => self.slots[slot] = value,
            std::cmp::Ordering::Equal => self.slots.push(value),
            std::cmp::Ordering::Greater => {
                return Err(VmError::Internal(format!(
                    "store to slot {slot} would leave a gap ({} slots in use)",
                    self.slots.len()
                )));
            }
        }
        Ok(())
    }

    fn load(&self, slot: usize) -> VmResult<Value> {
        self.slots.get(slot).cloned().ok_or_else(|| {
            VmError::Internal(format!(
                "load from slot {slot} is out of range ({} slots in use)",
                self.slots.len()
            ))
        })
    }
}

/// Runs `bf` to completion with `args` in its leading slots and returns the
/// value left on top of the operand stack.
pub fn interpret(import_data: &ImportData, bf: Rc<BytecodeFunction>, args: Vec<Value>) -> VmResult<Value> {
    interpret_with_builtins(import_data, bf, args, &BuiltinTable::standard())
}

pub fn interpret_with_builtins(
    import_data: &ImportData,
    bf: Rc<BytecodeFunction>,
    args: Vec<Value>,
    builtins: &BuiltinTable,
) -> VmResult<Value> {
    if bf.function().is_some() && args.len() != bf.param_count() {
        return Err(VmError::InvalidArgument(format!(
            "{} expects {} argument(s), got {}",
            bf.name(),
            bf.param_count(),
            args.len()
        )));
    }
    let mut interpreter = BytecodeInterpreter::new(import_data, builtins);
    interpreter.frames.push(Frame::new(bf, args));
    interpreter.run()?;
    interpreter.stack.pop().map_err(|_| {
        VmError::Internal("evaluation finished with an empty operand stack".to_string())
    })
}

pub struct BytecodeInterpreter<'a> {
    import_data: &'a ImportData,
    builtins: &'a BuiltinTable,
    stack: Stack,
    frames: Vec<Frame>,
}

impl<'a> BytecodeInterpreter<'a> {
    fn new(import_data: &'a ImportData, builtins: &'a BuiltinTable) -> Self {
        BytecodeInterpreter {
            import_data,
            builtins,
            stack: Stack::new(),
            frames: Vec::with_capacity(16),
        }
    }

    fn frame_mut(&mut self) -> VmResult<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| VmError::Internal("no active frame".to_string()))
    }

    fn frame(&self) -> VmResult<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| VmError::Internal("no active frame".to_string()))
    }

    fn run(&mut self) -> VmResult<()> {
        while let Some(frame) = self.frames.last() {
            let bf = frame.bf.clone();
            let old_pc = frame.pc;
            let Some(bytecode) = bf.bytecodes().get(old_pc) else {
                debug!(function = %bf.name(), "frame complete");
                self.frames.pop();
                continue;
            };

            trace!(function = %bf.name(), pc = old_pc, %bytecode, depth = self.stack.len(), "dispatch");
            self.eval_next_instruction(bytecode)?;

            // A call either pushed a frame or ran a builtin; both left the
            // caller's PC one past the call.
            if bytecode.op == Op::Call {
                continue;
            }

            let frame = self.frame()?;
            if frame.pc != old_pc + 1 {
                match bf.bytecodes().get(frame.pc) {
                    Some(target) if target.op == Op::JumpDest => {}
                    Some(target) => {
                        return Err(VmError::Internal(format!(
                            "bytecode at PC {} is not a jump_dest (was {}) after jump from PC {old_pc}",
                            frame.pc, target.op
                        )));
                    }
                    None => {
                        return Err(VmError::Internal(format!(
                            "jump from PC {old_pc} to PC {} leaves {} ({} bytecodes)",
                            frame.pc,
                            bf.name(),
                            bf.bytecodes().len()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn eval_next_instruction(&mut self, bytecode: &Bytecode) -> VmResult<()> {
        match bytecode.op {
            Op::Add => self.stack.binop(Value::add)?,
            Op::Sub => self.stack.binop(Value::sub)?,
            Op::Mul => self.stack.binop(Value::mul)?,
            Op::Div => self.stack.binop(Value::div)?,
            Op::And => self.stack.binop(Value::bitwise_and)?,
            Op::Or => self.stack.binop(Value::bitwise_or)?,
            Op::Xor => self.stack.binop(Value::bitwise_xor)?,
            Op::Shll => self.stack.binop(Value::shl)?,
            Op::Shrl => self.stack.binop(Value::shrl)?,
            Op::Concat => self.stack.binop(Value::concat)?,
            Op::Eq => self.stack.binop(|l, r| Ok(l.eq_value(r)))?,
            Op::Ne => self.stack.binop(|l, r| Ok(l.ne_value(r)))?,
            Op::Lt => self.stack.binop(Value::lt)?,
            Op::Le => self.stack.binop(Value::le)?,
            Op::Gt => self.stack.binop(Value::gt)?,
            Op::Ge => self.stack.binop(Value::ge)?,
            Op::Index => self.stack.binop(Value::index)?,
            Op::Invert => self.stack.unop(Value::bitwise_not)?,
            Op::Negate => self.stack.unop(Value::arithmetic_negate)?,
            Op::LogicalAnd => self.eval_logical(bytecode.op, |l, r| l && r)?,
            Op::LogicalOr => self.eval_logical(bytecode.op, |l, r| l || r)?,
            Op::Call => return self.eval_call(bytecode),
            Op::Cast => {
                let value = self.stack.pop()?;
                self.stack.push(cast::cast(value, bytecode.type_data()?)?);
            }
            Op::Slice => {
                let [basis, start, limit]: [Value; 3] = self.pop_array()?;
                self.stack.push(slice::bounds_slice(&basis, &start, &limit)?);
            }
            Op::WidthSlice => {
                let [basis, start]: [Value; 2] = self.pop_array()?;
                self.stack.push(slice::width_slice(&basis, &start, bytecode.type_data()?)?);
            }
            Op::CreateArray => {
                let elements = self.stack.pop_n(bytecode.num_elements()?)?;
                self.stack.push(Value::Array(elements));
            }
            Op::CreateTuple => {
                let elements = self.stack.pop_n(bytecode.num_elements()?)?;
                self.stack.push(Value::Tuple(elements));
            }
            Op::ExpandTuple => {
                let Value::Tuple(elements) = self.stack.pop()? else {
                    return Err(VmError::InvalidArgument(
                        "stack top has to be a tuple to expand it".to_string(),
                    ));
                };
                for element in elements.into_iter().rev() {
                    self.stack.push(element);
                }
            }
            Op::Literal => self.stack.push(bytecode.value_data()?.clone()),
            Op::Load => {
                let value = self.frame()?.load(bytecode.slot_index()?)?;
                self.stack.push(value);
            }
            Op::Store => {
                let slot = bytecode.slot_index()?;
                let value = self.stack.pop()?;
                self.frame_mut()?.store(slot, value)?;
            }
            Op::JumpRel => return self.jump(bytecode.jump_target()?),
            Op::JumpRelIf => {
                let condition = self.stack.pop()?;
                match condition.as_bits() {
                    Some(bits) if bits.width() == 1 => {}
                    _ => {
                        return Err(VmError::InvalidArgument(format!(
                            "jump_rel_if condition must be a 1-bit value, got {condition}"
                        )));
                    }
                }
                if condition.is_true() {
                    return self.jump(bytecode.jump_target()?);
                }
            }
            Op::JumpDest => {}
        }
        self.frame_mut()?.pc += 1;
        Ok(())
    }

    /// Pops `N` operands in push order.
    fn pop_array<const N: usize>(&mut self) -> VmResult<[Value; N]> {
        self.stack
            .pop_n(N)?
            .try_into()
            .map_err(|_| VmError::Internal(format!("expected {N} operands")))
    }

    fn jump(&mut self, offset: isize) -> VmResult<()> {
        let frame = self.frame_mut()?;
        let target = frame.pc.checked_add_signed(offset).ok_or_else(|| {
            VmError::Internal(format!("jump from PC {} by {offset:+} is out of range", frame.pc))
        })?;
        frame.pc = target;
        Ok(())
    }

    fn eval_logical(&mut self, op: Op, combine: impl FnOnce(bool, bool) -> bool) -> VmResult<()> {
        let [lhs, rhs]: [Value; 2] = self.pop_array()?;
        for (side, value) in [("LHS", &lhs), ("RHS", &rhs)] {
            match value.as_bits() {
                Some(bits) if bits.width() == 1 => {}
                Some(bits) => {
                    return Err(VmError::InvalidArgument(format!(
                        "{op} arguments must be boolean ({side} had {} bits)",
                        bits.width()
                    )));
                }
                None => {
                    return Err(VmError::InvalidArgument(format!(
                        "{op} arguments must be boolean ({side} was {})",
                        value.kind()
                    )));
                }
            }
        }
        self.stack.push(Value::make_bool(combine(lhs.is_true(), rhs.is_true())));
        Ok(())
    }

    fn eval_call(&mut self, bytecode: &Bytecode) -> VmResult<()> {
        let callee = self.stack.pop()?;
        let Value::Function(fn_ref) = callee else {
            return Err(VmError::InvalidArgument(format!(
                "call target must be a function, got {}",
                callee.kind()
            )));
        };

        match fn_ref {
            FnRef::Builtin(builtin) => {
                debug!(builtin = builtin.name(), "builtin call");
                self.frame_mut()?.pc += 1;
                self.builtins.run(builtin, bytecode, &mut self.stack)
            }
            FnRef::User { module, function } => {
                let bf = self.resolve(&module, &function, bytecode.bindings())?;
                let args = self.stack.pop_n(function.param_count())?;
                self.frame_mut()?.pc += 1;
                match bf.type_info().and_then(|ti| ti.bindings()) {
                    Some(bindings) => {
                        debug!(function = %function.identifier(), depth = self.frames.len() + 1, %bindings, "call")
                    }
                    None => debug!(function = %function.identifier(), depth = self.frames.len() + 1, "call"),
                }
                self.frames.push(Frame::new(bf, args));
                Ok(())
            }
        }
    }

    /// Parametric calls resolve against a child of the module's root type
    /// info that carries the caller's bindings.
    fn resolve(
        &self,
        module: &Module,
        function: &Rc<Function>,
        bindings: Option<&SymbolicBindings>,
    ) -> VmResult<Rc<BytecodeFunction>> {
        let root = self.import_data.root_type_info(module)?;
        let type_info = match bindings {
            Some(bindings) => self.import_data.instantiation(&root, bindings),
            None => root,
        };
        let cache = self
            .import_data
            .bytecode_cache()
            .ok_or_else(|| VmError::InvalidArgument("bytecode cache is not set".to_string()))?;
        cache.get_or_create_bytecode_function(function, &type_info, bindings)
    }
}
