//! Static checks on assembled bytecode.
//!
//! The interpreter reports the same defects as internal errors when it reaches
//! them; verifying up front reports every one of them, with spans, before
//! anything runs.

use crate::ast::{Function, Span};
use crate::bytecode::{Bytecode, Op};
use crate::parser::Assembly;

#[derive(Debug, Clone, PartialEq)]
pub struct VerifyError {
    pub code: &'static str,
    pub function: String,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "verify: {} in '{}'", self.message, self.function)?;
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {hint}")?;
        }
        Ok(())
    }
}

impl std::error::Error for VerifyError {}

struct FunctionChecker<'a> {
    function: &'a Function,
    body: &'a [Bytecode],
    errors: Vec<VerifyError>,
}

impl<'a> FunctionChecker<'a> {
    fn report(&mut self, code: &'static str, span: Span, message: String, hint: Option<String>) {
        self.errors.push(VerifyError {
            code,
            function: self.function.identifier(),
            span,
            message,
            hint,
        });
    }

    fn check_jumps(&mut self) {
        for (pc, bytecode) in self.body.iter().enumerate() {
            if !bytecode.op.is_jump() {
                continue;
            }
            let Ok(offset) = bytecode.jump_target() else { continue };
            let target = pc.checked_add_signed(offset).filter(|t| *t < self.body.len());
            match target.map(|t| &self.body[t]) {
                None => self.report(
                    "HVM-V001",
                    bytecode.span,
                    format!("jump at PC {pc} by {offset:+} leaves the function ({} bytecodes)", self.body.len()),
                    None,
                ),
                Some(dest) if dest.op != Op::JumpDest => {
                    let hint = Some("every jump must land on a `jump_dest`".to_string());
                    self.report(
                        "HVM-V002",
                        bytecode.span,
                        format!("jump at PC {pc} lands on `{}` at PC {}", dest.op, pc as isize + offset),
                        hint,
                    )
                }
                Some(_) => {}
            }
        }
    }

    /// Slots are checked in program order, which matches how bodies are
    /// emitted: every slot is stored before any load that reads it.
    fn check_slots(&mut self) {
        let mut defined = self.function.param_count();
        for (pc, bytecode) in self.body.iter().enumerate() {
            let Ok(slot) = bytecode.slot_index() else { continue };
            match bytecode.op {
                Op::Store if slot > defined => self.report(
                    "HVM-V003",
                    bytecode.span,
                    format!("store at PC {pc} to slot {slot} skips slot {defined}"),
                    Some("slots must be filled in order".to_string()),
                ),
                Op::Store if slot == defined => defined += 1,
                Op::Load if slot >= defined => self.report(
                    "HVM-V004",
                    bytecode.span,
                    format!("load at PC {pc} reads slot {slot} before it is stored"),
                    None,
                ),
                _ => {}
            }
        }
    }

    fn check_result(&mut self) {
        if !self.function.is_test && self.function.return_type.is_some() && self.body.is_empty() {
            self.report(
                "HVM-V005",
                self.function.span,
                format!("`{}` declares a return type but has an empty body", self.function.name),
                None,
            );
        }
    }
}

pub fn verify_function(function: &Function, body: &[Bytecode]) -> Vec<VerifyError> {
    let mut checker = FunctionChecker { function, body, errors: Vec::new() };
    checker.check_jumps();
    checker.check_slots();
    checker.check_result();
    checker.errors
}

pub fn verify(assembly: &Assembly) -> Result<(), Vec<VerifyError>> {
    let errors: Vec<VerifyError> = assembly
        .functions()
        .flat_map(|(function, body)| verify_function(function, body))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
