//! The operand stack shared by every frame of one evaluation.

use crate::value::{Value, ValueError};
use super::{VmError, VmResult};

#[derive(Debug, Default)]
pub struct Stack {
    values: Vec<Value>,
}

impl Stack {
    pub fn new() -> Self {
        Stack { values: Vec::with_capacity(64) }
    }

    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    pub fn pop(&mut self) -> VmResult<Value> {
        self.values
            .pop()
            .ok_or_else(|| VmError::Internal("tried to pop off an empty stack".to_string()))
    }

    /// Pops `n` values and returns them in push order.
    pub fn pop_n(&mut self, n: usize) -> VmResult<Vec<Value>> {
        if self.values.len() < n {
            return Err(VmError::Internal(format!(
                "needed {n} operands but the stack holds {}",
                self.values.len()
            )));
        }
        let at = self.values.len() - n;
        Ok(self.values.split_off(at))
    }

    /// `depth` 0 is the top of the stack.
    pub fn peek(&self, depth: usize) -> VmResult<&Value> {
        self.values
            .len()
            .checked_sub(depth + 1)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| VmError::Internal(format!("no operand at depth {depth}")))
    }

    /// Pops rhs then lhs and pushes `op(lhs, rhs)`.
    pub fn binop(&mut self, op: impl FnOnce(&Value, &Value) -> Result<Value, ValueError>) -> VmResult<()> {
        let [lhs, rhs]: [Value; 2] = self
            .pop_n(2)?
            .try_into()
            .map_err(|_| VmError::Internal("binop operand count".to_string()))?;
        let result = op(&lhs, &rhs)?;
        self.push(result);
        Ok(())
    }

    pub fn unop(&mut self, op: impl FnOnce(&Value) -> Result<Value, ValueError>) -> VmResult<()> {
        let operand = self.pop()?;
        let result = op(&operand)?;
        self.push(result);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_empty_is_internal() {
        let mut s = Stack::new();
        let err = s.pop().unwrap_err();
        assert!(matches!(err, VmError::Internal(_)));
    }

    #[test]
    fn pop_n_keeps_push_order() {
        let mut s = Stack::new();
        for i in 0..4 {
            s.push(Value::ubits(8, i));
        }
        let top = s.pop_n(3).unwrap();
        assert_eq!(top, vec![Value::ubits(8, 1), Value::ubits(8, 2), Value::ubits(8, 3)]);
        assert_eq!(s.len(), 1);
        assert!(s.pop_n(2).is_err());
        assert!(s.pop_n(0).unwrap().is_empty());
    }

    #[test]
    fn peek_depths() {
        let mut s = Stack::new();
        s.push(Value::ubits(8, 1));
        s.push(Value::ubits(8, 2));
        assert_eq!(s.peek(0).unwrap(), &Value::ubits(8, 2));
        assert_eq!(s.peek(1).unwrap(), &Value::ubits(8, 1));
        assert!(s.peek(2).is_err());
    }

    #[test]
    fn binop_operand_order() {
        let mut s = Stack::new();
        s.push(Value::ubits(8, 10));
        s.push(Value::ubits(8, 3));
        s.binop(|l, r| l.sub(r)).unwrap();
        assert_eq!(s.pop().unwrap(), Value::ubits(8, 7));
        assert!(s.is_empty());
    }

    #[test]
    fn binop_value_errors_are_invalid_arguments() {
        let mut s = Stack::new();
        s.push(Value::ubits(8, 10));
        s.push(Value::ubits(4, 3));
        let err = s.binop(|l, r| l.add(r)).unwrap_err();
        assert!(matches!(err, VmError::Value(ValueError::WidthMismatch { .. })));
    }
}
