//! Operand Stack
//!
//! Stack data structure for VM execution. One stack is shared across the
//! whole VM rather than allocated per frame; a callee's return value is
//! simply left on top for its caller. No execution semantics here.

use crate::error::{PyriteError, PyriteResult};

use super::value::Value;

/// VM operand stack
#[derive(Debug)]
pub struct Stack {
    values: Vec<Value>,
    max_size: usize,
}

impl Stack {
    /// Create a new stack with a maximum depth
    pub fn new(max_size: usize) -> Self {
        Stack {
            values: Vec::new(),
            max_size,
        }
    }

    /// Push a value onto the stack
    pub fn push(&mut self, value: Value) -> PyriteResult<()> {
        if self.values.len() >= self.max_size {
            return Err(PyriteError::StackOverflow);
        }
        self.values.push(value);
        Ok(())
    }

    /// Pop the top value
    pub fn pop(&mut self) -> PyriteResult<Value> {
        self.values.pop().ok_or(PyriteError::StackUnderflow)
    }

    /// Pop `count` values, returned in stack order reversed to push order
    /// (index 0 is the value pushed first).
    pub fn pop_n(&mut self, count: usize) -> PyriteResult<Vec<Value>> {
        if self.values.len() < count {
            return Err(PyriteError::StackUnderflow);
        }
        Ok(self.values.split_off(self.values.len() - count))
    }

    /// Peek at the top value without removing it
    pub fn peek(&self) -> PyriteResult<&Value> {
        self.values.last().ok_or(PyriteError::StackUnderflow)
    }

    /// Peek `depth` entries below the top (`0` is the top itself)
    pub fn peek_at(&self, depth: usize) -> PyriteResult<&Value> {
        if depth >= self.values.len() {
            return Err(PyriteError::StackUnderflow);
        }
        Ok(&self.values[self.values.len() - 1 - depth])
    }

    /// Swap the two top entries
    pub fn rot_two(&mut self) -> PyriteResult<()> {
        let len = self.values.len();
        if len < 2 {
            return Err(PyriteError::StackUnderflow);
        }
        self.values.swap(len - 1, len - 2);
        Ok(())
    }

    /// Duplicate the top value
    pub fn dup(&mut self) -> PyriteResult<()> {
        let value = self.peek()?.clone();
        self.push(value)
    }

    /// Current stack depth
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the stack is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_order() {
        let mut stack = Stack::new(16);
        stack.push(Value::int(1)).unwrap();
        stack.push(Value::int(2)).unwrap();
        assert_eq!(stack.pop().unwrap(), Value::int(2));
        assert_eq!(stack.pop().unwrap(), Value::int(1));
        assert!(stack.pop().is_err());
    }

    #[test]
    fn pop_n_returns_push_order() {
        let mut stack = Stack::new(16);
        for i in 0..3 {
            stack.push(Value::int(i)).unwrap();
        }
        let popped = stack.pop_n(2).unwrap();
        assert_eq!(popped, vec![Value::int(1), Value::int(2)]);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn overflow_is_trapped() {
        let mut stack = Stack::new(1);
        stack.push(Value::None).unwrap();
        assert!(matches!(
            stack.push(Value::None),
            Err(PyriteError::StackOverflow)
        ));
    }

    #[test]
    fn rot_two_swaps_top_entries() {
        let mut stack = Stack::new(8);
        stack.push(Value::int(1)).unwrap();
        stack.push(Value::int(2)).unwrap();
        stack.rot_two().unwrap();
        assert_eq!(stack.pop().unwrap(), Value::int(1));
        assert_eq!(stack.pop().unwrap(), Value::int(2));
    }

    #[test]
    fn peek_at_counts_from_top() {
        let mut stack = Stack::new(8);
        stack.push(Value::int(10)).unwrap();
        stack.push(Value::int(20)).unwrap();
        assert_eq!(*stack.peek_at(0).unwrap(), Value::int(20));
        assert_eq!(*stack.peek_at(1).unwrap(), Value::int(10));
        assert!(stack.peek_at(2).is_err());
    }
}
