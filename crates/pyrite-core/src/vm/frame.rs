//! Call Frames
//!
//! One frame per function invocation: the shared code object, this
//! invocation's instruction pointer, and its own fast-local slots. Slots
//! are allocated fresh per call so recursive and reentrant invocations of
//! the same function never share state.

use std::rc::Rc;

use crate::bytecode::CodeObject;
use crate::error::{PyriteError, PyriteResult};

use super::value::Value;

/// A single function (or module body) invocation
#[derive(Debug)]
pub struct Frame {
    pub code: Rc<CodeObject>,
    /// Index into the decoded instruction sequence
    pub ip: usize,
    locals: Vec<Value>,
}

impl Frame {
    /// New frame at instruction 0 with `nlocals` empty slots
    pub fn new(code: Rc<CodeObject>) -> Self {
        let nlocals = code.nlocals as usize;
        Frame {
            code,
            ip: 0,
            locals: vec![Value::None; nlocals],
        }
    }

    /// Read a fast-local slot
    pub fn local(&self, slot: usize) -> PyriteResult<Value> {
        self.locals
            .get(slot)
            .cloned()
            .ok_or(PyriteError::InvalidLocalSlot(slot))
    }

    /// Write a fast-local slot
    pub fn set_local(&mut self, slot: usize, value: Value) -> PyriteResult<()> {
        match self.locals.get_mut(slot) {
            Some(entry) => {
                *entry = value;
                Ok(())
            }
            None => Err(PyriteError::InvalidLocalSlot(slot)),
        }
    }
}
