//! Code Object Representation
//!
//! A `CodeObject` is the parsed form of one compiled function or module
//! body: its instruction bytes, constant and name pools, and metadata.
//! One `CodeObject` is created per module load or `MAKE_FUNCTION` operand
//! and shared (`Rc`) across every invocation of the function it backs;
//! per-call state lives in the frame, never here.

use std::cell::OnceCell;

use super::instruction::{decode, Instruction};
use crate::vm::value::Value;

/// Parsed representation of one compiled function/module body
#[derive(Debug)]
pub struct CodeObject {
    /// Function or module name
    pub name: String,
    /// Source filename recorded by the compiler
    pub filename: String,

    /// Number of positional arguments
    pub argcount: u32,
    /// Number of positional-only arguments
    pub posonlyargcount: u32,
    /// Number of keyword-only arguments
    pub kwonlyargcount: u32,
    /// Number of fast-local slots (arguments included)
    pub nlocals: u32,
    /// Stack depth declared by the compiler
    pub stacksize: u32,
    /// Compiler flag bits (recorded, not interpreted)
    pub flags: u32,
    /// First source line number
    pub firstlineno: u32,

    /// Raw instruction bytes, always 2-byte aligned
    pub code: Vec<u8>,
    /// Constant pool
    pub consts: Vec<Value>,
    /// Name pool for `*_NAME`/`*_GLOBAL`/`*_METHOD` operands
    pub names: Vec<String>,
    /// Fast-local variable names, one per slot
    pub varnames: Vec<String>,

    decoded: OnceCell<Vec<Instruction>>,
}

impl CodeObject {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        filename: String,
        argcount: u32,
        posonlyargcount: u32,
        kwonlyargcount: u32,
        nlocals: u32,
        stacksize: u32,
        flags: u32,
        firstlineno: u32,
        code: Vec<u8>,
        consts: Vec<Value>,
        names: Vec<String>,
        varnames: Vec<String>,
    ) -> Self {
        debug_assert!(code.len() % 2 == 0);
        CodeObject {
            name,
            filename,
            argcount,
            posonlyargcount,
            kwonlyargcount,
            nlocals,
            stacksize,
            flags,
            firstlineno,
            code,
            consts,
            names,
            varnames,
            decoded: OnceCell::new(),
        }
    }

    /// Decoded instruction sequence, computed on first use.
    ///
    /// Index-aligned with 2-byte positions in `code`; jump operands are
    /// indices into this slice.
    pub fn instructions(&self) -> &[Instruction] {
        self.decoded.get_or_init(|| decode(&self.code))
    }

    /// Constant pool lookup
    pub fn constant(&self, index: usize) -> Option<&Value> {
        self.consts.get(index)
    }

    /// Name pool lookup
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }
}
