//! Bytecode Opcode Definitions
//!
//! Defines the supported subset of the CPython 3.10 opcode set.
//! This file contains no execution semantics.
//! Opcode values are fixed by the upstream compiler and never change here.

/// Supported opcodes (CPython 3.10 numbering)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    // Stack manipulation
    PopTop = 1,
    RotTwo = 2,
    DupTop = 4,
    Nop = 9,

    // Binary arithmetic
    BinaryMultiply = 20,
    BinaryAdd = 23,
    BinarySubtract = 24,
    BinarySubscr = 25,

    // In-place arithmetic
    InplaceAdd = 55,
    InplaceSubtract = 56,
    InplaceMultiply = 57,

    // Subscript assignment
    StoreSubscr = 60,

    ReturnValue = 83,

    // Name access
    StoreName = 90,
    UnpackSequence = 92,
    LoadConst = 100,
    LoadName = 101,

    // Container construction
    BuildTuple = 102,
    BuildList = 103,
    BuildSet = 104,

    CompareOp = 107,

    // Control flow (operands are decoded-instruction indices)
    JumpForward = 110,
    JumpAbsolute = 113,
    PopJumpIfFalse = 114,
    PopJumpIfTrue = 115,

    LoadGlobal = 116,

    // Fast locals
    LoadFast = 124,
    StoreFast = 125,

    // Calls and function objects
    CallFunction = 131,
    MakeFunction = 132,
    CallFunctionKw = 141,

    // Method calls
    LoadMethod = 160,
    CallMethod = 161,

    SetUpdate = 163,
}

impl OpCode {
    /// Convert a raw byte to an opcode
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(OpCode::PopTop),
            2 => Some(OpCode::RotTwo),
            4 => Some(OpCode::DupTop),
            9 => Some(OpCode::Nop),

            20 => Some(OpCode::BinaryMultiply),
            23 => Some(OpCode::BinaryAdd),
            24 => Some(OpCode::BinarySubtract),
            25 => Some(OpCode::BinarySubscr),

            55 => Some(OpCode::InplaceAdd),
            56 => Some(OpCode::InplaceSubtract),
            57 => Some(OpCode::InplaceMultiply),

            60 => Some(OpCode::StoreSubscr),

            83 => Some(OpCode::ReturnValue),

            90 => Some(OpCode::StoreName),
            92 => Some(OpCode::UnpackSequence),
            100 => Some(OpCode::LoadConst),
            101 => Some(OpCode::LoadName),

            102 => Some(OpCode::BuildTuple),
            103 => Some(OpCode::BuildList),
            104 => Some(OpCode::BuildSet),

            107 => Some(OpCode::CompareOp),

            110 => Some(OpCode::JumpForward),
            113 => Some(OpCode::JumpAbsolute),
            114 => Some(OpCode::PopJumpIfFalse),
            115 => Some(OpCode::PopJumpIfTrue),

            116 => Some(OpCode::LoadGlobal),

            124 => Some(OpCode::LoadFast),
            125 => Some(OpCode::StoreFast),

            131 => Some(OpCode::CallFunction),
            132 => Some(OpCode::MakeFunction),
            141 => Some(OpCode::CallFunctionKw),

            160 => Some(OpCode::LoadMethod),
            161 => Some(OpCode::CallMethod),

            163 => Some(OpCode::SetUpdate),

            _ => None,
        }
    }
}
