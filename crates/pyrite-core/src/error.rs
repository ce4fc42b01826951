//! Pyrite Error Types
//!
//! Defines all core error conditions produced by the Pyrite interpreter.
//! Two families share one enum: structural errors raised while reading a
//! marshaled code stream, and execution errors raised by the VM. Structural
//! errors are recoverable for the caller of the deserializer; execution
//! errors end the run (the CLI reports the first one and exits non-zero).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PyriteError {
    // Marshal / structural errors
    #[error("truncated input")]
    TruncatedInput,
    #[error("unsupported bytecode magic number: {0}")]
    UnsupportedVersion(u16),
    #[error("unknown marshal tag: 0x{0:02X}")]
    UnknownTag(u8),
    #[error("dangling back-reference: {0}")]
    DanglingReference(usize),
    #[error("malformed code object: {0}")]
    MalformedCode(String),

    // VM execution errors
    #[error("unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),
    #[error("stack overflow")]
    StackOverflow,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("name '{0}' is not defined")]
    NameNotFound(String),
    #[error("'{on}' has no attribute '{attr}'")]
    NoSuchAttribute { on: &'static str, attr: String },
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("'{name}' takes {expected} arguments, got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("cannot unpack {got} values into {expected} targets")]
    UnpackMismatch { expected: usize, got: usize },
    #[error("'{0}' does not accept keyword arguments")]
    KeywordsUnsupported(String),
    #[error("invalid constant index: {0}")]
    InvalidConstantIndex(usize),
    #[error("invalid name index: {0}")]
    InvalidNameIndex(usize),
    #[error("invalid local slot: {0}")]
    InvalidLocalSlot(usize),
    #[error("invalid jump target: {0}")]
    InvalidJumpTarget(usize),
    #[error("invalid comparison operand: {0}")]
    InvalidCompareOp(u8),
    #[error("instruction pointer ran past end of code")]
    InstructionOverrun,
    #[error("call depth limit exceeded: {0}")]
    CallDepthExceeded(usize),

    // Import errors
    #[error("module '{0}' not found")]
    ModuleNotFound(String),
    #[error("import depth limit exceeded: {0}")]
    ImportDepthExceeded(usize),
    #[error("compilation failed: {0}")]
    CompileFailed(String),

    // Resource & IO boundary
    #[error("out of memory")]
    OutOfMemory,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PyriteResult<T> = Result<T, PyriteError>;
