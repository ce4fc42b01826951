pub mod code;
pub mod instruction;
pub mod opcode;

pub use code::CodeObject;
pub use instruction::Instruction;
pub use opcode::OpCode;
