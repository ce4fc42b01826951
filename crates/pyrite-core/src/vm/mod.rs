pub mod builtins;
pub mod frame;
pub mod import;
pub mod scope;
pub mod stack;
pub mod value;
pub mod vm;

pub use value::Value;
pub use vm::VirtualMachine;
