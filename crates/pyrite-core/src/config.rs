//! Pyrite Configuration
//!
//! Defines runtime limits and the module search path for the interpreter.
//! Configuration specifies constraints only; enforcement is handled by the VM.

use std::path::PathBuf;

/// VM configuration
#[derive(Debug, Clone)]
pub struct PyriteConfig {
    /// Maximum operand stack depth
    pub max_stack_size: usize,

    /// Maximum call depth (recursion limit)
    pub max_call_depth: usize,

    /// Maximum depth of nested imports
    pub max_import_depth: usize,

    /// Module search path (`sys.path`)
    pub sys_path: Vec<PathBuf>,
}

impl Default for PyriteConfig {
    fn default() -> Self {
        PyriteConfig {
            max_stack_size: 4096,
            max_call_depth: 256,
            max_import_depth: 64,
            sys_path: vec![PathBuf::from(".")],
        }
    }
}

impl PyriteConfig {
    /// Create a new configuration with default limits
    pub fn new() -> Self {
        Self::default()
    }
}
