//! Source Compiler Boundary
//!
//! The core never compiles source text itself. A host supplies a
//! `SourceCompiler` that turns source into marshaled bytecode in the exact
//! pyc format the deserializer consumes; the core treats it as an opaque
//! byte producer.

use crate::error::{PyriteError, PyriteResult};

/// Host-provided source-to-bytecode collaborator
pub trait SourceCompiler {
    /// Compile UTF-8 source text into full pyc-format bytes
    /// (16-byte header followed by the marshaled module code object).
    fn compile(&self, source: &str, filename: &str) -> PyriteResult<Vec<u8>>;
}

/// Compiler that refuses all source, for hosts that only run `.pyc` files.
#[derive(Debug, Default)]
pub struct PrecompiledOnly;

impl SourceCompiler for PrecompiledOnly {
    fn compile(&self, _source: &str, filename: &str) -> PyriteResult<Vec<u8>> {
        Err(PyriteError::CompileFailed(format!(
            "no source compiler configured (cannot compile {})",
            filename
        )))
    }
}
