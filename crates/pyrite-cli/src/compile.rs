//! CPython Compiler Bridge
//!
//! Implements the `SourceCompiler` collaborator by shelling out to a host
//! CPython 3.10 interpreter. The interpreter compiles the source text and
//! writes back full pyc-format bytes: its own magic number, twelve zero
//! header bytes, then the marshaled module code object.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::debug;

use pyrite_core::{PyriteError, PyriteResult, SourceCompiler};

const COMPILE_SNIPPET: &str = "\
import importlib.util, marshal, sys
code = compile(sys.stdin.read(), sys.argv[1], 'exec')
sys.stdout.buffer.write(importlib.util.MAGIC_NUMBER + bytes(12) + marshal.dumps(code))
";

/// Compiles source through an external `python3` process.
pub struct CpythonCompiler {
    python: PathBuf,
}

impl CpythonCompiler {
    pub fn new(python: Option<PathBuf>) -> Self {
        CpythonCompiler {
            python: python.unwrap_or_else(|| PathBuf::from("python3")),
        }
    }
}

impl SourceCompiler for CpythonCompiler {
    fn compile(&self, source: &str, filename: &str) -> PyriteResult<Vec<u8>> {
        debug!(interpreter = %self.python.display(), filename, "compiling source");
        let mut child = Command::new(&self.python)
            .arg("-c")
            .arg(COMPILE_SNIPPET)
            .arg(filename)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                PyriteError::CompileFailed(format!(
                    "failed to start {}: {}",
                    self.python.display(),
                    e
                ))
            })?;

        // stdin is piped above, so take() cannot return None
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(source.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(PyriteError::CompileFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(output.stdout)
    }
}
