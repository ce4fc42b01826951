//! Module Import
//!
//! Synchronous import mechanism: the built-in module table is consulted
//! first, then each `sys.path` entry is probed for `<name>.py` (compiled
//! through the collaborator) or a pre-compiled `<name>.pyc`. The module
//! body runs in a fresh, independent engine sharing the caller's module
//! cache and output stream; its global namespace is then copied into a
//! `Module` value, intersected with `fromlist` when one is given.
//!
//! Namespaces are cached by resolved path, so re-importing a module reuses
//! its globals instead of re-parsing and re-executing it.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::bytecode::CodeObject;
use crate::compiler::SourceCompiler;
use crate::config::PyriteConfig;
use crate::error::{PyriteError, PyriteResult};
use crate::marshal::parse_module;

use super::value::{ModuleObject, Value};
use super::vm::VirtualMachine;

/// Read, and if necessary compile, the module at `path` into a code object.
pub fn load_code(path: &Path, compiler: &dyn SourceCompiler) -> PyriteResult<Rc<CodeObject>> {
    let bytes = if path.extension().is_some_and(|ext| ext == "py") {
        let source = fs::read_to_string(path)?;
        compiler.compile(&source, &path.to_string_lossy())?
    } else {
        fs::read(path)?
    };
    parse_module(&bytes)
}

/// Import `name` into a `Module` value.
pub fn import_module(
    vm: &mut VirtualMachine,
    name: &str,
    fromlist: Option<&[String]>,
) -> PyriteResult<Value> {
    if let Some(module) = vm.builtin_module(name) {
        return Ok(module);
    }

    let path = resolve(vm.config(), name)
        .ok_or_else(|| PyriteError::ModuleNotFound(name.to_string()))?;
    let key = path.canonicalize().unwrap_or_else(|_| path.clone());

    let snapshot = match vm.cached_module(&key) {
        Some(namespace) => {
            debug!(module = name, "import served from cache");
            namespace
        }
        None => {
            if vm.import_depth() >= vm.config().max_import_depth {
                return Err(PyriteError::ImportDepthExceeded(
                    vm.config().max_import_depth,
                ));
            }
            debug!(module = name, path = %path.display(), "importing module");
            let code = load_code(&path, vm.compiler_ref())?;
            let mut nested = vm.nested();
            nested.run_code(code)?;
            let namespace = nested.globals().clone();
            vm.cache_module(key, namespace.clone());
            namespace
        }
    };

    let namespace: IndexMap<String, Value> = match fromlist {
        Some(names) => names
            .iter()
            .filter_map(|n| snapshot.get(n).map(|v| (n.clone(), v.clone())))
            .collect(),
        None => snapshot,
    };

    Ok(Value::Module(Rc::new(ModuleObject {
        name: name.to_string(),
        namespace: RefCell::new(namespace),
    })))
}

/// Probe each search-path entry for a source or pre-compiled module file.
fn resolve(config: &PyriteConfig, name: &str) -> Option<PathBuf> {
    for dir in &config.sys_path {
        let source = dir.join(format!("{}.py", name));
        if source.is_file() {
            return Some(source);
        }
        let compiled = dir.join(format!("{}.pyc", name));
        if compiled.is_file() {
            return Some(compiled);
        }
    }
    None
}
