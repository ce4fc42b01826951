//! Scope Chain
//!
//! Name -> value maps, one per active call depth, with depth 0 designated
//! the global/module namespace. A fresh map is pushed on every call entry
//! and popped on return, in lockstep with the frame stack.
//!
//! `LOAD_NAME` resolution order: the current depth first, then the global
//! scope, then the remaining intermediate depths from just below the
//! current one down to depth 1.

use indexmap::IndexMap;

use crate::error::{PyriteError, PyriteResult};

use super::value::Value;

/// Stack of name -> value namespaces
#[derive(Debug)]
pub struct ScopeChain {
    scopes: Vec<IndexMap<String, Value>>,
}

impl ScopeChain {
    /// New chain with an empty global scope at depth 0
    pub fn new() -> Self {
        ScopeChain {
            scopes: vec![IndexMap::new()],
        }
    }

    /// Push a fresh local namespace (call entry)
    pub fn push(&mut self) {
        self.scopes.push(IndexMap::new());
    }

    /// Pop the current local namespace (call return). Depth 0 is never popped.
    pub fn pop(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Current call depth (0 = module scope)
    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Bind a name at the current depth
    pub fn define(&mut self, name: &str, value: Value) {
        self.scopes
            .last_mut()
            .expect("scope chain always has a global scope")
            .insert(name.to_string(), value);
    }

    /// Resolve a name: current depth, then global, then intermediates
    /// from current-1 down to 1.
    pub fn lookup(&self, name: &str) -> PyriteResult<Value> {
        let current = self.scopes.len() - 1;
        if let Some(value) = self.scopes[current].get(name) {
            return Ok(value.clone());
        }
        if current > 0 {
            if let Some(value) = self.scopes[0].get(name) {
                return Ok(value.clone());
            }
            for depth in (1..current).rev() {
                if let Some(value) = self.scopes[depth].get(name) {
                    return Ok(value.clone());
                }
            }
        }
        Err(PyriteError::NameNotFound(name.to_string()))
    }

    /// Resolve a name in the global scope only
    pub fn lookup_global(&self, name: &str) -> PyriteResult<Value> {
        self.scopes[0]
            .get(name)
            .cloned()
            .ok_or_else(|| PyriteError::NameNotFound(name.to_string()))
    }

    /// The global/module namespace
    pub fn globals(&self) -> &IndexMap<String, Value> {
        &self.scopes[0]
    }

    /// Mutable access to the global namespace
    pub fn globals_mut(&mut self) -> &mut IndexMap<String, Value> {
        &mut self.scopes[0]
    }
}

impl Default for ScopeChain {
    fn default() -> Self {
        Self::new()
    }
}
