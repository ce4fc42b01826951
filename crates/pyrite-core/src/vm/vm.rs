//! Virtual Machine Core
//!
//! The interpreter loop: one program counter (current frame's code object
//! plus instruction index), an explicit frame stack for calls, a scope
//! chain kept in lockstep with it, and a single operand stack shared
//! across all frames. Execution is single-threaded and synchronous; a call
//! or import runs to completion before the caller resumes.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;
use num_traits::ToPrimitive;
use tracing::{debug, info, trace};

use crate::bytecode::{CodeObject, OpCode};
use crate::compiler::SourceCompiler;
use crate::config::PyriteConfig;
use crate::error::{PyriteError, PyriteResult};

use super::builtins;
use super::frame::Frame;
use super::import;
use super::scope::ScopeChain;
use super::stack::Stack;
use super::value::{FunctionObject, Kwargs, Value};

/// Where `print` and friends write. Shared with nested import engines so a
/// whole run observes one output stream.
pub type OutputHandle = Rc<RefCell<Box<dyn Write>>>;

/// Cached module namespaces, keyed by resolved file path and shared with
/// nested import engines.
pub(crate) type ModuleCache = Rc<RefCell<HashMap<PathBuf, IndexMap<String, Value>>>>;

enum ArithOp {
    Add,
    Sub,
    Mul,
}

/// Pyrite virtual machine
pub struct VirtualMachine {
    config: PyriteConfig,
    compiler: Rc<dyn SourceCompiler>,
    stack: Stack,
    scopes: ScopeChain,
    frames: Vec<Frame>,
    builtin_modules: HashMap<String, Value>,
    module_cache: ModuleCache,
    import_depth: usize,
    output: OutputHandle,
    halted: bool,
}

impl VirtualMachine {
    /// Create a new VM instance. Built-in functions and the built-in
    /// module table are installed before any code runs.
    pub fn new(config: PyriteConfig, compiler: Rc<dyn SourceCompiler>) -> Self {
        let mut vm = VirtualMachine {
            stack: Stack::new(config.max_stack_size),
            scopes: ScopeChain::new(),
            frames: Vec::new(),
            builtin_modules: HashMap::new(),
            module_cache: Rc::new(RefCell::new(HashMap::new())),
            import_depth: 0,
            output: Rc::new(RefCell::new(Box::new(io::stdout()))),
            halted: false,
            compiler,
            config,
        };
        builtins::install(vm.scopes.globals_mut());
        vm.builtin_modules
            .insert("sys".to_string(), builtins::sys_module(&vm.config));
        vm
    }

    /// Independent engine for a nested import: fresh stack, scopes and
    /// frames, but the caller's compiler, module cache and output stream.
    pub(crate) fn nested(&self) -> VirtualMachine {
        let mut vm = VirtualMachine::new(self.config.clone(), self.compiler.clone());
        vm.module_cache = self.module_cache.clone();
        vm.output = self.output.clone();
        vm.import_depth = self.import_depth + 1;
        vm
    }

    pub fn config(&self) -> &PyriteConfig {
        &self.config
    }

    pub(crate) fn compiler_ref(&self) -> &dyn SourceCompiler {
        self.compiler.as_ref()
    }

    pub(crate) fn import_depth(&self) -> usize {
        self.import_depth
    }

    pub(crate) fn builtin_module(&self, name: &str) -> Option<Value> {
        self.builtin_modules.get(name).cloned()
    }

    pub(crate) fn cached_module(&self, key: &Path) -> Option<IndexMap<String, Value>> {
        self.module_cache.borrow().get(key).cloned()
    }

    pub(crate) fn cache_module(&self, key: PathBuf, namespace: IndexMap<String, Value>) {
        self.module_cache.borrow_mut().insert(key, namespace);
    }

    /// Redirect output (shared with any nested import engines created
    /// after this call).
    pub fn set_output(&mut self, output: OutputHandle) {
        self.output = output;
    }

    pub fn output(&self) -> OutputHandle {
        self.output.clone()
    }

    /// The module/global namespace
    pub fn globals(&self) -> &IndexMap<String, Value> {
        self.scopes.globals()
    }

    /// Top of the operand stack, if any
    pub fn peek_top(&self) -> PyriteResult<Value> {
        Ok(self.stack.peek()?.clone())
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Execute a module code object to completion.
    pub fn run_code(&mut self, code: Rc<CodeObject>) -> PyriteResult<()> {
        debug!(name = %code.name, file = %code.filename, "running code object");
        self.frames.push(Frame::new(code));
        self.halted = false;
        self.execute()
    }

    /// Run until `RETURN_VALUE` at depth 0 or the first error.
    fn execute(&mut self) -> PyriteResult<()> {
        while !self.halted {
            self.step()?;
        }
        Ok(())
    }

    /// Fetch, advance, dispatch one instruction.
    fn step(&mut self) -> PyriteResult<()> {
        let (code, index) = {
            let frame = self
                .frames
                .last_mut()
                .ok_or(PyriteError::InstructionOverrun)?;
            let index = frame.ip;
            frame.ip += 1;
            (frame.code.clone(), index)
        };
        let ins = *code
            .instructions()
            .get(index)
            .ok_or(PyriteError::InstructionOverrun)?;
        let opcode =
            OpCode::from_u8(ins.opcode).ok_or(PyriteError::UnknownOpcode(ins.opcode))?;
        trace!(?opcode, arg = ins.arg, index, depth = self.frames.len() - 1, "dispatch");

        let arg = ins.arg as usize;
        match opcode {
            OpCode::Nop => Ok(()),
            OpCode::PopTop => self.stack.pop().map(|_| ()),
            OpCode::RotTwo => self.stack.rot_two(),
            OpCode::DupTop => self.stack.dup(),

            OpCode::LoadConst => {
                let value = code
                    .constant(arg)
                    .cloned()
                    .ok_or(PyriteError::InvalidConstantIndex(arg))?;
                self.stack.push(value)
            }
            OpCode::LoadName => {
                let name = code.name_at(arg).ok_or(PyriteError::InvalidNameIndex(arg))?;
                let value = self.scopes.lookup(name)?;
                self.stack.push(value)
            }
            OpCode::StoreName => {
                let name = code
                    .name_at(arg)
                    .ok_or(PyriteError::InvalidNameIndex(arg))?
                    .to_string();
                let value = self.stack.pop()?;
                self.scopes.define(&name, value);
                Ok(())
            }
            OpCode::LoadGlobal => {
                let name = code.name_at(arg).ok_or(PyriteError::InvalidNameIndex(arg))?;
                let value = self.scopes.lookup_global(name)?;
                self.stack.push(value)
            }
            OpCode::LoadFast => {
                let frame = self.frames.last().ok_or(PyriteError::InstructionOverrun)?;
                let value = frame.local(arg)?;
                self.stack.push(value)
            }
            OpCode::StoreFast => {
                let value = self.stack.pop()?;
                let frame = self
                    .frames
                    .last_mut()
                    .ok_or(PyriteError::InstructionOverrun)?;
                frame.set_local(arg, value)
            }
            OpCode::LoadMethod => {
                let name = code.name_at(arg).ok_or(PyriteError::InvalidNameIndex(arg))?;
                let receiver = self.stack.pop()?;
                let method = builtins::resolve_attribute(&receiver, name)?;
                self.stack.push(method)?;
                self.stack.push(receiver)
            }

            OpCode::BuildTuple => {
                let items = self.stack.pop_n(arg)?;
                self.stack.push(Value::tuple(items))
            }
            OpCode::BuildList => {
                let items = self.stack.pop_n(arg)?;
                self.stack.push(Value::list(items))
            }
            OpCode::BuildSet => {
                let items = self.stack.pop_n(arg)?;
                self.stack.push(Value::set(items.into_iter().collect()))
            }
            OpCode::SetUpdate => {
                let iterable = self.stack.pop()?;
                if arg == 0 {
                    return Err(PyriteError::StackUnderflow);
                }
                let target = self.stack.peek_at(arg - 1)?.clone();
                match target {
                    Value::Set(set) => {
                        let mut set = set.borrow_mut();
                        for item in iterable.elements()? {
                            set.insert(item);
                        }
                        Ok(())
                    }
                    other => Err(PyriteError::TypeMismatch {
                        expected: "set",
                        found: other.type_name(),
                    }),
                }
            }

            OpCode::BinaryAdd | OpCode::InplaceAdd => self.binary_op(ArithOp::Add),
            OpCode::BinarySubtract | OpCode::InplaceSubtract => self.binary_op(ArithOp::Sub),
            OpCode::BinaryMultiply | OpCode::InplaceMultiply => self.binary_op(ArithOp::Mul),
            OpCode::CompareOp => self.compare_op(ins.arg),

            OpCode::BinarySubscr => {
                let index = self.stack.pop()?;
                let container = self.stack.pop()?;
                let value = subscript_get(&container, &index)?;
                self.stack.push(value)
            }
            OpCode::StoreSubscr => {
                let index = self.stack.pop()?;
                let container = self.stack.pop()?;
                let value = self.stack.pop()?;
                subscript_set(&container, &index, value)
            }

            OpCode::JumpForward => {
                let frame = self
                    .frames
                    .last_mut()
                    .ok_or(PyriteError::InstructionOverrun)?;
                jump(frame, frame.ip + arg)
            }
            OpCode::JumpAbsolute => {
                let frame = self
                    .frames
                    .last_mut()
                    .ok_or(PyriteError::InstructionOverrun)?;
                jump(frame, arg)
            }
            OpCode::PopJumpIfTrue => self.pop_jump_if(arg, true),
            OpCode::PopJumpIfFalse => self.pop_jump_if(arg, false),

            OpCode::UnpackSequence => {
                let value = self.stack.pop()?;
                match value {
                    Value::Tuple(items) => {
                        if items.len() != arg {
                            return Err(PyriteError::UnpackMismatch {
                                expected: arg,
                                got: items.len(),
                            });
                        }
                        // Reverse push so left-to-right targets pop in order.
                        for item in items.iter().rev() {
                            self.stack.push(item.clone())?;
                        }
                        Ok(())
                    }
                    other => Err(PyriteError::TypeMismatch {
                        expected: "tuple",
                        found: other.type_name(),
                    }),
                }
            }

            OpCode::MakeFunction => {
                if arg != 0 {
                    return Err(PyriteError::MalformedCode(format!(
                        "MAKE_FUNCTION flags 0x{:02X} not supported",
                        arg
                    )));
                }
                let name = self.stack.pop()?.expect_text()?;
                let code_value = self.stack.pop()?;
                match code_value {
                    Value::Code(code) => self
                        .stack
                        .push(Value::Function(Rc::new(FunctionObject { name, code }))),
                    other => Err(PyriteError::TypeMismatch {
                        expected: "code",
                        found: other.type_name(),
                    }),
                }
            }

            OpCode::CallFunction => {
                let args = self.stack.pop_n(arg)?;
                let callable = self.stack.pop()?;
                self.call_value(callable, args, None)
            }
            OpCode::CallFunctionKw => {
                let names = self.stack.pop()?;
                let names = match names {
                    Value::Tuple(items) => items,
                    other => {
                        return Err(PyriteError::TypeMismatch {
                            expected: "tuple",
                            found: other.type_name(),
                        })
                    }
                };
                if names.len() > arg {
                    return Err(PyriteError::StackUnderflow);
                }
                let values = self.stack.pop_n(names.len())?;
                let mut kwargs = Kwargs::new();
                for (name, value) in names.iter().zip(values) {
                    kwargs.insert(name.expect_text()?, value);
                }
                let args = self.stack.pop_n(arg - kwargs.len())?;
                let callable = self.stack.pop()?;
                self.call_value(callable, args, Some(kwargs))
            }
            OpCode::CallMethod => {
                let mut args = self.stack.pop_n(arg)?;
                let receiver = self.stack.pop()?;
                let callable = self.stack.pop()?;
                args.insert(0, receiver);
                self.call_value(callable, args, None)
            }

            OpCode::ReturnValue => {
                // The return value stays on the shared operand stack for
                // the caller; at depth 0 it marks the end of the run.
                self.stack.peek()?;
                self.frames.pop();
                if self.frames.is_empty() {
                    self.halted = true;
                } else {
                    self.scopes.pop();
                    trace!(depth = self.frames.len() - 1, "return");
                }
                Ok(())
            }
        }
    }

    fn pop_jump_if(&mut self, target: usize, when: bool) -> PyriteResult<()> {
        let condition = match self.stack.pop()? {
            Value::Bool(b) => b,
            other => {
                return Err(PyriteError::TypeMismatch {
                    expected: "bool",
                    found: other.type_name(),
                })
            }
        };
        if condition == when {
            let frame = self
                .frames
                .last_mut()
                .ok_or(PyriteError::InstructionOverrun)?;
            jump(frame, target)?;
        }
        Ok(())
    }

    fn binary_op(&mut self, op: ArithOp) -> PyriteResult<()> {
        let rhs = self.stack.pop()?;
        let lhs = self.stack.pop()?;
        let result = match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => {
                let n = match op {
                    ArithOp::Add => &**a + &**b,
                    ArithOp::Sub => &**a - &**b,
                    ArithOp::Mul => &**a * &**b,
                };
                Value::Int(Rc::new(n))
            }
            (Value::Float(a), Value::Float(b)) => Value::Float(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
            }),
            _ => {
                return Err(PyriteError::TypeMismatch {
                    expected: lhs.type_name(),
                    found: rhs.type_name(),
                })
            }
        };
        self.stack.push(result)
    }

    fn compare_op(&mut self, operand: u8) -> PyriteResult<()> {
        let rhs = self.stack.pop()?;
        let lhs = self.stack.pop()?;
        let outcome = match operand {
            2 => lhs == rhs,
            3 => lhs != rhs,
            0 | 1 | 4 | 5 => {
                let ord = ordering(&lhs, &rhs)?;
                match operand {
                    0 => ord == Ordering::Less,
                    1 => ord != Ordering::Greater,
                    4 => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                }
            }
            other => return Err(PyriteError::InvalidCompareOp(other)),
        };
        self.stack.push(Value::Bool(outcome))
    }

    /// Invoke a callable with already-popped arguments in call order.
    pub(crate) fn call_value(
        &mut self,
        callable: Value,
        args: Vec<Value>,
        kwargs: Option<Kwargs>,
    ) -> PyriteResult<()> {
        match callable {
            Value::NativeFunction(native) => {
                let result = native(self, &args, kwargs.as_ref())?;
                self.stack.push(result)
            }
            Value::Function(function) => {
                if kwargs.as_ref().is_some_and(|kw| !kw.is_empty()) {
                    return Err(PyriteError::KeywordsUnsupported(function.name.clone()));
                }
                if self.frames.len() >= self.config.max_call_depth {
                    return Err(PyriteError::CallDepthExceeded(self.config.max_call_depth));
                }
                let expected = function.code.argcount as usize;
                if args.len() != expected {
                    return Err(PyriteError::ArityMismatch {
                        name: function.name.clone(),
                        expected,
                        got: args.len(),
                    });
                }
                debug!(name = %function.name, argc = args.len(), depth = self.frames.len(), "call");
                let mut frame = Frame::new(function.code.clone());
                for (slot, value) in args.into_iter().enumerate() {
                    frame.set_local(slot, value)?;
                }
                self.frames.push(frame);
                self.scopes.push();
                Ok(())
            }
            other => Err(PyriteError::TypeMismatch {
                expected: "callable",
                found: other.type_name(),
            }),
        }
    }

    /// Import a module by name, honoring the optional fromlist filter.
    pub fn import(&mut self, name: &str, fromlist: Option<&[String]>) -> PyriteResult<Value> {
        import::import_module(self, name, fromlist)
    }
}

fn jump(frame: &mut Frame, target: usize) -> PyriteResult<()> {
    if target >= frame.code.instructions().len() {
        return Err(PyriteError::InvalidJumpTarget(target));
    }
    frame.ip = target;
    Ok(())
}

fn normalize_index(index: &Value, len: usize) -> PyriteResult<usize> {
    let raw = index
        .expect_int()?
        .to_i64()
        .ok_or(PyriteError::IndexOutOfRange {
            index: i64::MAX,
            len,
        })?;
    let adjusted = if raw < 0 { raw + len as i64 } else { raw };
    if adjusted < 0 || adjusted as usize >= len {
        return Err(PyriteError::IndexOutOfRange { index: raw, len });
    }
    Ok(adjusted as usize)
}

fn subscript_get(container: &Value, index: &Value) -> PyriteResult<Value> {
    match container {
        Value::List(list) => {
            let list = list.borrow();
            let at = normalize_index(index, list.len())?;
            Ok(list[at].clone())
        }
        Value::Tuple(items) => {
            let at = normalize_index(index, items.len())?;
            Ok(items[at].clone())
        }
        other => Err(PyriteError::TypeMismatch {
            expected: "list or tuple",
            found: other.type_name(),
        }),
    }
}

fn subscript_set(container: &Value, index: &Value, value: Value) -> PyriteResult<()> {
    match container {
        Value::List(list) => {
            let mut list = list.borrow_mut();
            let len = list.len();
            let at = normalize_index(index, len)?;
            list[at] = value;
            Ok(())
        }
        other => Err(PyriteError::TypeMismatch {
            expected: "list",
            found: other.type_name(),
        }),
    }
}

fn ordering(lhs: &Value, rhs: &Value) -> PyriteResult<Ordering> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => Ok(a.total_cmp(b)),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        _ => Err(PyriteError::TypeMismatch {
            expected: lhs.type_name(),
            found: rhs.type_name(),
        }),
    }
}

/// Compile (if needed), deserialize and execute the module at `path`.
pub fn run_path(
    path: &Path,
    config: PyriteConfig,
    compiler: Rc<dyn SourceCompiler>,
) -> PyriteResult<()> {
    let code = import::load_code(path, compiler.as_ref())?;
    info!(path = %path.display(), "running module");
    let mut vm = VirtualMachine::new(config, compiler);
    vm.run_code(code)
}
