//! Built-in Functions
//!
//! The fixed native-function table installed into the global scope before
//! execution starts, plus the per-variant member-function tables consulted
//! by `LOAD_METHOD`/`getattr`. All natives share one calling convention:
//! the VM, positional arguments in call order, and an optional keyword map.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed};

use crate::config::PyriteConfig;
use crate::error::{PyriteError, PyriteResult};

use super::value::{Kwargs, ModuleObject, NativeFn, Value};
use super::vm::VirtualMachine;

/// Name -> native function table installed at depth 0
const BUILTINS: &[(&str, NativeFn)] = &[
    ("print", builtin_print),
    ("abs", builtin_abs),
    ("bool", builtin_bool),
    ("int", builtin_int),
    ("len", builtin_len),
    ("input", builtin_input),
    ("getattr", builtin_getattr),
    ("__import__", builtin_import),
];

/// Install the built-in function table into a global namespace.
pub fn install(globals: &mut IndexMap<String, Value>) {
    for (name, native) in BUILTINS {
        globals.insert((*name).to_string(), Value::NativeFunction(*native));
    }
}

/// The pre-populated built-in `sys` module (currently just `path`).
pub fn sys_module(config: &PyriteConfig) -> Value {
    let path = Value::list(
        config
            .sys_path
            .iter()
            .map(|p| Value::str(&p.to_string_lossy()))
            .collect(),
    );
    let mut namespace = IndexMap::new();
    namespace.insert("path".to_string(), path);
    Value::Module(Rc::new(ModuleObject {
        name: "sys".to_string(),
        namespace: RefCell::new(namespace),
    }))
}

/// Resolve an attribute or bound member function by name.
pub fn resolve_attribute(value: &Value, name: &str) -> PyriteResult<Value> {
    let member = match value {
        Value::Module(module) => return module
            .namespace
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| PyriteError::NoSuchAttribute {
                on: "module",
                attr: name.to_string(),
            }),
        Value::List(_) => match name {
            "append" => Some(list_append as NativeFn),
            _ => None,
        },
        Value::Set(_) => match name {
            "add" => Some(set_add as NativeFn),
            "update" => Some(set_update as NativeFn),
            _ => None,
        },
        _ => None,
    };
    member
        .map(Value::NativeFunction)
        .ok_or_else(|| PyriteError::NoSuchAttribute {
            on: value.type_name(),
            attr: name.to_string(),
        })
}

fn expect_arity(name: &str, args: &[Value], expected: usize) -> PyriteResult<()> {
    if args.len() != expected {
        return Err(PyriteError::ArityMismatch {
            name: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn kwarg_text(kwargs: Option<&Kwargs>, key: &str, default: &str) -> PyriteResult<String> {
    match kwargs.and_then(|kw| kw.get(key)) {
        Some(value) => value.expect_text(),
        None => Ok(default.to_string()),
    }
}

fn builtin_print(
    vm: &mut VirtualMachine,
    args: &[Value],
    kwargs: Option<&Kwargs>,
) -> PyriteResult<Value> {
    let sep = kwarg_text(kwargs, "sep", " ")?;
    let end = kwarg_text(kwargs, "end", "\n")?;

    let rendered: Vec<String> = args.iter().map(Value::to_string).collect();
    let out = vm.output();
    let mut out = out.borrow_mut();
    write!(out, "{}{}", rendered.join(&sep), end)?;
    out.flush()?;
    Ok(Value::None)
}

fn builtin_abs(
    _vm: &mut VirtualMachine,
    args: &[Value],
    _kwargs: Option<&Kwargs>,
) -> PyriteResult<Value> {
    expect_arity("abs", args, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(Rc::new(n.abs()))),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(PyriteError::TypeMismatch {
            expected: "int or float",
            found: other.type_name(),
        }),
    }
}

fn builtin_bool(
    _vm: &mut VirtualMachine,
    args: &[Value],
    _kwargs: Option<&Kwargs>,
) -> PyriteResult<Value> {
    expect_arity("bool", args, 1)?;
    Ok(Value::Bool(args[0].is_truthy()))
}

fn builtin_int(
    _vm: &mut VirtualMachine,
    args: &[Value],
    _kwargs: Option<&Kwargs>,
) -> PyriteResult<Value> {
    expect_arity("int", args, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(n.clone())),
        Value::Bool(b) => Ok(Value::int(i32::from(*b))),
        Value::Float(f) => BigInt::from_f64(f.trunc())
            .map(|n| Value::Int(Rc::new(n)))
            .ok_or(PyriteError::TypeMismatch {
                expected: "finite float",
                found: "float",
            }),
        Value::Str(_) => {
            let text = args[0].expect_text()?;
            text.trim()
                .parse::<BigInt>()
                .map(|n| Value::Int(Rc::new(n)))
                .map_err(|_| PyriteError::TypeMismatch {
                    expected: "integer literal",
                    found: "str",
                })
        }
        other => Err(PyriteError::TypeMismatch {
            expected: "int, bool, float or str",
            found: other.type_name(),
        }),
    }
}

fn builtin_len(
    _vm: &mut VirtualMachine,
    args: &[Value],
    _kwargs: Option<&Kwargs>,
) -> PyriteResult<Value> {
    expect_arity("len", args, 1)?;
    let len = match &args[0] {
        Value::Str(s) => s.len(),
        Value::Tuple(t) => t.len(),
        Value::List(l) => l.borrow().len(),
        Value::Set(s) => s.borrow().len(),
        other => {
            return Err(PyriteError::TypeMismatch {
                expected: "sized container",
                found: other.type_name(),
            })
        }
    };
    Ok(Value::int(len as u64))
}

fn builtin_input(
    vm: &mut VirtualMachine,
    args: &[Value],
    _kwargs: Option<&Kwargs>,
) -> PyriteResult<Value> {
    if args.len() > 1 {
        return Err(PyriteError::ArityMismatch {
            name: "input".to_string(),
            expected: 1,
            got: args.len(),
        });
    }
    if let Some(prompt) = args.first() {
        let out = vm.output();
        let mut out = out.borrow_mut();
        write!(out, "{}", prompt)?;
        out.flush()?;
    }
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Value::str(&line))
}

fn builtin_getattr(
    _vm: &mut VirtualMachine,
    args: &[Value],
    _kwargs: Option<&Kwargs>,
) -> PyriteResult<Value> {
    if args.len() != 2 && args.len() != 3 {
        return Err(PyriteError::ArityMismatch {
            name: "getattr".to_string(),
            expected: 2,
            got: args.len(),
        });
    }
    let name = args[1].expect_text()?;
    match resolve_attribute(&args[0], &name) {
        Ok(value) => Ok(value),
        Err(PyriteError::NoSuchAttribute { .. }) if args.len() == 3 => Ok(args[2].clone()),
        Err(err) => Err(err),
    }
}

fn builtin_import(
    vm: &mut VirtualMachine,
    args: &[Value],
    kwargs: Option<&Kwargs>,
) -> PyriteResult<Value> {
    expect_arity("__import__", args, 1)?;
    let name = args[0].expect_text()?;
    let fromlist = match kwargs.and_then(|kw| kw.get("fromlist")) {
        Some(Value::None) | None => None,
        Some(value) => {
            let names = value
                .elements()?
                .iter()
                .map(Value::expect_text)
                .collect::<PyriteResult<Vec<String>>>()?;
            Some(names)
        }
    };
    vm.import(&name, fromlist.as_deref())
}

// Member functions: args[0] is always the receiver.

fn list_append(
    _vm: &mut VirtualMachine,
    args: &[Value],
    _kwargs: Option<&Kwargs>,
) -> PyriteResult<Value> {
    expect_arity("list.append", args, 2)?;
    match &args[0] {
        Value::List(list) => {
            list.borrow_mut().push(args[1].clone());
            Ok(Value::None)
        }
        other => Err(PyriteError::TypeMismatch {
            expected: "list",
            found: other.type_name(),
        }),
    }
}

fn set_add(
    _vm: &mut VirtualMachine,
    args: &[Value],
    _kwargs: Option<&Kwargs>,
) -> PyriteResult<Value> {
    expect_arity("set.add", args, 2)?;
    match &args[0] {
        Value::Set(set) => {
            set.borrow_mut().insert(args[1].clone());
            Ok(Value::None)
        }
        other => Err(PyriteError::TypeMismatch {
            expected: "set",
            found: other.type_name(),
        }),
    }
}

fn set_update(
    _vm: &mut VirtualMachine,
    args: &[Value],
    _kwargs: Option<&Kwargs>,
) -> PyriteResult<Value> {
    if args.is_empty() {
        return Err(PyriteError::ArityMismatch {
            name: "set.update".to_string(),
            expected: 2,
            got: 0,
        });
    }
    match &args[0] {
        Value::Set(set) => {
            for iterable in &args[1..] {
                let items = iterable.elements()?;
                let mut set = set.borrow_mut();
                for item in items {
                    set.insert(item);
                }
            }
            Ok(Value::None)
        }
        other => Err(PyriteError::TypeMismatch {
            expected: "set",
            found: other.type_name(),
        }),
    }
}
