//! Runtime Value Representation
//!
//! Defines the tagged value type used by the Pyrite VM. Payload-free tags
//! (`None`, the canonical booleans) are plain enum variants and never
//! allocate; payload-bearing tags own their heap data behind `Rc`, so a
//! value is always cheap to copy and its payload lives as long as any
//! holder (operand stack, scope map, container) keeps it.
//!
//! Equality and hashing are structural per variant — big-integer value,
//! string bytes, element-wise containers — never the identity of the
//! backing allocation. Functions, modules and code objects have no
//! structural value semantics and compare by identity.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use num_bigint::BigInt;

use crate::bytecode::CodeObject;
use crate::error::{PyriteError, PyriteResult};
use crate::vm::vm::VirtualMachine;

/// Keyword-argument map passed to native functions
pub type Kwargs = IndexMap<String, Value>;

/// Signature shared by every built-in and member function
pub type NativeFn =
    fn(&mut VirtualMachine, &[Value], Option<&Kwargs>) -> PyriteResult<Value>;

/// An interpreted function: a name bound to a shared code object.
/// No captured environment — closures are not supported.
#[derive(Debug)]
pub struct FunctionObject {
    pub name: String,
    pub code: Rc<CodeObject>,
}

/// A loaded module: a name plus a flat name -> value namespace
#[derive(Debug)]
pub struct ModuleObject {
    pub name: String,
    pub namespace: RefCell<IndexMap<String, Value>>,
}

/// Tagged runtime value
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    /// Arbitrary-precision signed integer
    Int(Rc<BigInt>),
    Float(f64),
    /// Immutable byte buffer
    Str(Rc<[u8]>),
    /// Immutable fixed array
    Tuple(Rc<[Value]>),
    /// Growable array, mutable in place
    List(Rc<RefCell<Vec<Value>>>),
    /// Hash set over value equality
    Set(Rc<RefCell<IndexSet<Value>>>),
    NativeFunction(NativeFn),
    Function(Rc<FunctionObject>),
    Module(Rc<ModuleObject>),
    /// A bare code object, the `MAKE_FUNCTION` operand
    Code(Rc<CodeObject>),
}

impl Value {
    pub fn int(n: impl Into<BigInt>) -> Value {
        Value::Int(Rc::new(n.into()))
    }

    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s.as_bytes()))
    }

    pub fn bytes(b: &[u8]) -> Value {
        Value::Str(Rc::from(b))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::from(items))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn set(items: IndexSet<Value>) -> Value {
        Value::Set(Rc::new(RefCell::new(items)))
    }

    /// Tag name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::NativeFunction(_) => "builtin_function",
            Value::Function(_) => "function",
            Value::Module(_) => "module",
            Value::Code(_) => "code",
        }
    }

    /// Truth value: `None` and empty/zero payloads are false
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => **n != BigInt::from(0),
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Set(s) => !s.borrow().is_empty(),
            Value::NativeFunction(_)
            | Value::Function(_)
            | Value::Module(_)
            | Value::Code(_) => true,
        }
    }

    pub fn expect_int(&self) -> PyriteResult<&BigInt> {
        match self {
            Value::Int(n) => Ok(n),
            other => Err(PyriteError::TypeMismatch {
                expected: "int",
                found: other.type_name(),
            }),
        }
    }

    pub fn expect_str(&self) -> PyriteResult<&[u8]> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(PyriteError::TypeMismatch {
                expected: "str",
                found: other.type_name(),
            }),
        }
    }

    /// String payload as UTF-8 text (lossy; the buffer is raw bytes)
    pub fn expect_text(&self) -> PyriteResult<String> {
        Ok(String::from_utf8_lossy(self.expect_str()?).into_owned())
    }

    /// Elements of a container value, in iteration order
    pub fn elements(&self) -> PyriteResult<Vec<Value>> {
        match self {
            Value::Tuple(t) => Ok(t.to_vec()),
            Value::List(l) => Ok(l.borrow().clone()),
            Value::Set(s) => Ok(s.borrow().iter().cloned().collect()),
            other => Err(PyriteError::TypeMismatch {
                expected: "iterable",
                found: other.type_name(),
            }),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::Set(a), Value::Set(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().all(|v| b.contains(v))
            }
            (Value::NativeFunction(a), Value::NativeFunction(b)) => {
                *a as usize == *b as usize
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Code(a), Value::Code(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Value::None => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(n) => n.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Tuple(t) => {
                for v in t.iter() {
                    v.hash(state);
                }
            }
            Value::List(l) => {
                for v in l.borrow().iter() {
                    v.hash(state);
                }
            }
            // Order-independent: hash only the size, equality does the rest
            Value::Set(s) => s.borrow().len().hash(state),
            Value::NativeFunction(f) => (*f as usize).hash(state),
            Value::Function(f) => Rc::as_ptr(f).hash(state),
            Value::Module(m) => Rc::as_ptr(m).hash(state),
            Value::Code(c) => Rc::as_ptr(c).hash(state),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, v) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", v)?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", String::from_utf8_lossy(s)),
            Value::Tuple(t) => {
                write!(f, "(")?;
                join(f, t)?;
                write!(f, ")")
            }
            Value::List(l) => {
                write!(f, "[")?;
                join(f, &l.borrow())?;
                write!(f, "]")
            }
            Value::Set(s) => {
                write!(f, "{{")?;
                let items: Vec<Value> = s.borrow().iter().cloned().collect();
                join(f, &items)?;
                write!(f, "}}")
            }
            Value::NativeFunction(_) => write!(f, "<built-in function>"),
            Value::Function(func) => write!(f, "<function {}>", func.name),
            Value::Module(m) => write!(f, "<module {}>", m.name),
            Value::Code(c) => write!(f, "<code {}>", c.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_free_tags_compare_by_value() {
        assert_eq!(Value::None, Value::None);
        assert_eq!(Value::Bool(true), Value::Bool(true));
        assert_ne!(Value::Bool(true), Value::Bool(false));
    }

    #[test]
    fn int_equality_is_structural() {
        // Two distinct allocations of the same integer are equal.
        let a = Value::int(1234567890i64);
        let b = Value::int(1234567890i64);
        assert_eq!(a, b);
    }

    #[test]
    fn set_membership_uses_value_equality() {
        let mut set = IndexSet::new();
        assert!(set.insert(Value::int(7)));
        // Same value, different allocation: must be deduplicated.
        assert!(!set.insert(Value::int(7)));
        assert!(set.contains(&Value::int(7)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn display_matches_tag_specific_forms() {
        assert_eq!(Value::None.to_string(), "None");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::int(-3).to_string(), "-3");
        assert_eq!(Value::str("hi").to_string(), "hi");
        let t = Value::tuple(vec![Value::int(1), Value::int(2)]);
        assert_eq!(t.to_string(), "(1, 2)");
        let l = Value::list(vec![Value::str("a"), Value::None]);
        assert_eq!(l.to_string(), "[a, None]");
        let mut s = IndexSet::new();
        s.insert(Value::int(5));
        assert_eq!(Value::set(s).to_string(), "{5}");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::int(0).is_truthy());
        assert!(Value::int(-1).is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(Value::str("x").is_truthy());
        assert!(!Value::list(vec![]).is_truthy());
        assert!(Value::list(vec![Value::None]).is_truthy());
    }
}
