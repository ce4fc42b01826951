//! Marshal Deserializer
//!
//! Parses the CPython 3.10 serialized code-object format ("marshal") into
//! an in-memory `CodeObject` tree. This layer performs structural
//! validation only; it never executes anything.
//!
//! The stream is one recursively tagged object after a 16-byte pyc header
//! (magic, flags, mtime, source size). When a tag byte carries the high
//! bit, a back-reference slot is reserved before the payload is read, so
//! later `REF` tags can alias any completed earlier object but never a
//! partially read one.

use std::rc::Rc;

use num_bigint::BigInt;
use tracing::debug;

use crate::bytecode::CodeObject;
use crate::error::{PyriteError, PyriteResult};
use crate::vm::value::Value;

/// Magic numbers selecting the one supported bytecode revision (3.10)
const MAGIC_MIN: u16 = 3430;
const MAGIC_MAX: u16 = 3439;

/// pyc header: 4-byte magic, 4-byte flags, 4-byte mtime, 4-byte size
const HEADER_LEN: usize = 16;

/// High bit of the tag byte: reserve a back-reference slot for this object
const FLAG_REF: u8 = 0x80;

const TAG_NONE: u8 = b'N';
const TAG_FALSE: u8 = b'F';
const TAG_TRUE: u8 = b'T';
const TAG_INT: u8 = b'i';
const TAG_BINARY_FLOAT: u8 = b'g';
const TAG_STRING: u8 = b's';
const TAG_ASCII: u8 = b'a';
const TAG_ASCII_INTERNED: u8 = b'A';
const TAG_UNICODE: u8 = b'u';
const TAG_SHORT_ASCII: u8 = b'z';
const TAG_SHORT_ASCII_INTERNED: u8 = b'Z';
const TAG_TUPLE: u8 = b'(';
const TAG_SMALL_TUPLE: u8 = b')';
const TAG_REF: u8 = b'r';
const TAG_CODE: u8 = b'c';

/// Refuse declared sizes no real module would reach
const MAX_ALLOC: usize = 1 << 28;

/// Parse a full pyc image into its top-level code object.
pub fn parse_module(bytes: &[u8]) -> PyriteResult<Rc<CodeObject>> {
    if bytes.len() < 4 {
        return Err(PyriteError::TruncatedInput);
    }
    let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
    if !(MAGIC_MIN..=MAGIC_MAX).contains(&magic) {
        return Err(PyriteError::UnsupportedVersion(magic));
    }
    if bytes.len() < HEADER_LEN {
        return Err(PyriteError::TruncatedInput);
    }

    let mut reader = MarshalReader::new(&bytes[HEADER_LEN..]);
    match reader.read_object()? {
        Value::Code(code) => {
            debug!(name = %code.name, file = %code.filename, "parsed module code object");
            Ok(code)
        }
        other => Err(PyriteError::MalformedCode(format!(
            "top-level object is {}, expected code",
            other.type_name()
        ))),
    }
}

/// Cursor over the tagged-object stream.
///
/// The back-reference table lives only for the duration of one parse.
struct MarshalReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    refs: Vec<Option<Value>>,
}

impl<'a> MarshalReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        MarshalReader {
            bytes,
            pos: 0,
            refs: Vec::new(),
        }
    }

    fn read_u8(&mut self) -> PyriteResult<u8> {
        if self.pos >= self.bytes.len() {
            return Err(PyriteError::TruncatedInput);
        }
        let b = self.bytes[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, len: usize) -> PyriteResult<&'a [u8]> {
        if len > MAX_ALLOC {
            return Err(PyriteError::OutOfMemory);
        }
        if self.pos + len > self.bytes.len() {
            return Err(PyriteError::TruncatedInput);
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u32(&mut self) -> PyriteResult<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i32(&mut self) -> PyriteResult<i32> {
        let b = self.read_bytes(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_f64(&mut self) -> PyriteResult<f64> {
        let b = self.read_bytes(8)?;
        Ok(f64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Read one tagged object.
    fn read_object(&mut self) -> PyriteResult<Value> {
        let raw = self.read_u8()?;
        let tag = raw & !FLAG_REF;

        // Reserve the slot before recursing: the payload may reference any
        // completed earlier object, never itself.
        let slot = if raw & FLAG_REF != 0 {
            self.refs.push(None);
            Some(self.refs.len() - 1)
        } else {
            None
        };

        let value = match tag {
            TAG_NONE => Value::None,
            TAG_TRUE => Value::Bool(true),
            TAG_FALSE => Value::Bool(false),
            TAG_INT => {
                let n = self.read_i32()?;
                Value::Int(Rc::new(BigInt::from(n)))
            }
            TAG_BINARY_FLOAT => Value::Float(self.read_f64()?),
            TAG_STRING | TAG_ASCII | TAG_ASCII_INTERNED | TAG_UNICODE => {
                let len = self.read_u32()? as usize;
                Value::bytes(self.read_bytes(len)?)
            }
            TAG_SHORT_ASCII | TAG_SHORT_ASCII_INTERNED => {
                let len = self.read_u8()? as usize;
                Value::bytes(self.read_bytes(len)?)
            }
            TAG_SMALL_TUPLE => {
                let count = self.read_u8()? as usize;
                self.read_tuple_items(count)?
            }
            TAG_TUPLE => {
                let count = self.read_u32()? as usize;
                if count > MAX_ALLOC {
                    return Err(PyriteError::OutOfMemory);
                }
                self.read_tuple_items(count)?
            }
            TAG_REF => {
                let index = self.read_u32()? as usize;
                match self.refs.get(index) {
                    Some(Some(value)) => value.clone(),
                    _ => return Err(PyriteError::DanglingReference(index)),
                }
            }
            TAG_CODE => self.read_code()?,
            other => return Err(PyriteError::UnknownTag(other)),
        };

        if let Some(index) = slot {
            self.refs[index] = Some(value.clone());
        }
        Ok(value)
    }

    fn read_tuple_items(&mut self, count: usize) -> PyriteResult<Value> {
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(self.read_object()?);
        }
        Ok(Value::tuple(items))
    }

    /// Read a code object. The field order is fixed by the format; reading
    /// any field out of sequence silently corrupts the rest of the stream.
    fn read_code(&mut self) -> PyriteResult<Value> {
        let argcount = self.read_u32()?;
        let posonlyargcount = self.read_u32()?;
        let kwonlyargcount = self.read_u32()?;
        let nlocals = self.read_u32()?;
        let stacksize = self.read_u32()?;
        let flags = self.read_u32()?;

        let code = self.expect_buffer("code")?;
        if code.len() % 2 != 0 {
            return Err(PyriteError::MalformedCode(
                "instruction stream is not 2-byte aligned".into(),
            ));
        }

        let consts = self.expect_tuple("consts")?;
        let names = self.expect_name_tuple("names")?;
        let varnames = self.expect_name_tuple("varnames")?;

        // No closure support: free and cell variables are read to keep the
        // cursor in sync, then dropped.
        self.read_object()?;
        self.read_object()?;

        let filename = self.expect_text("filename")?;
        let name = self.expect_text("name")?;
        let firstlineno = self.read_u32()?;

        // Line number table, unused.
        self.read_object()?;

        Ok(Value::Code(Rc::new(CodeObject::new(
            name,
            filename,
            argcount,
            posonlyargcount,
            kwonlyargcount,
            nlocals,
            stacksize,
            flags,
            firstlineno,
            code,
            consts,
            names,
            varnames,
        ))))
    }

    fn expect_buffer(&mut self, field: &str) -> PyriteResult<Vec<u8>> {
        match self.read_object()? {
            Value::Str(bytes) => Ok(bytes.to_vec()),
            other => Err(PyriteError::MalformedCode(format!(
                "{} field is {}, expected string",
                field,
                other.type_name()
            ))),
        }
    }

    fn expect_text(&mut self, field: &str) -> PyriteResult<String> {
        Ok(String::from_utf8_lossy(&self.expect_buffer(field)?).into_owned())
    }

    fn expect_tuple(&mut self, field: &str) -> PyriteResult<Vec<Value>> {
        match self.read_object()? {
            Value::Tuple(items) => Ok(items.to_vec()),
            other => Err(PyriteError::MalformedCode(format!(
                "{} field is {}, expected tuple",
                field,
                other.type_name()
            ))),
        }
    }

    fn expect_name_tuple(&mut self, field: &str) -> PyriteResult<Vec<String>> {
        let items = self.expect_tuple(field)?;
        items
            .iter()
            .map(|v| match v {
                Value::Str(s) => Ok(String::from_utf8_lossy(s).into_owned()),
                other => Err(PyriteError::MalformedCode(format!(
                    "{} entry is {}, expected string",
                    field,
                    other.type_name()
                ))),
            })
            .collect()
    }
}
