//! Pyrite - Core Library
//!
//! A from-scratch virtual machine for CPython 3.10 bytecode: a marshal
//! deserializer, a tagged runtime value model, and a stack-based
//! execution engine with call frames, scope resolution and synchronous
//! module import. CPython itself is only ever used out of process, as a
//! source-to-bytecode compiler behind the `SourceCompiler` trait.

pub mod bytecode;
pub mod compiler;
pub mod config;
pub mod error;
pub mod marshal;
pub mod vm;

// Re-export commonly used types
pub use bytecode::{CodeObject, Instruction, OpCode};
pub use compiler::{PrecompiledOnly, SourceCompiler};
pub use config::PyriteConfig;
pub use error::{PyriteError, PyriteResult};
pub use marshal::parse_module;
pub use vm::vm::run_path;
pub use vm::{Value, VirtualMachine};

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;

    use num_bigint::BigInt;

    /// Test writer that keeps everything printed in memory.
    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn code_object(
        argcount: u32,
        nlocals: u32,
        code: Vec<u8>,
        consts: Vec<Value>,
        names: Vec<&str>,
    ) -> Rc<CodeObject> {
        Rc::new(CodeObject::new(
            "<test>".into(),
            "<test>".into(),
            argcount,
            0,
            0,
            nlocals,
            16,
            64,
            1,
            code,
            consts,
            names.into_iter().map(String::from).collect(),
            Vec::new(),
        ))
    }

    fn vm_with_capture() -> (VirtualMachine, SharedBuf) {
        let mut vm = VirtualMachine::new(PyriteConfig::new(), Rc::new(PrecompiledOnly));
        let buf = SharedBuf::default();
        vm.set_output(Rc::new(RefCell::new(Box::new(buf.clone()))));
        (vm, buf)
    }

    const LOAD_CONST: u8 = OpCode::LoadConst as u8;
    const LOAD_NAME: u8 = OpCode::LoadName as u8;
    const STORE_NAME: u8 = OpCode::StoreName as u8;
    const RETURN_VALUE: u8 = OpCode::ReturnValue as u8;
    const POP_TOP: u8 = OpCode::PopTop as u8;

    #[test]
    fn arithmetic_result_is_printed() {
        // x = 1 + 2; print(x)
        let code = code_object(
            0,
            0,
            vec![
                LOAD_CONST, 0,
                LOAD_CONST, 1,
                OpCode::BinaryAdd as u8, 0,
                STORE_NAME, 0,
                LOAD_NAME, 1,
                LOAD_NAME, 0,
                OpCode::CallFunction as u8, 1,
                POP_TOP, 0,
                LOAD_CONST, 2,
                RETURN_VALUE, 0,
            ],
            vec![Value::int(1), Value::int(2), Value::None],
            vec!["x", "print"],
        );
        let (mut vm, out) = vm_with_capture();
        vm.run_code(code).expect("execution failed");
        assert_eq!(out.contents(), "3\n");
        assert_eq!(vm.globals().get("x"), Some(&Value::int(3)));
    }

    #[test]
    fn binary_add_is_arbitrary_precision() {
        let a: BigInt = "123456789012345678901234567890".parse().unwrap();
        let b: BigInt = "987654321098765432109876543210".parse().unwrap();
        let code = code_object(
            0,
            0,
            vec![LOAD_CONST, 0, LOAD_CONST, 1, OpCode::BinaryAdd as u8, 0, RETURN_VALUE, 0],
            vec![Value::int(a.clone()), Value::int(b.clone())],
            vec![],
        );
        let (mut vm, _) = vm_with_capture();
        vm.run_code(code).expect("execution failed");
        assert_eq!(vm.peek_top().unwrap(), Value::int(a + b));
    }

    #[test]
    fn binary_add_rejects_mixed_tags() {
        let code = code_object(
            0,
            0,
            vec![LOAD_CONST, 0, LOAD_CONST, 1, OpCode::BinaryAdd as u8, 0, RETURN_VALUE, 0],
            vec![Value::int(1), Value::str("x")],
            vec![],
        );
        let (mut vm, _) = vm_with_capture();
        assert!(matches!(
            vm.run_code(code),
            Err(PyriteError::TypeMismatch { .. })
        ));
    }

    fn compare(a: i64, b: i64, operand: u8) -> bool {
        let code = code_object(
            0,
            0,
            vec![LOAD_CONST, 0, LOAD_CONST, 1, OpCode::CompareOp as u8, operand, RETURN_VALUE, 0],
            vec![Value::int(a), Value::int(b)],
            vec![],
        );
        let (mut vm, _) = vm_with_capture();
        vm.run_code(code).expect("execution failed");
        match vm.peek_top().unwrap() {
            Value::Bool(result) => result,
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn compare_op_is_consistent_with_total_order() {
        let samples = [-3i64, 0, 1, 7];
        for &a in &samples {
            for &b in &samples {
                assert_eq!(compare(a, b, 0), a < b);
                assert_eq!(compare(a, b, 1), a <= b);
                assert_eq!(compare(a, b, 2), a == b);
                assert_eq!(compare(a, b, 3), a != b);
                assert_eq!(compare(a, b, 4), a > b);
                assert_eq!(compare(a, b, 5), a >= b);
            }
        }
    }

    #[test]
    fn store_subscr_negative_index_mutates_last_element() {
        // xs = [10, 20, 30]; xs[-1] = 99
        let code = code_object(
            0,
            0,
            vec![
                LOAD_CONST, 0,
                LOAD_CONST, 1,
                LOAD_CONST, 2,
                OpCode::BuildList as u8, 3,
                STORE_NAME, 0,
                LOAD_CONST, 3,
                LOAD_NAME, 0,
                LOAD_CONST, 4,
                OpCode::StoreSubscr as u8, 0,
                LOAD_CONST, 5,
                RETURN_VALUE, 0,
            ],
            vec![
                Value::int(10),
                Value::int(20),
                Value::int(30),
                Value::int(99),
                Value::int(-1),
                Value::None,
            ],
            vec!["xs"],
        );
        let (mut vm, _) = vm_with_capture();
        vm.run_code(code).expect("execution failed");
        let expected = Value::list(vec![Value::int(10), Value::int(20), Value::int(99)]);
        assert_eq!(vm.globals().get("xs"), Some(&expected));
    }

    #[test]
    fn store_subscr_out_of_range_is_fatal() {
        let code = code_object(
            0,
            0,
            vec![
                LOAD_CONST, 0,
                LOAD_CONST, 0,
                LOAD_CONST, 0,
                OpCode::BuildList as u8, 3,
                STORE_NAME, 0,
                LOAD_CONST, 1,
                LOAD_NAME, 0,
                LOAD_CONST, 2,
                OpCode::StoreSubscr as u8, 0,
                LOAD_CONST, 3,
                RETURN_VALUE, 0,
            ],
            vec![Value::int(0), Value::int(99), Value::int(3), Value::None],
            vec!["xs"],
        );
        let (mut vm, _) = vm_with_capture();
        assert!(matches!(
            vm.run_code(code),
            Err(PyriteError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn interpreted_call_returns_and_resumes_caller() {
        // def f(n): return n + 10
        // module returns f(32)
        let callee = code_object(
            1,
            1,
            vec![
                OpCode::LoadFast as u8, 0,
                LOAD_CONST, 0,
                OpCode::BinaryAdd as u8, 0,
                RETURN_VALUE, 0,
            ],
            vec![Value::int(10)],
            vec![],
        );
        let module = code_object(
            0,
            0,
            vec![
                LOAD_CONST, 0,
                LOAD_CONST, 1,
                OpCode::MakeFunction as u8, 0,
                STORE_NAME, 0,
                LOAD_NAME, 0,
                LOAD_CONST, 2,
                OpCode::CallFunction as u8, 1,
                RETURN_VALUE, 0,
            ],
            vec![Value::Code(callee), Value::str("f"), Value::int(32)],
            vec!["f"],
        );
        let (mut vm, _) = vm_with_capture();
        vm.run_code(module).expect("execution failed");
        // Exactly the callee's return value is left for the caller.
        assert_eq!(vm.stack_len(), 1);
        assert_eq!(vm.peek_top().unwrap(), Value::int(42));
    }

    #[test]
    fn call_arity_mismatch_is_fatal() {
        let callee = code_object(1, 1, vec![LOAD_CONST, 0, RETURN_VALUE, 0], vec![Value::None], vec![]);
        let module = code_object(
            0,
            0,
            vec![
                LOAD_CONST, 0,
                LOAD_CONST, 1,
                OpCode::MakeFunction as u8, 0,
                OpCode::CallFunction as u8, 0,
                RETURN_VALUE, 0,
            ],
            vec![Value::Code(callee), Value::str("f")],
            vec![],
        );
        let (mut vm, _) = vm_with_capture();
        assert!(matches!(
            vm.run_code(module),
            Err(PyriteError::ArityMismatch { expected: 1, got: 0, .. })
        ));
    }

    #[test]
    fn unpack_sequence_assigns_left_to_right() {
        // a, b = (1, 2)
        let code = code_object(
            0,
            0,
            vec![
                LOAD_CONST, 0,
                OpCode::UnpackSequence as u8, 2,
                STORE_NAME, 0,
                STORE_NAME, 1,
                LOAD_CONST, 1,
                RETURN_VALUE, 0,
            ],
            vec![
                Value::tuple(vec![Value::int(1), Value::int(2)]),
                Value::None,
            ],
            vec!["a", "b"],
        );
        let (mut vm, _) = vm_with_capture();
        vm.run_code(code).expect("execution failed");
        assert_eq!(vm.globals().get("a"), Some(&Value::int(1)));
        assert_eq!(vm.globals().get("b"), Some(&Value::int(2)));
    }

    #[test]
    fn pop_jump_if_false_skips_taken_branch() {
        // x = 1 if False-path skipped, else 2
        let code = code_object(
            0,
            0,
            vec![
                LOAD_CONST, 0,                           // False
                OpCode::PopJumpIfFalse as u8, 4,         // -> instruction 4
                LOAD_CONST, 1,
                STORE_NAME, 0,                           // skipped
                LOAD_CONST, 2,
                STORE_NAME, 1,
                LOAD_CONST, 3,
                RETURN_VALUE, 0,
            ],
            vec![
                Value::Bool(false),
                Value::int(1),
                Value::int(2),
                Value::None,
            ],
            vec!["skipped", "taken"],
        );
        let (mut vm, _) = vm_with_capture();
        vm.run_code(code).expect("execution failed");
        assert_eq!(vm.globals().get("skipped"), None);
        assert_eq!(vm.globals().get("taken"), Some(&Value::int(2)));
    }

    #[test]
    fn build_set_and_set_update_merge_values() {
        // s = {1}; s.update via SET_UPDATE with (2, 1)
        let code = code_object(
            0,
            0,
            vec![
                LOAD_CONST, 0,
                OpCode::BuildSet as u8, 1,
                LOAD_CONST, 1,
                OpCode::SetUpdate as u8, 1,
                STORE_NAME, 0,
                LOAD_CONST, 2,
                RETURN_VALUE, 0,
            ],
            vec![
                Value::int(1),
                Value::tuple(vec![Value::int(2), Value::int(1)]),
                Value::None,
            ],
            vec!["s"],
        );
        let (mut vm, _) = vm_with_capture();
        vm.run_code(code).expect("execution failed");
        match vm.globals().get("s") {
            Some(Value::Set(set)) => {
                let set = set.borrow();
                assert_eq!(set.len(), 2);
                assert!(set.contains(&Value::int(1)));
                assert!(set.contains(&Value::int(2)));
            }
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[test]
    fn load_method_call_method_appends_to_list() {
        // xs = []; xs.append(5)
        let code = code_object(
            0,
            0,
            vec![
                OpCode::BuildList as u8, 0,
                STORE_NAME, 0,
                LOAD_NAME, 0,
                OpCode::LoadMethod as u8, 1,
                LOAD_CONST, 0,
                OpCode::CallMethod as u8, 1,
                POP_TOP, 0,
                LOAD_CONST, 1,
                RETURN_VALUE, 0,
            ],
            vec![Value::int(5), Value::None],
            vec!["xs", "append"],
        );
        let (mut vm, _) = vm_with_capture();
        vm.run_code(code).expect("execution failed");
        assert_eq!(
            vm.globals().get("xs"),
            Some(&Value::list(vec![Value::int(5)]))
        );
    }

    #[test]
    fn call_function_kw_overrides_print_separators() {
        // print(1, 2, sep="-", end="")
        let code = code_object(
            0,
            0,
            vec![
                LOAD_NAME, 0,
                LOAD_CONST, 0,
                LOAD_CONST, 1,
                LOAD_CONST, 2,
                LOAD_CONST, 3,
                LOAD_CONST, 4,
                OpCode::CallFunctionKw as u8, 4,
                POP_TOP, 0,
                LOAD_CONST, 5,
                RETURN_VALUE, 0,
            ],
            vec![
                Value::int(1),
                Value::int(2),
                Value::str("-"),
                Value::str(""),
                Value::tuple(vec![Value::str("sep"), Value::str("end")]),
                Value::None,
            ],
            vec!["print"],
        );
        let (mut vm, out) = vm_with_capture();
        vm.run_code(code).expect("execution failed");
        assert_eq!(out.contents(), "1-2");
    }

    #[test]
    fn load_global_bypasses_local_scope() {
        // def f(): return print  (via LOAD_GLOBAL)
        let callee = code_object(
            0,
            0,
            vec![OpCode::LoadGlobal as u8, 0, RETURN_VALUE, 0],
            vec![],
            vec!["print"],
        );
        let module = code_object(
            0,
            0,
            vec![
                LOAD_CONST, 0,
                LOAD_CONST, 1,
                OpCode::MakeFunction as u8, 0,
                OpCode::CallFunction as u8, 0,
                RETURN_VALUE, 0,
            ],
            vec![Value::Code(callee), Value::str("f")],
            vec![],
        );
        let (mut vm, _) = vm_with_capture();
        vm.run_code(module).expect("execution failed");
        assert!(matches!(
            vm.peek_top().unwrap(),
            Value::NativeFunction(_)
        ));
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let code = code_object(0, 0, vec![0, 0], vec![], vec![]);
        let (mut vm, _) = vm_with_capture();
        assert!(matches!(
            vm.run_code(code),
            Err(PyriteError::UnknownOpcode(0))
        ));
    }
}
