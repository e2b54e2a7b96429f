//! The fetch-decode-execute loop: a fixed-size value stack, a globals
//! table, and the arithmetic/logic/print/jump semantics of §4.3.

use clockwork_compiler::compile;
use clockwork_core::{Chunk, Heap, Interner, OpCode, Table, Value};
use tracing::{debug, trace};

use crate::error::{InterpretResult, RuntimeError};

const STACK_MAX: usize = 256;

/// Owns the one heap, one string table, one globals table, and one value
/// stack spec.md §5 describes a single Clockwork VM as having. Nothing
/// here is reentrant on the same `Vm`, but independent `Vm`s share no
/// state and can run in parallel on different threads.
pub struct Vm {
    heap: Heap,
    interner: Interner,
    globals: Table<Value>,
    stack: [Value; STACK_MAX],
    sp: usize,
}

impl Vm {
    pub fn new() -> Self {
        Vm {
            heap: Heap::new(),
            interner: Interner::new(),
            globals: Table::new(),
            stack: [Value::Null; STACK_MAX],
            sp: 0,
        }
    }

    /// Compile `source` and, on success, run it to completion. Per spec.md
    /// §6's `interpret(source) -> result` contract.
    ///
    /// The compiled [`Chunk`] is owned by this call and dropped when it
    /// returns (spec.md §5: chunks are caller-owned, the VM never frees
    /// them); the heap, intern table, and globals table persist across
    /// calls, which is what lets a REPL line declare a global and a later
    /// line read it.
    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        debug!(bytes = source.len(), "compiling source");
        let mut chunk = Chunk::new();
        if let Err(errors) = compile(source, &mut chunk, &self.heap, &mut self.interner) {
            debug!(count = errors.len(), "compile failed");
            return InterpretResult::CompileError(errors);
        }

        #[cfg(feature = "trace_execution")]
        chunk.disassemble("script");

        self.run(&chunk)
    }

    fn run(&mut self, chunk: &Chunk) -> InterpretResult {
        let mut ip: usize = 0;
        debug!("entering dispatch loop");

        macro_rules! push_or_overflow {
            ($value:expr, $line:expr) => {{
                if !self.push($value) {
                    return InterpretResult::RuntimeError(self.fail($line, "Stack overflow."));
                }
            }};
        }

        loop {
            #[cfg(feature = "trace_execution")]
            {
                self.trace_stack();
                chunk.disassemble_instruction(ip);
            }

            let op = OpCode::from_byte(chunk.byte_at(ip));
            let line = chunk.line_at(ip);
            ip += 1;
            trace!(?op, ip, line, "dispatch");

            macro_rules! read_byte {
                () => {{
                    let b = chunk.byte_at(ip);
                    ip += 1;
                    b
                }};
            }
            macro_rules! read_u16 {
                () => {{
                    let hi = chunk.byte_at(ip) as u16;
                    let lo = chunk.byte_at(ip + 1) as u16;
                    ip += 2;
                    (hi << 8) | lo
                }};
            }
            macro_rules! read_constant {
                () => {{
                    let idx = read_byte!();
                    chunk.constant_at(idx)
                }};
            }

            match op {
                OpCode::Constant => {
                    let value = read_constant!();
                    push_or_overflow!(value, line);
                }
                OpCode::Null => push_or_overflow!(Value::Null, line),
                OpCode::True => push_or_overflow!(Value::Bool(true), line),
                OpCode::False => push_or_overflow!(Value::Bool(false), line),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::DefGlobal => {
                    let name = read_constant!();
                    let Value::Object(handle) = name else {
                        unreachable!("DEF_GLOBAL operand is always an interned name constant");
                    };
                    let value = self.pop();
                    self.globals.set(handle, value);
                }
                OpCode::GetGlobal => {
                    let name = read_constant!();
                    let Value::Object(handle) = name else {
                        unreachable!("GET_GLOBAL operand is always an interned name constant");
                    };
                    match self.globals.get(handle) {
                        Some(value) => {
                            let value = *value;
                            push_or_overflow!(value, line);
                        }
                        None => {
                            let message =
                                format!("Undefined variable '{}'.", name.as_str().unwrap_or(""));
                            return InterpretResult::RuntimeError(self.fail(line, &message));
                        }
                    }
                }
                OpCode::SetGlobal => {
                    let name = read_constant!();
                    let Value::Object(handle) = name else {
                        unreachable!("SET_GLOBAL operand is always an interned name constant");
                    };
                    let value = self.peek(0);
                    if self.globals.set(handle, value) {
                        self.globals.delete(handle);
                        let message =
                            format!("Undefined variable '{}'.", name.as_str().unwrap_or(""));
                        return InterpretResult::RuntimeError(self.fail(line, &message));
                    }
                }
                OpCode::GetLocal => {
                    let slot = read_byte!();
                    let value = self.stack[slot as usize];
                    push_or_overflow!(value, line);
                }
                OpCode::SetLocal => {
                    let slot = read_byte!();
                    self.stack[slot as usize] = self.peek(0);
                }
                OpCode::Eq => {
                    let b = self.pop();
                    let a = self.pop();
                    push_or_overflow!(Value::Bool(a == b), line);
                }
                OpCode::NotEq => {
                    let b = self.pop();
                    let a = self.pop();
                    push_or_overflow!(Value::Bool(a != b), line);
                }
                OpCode::Lt | OpCode::LtEq | OpCode::Gt | OpCode::GtEq => {
                    let b = self.pop();
                    let a = self.pop();
                    let (Value::Number(a), Value::Number(b)) = (a, b) else {
                        return InterpretResult::RuntimeError(
                            self.fail(line, "Operands must be numbers."),
                        );
                    };
                    let result = match op {
                        OpCode::Lt => a < b,
                        OpCode::LtEq => a <= b,
                        OpCode::Gt => a > b,
                        OpCode::GtEq => a >= b,
                        _ => unreachable!("match arm guarded above"),
                    };
                    push_or_overflow!(Value::Bool(result), line);
                }
                OpCode::Add => {
                    let b = self.pop();
                    let a = self.pop();
                    let result = match (a, b) {
                        (Value::Number(x), Value::Number(y)) => Value::Number(x + y),
                        (Value::Object(_), Value::Object(_)) => {
                            let a_str = a.as_str().expect("Object values are always strings");
                            let b_str = b.as_str().expect("Object values are always strings");
                            let concatenated = format!("{a_str}{b_str}");
                            let handle = self.interner.intern(&self.heap, &concatenated);
                            Value::Object(handle)
                        }
                        _ => {
                            return InterpretResult::RuntimeError(self.fail(
                                line,
                                "Operands must be two numbers or two strings.",
                            ));
                        }
                    };
                    push_or_overflow!(result, line);
                }
                OpCode::Subtract | OpCode::Multiply | OpCode::Divide => {
                    let b = self.pop();
                    let a = self.pop();
                    let (Value::Number(a), Value::Number(b)) = (a, b) else {
                        return InterpretResult::RuntimeError(
                            self.fail(line, "Operands must be numbers."),
                        );
                    };
                    // Division by zero is IEEE-754 infinity, not an error
                    // (spec.md §4.3): Rust's `f64` division already does
                    // the right thing without a special case.
                    let result = match op {
                        OpCode::Subtract => a - b,
                        OpCode::Multiply => a * b,
                        OpCode::Divide => a / b,
                        _ => unreachable!("match arm guarded above"),
                    };
                    push_or_overflow!(Value::Number(result), line);
                }
                OpCode::Not => {
                    let value = self.pop();
                    push_or_overflow!(Value::Bool(value.is_falsey()), line);
                }
                OpCode::Negate => {
                    let value = self.pop();
                    let Value::Number(n) = value else {
                        return InterpretResult::RuntimeError(
                            self.fail(line, "Operand must be a number."),
                        );
                    };
                    push_or_overflow!(Value::Number(-n), line);
                }
                OpCode::Print => {
                    let value = self.pop();
                    println!("{value}");
                }
                OpCode::Jump => {
                    let offset = read_u16!();
                    ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = read_u16!();
                    if self.peek(0).is_falsey() {
                        ip += offset as usize;
                    }
                }
                OpCode::JumpIfTrue => {
                    let offset = read_u16!();
                    if !self.peek(0).is_falsey() {
                        ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = read_u16!();
                    ip -= offset as usize;
                }
                OpCode::Return => {
                    debug!("halting on RETURN");
                    return InterpretResult::Ok;
                }
            }
        }
    }

    fn push(&mut self, value: Value) -> bool {
        if self.sp >= STACK_MAX {
            return false;
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        true
    }

    fn pop(&mut self) -> Value {
        self.sp -= 1;
        self.stack[self.sp]
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.sp - 1 - distance]
    }

    /// A runtime error always resets the stack and aborts the current
    /// `interpret` call (spec.md §7); there is no user-visible exception
    /// mechanism to recover into.
    fn fail(&mut self, line: u32, message: &str) -> RuntimeError {
        self.sp = 0;
        RuntimeError {
            message: message.to_string(),
            line,
        }
    }

    #[cfg(feature = "trace_execution")]
    fn trace_stack(&self) {
        print!("          ");
        for value in &self.stack[..self.sp] {
            print!("[ {value} ]");
        }
        println!();
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl Vm {
    /// Read back a global's current value by name, for test assertions.
    /// Does not go through the bytecode interpreter's own GET_GLOBAL path,
    /// so it can inspect state the script itself never printed.
    fn global(&self, name: &str) -> Option<Value> {
        use clockwork_core::fnv1a_hash;
        let hash = fnv1a_hash(name.as_bytes());
        let handle = self.interner.find_by_bytes(name.as_bytes(), hash)?;
        self.globals.get(handle).copied()
    }

    fn stack_depth(&self) -> usize {
        self.sp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_precedence_scenario() {
        let mut vm = Vm::new();
        assert_eq!(vm.interpret("let r = 1 + 2 * 3;"), InterpretResult::Ok);
        assert_eq!(vm.global("r"), Some(Value::Number(7.0)));
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn string_concatenation_scenario() {
        let mut vm = Vm::new();
        let result = vm.interpret(r#"let a = "foo"; let b = "bar"; let c = a + b;"#);
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(vm.global("c").and_then(|v| v.as_str().map(String::from)), Some("foobar".to_string()));
    }

    #[test]
    fn while_loop_scenario() {
        let mut vm = Vm::new();
        let result = vm.interpret("let mut i = 0; while (i < 3) { i = i + 1; }");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(vm.global("i"), Some(Value::Number(3.0)));
    }

    #[test]
    fn if_else_scenario() {
        let mut vm = Vm::new();
        let result = vm.interpret("let mut r = 0; if (1 == 1) { r = 1; } else { r = 2; }");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(vm.global("r"), Some(Value::Number(1.0)));
    }

    #[test]
    fn negating_a_bool_is_a_runtime_error() {
        let mut vm = Vm::new();
        match vm.interpret("-true;") {
            InterpretResult::RuntimeError(e) => assert_eq!(e.message, "Operand must be a number."),
            other => panic!("expected a runtime error, got {other:?}"),
        }
    }

    #[test]
    fn reading_an_undefined_global_is_a_runtime_error() {
        let mut vm = Vm::new();
        match vm.interpret("x;") {
            InterpretResult::RuntimeError(e) => assert!(e.message.contains("Undefined variable")),
            other => panic!("expected a runtime error, got {other:?}"),
        }
    }

    #[test]
    fn self_referential_global_initializer_fails_at_runtime_not_compile_time() {
        // Unlike a local `let x = x;` (a compile error), a global
        // initializer referencing its own not-yet-defined name only fails
        // once GET_GLOBAL actually runs (spec.md §9).
        let mut vm = Vm::new();
        match vm.interpret("let x = x;") {
            InterpretResult::RuntimeError(e) => assert!(e.message.contains("Undefined variable")),
            other => panic!("expected a runtime error, got {other:?}"),
        }
    }

    #[test]
    fn interning_corollary_holds() {
        let mut vm = Vm::new();
        let result = vm.interpret(r#"let r = ("ab" + "c") == ("a" + "bc");"#);
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(vm.global("r"), Some(Value::Bool(true)));
    }

    #[test]
    fn division_by_zero_is_infinity_not_an_error() {
        let mut vm = Vm::new();
        let result = vm.interpret("let r = 1 / 0;");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(vm.global("r"), Some(Value::Number(f64::INFINITY)));
    }

    #[test]
    fn or_short_circuits_on_a_truthy_left_operand() {
        let mut vm = Vm::new();
        let result = vm.interpret("let r = false or 1;");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(vm.global("r"), Some(Value::Number(1.0)));
    }

    #[test]
    fn and_short_circuits_on_a_falsey_left_operand() {
        // If `and` evaluated its right operand here it would be a runtime
        // error (negating a string); short-circuiting means it never does.
        let mut vm = Vm::new();
        let result = vm.interpret(r#"let r = false and -"x";"#);
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(vm.global("r"), Some(Value::Bool(false)));
    }

    #[test]
    fn falsiness_matches_spec_in_conditionals() {
        let mut vm = Vm::new();
        vm.interpret("let mut a = 0; if (null) { a = 1; } if (false) { a = 2; }");
        assert_eq!(vm.global("a"), Some(Value::Number(0.0)));

        let mut vm = Vm::new();
        vm.interpret("let mut a = 0; if (0) { a = 1; }");
        assert_eq!(vm.global("a"), Some(Value::Number(1.0)));
    }

    #[test]
    fn a_compile_error_skips_execution_entirely() {
        let mut vm = Vm::new();
        match vm.interpret("let ;") {
            InterpretResult::CompileError(errors) => assert!(!errors.is_empty()),
            other => panic!("expected a compile error, got {other:?}"),
        }
        // Nothing ran, so no global was ever declared.
        assert_eq!(vm.global("anything"), None);
    }

    #[test]
    fn panic_mode_recovers_to_report_independent_errors() {
        // Two unrelated missing-semicolon errors on separate statements
        // should both surface, not just the first (spec.md §7).
        let mut vm = Vm::new();
        match vm.interpret("let a = 1\nlet b = 2\n") {
            InterpretResult::CompileError(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected a compile error, got {other:?}"),
        }
    }
}
