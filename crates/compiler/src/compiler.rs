//! Single-pass compiler: a Pratt expression parser and a recursive-descent
//! statement parser that emit bytecode directly, with no intermediate AST.
//! Per spec.md §4.2/§9.

use clockwork_core::{Chunk, Heap, Interner, OpCode, Value};
use tracing::{debug, trace};

use crate::error::{CompileError, ErrorLocation};
use crate::rules::{get_rule, Precedence};
use crate::scanner::Scanner;
use crate::token::{Token, TokenKind};

/// A local variable's stack slot, indexed by declaration order within the
/// function (there are no functions here, so effectively within the whole
/// program). `depth == -1` means "declared but its initializer hasn't run
/// yet" — reading it in that state is a compile error (spec.md §9).
struct Local<'src> {
    name: &'src str,
    depth: i32,
}

/// Compiles one source string into `chunk`. `'src` is the lifetime of the
/// source text; `'vm` is the (longer-lived) lifetime of the heap and
/// interner the VM owns and keeps using after compilation finishes, since
/// interned strings created at compile time must outlive this call.
pub struct Compiler<'src, 'vm> {
    scanner: Scanner<'src>,
    previous: Token<'src>,
    current: Token<'src>,
    chunk: &'vm mut Chunk,
    heap: &'vm Heap,
    interner: &'vm mut Interner,
    locals: Vec<Local<'src>>,
    scope_depth: i32,
    panic_mode: bool,
    had_error: bool,
    errors: Vec<CompileError>,
}

const MAX_LOCALS: usize = 256;

/// Compile `source` into `chunk`, sharing `heap`/`interner` with the VM that
/// will later run it. Per spec.md §4.2's `compile(source, chunk) -> ok?`
/// contract, generalized into a `Result` so the driver gets every
/// accumulated diagnostic rather than just a boolean.
pub fn compile<'vm>(
    source: &str,
    chunk: &'vm mut Chunk,
    heap: &'vm Heap,
    interner: &'vm mut Interner,
) -> Result<(), Vec<CompileError>> {
    let mut compiler = Compiler {
        scanner: Scanner::new(source),
        previous: Token::new(TokenKind::Eof, "", 0),
        current: Token::new(TokenKind::Eof, "", 0),
        chunk,
        heap,
        interner,
        locals: Vec::new(),
        scope_depth: 0,
        panic_mode: false,
        had_error: false,
        errors: Vec::new(),
    };

    debug!(bytes = source.len(), "compiling source");

    compiler.advance();
    while !compiler.check(TokenKind::Eof) {
        compiler.declaration();
    }
    compiler.consume(TokenKind::Eof, "Expect end of expression.");
    compiler.emit_return();

    if compiler.had_error {
        debug!(count = compiler.errors.len(), "compile finished with errors");
        Err(compiler.errors)
    } else {
        Ok(())
    }
}

impl<'src, 'vm> Compiler<'src, 'vm> {
    // ---- token stream plumbing --------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme.to_string();
            self.error_at_current(&message);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.check(kind) {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    // ---- error reporting ----------------------------------------------

    fn error(&mut self, message: &str) {
        let token = self.previous;
        self.error_at(token, message);
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current;
        self.error_at(token, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        trace!(line = token.line, message, "compile error");
        let at = if token.kind == TokenKind::Eof {
            ErrorLocation::AtEnd
        } else {
            ErrorLocation::AtLexeme(token.lexeme.to_string())
        };
        self.errors.push(CompileError {
            line: token.line,
            at,
            message: message.to_string(),
        });
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Let
                | TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Print
                | TokenKind::Return
                | TokenKind::Func => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ---- bytecode emission ---------------------------------------------

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.chunk.write_byte(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        let line = self.previous.line;
        self.chunk.write_op(op, line);
    }

    fn emit_op_at(&mut self, op: OpCode, line: u32) {
        self.chunk.write_op(op, line);
    }

    fn emit_return(&mut self) {
        self.emit_op(OpCode::Return);
    }

    fn emit_constant(&mut self, value: Value) {
        match self.chunk.add_constant(value) {
            Ok(index) => {
                self.emit_op(OpCode::Constant);
                self.emit_byte(index);
            }
            Err(message) => self.error(message),
        }
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk.len() - 2
    }

    fn patch_jump(&mut self, operand_offset: usize) {
        if let Err(message) = self.chunk.patch_jump(operand_offset) {
            self.error(message);
        }
    }

    fn emit_loop(&mut self, loop_start: usize) {
        let line = self.previous.line;
        if let Err(message) = self.chunk.emit_loop(loop_start, line) {
            self.error(message);
        }
    }

    fn identifier_constant(&mut self, token: Token<'src>) -> u8 {
        let handle = self.interner.intern(self.heap, token.lexeme);
        match self.chunk.add_constant(Value::Object(handle)) {
            Ok(index) => index,
            Err(message) => {
                self.error(message);
                0
            }
        }
    }

    // ---- scopes and locals ----------------------------------------------

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.scope_depth -= 1;
        while let Some(local) = self.locals.last() {
            if local.depth > self.scope_depth {
                self.emit_op(OpCode::Pop);
                self.locals.pop();
            } else {
                break;
            }
        }
    }

    fn add_local(&mut self, name: &'src str) {
        if self.locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in scope.");
            return;
        }
        self.locals.push(Local { name, depth: -1 });
    }

    fn declare_local(&mut self) {
        if self.scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme;
        for local in self.locals.iter().rev() {
            if local.depth != -1 && local.depth < self.scope_depth {
                break;
            }
            if local.name == name {
                self.error("Already a variable with this name in this scope.");
                return;
            }
        }
        self.add_local(name);
    }

    fn mark_initialized(&mut self) {
        if self.scope_depth == 0 {
            return;
        }
        if let Some(local) = self.locals.last_mut() {
            local.depth = self.scope_depth;
        }
    }

    /// Find `name` among the currently-live locals, innermost first.
    /// Reading a local before its own initializer has run is a compile
    /// error (spec.md §9), but resolution still returns its slot so
    /// compilation can continue.
    fn resolve_local(&mut self, name: &str) -> Option<u8> {
        for (index, local) in self.locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth == -1 {
                    self.error("Can not read a local variable in its own initializer.");
                }
                return Some(index as u8);
            }
        }
        None
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_local();
        if self.scope_depth > 0 {
            return 0;
        }
        let token = self.previous;
        self.identifier_constant(token)
    }

    fn define_variable(&mut self, global_index: u8) {
        if self.scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op(OpCode::DefGlobal);
        self.emit_byte(global_index);
    }

    fn named_variable(&mut self, name: Token<'src>, can_assign: bool) {
        let (get_op, set_op, arg) = match self.resolve_local(name.lexeme) {
            Some(slot) => (OpCode::GetLocal, OpCode::SetLocal, slot),
            None => {
                let index = self.identifier_constant(name);
                (OpCode::GetGlobal, OpCode::SetGlobal, index)
            }
        };

        if can_assign && self.match_kind(TokenKind::Equal) {
            self.expression();
            self.emit_op(set_op);
            self.emit_byte(arg);
        } else {
            self.emit_op(get_op);
            self.emit_byte(arg);
        }
    }

    // ---- expressions ----------------------------------------------------

    pub(crate) fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix_rule = get_rule(self.previous.kind).prefix;
        let Some(prefix_rule) = prefix_rule else {
            self.error("Expect expression.");
            return;
        };

        let can_assign = precedence <= Precedence::Assignment;
        prefix_rule(self, can_assign);

        while precedence <= get_rule(self.current.kind).precedence {
            self.advance();
            let infix_rule = get_rule(self.previous.kind)
                .infix
                .expect("token reached infix position without an infix rule");
            infix_rule(self, can_assign);
        }

        if can_assign && self.match_kind(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    // ---- statements -------------------------------------------------------

    fn declaration(&mut self) {
        if self.match_kind(TokenKind::Let) {
            self.let_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn let_declaration(&mut self) {
        // `mut` is accepted but carries no enforcement: nothing in the
        // language distinguishes a mutable binding from an immutable one
        // at runtime, so this is purely a parsing no-op.
        self.match_kind(TokenKind::Mut);

        let global_index = self.parse_variable("Expect variable name.");

        if self.match_kind(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Null);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global_index);
    }

    fn statement(&mut self) {
        if self.match_kind(TokenKind::Print) {
            self.print_statement();
        } else if self.match_kind(TokenKind::If) {
            self.if_statement();
        } else if self.match_kind(TokenKind::While) {
            self.while_statement();
        } else if self.match_kind(TokenKind::Return) {
            self.return_statement();
        } else if self.match_kind(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.match_kind(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk.len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    /// Only `return;` is legal: there are no functions to return a value
    /// from, so a bare `return` halts the top-level script (spec.md §9).
    fn return_statement(&mut self) {
        if self.match_kind(TokenKind::Semicolon) {
            self.emit_op(OpCode::Return);
            return;
        }
        self.error("Can not return a value from top-level code.");
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
    }
}

// ---- Pratt prefix/infix parsers -----------------------------------------
//
// These live as free functions (rather than `Compiler` methods) because
// `rules::get_rule` needs plain `fn` pointers for its table; each one
// matches the `ParseFn` signature in rules.rs.

pub(crate) fn grouping<'src, 'vm>(compiler: &mut Compiler<'src, 'vm>, _can_assign: bool) {
    compiler.expression();
    compiler.consume(TokenKind::RightParen, "Expect ')' after expression.");
}

pub(crate) fn unary<'src, 'vm>(compiler: &mut Compiler<'src, 'vm>, _can_assign: bool) {
    let op_kind = compiler.previous.kind;
    let line = compiler.previous.line;
    compiler.parse_precedence(Precedence::Unary);
    match op_kind {
        TokenKind::Minus => compiler.emit_op_at(OpCode::Negate, line),
        TokenKind::Bang => compiler.emit_op_at(OpCode::Not, line),
        _ => unreachable!("unary rule registered for non-unary token"),
    }
}

pub(crate) fn binary<'src, 'vm>(compiler: &mut Compiler<'src, 'vm>, _can_assign: bool) {
    let op_kind = compiler.previous.kind;
    let line = compiler.previous.line;
    let rule = get_rule(op_kind);
    compiler.parse_precedence(rule.precedence.next());
    let op = match op_kind {
        TokenKind::Plus => OpCode::Add,
        TokenKind::Minus => OpCode::Subtract,
        TokenKind::Star => OpCode::Multiply,
        TokenKind::Slash => OpCode::Divide,
        TokenKind::EqualEqual => OpCode::Eq,
        TokenKind::BangEqual => OpCode::NotEq,
        TokenKind::Less => OpCode::Lt,
        TokenKind::LessEqual => OpCode::LtEq,
        TokenKind::Greater => OpCode::Gt,
        TokenKind::GreaterEqual => OpCode::GtEq,
        _ => unreachable!("binary rule registered for non-binary token"),
    };
    compiler.emit_op_at(op, line);
}

pub(crate) fn and_<'src, 'vm>(compiler: &mut Compiler<'src, 'vm>, _can_assign: bool) {
    let end_jump = compiler.emit_jump(OpCode::JumpIfFalse);
    compiler.emit_op(OpCode::Pop);
    compiler.parse_precedence(Precedence::And);
    compiler.patch_jump(end_jump);
}

/// Mirrors `and_`: short-circuits on a truthy left operand via
/// `JUMP_IF_TRUE` instead of `and_`'s `JUMP_IF_FALSE`, per spec.md §4.2
/// ("logical `or` (symmetric with `JUMP_IF_TRUE`)").
pub(crate) fn or_<'src, 'vm>(compiler: &mut Compiler<'src, 'vm>, _can_assign: bool) {
    let end_jump = compiler.emit_jump(OpCode::JumpIfTrue);
    compiler.emit_op(OpCode::Pop);
    compiler.parse_precedence(Precedence::Or);
    compiler.patch_jump(end_jump);
}

pub(crate) fn literal<'src, 'vm>(compiler: &mut Compiler<'src, 'vm>, _can_assign: bool) {
    match compiler.previous.kind {
        TokenKind::Null => compiler.emit_op(OpCode::Null),
        TokenKind::True => compiler.emit_op(OpCode::True),
        TokenKind::False => compiler.emit_op(OpCode::False),
        _ => unreachable!("literal rule registered for non-literal token"),
    }
}

pub(crate) fn number<'src, 'vm>(compiler: &mut Compiler<'src, 'vm>, _can_assign: bool) {
    let token = compiler.previous;
    match parse_number_literal(token.lexeme, token.number_base) {
        Some(value) => compiler.emit_constant(Value::Number(value)),
        None => compiler.error("Invalid number literal."),
    }
}

fn parse_number_literal(lexeme: &str, base: crate::token::NumberBase) -> Option<f64> {
    use crate::token::NumberBase;
    match base {
        NumberBase::Decimal => lexeme.parse::<f64>().ok(),
        NumberBase::Binary => u64::from_str_radix(&lexeme[2..], 2).ok().map(|v| v as f64),
        NumberBase::Octal => u64::from_str_radix(&lexeme[2..], 8).ok().map(|v| v as f64),
        NumberBase::Hex => u64::from_str_radix(&lexeme[2..], 16).ok().map(|v| v as f64),
    }
}

pub(crate) fn string<'src, 'vm>(compiler: &mut Compiler<'src, 'vm>, _can_assign: bool) {
    let lexeme = compiler.previous.lexeme;
    // Lexeme includes the surrounding quote characters; strip them.
    let contents = &lexeme[1..lexeme.len() - 1];
    let handle = compiler.interner.intern(compiler.heap, contents);
    compiler.emit_constant(Value::Object(handle));
}

pub(crate) fn variable<'src, 'vm>(compiler: &mut Compiler<'src, 'vm>, can_assign: bool) {
    let name = compiler.previous;
    compiler.named_variable(name, can_assign);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clockwork_core::Interner;

    fn compile_ok(source: &str) -> Chunk {
        let heap = Heap::new();
        let mut interner = Interner::new();
        let mut chunk = Chunk::new();
        compile(source, &mut chunk, &heap, &mut interner).expect("expected compile to succeed");
        chunk
    }

    fn compile_err(source: &str) -> Vec<CompileError> {
        let heap = Heap::new();
        let mut interner = Interner::new();
        let mut chunk = Chunk::new();
        compile(source, &mut chunk, &heap, &mut interner).expect_err("expected compile to fail")
    }

    #[test]
    fn arithmetic_expression_statement_ends_in_pop_and_return() {
        let chunk = compile_ok("1 + 2 * 3;");
        let ops: Vec<OpCode> = chunk.code().iter().map(|&b| OpCode::from_byte(b)).collect();
        // Constants and arithmetic ops interleave with operand bytes; what
        // matters here is that the statement is POP-terminated and the
        // chunk as a whole ends in RETURN.
        assert!(ops.contains(&OpCode::Add));
        assert!(ops.contains(&OpCode::Multiply));
        assert_eq!(*ops.last().unwrap(), OpCode::Return);
    }

    #[test]
    fn global_declaration_emits_def_global() {
        let chunk = compile_ok("let x = 1;");
        let ops: Vec<OpCode> = chunk.code().iter().map(|&b| OpCode::from_byte(b)).collect();
        assert!(ops.contains(&OpCode::DefGlobal));
    }

    #[test]
    fn block_scope_pops_its_locals_on_exit() {
        let chunk = compile_ok("{ let a = 1; let b = 2; }");
        let ops: Vec<OpCode> = chunk.code().iter().map(|&b| OpCode::from_byte(b)).collect();
        let pop_count = ops.iter().filter(|op| **op == OpCode::Pop).count();
        assert_eq!(pop_count, 2);
        // Neither local should have been compiled as a global.
        assert!(!ops.contains(&OpCode::DefGlobal));
    }

    #[test]
    fn reading_own_initializer_is_a_compile_error() {
        let errors = compile_err("{ let x = x; }");
        assert!(errors
            .iter()
            .any(|e| e.message.contains("own initializer")));
    }

    #[test]
    fn missing_semicolon_is_reported_with_line_and_location() {
        let errors = compile_err("let x = 1\n");
        assert_eq!(errors.len(), 1);
        let rendered = errors[0].to_string();
        assert!(rendered.starts_with("[line 2]"));
    }

    #[test]
    fn if_else_emits_two_jumps() {
        let chunk = compile_ok("if (true) { print 1; } else { print 2; }");
        let ops: Vec<OpCode> = chunk.code().iter().map(|&b| OpCode::from_byte(b)).collect();
        assert!(ops.contains(&OpCode::JumpIfFalse));
        assert!(ops.contains(&OpCode::Jump));
        assert_eq!(ops.iter().filter(|op| **op == OpCode::Print).count(), 2);
    }

    #[test]
    fn and_emits_a_single_jump_if_false() {
        let chunk = compile_ok("true and false;");
        let ops: Vec<OpCode> = chunk.code().iter().map(|&b| OpCode::from_byte(b)).collect();
        assert_eq!(ops.iter().filter(|op| **op == OpCode::JumpIfFalse).count(), 1);
        assert!(!ops.contains(&OpCode::JumpIfTrue));
    }

    #[test]
    fn or_emits_a_single_jump_if_true() {
        let chunk = compile_ok("false or true;");
        let ops: Vec<OpCode> = chunk.code().iter().map(|&b| OpCode::from_byte(b)).collect();
        assert_eq!(ops.iter().filter(|op| **op == OpCode::JumpIfTrue).count(), 1);
        assert!(!ops.contains(&OpCode::JumpIfFalse));
    }

    #[test]
    fn while_loop_emits_a_backward_loop() {
        let chunk = compile_ok("while (false) { print 1; }");
        let ops: Vec<OpCode> = chunk.code().iter().map(|&b| OpCode::from_byte(b)).collect();
        assert!(ops.contains(&OpCode::Loop));
    }

    #[test]
    fn bare_return_is_accepted_at_top_level() {
        let chunk = compile_ok("return;");
        let ops: Vec<OpCode> = chunk.code().iter().map(|&b| OpCode::from_byte(b)).collect();
        // The explicit `return;` plus the compiler's own trailing RETURN.
        assert_eq!(ops.iter().filter(|op| **op == OpCode::Return).count(), 2);
    }

    #[test]
    fn integer_bases_reparse_to_the_same_number() {
        let chunk = compile_ok("0xFF;");
        match chunk.constant_at(0) {
            Value::Number(n) => assert_eq!(n, 255.0),
            other => panic!("expected a number constant, got {other:?}"),
        }
    }
}
