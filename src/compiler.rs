//! Compiler: source → bytecode in a single pass
//!
//! There is no syntax tree. Expressions are parsed by precedence climbing over
//! a table of prefix/infix handlers that emit code as they go; statements are
//! dispatched on their leading keyword. Locals are resolved to slots through
//! the current function's [`Scope`]; anything else becomes a global lookup
//! that the VM resolves at run time.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::bytecode::{Chunk, OpCode};
use crate::error::{Diagnostic, ErrorKind, Result, ShipError};
use crate::gc::{Handle, Heap};
use crate::lexer::Lexer;
use crate::object::{FunctionKind, FunctionObj};
use crate::scope::Scope;
use crate::token::{LexError, Token, TokenKind};
use crate::value::Value;

/// Binding power of operators, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment,
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * / %
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    fn next(self) -> Self {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

type ParseFn<'src, 'h> = fn(&mut Compiler<'src, 'h>);

struct ParseRule<'src, 'h> {
    prefix: Option<ParseFn<'src, 'h>>,
    infix: Option<ParseFn<'src, 'h>>,
    precedence: Precedence,
}

/// Function being compiled
struct FunctionState {
    name: String,
    kind: FunctionKind,
    arity: usize,
    chunk: Chunk,
    scope: Scope,
    /// Constant index of every string already in the pool
    strings: HashMap<String, u8>,
}

impl FunctionState {
    fn new(name: &str, kind: FunctionKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            arity: 0,
            chunk: Chunk::new(),
            scope: Scope::new(),
            strings: HashMap::new(),
        }
    }
}

/// Compile `source` into the root function of a script
pub fn compile(source: &str, heap: &mut Heap) -> Result<Handle> {
    Compiler::new(source, heap).compile()
}

/// The bytecode compiler
pub struct Compiler<'src, 'h> {
    lexer: Lexer<'src>,
    source: &'src str,
    current: Token<'src>,
    previous: Token<'src>,
    /// Innermost function being compiled
    function: FunctionState,
    /// Functions enclosing `function`, outermost first
    enclosing: Vec<FunctionState>,
    heap: &'h mut Heap,
    diagnostics: Vec<Diagnostic>,
    had_error: bool,
    panic_mode: bool,
}

impl<'src, 'h> Compiler<'src, 'h> {
    pub fn new(source: &'src str, heap: &'h mut Heap) -> Self {
        Self {
            lexer: Lexer::new(source),
            source,
            current: Token::empty(),
            previous: Token::empty(),
            function: FunctionState::new("<script>", FunctionKind::Script),
            enclosing: Vec::new(),
            heap,
            diagnostics: Vec::new(),
            had_error: false,
            panic_mode: false,
        }
    }

    /// Compile the whole program. Fails if any error was recorded, even when
    /// recovery let parsing run to the end.
    pub fn compile(mut self) -> Result<Handle> {
        self.advance();
        while !self.match_token(TokenKind::Eof) {
            self.declaration();
        }
        self.emit(OpCode::Halt);

        if self.had_error {
            debug!(errors = self.diagnostics.len(), "compilation failed");
            return Err(ShipError::Compile(self.diagnostics).with_source(self.source));
        }

        let script = std::mem::replace(
            &mut self.function,
            FunctionState::new("<script>", FunctionKind::Script),
        );
        Ok(self.finish_function(script))
    }

    fn finish_function(&mut self, state: FunctionState) -> Handle {
        trace!(
            name = %state.name,
            bytes = state.chunk.len(),
            constants = state.chunk.constants.len(),
            locals = state.scope.len(),
            "compiled function"
        );
        let function = FunctionObj::new(
            state.name,
            state.kind,
            state.arity,
            state.chunk,
            state.scope.into_names(),
        );
        self.heap.alloc_function(function)
    }

    // ==================== Token handling ====================

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.next_token();
            let TokenKind::Error(err) = self.current.kind else {
                break;
            };
            let kind = match err {
                LexError::UnexpectedCharacter => {
                    ErrorKind::UnexpectedCharacter(self.current.lexeme.to_string())
                }
                LexError::UnterminatedString => ErrorKind::UnterminatedString,
            };
            self.error_at(self.current, kind);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    /// Look one token past `current` without consuming anything
    fn check_next(&self, kind: TokenKind) -> bool {
        self.lexer.clone().next_token().kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, expected: &str) {
        if self.check(kind) {
            self.advance();
            return;
        }
        let got = self.describe(self.current);
        self.error_at(self.current, ErrorKind::ExpectedToken(expected.to_string(), got));
    }

    fn describe(&self, token: Token<'_>) -> String {
        match token.kind {
            TokenKind::Eof => "EOF".to_string(),
            _ => token.lexeme.to_string(),
        }
    }

    // ==================== Errors ====================

    fn error_at(&mut self, token: Token<'_>, kind: ErrorKind) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        self.diagnostics.push(Diagnostic::new(kind, token.span));
    }

    fn error(&mut self, kind: ErrorKind) {
        self.error_at(self.previous, kind);
    }

    /// Skip to a statement boundary after a syntax error
    fn synchronize(&mut self) {
        self.panic_mode = false;

        while !self.check(TokenKind::Eof) {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Var
                | TokenKind::Fn
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Foreach
                | TokenKind::Return
                | TokenKind::Print
                | TokenKind::Class
                | TokenKind::RightBrace => return,
                _ => self.advance(),
            }
        }
    }

    // ==================== Emission ====================

    fn line(&self) -> usize {
        self.previous.span.line
    }

    fn emit(&mut self, op: OpCode) {
        let line = self.line();
        self.function.chunk.write(op, line);
    }

    fn emit_with(&mut self, op: OpCode, operand: u8) {
        self.emit(op);
        let line = self.line();
        self.function.chunk.write_byte(operand, line);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        match self.function.chunk.add_constant(value) {
            Ok(idx) => idx,
            Err(kind) => {
                self.error(kind);
                0
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let idx = self.make_constant(value);
        self.emit_with(OpCode::Constant, idx);
    }

    /// Constant index of a string, allocating it on first use
    fn string_constant(&mut self, text: &str) -> u8 {
        if let Some(&idx) = self.function.strings.get(text) {
            return idx;
        }
        let handle = self.heap.alloc_string(text.to_string());
        let idx = self.make_constant(Value::String(handle));
        self.function.strings.insert(text.to_string(), idx);
        idx
    }

    /// Emit a forward jump with a placeholder offset; returns the operand position
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit(op);
        let line = self.line();
        self.function.chunk.write_u16(0xFFFF, line);
        self.function.chunk.len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        if let Err(kind) = self.function.chunk.patch_jump(offset) {
            self.error(kind);
        }
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit(OpCode::JumpBackward);
        let offset = self.function.chunk.len() + 2 - loop_start;
        let offset = match u16::try_from(offset) {
            Ok(offset) => offset,
            Err(_) => {
                self.error(ErrorKind::JumpTooLarge);
                0
            }
        };
        let line = self.line();
        self.function.chunk.write_u16(offset, line);
    }

    // ==================== Scope ====================

    fn declare_local(&mut self, token: Token<'_>) -> Option<u8> {
        match self.function.scope.declare(token.lexeme) {
            Ok(slot) => Some(slot),
            Err(kind) => {
                self.error_at(token, kind);
                None
            }
        }
    }

    // ==================== Statements ====================

    fn declaration(&mut self) {
        match self.current.kind {
            TokenKind::Var => self.var_declaration(),
            TokenKind::Fn => self.fn_declaration(),
            TokenKind::Class => self.class_declaration(),
            _ => self.statement(),
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn statement(&mut self) {
        match self.current.kind {
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::Foreach => self.foreach_statement(),
            TokenKind::Return => self.return_statement(),
            TokenKind::Print => self.print_statement(),
            TokenKind::Identifier if self.check_next(TokenKind::Equal) => self.assignment(),
            _ => self.expression_statement(),
        }
    }

    fn var_declaration(&mut self) {
        self.advance(); // var
        let name = self.current;
        self.consume(TokenKind::Identifier, "variable name");

        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "';' after variable declaration");

        if name.kind == TokenKind::Identifier {
            if let Some(slot) = self.declare_local(name) {
                self.emit_with(OpCode::StoreFast, slot);
            }
        }
    }

    fn assignment(&mut self) {
        self.advance(); // identifier
        let name = self.previous.lexeme;
        self.advance(); // =
        self.expression();
        self.consume(TokenKind::Semicolon, "';' after assignment");

        match self.function.scope.resolve(name) {
            Some(slot) => self.emit_with(OpCode::AssignLocal, slot),
            None => {
                let idx = self.string_constant(name);
                self.emit_with(OpCode::AssignGlobal, idx);
            }
        }
    }

    fn block(&mut self) {
        self.consume(TokenKind::LeftBrace, "'{' before block");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "'}' after block");
    }

    fn if_statement(&mut self) {
        self.advance(); // if
        self.expression();

        let then_jump = self.emit_jump(OpCode::PopJumpIfFalse);
        self.block();

        if self.match_token(TokenKind::Else) {
            let else_jump = self.emit_jump(OpCode::Jump);
            self.patch_jump(then_jump);
            if self.check(TokenKind::If) {
                self.if_statement();
            } else {
                self.block();
            }
            self.patch_jump(else_jump);
        } else {
            self.patch_jump(then_jump);
        }
    }

    fn while_statement(&mut self) {
        let loop_start = self.function.chunk.len();
        self.advance(); // while
        self.expression();

        let exit_jump = self.emit_jump(OpCode::PopJumpIfFalse);
        self.block();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
    }

    /// `foreach iterable |name| { body }`
    fn foreach_statement(&mut self) {
        self.advance(); // foreach
        self.expression();
        self.emit(OpCode::GetIter);

        self.consume(TokenKind::VerticalBar, "'|' before loop variable");
        let name = self.current;
        self.consume(TokenKind::Identifier, "loop variable name");
        self.consume(TokenKind::VerticalBar, "'|' after loop variable");

        // A loop variable may reuse a slot declared by an earlier loop.
        let slot = match self.function.scope.resolve(name.lexeme) {
            Some(slot) => Some(slot),
            None if name.kind == TokenKind::Identifier => self.declare_local(name),
            None => None,
        };

        let loop_start = self.function.chunk.len();
        let exit_jump = self.emit_jump(OpCode::ForIter);
        self.emit_with(OpCode::StoreFast, slot.unwrap_or(0));

        self.block();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit(OpCode::EndFor);
    }

    fn fn_declaration(&mut self) {
        self.advance(); // fn
        let name = self.current;
        self.consume(TokenKind::Identifier, "function name");
        let slot = if name.kind == TokenKind::Identifier {
            self.declare_local(name)
        } else {
            None
        };

        let outer = std::mem::replace(
            &mut self.function,
            FunctionState::new(name.lexeme, FunctionKind::Function),
        );
        self.enclosing.push(outer);

        self.consume(TokenKind::LeftParen, "'(' after function name");
        if !self.check(TokenKind::RightParen) {
            loop {
                let param = self.current;
                self.consume(TokenKind::Identifier, "parameter name");
                if param.kind == TokenKind::Identifier {
                    self.declare_local(param);
                }
                self.function.arity += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "')' after parameters");
        self.block();

        // Falling off the end returns nil
        self.emit(OpCode::Nil);
        self.emit(OpCode::Return);

        let Some(outer) = self.enclosing.pop() else {
            return;
        };
        let inner = std::mem::replace(&mut self.function, outer);
        let handle = self.finish_function(inner);

        self.emit_constant(Value::Function(handle));
        if let Some(slot) = slot {
            self.emit_with(OpCode::StoreFast, slot);
        } else {
            self.emit(OpCode::PopTop);
        }
    }

    fn return_statement(&mut self) {
        self.advance(); // return
        if self.function.kind == FunctionKind::Script {
            self.error(ErrorKind::ReturnOutsideFunction);
        }

        if self.match_token(TokenKind::Semicolon) {
            self.emit(OpCode::Nil);
        } else {
            self.expression();
            self.consume(TokenKind::Semicolon, "';' after return value");
        }
        self.emit(OpCode::Return);
    }

    fn print_statement(&mut self) {
        self.advance(); // print
        self.consume(TokenKind::LeftParen, "'(' after print");
        self.expression();
        self.consume(TokenKind::RightParen, "')' after print argument");
        self.consume(TokenKind::Semicolon, "';' after print");
        self.emit(OpCode::ShowTop);
    }

    /// Classes are reserved but not implemented: report and skip the body
    fn class_declaration(&mut self) {
        self.advance(); // class
        self.error(ErrorKind::ClassesUnsupported);
        self.match_token(TokenKind::Identifier);

        if self.match_token(TokenKind::LeftBrace) {
            let mut depth = 1;
            while depth > 0 && !self.check(TokenKind::Eof) {
                match self.current.kind {
                    TokenKind::LeftBrace => depth += 1,
                    TokenKind::RightBrace => depth -= 1,
                    _ => {}
                }
                self.advance();
            }
        }
        self.panic_mode = false;
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "';' after expression");
        self.emit(OpCode::PopTop);
    }

    // ==================== Expressions ====================

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = Self::rule(self.previous.kind).prefix else {
            let got = self.describe(self.previous);
            self.error(ErrorKind::ExpectedExpression(got));
            return;
        };
        prefix(self);

        while precedence <= Self::rule(self.current.kind).precedence {
            self.advance();
            if let Some(infix) = Self::rule(self.previous.kind).infix {
                infix(self);
            }
        }
    }

    fn rule(kind: TokenKind) -> ParseRule<'src, 'h> {
        let (prefix, infix, precedence): (Option<ParseFn<'src, 'h>>, Option<ParseFn<'src, 'h>>, _) =
            match kind {
                TokenKind::LeftParen => (Some(Self::grouping), Some(Self::call), Precedence::Call),
                TokenKind::LeftBracket => (Some(Self::array), None, Precedence::None),
                TokenKind::Dot => (None, Some(Self::attribute), Precedence::Call),
                TokenKind::Minus => (Some(Self::unary), Some(Self::binary), Precedence::Term),
                TokenKind::Plus => (None, Some(Self::binary), Precedence::Term),
                TokenKind::Slash | TokenKind::Star | TokenKind::Percent => {
                    (None, Some(Self::binary), Precedence::Factor)
                }
                TokenKind::Bang => (Some(Self::unary), None, Precedence::None),
                TokenKind::BangEqual | TokenKind::EqualEqual => {
                    (None, Some(Self::binary), Precedence::Equality)
                }
                TokenKind::Greater
                | TokenKind::GreaterEqual
                | TokenKind::Less
                | TokenKind::LessEqual => (None, Some(Self::binary), Precedence::Comparison),
                TokenKind::Identifier => (Some(Self::variable), None, Precedence::None),
                TokenKind::String => (Some(Self::string), None, Precedence::None),
                TokenKind::Number => (Some(Self::number), None, Precedence::None),
                TokenKind::True | TokenKind::False | TokenKind::Nil => {
                    (Some(Self::literal), None, Precedence::None)
                }
                _ => (None, None, Precedence::None),
            };
        ParseRule { prefix, infix, precedence }
    }

    fn number(&mut self) {
        let lexeme = self.previous.lexeme;
        match lexeme.parse::<f64>() {
            Ok(n) => self.emit_constant(Value::Number(n)),
            Err(_) => self.error(ErrorKind::InvalidNumber(lexeme.to_string())),
        }
    }

    fn string(&mut self) {
        let lexeme = self.previous.lexeme;
        let text = unescape(&lexeme[1..lexeme.len() - 1]);
        let idx = self.string_constant(&text);
        self.emit_with(OpCode::Constant, idx);
    }

    fn literal(&mut self) {
        match self.previous.kind {
            TokenKind::True => self.emit(OpCode::True),
            TokenKind::False => self.emit(OpCode::False),
            _ => self.emit(OpCode::Nil),
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "')' after expression");
    }

    fn unary(&mut self) {
        let op = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match op {
            TokenKind::Minus => self.emit(OpCode::Negate),
            _ => self.emit(OpCode::Not),
        }
    }

    fn binary(&mut self) {
        let op = self.previous.kind;
        let precedence = Self::rule(op).precedence;
        self.parse_precedence(precedence.next());

        match op {
            TokenKind::Plus => self.emit(OpCode::Add),
            TokenKind::Minus => self.emit(OpCode::Sub),
            TokenKind::Star => self.emit(OpCode::Mul),
            TokenKind::Slash => self.emit(OpCode::Div),
            TokenKind::Percent => self.emit(OpCode::Mod),
            TokenKind::EqualEqual => self.emit(OpCode::Compare),
            TokenKind::BangEqual => {
                self.emit(OpCode::Compare);
                self.emit(OpCode::Not);
            }
            TokenKind::Less => self.emit(OpCode::LessThan),
            TokenKind::Greater => self.emit(OpCode::GreaterThan),
            TokenKind::LessEqual => {
                self.emit(OpCode::GreaterThan);
                self.emit(OpCode::Not);
            }
            TokenKind::GreaterEqual => {
                self.emit(OpCode::LessThan);
                self.emit(OpCode::Not);
            }
            _ => {}
        }
    }

    fn variable(&mut self) {
        let name = self.previous.lexeme;
        match self.function.scope.resolve(name) {
            Some(slot) => self.emit_with(OpCode::LoadLocal, slot),
            None => {
                let idx = self.string_constant(name);
                self.emit_with(OpCode::LoadGlobal, idx);
            }
        }
    }

    fn array(&mut self) {
        let count = self.comma_list(TokenKind::RightBracket, "']' after array elements");
        self.emit_with(OpCode::BuildArray, count);
    }

    fn call(&mut self) {
        let count = self.comma_list(TokenKind::RightParen, "')' after arguments");
        self.emit_with(OpCode::Call, count);
    }

    /// Parse comma-separated expressions up to `close`; returns how many
    fn comma_list(&mut self, close: TokenKind, expected: &str) -> u8 {
        let mut count: usize = 0;
        if !self.check(close) {
            loop {
                self.expression();
                if count == u8::MAX as usize {
                    self.error(ErrorKind::TooManyArguments);
                }
                count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(close, expected);
        count.min(u8::MAX as usize) as u8
    }

    fn attribute(&mut self) {
        self.consume(TokenKind::Identifier, "attribute name after '.'");
        let name = self.previous.lexeme;
        let idx = self.string_constant(name);
        self.emit_with(OpCode::LoadAttr, idx);
    }
}

/// Decode the escapes of a string literal body
fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    fn compile_ok(source: &str, heap: &mut Heap) -> FunctionObj {
        let handle = compile(source, heap).expect("compile failed");
        heap.get_function(handle).cloned().expect("function missing")
    }

    fn compile_err(source: &str) -> Vec<Diagnostic> {
        let mut heap = Heap::new(1024);
        match compile(source, &mut heap) {
            Err(ShipError::Compile(diagnostics)) => diagnostics,
            other => panic!("expected compile error, got {:?}", other.map(|_| ())),
        }
    }

    fn ops(code: &[u8]) -> Vec<OpCode> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < code.len() {
            let op = OpCode::try_from(code[offset]).expect("bad opcode");
            out.push(op);
            offset += 1 + op.operand_len();
        }
        out
    }

    #[test]
    fn test_compile_arithmetic() {
        let mut heap = Heap::new(1024);
        let f = compile_ok("1 + 2 * 3;", &mut heap);
        assert_eq!(
            ops(&f.chunk.code),
            vec![
                OpCode::Constant,
                OpCode::Constant,
                OpCode::Constant,
                OpCode::Mul,
                OpCode::Add,
                OpCode::PopTop,
                OpCode::Halt,
            ]
        );
        assert_eq!(f.chunk.code.len(), f.chunk.lines.len());
    }

    #[test]
    fn test_var_declaration_uses_slots() {
        let mut heap = Heap::new(1024);
        let f = compile_ok("var x = 5; var y = x; y = 2;", &mut heap);
        assert_eq!(f.locals, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(
            f.chunk.code,
            vec![
                OpCode::Constant as u8, 0,
                OpCode::StoreFast as u8, 0,
                OpCode::LoadLocal as u8, 0,
                OpCode::StoreFast as u8, 1,
                OpCode::Constant as u8, 1,
                OpCode::AssignLocal as u8, 1,
                OpCode::Halt as u8,
            ]
        );
    }

    #[test]
    fn test_unknown_names_become_globals() {
        let mut heap = Heap::new(1024);
        let f = compile_ok("print(y); y = 1;", &mut heap);
        assert_eq!(
            ops(&f.chunk.code),
            vec![
                OpCode::LoadGlobal,
                OpCode::ShowTop,
                OpCode::Constant,
                OpCode::AssignGlobal,
                OpCode::Halt,
            ]
        );
        // The name constant is shared by both references
        assert_eq!(f.chunk.code[1], f.chunk.code[6]);
    }

    #[test]
    fn test_if_else_jump_offsets() {
        let mut heap = Heap::new(1024);
        let f = compile_ok("if true { print(1); } else { print(2); }", &mut heap);
        let code = &f.chunk.code;
        // true, PopJumpIfFalse hi lo
        assert_eq!(code[1], OpCode::PopJumpIfFalse as u8);
        let then_skip = f.chunk.read_u16(2) as usize;
        // Lands on the first instruction of the else branch
        assert_eq!(code[4 + then_skip - 3], OpCode::Jump as u8);
        let else_skip = f.chunk.read_u16(4 + then_skip - 2) as usize;
        assert_eq!(code[4 + then_skip + else_skip], OpCode::Halt as u8);
    }

    #[test]
    fn test_while_jumps_backward_to_condition() {
        let mut heap = Heap::new(1024);
        let f = compile_ok("var i = 0; while i < 3 { i = i + 1; }", &mut heap);
        let code = &f.chunk.code;
        let back = code.iter().position(|&b| b == OpCode::JumpBackward as u8).unwrap();
        let offset = f.chunk.read_u16(back + 1) as usize;
        // Condition starts right after the declaration (4 bytes)
        assert_eq!(back + 3 - offset, 4);
    }

    #[test]
    fn test_foreach_lowering() {
        let mut heap = Heap::new(1024);
        let f = compile_ok("foreach [1, 2] |v| { print(v); }", &mut heap);
        assert_eq!(
            ops(&f.chunk.code),
            vec![
                OpCode::Constant,
                OpCode::Constant,
                OpCode::BuildArray,
                OpCode::GetIter,
                OpCode::ForIter,
                OpCode::StoreFast,
                OpCode::LoadLocal,
                OpCode::ShowTop,
                OpCode::JumpBackward,
                OpCode::EndFor,
                OpCode::Halt,
            ]
        );
    }

    #[test]
    fn test_function_declaration() {
        let mut heap = Heap::new(1024);
        let script = compile_ok("fn add(a, b) { return a + b; }", &mut heap);
        assert_eq!(script.locals, vec!["add".to_string()]);

        let Value::Function(handle) = script.chunk.constants[0] else {
            panic!("expected function constant");
        };
        let add = heap.get_function(handle).unwrap();
        assert_eq!(add.name, "add");
        assert_eq!(add.arity, 2);
        assert_eq!(add.kind, FunctionKind::Function);
        assert_eq!(add.locals, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            ops(&add.chunk.code),
            vec![
                OpCode::LoadLocal,
                OpCode::LoadLocal,
                OpCode::Add,
                OpCode::Return,
                OpCode::Nil,
                OpCode::Return,
            ]
        );
    }

    #[test]
    fn test_redeclaration_is_name_error() {
        let diagnostics = compile_err("var x = 1;\nvar x = 2;");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, ErrorKind::Redeclared("x".into()));
        assert_eq!(diagnostics[0].kind.class(), ErrorClass::Name);
        assert_eq!(diagnostics[0].span.line, 2);
    }

    #[test]
    fn test_shadowing_in_nested_function_is_allowed() {
        let mut heap = Heap::new(1024);
        compile_ok("var x = 1; fn f(x) { var y = x; return y; }", &mut heap);
    }

    #[test]
    fn test_return_outside_function() {
        let diagnostics = compile_err("return 1;");
        assert_eq!(diagnostics[0].kind, ErrorKind::ReturnOutsideFunction);
    }

    #[test]
    fn test_recovery_reports_multiple_errors() {
        let diagnostics = compile_err("var = 1;\nprint(1 +);\nvar ok = 2;\nvar ok = 3;");
        assert_eq!(diagnostics.len(), 3);
        assert_eq!(diagnostics[0].span.line, 1);
        assert_eq!(diagnostics[1].span.line, 2);
        assert_eq!(diagnostics[2].kind, ErrorKind::Redeclared("ok".into()));
    }

    #[test]
    fn test_unterminated_string_reported() {
        let diagnostics = compile_err("print(\"abc);");
        assert_eq!(diagnostics[0].kind, ErrorKind::UnterminatedString);
        assert_eq!(diagnostics[0].span.column, 7);
    }

    #[test]
    fn test_class_is_a_stub() {
        let diagnostics = compile_err("class Point { fn x() { return 1; } }\nprint(1);");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, ErrorKind::ClassesUnsupported);
    }

    #[test]
    fn test_too_many_constants() {
        let source: String = (0..300).map(|i| format!("{};", i)).collect();
        let diagnostics = compile_err(&source);
        assert_eq!(diagnostics[0].kind, ErrorKind::TooManyConstants);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r#"a\nb\t\"c\"\\"#), "a\nb\t\"c\"\\");
    }
}
