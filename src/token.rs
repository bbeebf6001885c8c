//! Token definitions for Ship
//!
//! Tokens borrow their lexeme from the source text; the compiler reads
//! numbers, strings and identifiers straight out of it.

use std::fmt;

/// Location in source code for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self { start, end, line, column }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Why the lexer produced an error token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexError {
    UnexpectedCharacter,
    UnterminatedString,
}

/// Token types in Ship
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Delimiters
    LeftParen,    // (
    RightParen,   // )
    LeftBrace,    // {
    RightBrace,   // }
    LeftBracket,  // [
    RightBracket, // ]
    VerticalBar,  // |
    Comma,        // ,
    Dot,          // .
    Semicolon,    // ;

    // Operators
    Minus,
    Plus,
    Slash,
    Star,
    Percent,
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier,
    String,
    Number,

    // Keywords
    Var,
    Fn,
    If,
    Else,
    While,
    Foreach,
    Return,
    Print,
    True,
    False,
    Nil,
    Class,

    Error(LexError),
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::VerticalBar => "|",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::Semicolon => ";",
            TokenKind::Minus => "-",
            TokenKind::Plus => "+",
            TokenKind::Slash => "/",
            TokenKind::Star => "*",
            TokenKind::Percent => "%",
            TokenKind::Bang => "!",
            TokenKind::BangEqual => "!=",
            TokenKind::Equal => "=",
            TokenKind::EqualEqual => "==",
            TokenKind::Greater => ">",
            TokenKind::GreaterEqual => ">=",
            TokenKind::Less => "<",
            TokenKind::LessEqual => "<=",
            TokenKind::Identifier => "identifier",
            TokenKind::String => "string",
            TokenKind::Number => "number",
            TokenKind::Var => "var",
            TokenKind::Fn => "fn",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::Foreach => "foreach",
            TokenKind::Return => "return",
            TokenKind::Print => "print",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Nil => "nil",
            TokenKind::Class => "class",
            TokenKind::Error(_) => "error",
            TokenKind::Eof => "EOF",
        };
        write!(f, "{}", text)
    }
}

/// A token with its kind, source text and location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Span,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, lexeme: &'a str, span: Span) -> Self {
        Self { kind, lexeme, span }
    }

    /// Placeholder used before the first token is read
    pub fn empty() -> Self {
        Self::new(TokenKind::Eof, "", Span::default())
    }
}

/// Classify an identifier as a keyword, dispatching on its first character
pub fn keyword_kind(ident: &str) -> TokenKind {
    let bytes = ident.as_bytes();
    let check = |rest: &str, kind: TokenKind| {
        if &ident[1..] == rest {
            kind
        } else {
            TokenKind::Identifier
        }
    };

    match bytes.first() {
        Some(b'c') => check("lass", TokenKind::Class),
        Some(b'e') => check("lse", TokenKind::Else),
        Some(b'f') => match bytes.get(1) {
            Some(b'a') => check("alse", TokenKind::False),
            Some(b'n') => check("n", TokenKind::Fn),
            Some(b'o') => check("oreach", TokenKind::Foreach),
            _ => TokenKind::Identifier,
        },
        Some(b'i') => check("f", TokenKind::If),
        Some(b'n') => check("il", TokenKind::Nil),
        Some(b'p') => check("rint", TokenKind::Print),
        Some(b'r') => check("eturn", TokenKind::Return),
        Some(b't') => check("rue", TokenKind::True),
        Some(b'v') => check("ar", TokenKind::Var),
        Some(b'w') => check("hile", TokenKind::While),
        _ => TokenKind::Identifier,
    }
}
