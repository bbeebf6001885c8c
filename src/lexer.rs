//! Lexer for Ship
//!
//! Produces one token per call from the cursor state. The stream is finite and
//! forward-only: once `Eof` is returned every further call returns `Eof` again.

use crate::token::{keyword_kind, LexError, Span, Token, TokenKind};

/// The lexer state
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    source: &'a str,
    start: usize,
    current: usize,
    line: usize,
    column: usize,
    start_column: usize,
    start_line: usize,
    finished: bool,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer from source code
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            start: 0,
            current: 0,
            line: 1,
            column: 1,
            start_column: 1,
            start_line: 1,
            finished: false,
        }
    }

    /// Scan the next token
    pub fn next_token(&mut self) -> Token<'a> {
        self.skip_whitespace_and_comments();

        self.start = self.current;
        self.start_line = self.line;
        self.start_column = self.column;

        let Some(c) = self.advance() else {
            return self.make_token(TokenKind::Eof);
        };

        let kind = match c {
            b'(' => TokenKind::LeftParen,
            b')' => TokenKind::RightParen,
            b'{' => TokenKind::LeftBrace,
            b'}' => TokenKind::RightBrace,
            b'[' => TokenKind::LeftBracket,
            b']' => TokenKind::RightBracket,
            b'|' => TokenKind::VerticalBar,
            b',' => TokenKind::Comma,
            b'.' => TokenKind::Dot,
            b';' => TokenKind::Semicolon,
            b'-' => TokenKind::Minus,
            b'+' => TokenKind::Plus,
            b'/' => TokenKind::Slash,
            b'*' => TokenKind::Star,
            b'%' => TokenKind::Percent,
            b'!' => self.either(b'=', TokenKind::BangEqual, TokenKind::Bang),
            b'=' => self.either(b'=', TokenKind::EqualEqual, TokenKind::Equal),
            b'<' => self.either(b'=', TokenKind::LessEqual, TokenKind::Less),
            b'>' => self.either(b'=', TokenKind::GreaterEqual, TokenKind::Greater),
            b'"' => self.scan_string(),
            c if c.is_ascii_digit() => self.scan_number(),
            c if is_alpha(c) => self.scan_identifier(),
            _ => {
                // Swallow the rest of a multi-byte character so the error span
                // stays on a char boundary.
                while !self.is_at_end() && !self.source.is_char_boundary(self.current) {
                    self.current += 1;
                }
                TokenKind::Error(LexError::UnexpectedCharacter)
            }
        };

        self.make_token(kind)
    }

    fn make_token(&mut self, kind: TokenKind) -> Token<'a> {
        if kind == TokenKind::Eof {
            self.finished = true;
        }
        Token::new(
            kind,
            &self.source[self.start..self.current],
            Span::new(self.start, self.current, self.start_line, self.start_column),
        )
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.current).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.source.as_bytes().get(self.current + 1).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.current += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn either(&mut self, expected: u8, matched: TokenKind, otherwise: TokenKind) -> TokenKind {
        if self.peek() == Some(expected) {
            self.advance();
            matched
        } else {
            otherwise
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.advance();
                }
                b'/' if self.peek_next() == Some(b'/') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Scan a string literal; escapes are kept verbatim and decoded by the compiler
    fn scan_string(&mut self) -> TokenKind {
        loop {
            match self.peek() {
                None => return TokenKind::Error(LexError::UnterminatedString),
                Some(b'"') => {
                    self.advance();
                    return TokenKind::String;
                }
                Some(b'\\') => {
                    self.advance();
                    self.advance();
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    /// Scan a number literal with at most one decimal point
    fn scan_number(&mut self) -> TokenKind {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        if self.peek() == Some(b'.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        TokenKind::Number
    }

    fn scan_identifier(&mut self) -> TokenKind {
        while self.peek().is_some_and(|c| is_alpha(c) || c.is_ascii_digit()) {
            self.advance();
        }
        keyword_kind(&self.source[self.start..self.current])
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    /// Yields every token up to and including `Eof`, then stops
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        Some(self.next_token())
    }
}

fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}
