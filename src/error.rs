//! Error types for Ship
//!
//! Compile errors are collected as diagnostics with source spans; runtime
//! errors carry the line of the faulting instruction.

use crate::token::Span;
use std::fmt;

/// The coarse classification every error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Syntax,
    Name,
    Type,
    /// Resource exhaustion (operand or call-frame stack overflow)
    Fatal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Syntax => write!(f, "SyntaxError"),
            ErrorClass::Name => write!(f, "NameError"),
            ErrorClass::Type => write!(f, "TypeError"),
            ErrorClass::Fatal => write!(f, "FatalError"),
        }
    }
}

/// Error kinds in Ship
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    // Lexer errors
    UnexpectedCharacter(String),
    UnterminatedString,

    // Compiler errors
    ExpectedToken(String, String),
    ExpectedExpression(String),
    InvalidNumber(String),
    Redeclared(String),
    ReturnOutsideFunction,
    ClassesUnsupported,
    TooManyConstants,
    TooManyLocals,
    TooManyArguments,
    JumpTooLarge,

    // Runtime errors
    UndefinedVariable(String),
    UnsupportedOperands(&'static str, &'static str, &'static str),
    TypeMismatch(String, &'static str),
    DivisionByZero,
    NotCallable(&'static str),
    StackOverflow,
    FrameOverflow,

    /// An error produced by a builtin, already classified
    Raised(ErrorClass, String),
}

impl ErrorKind {
    pub fn class(&self) -> ErrorClass {
        match self {
            ErrorKind::UnexpectedCharacter(_)
            | ErrorKind::UnterminatedString
            | ErrorKind::ExpectedToken(..)
            | ErrorKind::ExpectedExpression(_)
            | ErrorKind::InvalidNumber(_)
            | ErrorKind::ReturnOutsideFunction
            | ErrorKind::ClassesUnsupported
            | ErrorKind::TooManyConstants
            | ErrorKind::TooManyLocals
            | ErrorKind::TooManyArguments
            | ErrorKind::JumpTooLarge => ErrorClass::Syntax,
            ErrorKind::Redeclared(_) | ErrorKind::UndefinedVariable(_) => ErrorClass::Name,
            ErrorKind::UnsupportedOperands(..)
            | ErrorKind::TypeMismatch(..)
            | ErrorKind::DivisionByZero
            | ErrorKind::NotCallable(_) => ErrorClass::Type,
            ErrorKind::StackOverflow | ErrorKind::FrameOverflow => ErrorClass::Fatal,
            ErrorKind::Raised(class, _) => *class,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::UnexpectedCharacter(c) => write!(f, "unexpected character '{}'", c),
            ErrorKind::UnterminatedString => write!(f, "EOL while scanning string literal"),
            ErrorKind::ExpectedToken(expected, got) => {
                write!(f, "expected {}, got '{}'", expected, got)
            }
            ErrorKind::ExpectedExpression(got) => write!(f, "expected expression, got '{}'", got),
            ErrorKind::InvalidNumber(s) => write!(f, "invalid number '{}'", s),
            ErrorKind::Redeclared(name) => {
                write!(f, "variable '{}' is already declared in this scope", name)
            }
            ErrorKind::ReturnOutsideFunction => write!(f, "'return' outside of function"),
            ErrorKind::ClassesUnsupported => write!(f, "classes are not supported"),
            ErrorKind::TooManyConstants => write!(f, "too many constants in one function"),
            ErrorKind::TooManyLocals => write!(f, "too many local variables in one function"),
            ErrorKind::TooManyArguments => write!(f, "can't have more than 255 arguments or elements"),
            ErrorKind::JumpTooLarge => write!(f, "max jump length exceeded"),
            ErrorKind::UndefinedVariable(name) => write!(f, "name '{}' is not defined", name),
            ErrorKind::UnsupportedOperands(op, left, right) => {
                write!(f, "unsupported operand types for {}: '{}' and '{}'", op, left, right)?;
                if *op == "+" && (*left == "string" || *right == "string") {
                    write!(f, " (use str() to convert)")?;
                }
                Ok(())
            }
            ErrorKind::TypeMismatch(expected, got) => {
                write!(f, "expected {}, got '{}'", expected, got)
            }
            ErrorKind::DivisionByZero => write!(f, "division by zero"),
            ErrorKind::NotCallable(type_name) => write!(f, "'{}' object is not callable", type_name),
            ErrorKind::StackOverflow => write!(f, "operand stack overflow"),
            ErrorKind::FrameOverflow => write!(f, "maximum call depth exceeded"),
            ErrorKind::Raised(_, message) => write!(f, "{}", message),
        }
    }
}

/// A compile error with location information
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub span: Span,
    pub source_line: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, span: Span) -> Self {
        Self {
            kind,
            span,
            source_line: None,
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        if self.span.line > 0 {
            self.source_line = source.lines().nth(self.span.line - 1).map(str::to_string);
        }
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[line {}:{}] {}: {}",
            self.span.line,
            self.span.column,
            self.kind.class(),
            self.kind
        )?;

        if let Some(ref line) = self.source_line {
            let width = self.span.len().max(1);
            write!(f, "\n  | {}", line)?;
            write!(
                f,
                "\n  | {}{}",
                " ".repeat(self.span.column.saturating_sub(1)),
                "^".repeat(width)
            )?;
        }
        Ok(())
    }
}

/// A runtime error raised by the VM
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub line: usize,
    pub file: String,
}

impl RuntimeError {
    pub fn class(&self) -> ErrorClass {
        self.kind.class()
    }

    /// The message stored in the error object, prefixed with its class
    pub fn message(&self) -> String {
        format!("{}: {}", self.kind.class(), self.kind)
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n  [{}:{}]", self.message(), self.file, self.line)
    }
}

/// Any error surfaced by compiling or running a program
#[derive(Debug, Clone, PartialEq)]
pub enum ShipError {
    Compile(Vec<Diagnostic>),
    Runtime(RuntimeError),
}

impl ShipError {
    /// Attach source lines to compile diagnostics
    pub fn with_source(self, source: &str) -> Self {
        match self {
            ShipError::Compile(diagnostics) => ShipError::Compile(
                diagnostics.into_iter().map(|d| d.with_source(source)).collect(),
            ),
            other => other,
        }
    }

    /// Classes of every error carried, in report order
    pub fn classes(&self) -> Vec<ErrorClass> {
        match self {
            ShipError::Compile(diagnostics) => diagnostics.iter().map(|d| d.kind.class()).collect(),
            ShipError::Runtime(err) => vec![err.class()],
        }
    }
}

impl fmt::Display for ShipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShipError::Compile(diagnostics) => {
                for (i, diagnostic) in diagnostics.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", diagnostic)?;
                }
                Ok(())
            }
            ShipError::Runtime(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ShipError {}

/// Result type for Ship operations
pub type Result<T> = std::result::Result<T, ShipError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_caret_span() {
        let source = "var x = 1;\nvar x = 2;";
        let diag = Diagnostic::new(ErrorKind::Redeclared("x".into()), Span::new(15, 16, 2, 5))
            .with_source(source);
        let text = diag.to_string();
        assert!(text.starts_with("[line 2:5] NameError:"));
        assert!(text.contains("\n  | var x = 2;"));
        assert!(text.ends_with("\n  |     ^"));
    }

    #[test]
    fn test_runtime_error_format() {
        let err = RuntimeError {
            kind: ErrorKind::DivisionByZero,
            line: 3,
            file: "main.ship".into(),
        };
        assert_eq!(err.to_string(), "TypeError: division by zero\n  [main.ship:3]");
    }

    #[test]
    fn test_mixed_add_hint() {
        let kind = ErrorKind::UnsupportedOperands("+", "number", "string");
        assert!(kind.to_string().contains("str()"));
        assert_eq!(kind.class(), ErrorClass::Type);
    }
}
