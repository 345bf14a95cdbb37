//! minischeme - evaluation core of a small Scheme
//!
//! This crate takes a parsed symbolic-expression tree, evaluates it against a chain of
//! lexical environments and dispatches to a table of builtin procedures. It implements
//! the parts of an interpreter where the engineering is: the object model, the
//! environment model, the builtin table and the evaluator/apply loop.
//!
//! ```scheme
//! (+ 1 2 3)                         ; 6
//! (eqv? "abc" "abc")                ; #t
//! (define (loop n) (if (= n 0) 'done (loop (- n 1))))
//! (loop 100000)                     ; done, in constant stack space
//! ```
//!
//! ## Errors Are Values
//!
//! Evaluation never panics and never returns a host-level error. Unbound variables,
//! arity mismatches, type violations and attempts to apply non-procedures all produce
//! a [`ast::Value::Error`] object, which is returned like any other result:
//!
//! ```
//! use minischeme::ast::Value;
//! use minischeme::evaluator::{create_global_env, eval};
//! use minischeme::scheme::parse_scheme;
//!
//! let mut env = create_global_env();
//! let expr = parse_scheme("(eq? 5)").unwrap();
//! let result = eval(&expr, &mut env);
//! assert!(result.is_error());
//! ```
//!
//! ## Modules
//!
//! - `ast`: the tagged object model, equality relations and printer
//! - `evaluator`: environments and the tail-calling evaluation engine
//! - `builtinops`: the registry of native procedures and special forms
//! - `scheme`: S-expression reader (feature `scheme`)

use std::fmt;

use crate::builtinops::Arity;

/// Maximum parsing depth to prevent stack overflow attacks
/// This limits deeply nested structures handed to the reader
pub const MAX_PARSE_DEPTH: usize = 64;

/// Default bound on nested (non-tail) evaluation.
/// Tail calls run in a loop and never count against this limit.
pub const MAX_EVAL_DEPTH: usize = 100;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed expressions)
    InvalidSyntax,
    /// Input ended before the expression was complete (EOF, unterminated string, unclosed parens)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid expression
    TrailingContent,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    /// Create a ParseError with all fields
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with context extracted from input at a given offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let context_start = error_offset.saturating_sub(20);
        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        // Keep the snippet on one line
        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        let found = input.chars().nth(error_offset).map(String::from);

        Self::new(kind, message, Some(display_context), found)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ParseError: {}", self.message)?;
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// The error taxonomy shared by the reader, the evaluator and every builtin.
///
/// Inside the crate these travel in `Result`s so helpers can use `?`. At the
/// evaluation boundary each one is wrapped into a first-class
/// [`ast::Value::Error`] object.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    ParseError(ParseError),
    #[error("EvaluationError: {0}")]
    EvalError(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("Unbound variable: {0}")]
    UnboundVariable(String),
    #[error(
        "ArityError: {}expected {expected} arguments, got {got}",
        .name.as_ref().map(|n| format!("{n}: ")).unwrap_or_default()
    )]
    ArityError {
        expected: Arity,
        got: usize,
        name: Option<String>,
    },
    #[error("Not applicable: {0}")]
    NotApplicable(String),
}

/// Fieldless view of [`Error`], for callers that only care about the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Eval,
    Type,
    UnboundVariable,
    Arity,
    NotApplicable,
}

impl Error {
    /// Create an ArityError without a procedure name
    pub fn arity_error(expected: Arity, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            name: None,
        }
    }

    /// Create an ArityError naming the procedure or form that rejected the call
    pub fn arity_error_for(name: impl Into<String>, expected: Arity, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            name: Some(name.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ParseError(_) => ErrorKind::Parse,
            Error::EvalError(_) => ErrorKind::Eval,
            Error::TypeError(_) => ErrorKind::Type,
            Error::UnboundVariable(_) => ErrorKind::UnboundVariable,
            Error::ArityError { .. } => ErrorKind::Arity,
            Error::NotApplicable(_) => ErrorKind::NotApplicable,
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::ParseError(err)
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;

#[cfg(feature = "scheme")]
pub mod scheme;
