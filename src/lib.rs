//! minilisp - Minimal Lisp-family expression reader and evaluator
//!
//! This crate turns one line of s-expression text into a tree of [`ast::Value`]s
//! and evaluates that tree against a chain of lexical environments. It is meant
//! to be embedded behind a line-oriented shell, which owns the prompt, the I/O
//! loop and error printing.
//!
//! ```
//! use minilisp::{eval, read};
//! use minilisp::evaluator::create_global_env;
//!
//! let mut env = create_global_env();
//! let expr = read("(list 3 4 5)").unwrap();
//! assert_eq!(eval(&expr, &mut env).unwrap().to_string(), "(3 4 5)");
//! ```
//!
//! ## Strict Typing
//!
//! - No numeric coercion: `(+ 1 1.5)` is a type error
//! - `if` requires an actual boolean test value (no "truthiness")
//! - Integer arithmetic overflow and division by zero are reported, never wrapped
//! - Strict arity checking for primitives and special forms
//!
//! ## Modules
//!
//! - `reader`: tokenizer and recursive-descent parser
//! - `ast`: the runtime value model and its canonical printed form
//! - `evaluator`: environments, special forms and procedure application
//! - `builtinops`: the fixed primitive library

use std::fmt;

/// Depth used by [`reader::ParseConfig::bounded`] when an embedder wants a hard
/// limit on nested parentheses instead of relying on the host stack.
pub const DEFAULT_MAX_PARSE_DEPTH: usize = 256;

/// Depth used by [`evaluator::EvalConfig::bounded`].
/// Set higher than the parse depth since every nested form costs a frame for
/// the form itself and one for its operands.
pub const DEFAULT_MAX_EVAL_DEPTH: usize = 512;

/// Categorizes the different kinds of syntax errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// No tokens at all
    EmptyExpression,
    /// `)` where an expression was expected
    UnexpectedCloseParen,
    /// Input ended before a `(` was closed
    Incomplete,
    /// Extra tokens after a complete expression
    TrailingContent,
    /// Nesting exceeded the configured parse depth
    TooDeeplyNested,
}

/// A structured error describing why a line could not be read.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// The tokens surrounding the failure, re-joined with spaces
    pub context: Option<String>,
    /// The offending token, if there is one
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

    /// Create a ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError whose context is a window of tokens around `position`.
    pub(crate) fn with_token_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        tokens: &[&str],
        position: usize,
    ) -> Self {
        const WINDOW: usize = 5;

        let start = position.saturating_sub(WINDOW);
        let end = (position + WINDOW).min(tokens.len());
        let mut context = String::new();
        if start > 0 {
            context.push_str("[...] ");
        }
        context.push_str(&tokens[start..end].join(" "));
        if end < tokens.len() {
            context.push_str(" [...]");
        }

        let found = tokens.get(position).map(|t| (*t).to_owned());
        Self::new(kind, message, Some(context), found)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SyntaxError: {}", self.message)?;
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

/// Runtime errors raised while evaluating an expression.
///
/// Every variant aborts the current top-level evaluation. Bindings made by a
/// `define` that completed before the failure stay in place.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// General evaluation failure (division by zero, overflow, depth limit,
    /// a value shape the evaluator cannot handle)
    EvalError(String),
    /// A value of the wrong variant reached a primitive or special form
    TypeError(String),
    UnboundVariable(String),
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>, // Optional expression context
    },
    /// A special form or application with the wrong shape
    MalformedForm(String),
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
            Error::TypeError(msg) => write!(f, "Type error: {msg}"),
            Error::UnboundVariable(var) => write!(f, "Unbound variable: {var}"),
            Error::ArityError {
                expected,
                got,
                expression,
            } => match expression {
                Some(expr) => write!(
                    f,
                    "ArityError: {expr}: expected {expected} arguments, got {got}"
                ),
                None => write!(
                    f,
                    "ArityError: function expected {expected} arguments but got {got}"
                ),
            },
            Error::MalformedForm(msg) => write!(f, "Malformed form: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod reader;

pub use evaluator::eval;
pub use reader::read;
