//! Unified error type for every failure stage: lexing, parsing, preprocessing
//! (reference resolution), and evaluation (type errors and invariant
//! violations).

use std::fmt;

/// A 1-indexed source location, used for every error that originates before
/// evaluation begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Every way a reflex program can fail to run.
///
/// Kept as one flat enum (rather than one type per pipeline stage) because
/// callers generally just want to print the error and exit; the variants
/// still separate by stage the way spec.md §7 requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReflexError {
    /// Unexpected byte or unterminated string literal.
    Lex { message: String, position: Position },
    /// Unexpected token, duplicate key in one block, eager def outside a
    /// call, or `^` used outside a postfix chain.
    Parse { message: String, position: Position },
    /// Ancestor lookup failed, `^` depth exceeded the ancestor stack, or an
    /// attribute access found no such attribute.
    Reference { message: String, position: Option<Position> },
    /// A built-in received a non-primitive where a primitive was required.
    Type { attr: String, message: String },
    /// A surface-only node survived preprocessing, or a block was inspected
    /// with a non-empty pending-clone table. Implementations should treat
    /// these as assertions: they indicate a bug in the evaluator itself.
    Invariant { attr: String, message: String },
    /// An optional, implementation-defined step budget was exceeded.
    ResourceExceeded { message: String },
}

impl fmt::Display for ReflexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex { message, position } => write!(f, "lex error at {position}: {message}"),
            Self::Parse { message, position } => write!(f, "parse error at {position}: {message}"),
            Self::Reference { message, position } => match position {
                Some(position) => write!(f, "reference error at {position}: {message}"),
                None => write!(f, "reference error: {message}"),
            },
            Self::Type { attr, message } => write!(f, "type error in `{attr}`: {message}"),
            Self::Invariant { attr, message } => {
                write!(f, "invariant violation at `{attr}`: {message}")
            }
            Self::ResourceExceeded { message } => write!(f, "resource limit exceeded: {message}"),
        }
    }
}

impl std::error::Error for ReflexError {}

pub type ReflexResult<T> = Result<T, ReflexError>;
