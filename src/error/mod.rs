//! Error types.
//!
//! Every fallible operation of the object layer returns [`Result`]. The
//! variants follow the failure classes of the layer: caller mistakes that
//! are detected before any mutation (`NullReference`, `InvalidOperation`,
//! `InvalidIterator`, `WrongKind`), stale references (`DanglingHandle`),
//! broken internal invariants (`InternalConsistency`), and errors surfaced
//! unchanged from the parsing, encoding and query boundaries.

use std::fmt;

use crate::encoding::EncodingError;
use crate::engine::EngineError;
use crate::node::NodeKind;
use crate::xpath::XPathError;

/// The error type of the object layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An empty handle was dereferenced.
    #[error("null reference: the handle does not refer to any node")]
    NullReference,
    /// The handle's node (or its document) has been destroyed.
    #[error("dangling handle: the referenced node no longer exists")]
    DanglingHandle,
    /// A checked downcast found a different node kind.
    #[error("wrong node kind: expected {expected}, found {found}")]
    WrongKind {
        /// The kind the handle type requires.
        expected: &'static str,
        /// The kind of the referenced node.
        found: NodeKind,
    },
    /// A structural precondition was violated. Nothing was modified.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// An iterator was moved past either end of its sequence.
    #[error("invalid iterator operation: {0}")]
    InvalidIterator(&'static str),
    /// A layer invariant was broken. Not recoverable.
    #[error("internal consistency error: {0}")]
    InternalConsistency(String),
    /// The input was not well-formed XML.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The query engine rejected or failed to evaluate an expression.
    #[error(transparent)]
    XPath(#[from] XPathError),
    /// The input bytes could not be decoded.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        Self::InternalConsistency(err.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Source location within an XML document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number (in characters, not bytes).
    pub column: u32,
    /// 0-based byte offset from the start of the input.
    pub byte_offset: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The error returned when the input is not well-formed XML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// The primary error message.
    pub message: String,
    /// Where in the source the error occurred.
    pub location: SourceLocation,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at {}: {}", self.location, self.message)
    }
}

impl std::error::Error for ParseError {}
