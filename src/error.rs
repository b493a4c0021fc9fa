//! Error types
//!
//! Errors thrown by runtime operations mirror the ECMAScript native error
//! kinds. Allocator exhaustion is reported as a value instead of aborting,
//! and every constructor allocates before it publishes anything, so a failed
//! allocation never leaves a half-built cell reachable.

use thiserror::Error;

use crate::gc::AllocError;

/// The ECMAScript error kind of a [`RuntimeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Type,
    Range,
    Reference,
    Syntax,
    Uri,
    OutOfMemory,
    Config,
}

impl ErrorKind {
    /// Constructor name used when the error is shown to script code
    pub const fn name(self) -> &'static str {
        match self {
            ErrorKind::Type => "TypeError",
            ErrorKind::Range => "RangeError",
            ErrorKind::Reference => "ReferenceError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Uri => "URIError",
            ErrorKind::OutOfMemory => "InternalError",
            ErrorKind::Config => "InternalError",
        }
    }
}

/// A failure raised by a runtime operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("TypeError: {0}")]
    Type(String),

    #[error("RangeError: {0}")]
    Range(String),

    #[error("ReferenceError: {0}")]
    Reference(String),

    #[error("SyntaxError: {0}")]
    Syntax(String),

    #[error("URIError: {0}")]
    Uri(String),

    #[error("out of memory: {0}")]
    OutOfMemory(#[from] AllocError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RuntimeError {
    pub fn type_error(msg: impl Into<String>) -> Self {
        RuntimeError::Type(msg.into())
    }

    pub fn range_error(msg: impl Into<String>) -> Self {
        RuntimeError::Range(msg.into())
    }

    pub fn reference_error(msg: impl Into<String>) -> Self {
        RuntimeError::Reference(msg.into())
    }

    pub fn syntax_error(msg: impl Into<String>) -> Self {
        RuntimeError::Syntax(msg.into())
    }

    pub fn uri_error(msg: impl Into<String>) -> Self {
        RuntimeError::Uri(msg.into())
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::Type(_) => ErrorKind::Type,
            RuntimeError::Range(_) => ErrorKind::Range,
            RuntimeError::Reference(_) => ErrorKind::Reference,
            RuntimeError::Syntax(_) => ErrorKind::Syntax,
            RuntimeError::Uri(_) => ErrorKind::Uri,
            RuntimeError::OutOfMemory(_) => ErrorKind::OutOfMemory,
            RuntimeError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Result alias used by every fallible runtime operation
pub type JsResult<T> = Result<T, RuntimeError>;

/// Bytes still allocated after a teardown leak check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{leaked_bytes} bytes in {leaked_cells} cells still allocated at teardown")]
pub struct LeakError {
    pub leaked_bytes: usize,
    pub leaked_cells: usize,
}
