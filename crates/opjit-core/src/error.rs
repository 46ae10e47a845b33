//! Error types for opjit

use thiserror::Error;

/// Main error type for opjit operations
#[derive(Debug, Error)]
pub enum OpjitError {
    /// Invalid thread mode, malformed option tokens, bad configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Frontend planning failed, code generation failed or no module was produced
    #[error("Compile error: {0}")]
    Compile(String),

    /// Module ingestion, native materialization or library loading failed
    #[error("Link error: {0}")]
    Link(String),

    /// An entry point or factory symbol could not be resolved
    #[error("Symbol error: {0}")]
    Symbol(String),

    /// Compiled code returned a failure of its own
    #[error("Runtime error: compiled code returned status {0}")]
    Runtime(i32),

    /// Invalid operation for the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl OpjitError {
    /// Returns the coarse category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OpjitError::Config(_) => ErrorKind::Config,
            OpjitError::Compile(_) => ErrorKind::Compile,
            OpjitError::Link(_) => ErrorKind::Link,
            OpjitError::Symbol(_) => ErrorKind::Symbol,
            OpjitError::Runtime(_) => ErrorKind::Runtime,
            OpjitError::InvalidState(_) => ErrorKind::InvalidState,
        }
    }

    /// Builds the error reported when `name` is not defined by any ingested module.
    pub fn symbol_not_found(name: &str) -> Self {
        OpjitError::Symbol(format!("symbol not found: \"{name}\""))
    }
}

/// Error category, handy for assertions and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Compile,
    Link,
    Symbol,
    Runtime,
    InvalidState,
}

/// Result type alias for opjit operations
pub type Result<T> = std::result::Result<T, OpjitError>;
