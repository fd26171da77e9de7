//! Errors crossing the executor boundary.

use thiserror::Error;

use crate::breakpoint::BreakpointValue;

/// Errors produced by an executor or one of its instances.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ExecutorError {
    /// The bytecode could not be compiled or instantiated.
    #[error("compilation failed: {0}")]
    CompilationFailed(String),

    /// The module imports a symbol outside the known API set.
    #[error("unknown import: {0}")]
    UnknownImport(String),

    /// The requested export does not exist.
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    /// The export exists but cannot be called as an endpoint.
    #[error("invalid function")]
    InvalidFunction,

    /// A memory access fell outside the instance's linear memory.
    #[error("bad bounds")]
    BadBounds,

    /// Execution was stopped by the breakpoint register.
    #[error("execution stopped: breakpoint {0:?}")]
    Breakpoint(BreakpointValue),

    /// The guest trapped (unreachable, stack exhaustion, …).
    #[error("execution trapped: {0}")]
    Trap(String),
}

impl ExecutorError {
    /// The breakpoint that stopped execution, if that is what happened.
    pub fn breakpoint(&self) -> Option<BreakpointValue> {
        match self {
            ExecutorError::Breakpoint(value) => Some(*value),
            _ => None,
        }
    }
}
