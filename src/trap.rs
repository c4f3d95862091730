use thiserror::Error;

/// The reason execution stopped abnormally.
///
/// A trap aborts the whole invocation: every enclosing frame is unwound without running any
/// further instructions.
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum Trap {
    #[error("unreachable")]
    Unreachable,
    #[error("out of bounds memory access")]
    MemoryOutOfBounds,
    #[error("out of bounds table access")]
    TableOutOfBounds,
    #[error("undefined element")]
    UndefinedElement,
    #[error("uninitialized element")]
    UninitializedElement,
    #[error("indirect call type mismatch")]
    IndirectCallTypeMismatch,
    #[error("integer divide by zero")]
    IntegerDivideByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("invalid conversion to integer")]
    InvalidConversionToInteger,
    #[error("call stack exhausted")]
    CallStackExhausted,
    #[error("exceeded maximum allowed number of instructions")]
    InstructionLimitExceeded,
    #[error("uncaught exception")]
    UncaughtException,
    /// An [`InstructionHook`](crate::InstructionHook) stopped execution.
    #[error("execution aborted")]
    Aborted,
    /// The arguments passed to an invocation do not match the function type.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// A trap raised by a host function.
    #[error("{0}")]
    Host(String),
}

impl Trap {
    /// Creates a trap raised by a host function.
    pub fn host(reason: impl Into<String>) -> Self {
        Self::Host(reason.into())
    }

    /// Returns the human readable reason for this trap.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}
