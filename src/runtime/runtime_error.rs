use crate::bytecode::OpCode;
use crate::lang::ScalarType;
use crate::memory::HeapError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeErrorKind {
    #[error("null pointer dereference through address {address}")]
    NullPointerDereference { address: usize },

    #[error("array index {index} out of range for size {size}")]
    ArrayIndexOutOfRange { index: i64, size: i64 },

    #[error("division by zero")]
    DivisionByZero,

    #[error("heap exhausted: requested {requested} cells, largest free range holds {largest}")]
    HeapExhausted { requested: usize, largest: usize },

    #[error("unknown opcode '{0}'")]
    UnknownOpcode(OpCode),

    #[error("heap reference {reference} released twice")]
    DoubleFree { reference: usize },

    #[error("read of uninitialized address {address}")]
    UninitializedValue { address: usize },

    #[error("address {address} is not mapped")]
    InvalidAddress { address: usize },

    #[error("cannot read '{text}' as {expected}")]
    InvalidInput { expected: ScalarType, text: String },

    #[error("type error: {0}")]
    TypeError(String),

    #[error("function '{function}' ended without returning a value")]
    MissingReturn { function: String },

    #[error("execution step limit exceeded ({0})")]
    StepLimitExceeded(usize),

    #[error("maximum call depth exceeded ({0})")]
    CallDepthExceeded(usize),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<HeapError> for RuntimeErrorKind {
    fn from(err: HeapError) -> Self {
        match err {
            HeapError::Exhausted { requested, largest } => {
                RuntimeErrorKind::HeapExhausted { requested, largest }
            }
            HeapError::DoubleFree { reference } => RuntimeErrorKind::DoubleFree { reference },
            HeapError::InvalidAddress { address } => RuntimeErrorKind::InvalidAddress { address },
        }
    }
}

impl From<std::io::Error> for RuntimeErrorKind {
    fn from(err: std::io::Error) -> Self {
        RuntimeErrorKind::Io(err.to_string())
    }
}

/// A fatal runtime error, located at the quad that raised it.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub ip: usize,
    /// Active functions, outermost first.
    pub call_stack: Vec<String>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, ip: usize) -> Self {
        RuntimeError {
            kind,
            ip,
            call_stack: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.call_stack.push(context.to_string());
        self
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error at quad {}: {}", self.ip, self.kind)?;

        if !self.call_stack.is_empty() {
            write!(f, "\n  call stack:")?;

            for (i, frame) in self.call_stack.iter().rev().enumerate() {
                write!(f, "\n    {}: {}", i, frame)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_lists_innermost_frame_first() {
        let err = RuntimeError::new(RuntimeErrorKind::DivisionByZero, 12)
            .with_context("main")
            .with_context("ratio");
        let msg = err.to_string();
        assert!(msg.starts_with("runtime error at quad 12: division by zero"));
        let ratio = msg.find("0: ratio").unwrap();
        let main = msg.find("1: main").unwrap();
        assert!(ratio < main);
    }

    #[test]
    fn test_heap_error_conversion() {
        let kind: RuntimeErrorKind = HeapError::DoubleFree { reference: 9 }.into();
        assert_eq!(kind, RuntimeErrorKind::DoubleFree { reference: 9 });
        let kind: RuntimeErrorKind = HeapError::Exhausted {
            requested: 4,
            largest: 1,
        }
        .into();
        assert!(kind.to_string().contains("heap exhausted"));
    }

    #[test]
    fn test_index_message() {
        let kind = RuntimeErrorKind::ArrayIndexOutOfRange { index: 5, size: 3 };
        assert_eq!(kind.to_string(), "array index 5 out of range for size 3");
    }
}
