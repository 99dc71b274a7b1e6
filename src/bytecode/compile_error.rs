use crate::lang::{ScalarType, Segment};
use crate::memory::AllocError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileErrorKind {
    #[error("type mismatch: cannot apply '{op}' to '{left}' and '{right}'")]
    TypeMismatch {
        left: String,
        op: String,
        right: String,
    },

    #[error("undeclared identifier '{0}'")]
    UndeclaredIdentifier(String),

    #[error("'{0}' is already declared in this scope")]
    Redeclaration(String),

    #[error("'{function}' expects {expected} argument(s), got {found}")]
    ArityMismatch {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("argument {index} of '{function}' must be {expected}, got {found}")]
    ParameterTypeMismatch {
        function: String,
        index: usize,
        expected: String,
        found: String,
    },

    #[error("too many {ty} values in {segment} scope")]
    AddressSpaceExhausted { segment: Segment, ty: ScalarType },

    #[error("class '{class}' has no field '{field}'")]
    ClassFieldNotFound { class: String, field: String },

    #[error("cannot use a '{found}' object where '{expected}' is required")]
    ClassTypeMismatch { expected: String, found: String },

    #[error("array '{array}': {detail}")]
    ArrayDimensionMissing { array: String, detail: String },

    #[error("invalid return: {0}")]
    InvalidReturn(String),

    /// Event out of sequence or broken codegen state.
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CompileErrorKind {
    pub fn in_function(self, function: impl Into<String>) -> CompileError {
        CompileError {
            kind: self,
            function: function.into(),
        }
    }

    fn hint(&self) -> Option<&'static str> {
        match self {
            CompileErrorKind::TypeMismatch { .. } => {
                Some("Int widens to Float on assignment; every other conversion is explicit")
            }
            CompileErrorKind::AddressSpaceExhausted { .. } => {
                Some("split the function or raise the segment size in the layout")
            }
            CompileErrorKind::ArrayDimensionMissing { .. } => {
                Some("index every declared dimension, e.g. grid[i][j]")
            }
            _ => None,
        }
    }
}

impl From<AllocError> for CompileErrorKind {
    fn from(err: AllocError) -> Self {
        match err {
            AllocError::Exhausted { segment, ty } => {
                CompileErrorKind::AddressSpaceExhausted { segment, ty }
            }
            other => CompileErrorKind::Internal(other.to_string()),
        }
    }
}

/// A fatal compile error with the name of the enclosing function.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub function: String,
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "compile error in '{}': {}", self.function, self.kind)?;
        if let Some(hint) = self.kind.hint() {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mismatch_names_operands_and_operator() {
        let err = CompileErrorKind::TypeMismatch {
            left: "flag".into(),
            op: "+".into(),
            right: "count".into(),
        }
        .in_function("main");
        let msg = err.to_string();
        assert!(msg.contains("compile error in 'main'"));
        assert!(msg.contains("'+'"));
        assert!(msg.contains("'flag'"));
        assert!(msg.contains("'count'"));
        assert!(msg.contains("hint:"));
    }

    #[test]
    fn test_arity_display() {
        let err = CompileErrorKind::ArityMismatch {
            function: "add".into(),
            expected: 2,
            found: 3,
        }
        .in_function("main");
        assert!(err.to_string().contains("'add' expects 2 argument(s), got 3"));
        assert!(!err.to_string().contains("hint:"));
    }

    #[test]
    fn test_alloc_error_conversion() {
        let kind: CompileErrorKind = AllocError::Exhausted {
            segment: Segment::Local,
            ty: ScalarType::Int,
        }
        .into();
        assert_eq!(
            kind,
            CompileErrorKind::AddressSpaceExhausted {
                segment: Segment::Local,
                ty: ScalarType::Int
            }
        );
        assert!(kind.to_string().contains("too many Int values in local scope"));

        let kind: CompileErrorKind = AllocError::NotAllocated { address: 4 }.into();
        assert!(matches!(kind, CompileErrorKind::Internal(_)));
    }

    #[test]
    fn test_internal_error() {
        let err = CompileErrorKind::Internal("operand stack underflow".into()).in_function("main");
        assert!(err.to_string().contains("internal compiler error: operand stack underflow"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
