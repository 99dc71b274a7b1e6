//! # Quadra core language types
//!
//! Scalar types, memory segments and runtime values shared by the code
//! generator and the virtual machine.
//!
//! ## Conventions
//!
//! - Every storage slot has exactly one `ScalarType` and one `Segment`.
//! - Object references are stored in `Pointer` slots; the class of the
//!   pointee is tracked by the compiler only.

pub mod types;
pub mod value;

pub use types::{ScalarType, Segment, TypeName};
pub use value::Value;
