pub mod context;
pub mod runtime_error;
pub mod vm;

pub use context::ContextMemory;
pub use runtime_error::{RuntimeError, RuntimeErrorKind};
pub use vm::{VirtualMachine, VmConfig};
