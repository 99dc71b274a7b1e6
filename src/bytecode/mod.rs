pub mod compile;
pub mod compile_error;
pub mod cube;
pub mod disasm;
pub mod ir;
pub mod names;
pub mod op;

pub use compile::{CodeGenerator, Event};
pub use compile_error::{CompileError, CompileErrorKind};
pub use ir::{Constant, FunctionData, Program, SlotCounts};
pub use names::AddressNames;
pub use op::{OpClass, OpCode, Operand, Quad};
