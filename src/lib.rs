//! Quadruple code generator and virtual machine.
//!
//! A front-end drives [`bytecode::CodeGenerator`] with semantic events; the
//! resulting [`bytecode::Program`] is executed by [`runtime::VirtualMachine`].

pub mod bytecode;
pub mod lang;
pub mod memory;
pub mod runtime;
