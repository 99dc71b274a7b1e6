//! Quadruple code generation driven by semantic events.
//!
//! A front-end walks its parse and calls one method per semantic action
//! (or feeds [`Event`]s through [`CodeGenerator::apply`]). The generator
//! keeps an operand stack and an operator stack, allocates virtual
//! addresses, and emits quadruples with backpatched jumps.

mod array;
mod call;
mod control;
mod declare;
mod event;
mod expression;
mod object;
mod tables;

pub use declare::TypeTarget;
pub use event::{Event, parse_events};

use crate::bytecode::compile_error::{CompileError, CompileErrorKind};
use crate::bytecode::ir::{Constant, MAIN, Program};
use crate::bytecode::names::AddressNames;
use crate::bytecode::{OpCode, Operand, Quad};
use crate::lang::{ScalarType, Segment, Value};
use crate::memory::{AddressAllocator, LayoutConfig, MemoryLayout};
use control::{ConditionalFrame, LoopFrame};
use call::CallFrame;
use array::ArrayAccess;
use log::debug;
use tables::SymbolTables;

/// One entry of the operand stack.
#[derive(Debug, Clone, PartialEq)]
struct OperandEntry {
    address: usize,
    /// Type of the value the entry denotes.
    ty: ScalarType,
    /// Class of the referenced object for `Pointer` values.
    class: Option<String>,
    /// `address` is a pointer temporary; the value lives where it points.
    through: bool,
    /// Display name for diagnostics.
    name: String,
}

impl OperandEntry {
    fn value_operand(&self) -> Operand {
        if self.through {
            Operand::Deref(self.address)
        } else {
            Operand::Addr(self.address)
        }
    }

    fn pointer_operand(&self) -> Operand {
        if self.through {
            Operand::Deref(self.address)
        } else {
            Operand::Ref(self.address)
        }
    }

    fn type_name(&self) -> String {
        match &self.class {
            Some(class) => class.clone(),
            None => self.ty.to_string(),
        }
    }
}

pub struct CodeGenerator {
    allocator: AddressAllocator,
    program: Program,
    names: AddressNames,
    tables: SymbolTables,

    operands: Vec<OperandEntry>,
    operators: Vec<OpCode>,
    /// Operator stack height at each open parenthesis.
    fences: Vec<usize>,

    conditionals: Vec<ConditionalFrame>,
    loops: Vec<LoopFrame>,
    calls: Vec<CallFrame>,
    arrays: Vec<ArrayAccess>,

    current_function: Option<String>,
    current_class: Option<String>,
    last_declared: Option<String>,
    /// Callee of the call just closed, until its result is claimed.
    finished_call: Option<String>,
    returned: bool,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self::with_layout(LayoutConfig::default())
    }

    pub fn with_layout(config: LayoutConfig) -> Self {
        let layout = MemoryLayout::new(config.clone());
        CodeGenerator {
            allocator: AddressAllocator::new(layout),
            program: Program::new(config),
            names: AddressNames::new(),
            tables: SymbolTables::default(),
            operands: Vec::new(),
            operators: Vec::new(),
            fences: Vec::new(),
            conditionals: Vec::new(),
            loops: Vec::new(),
            calls: Vec::new(),
            arrays: Vec::new(),
            current_function: None,
            current_class: None,
            last_declared: None,
            finished_call: None,
            returned: false,
        }
    }

    /// Quadruples emitted so far.
    pub fn quads(&self) -> &[Quad] {
        &self.program.quad_list
    }

    pub fn names(&self) -> &AddressNames {
        &self.names
    }

    // ─── errors ───────────────────────────────────────────────────────────

    fn scope_name(&self) -> &str {
        self.current_function.as_deref().unwrap_or("<global>")
    }

    fn error(&self, kind: CompileErrorKind) -> CompileError {
        kind.in_function(self.scope_name())
    }

    fn internal(&self, msg: impl Into<String>) -> CompileError {
        self.error(CompileErrorKind::Internal(msg.into()))
    }

    fn mismatch(&self, left: &str, op: &str, right: &str) -> CompileError {
        self.error(CompileErrorKind::TypeMismatch {
            left: left.to_string(),
            op: op.to_string(),
            right: right.to_string(),
        })
    }

    // ─── emission ─────────────────────────────────────────────────────────

    fn emit(
        &mut self,
        op: OpCode,
        left: Option<Operand>,
        right: Option<Operand>,
        result: Option<Operand>,
    ) -> Result<usize, CompileError> {
        if self.current_function.is_none() {
            return Err(self.internal(format!(
                "'{}' emitted outside of a function body",
                op
            )));
        }
        let quad = Quad::new(op, left, right, result);
        let index = self.program.quad_list.len();
        debug!("{:04} {}", index, quad);
        self.program.quad_list.push(quad);
        Ok(index)
    }

    /// Index the next emitted quad will have.
    fn next_quad(&self) -> usize {
        self.program.quad_list.len()
    }

    fn patch(&mut self, index: usize, target: usize) -> Result<(), CompileError> {
        let is_jump = self
            .program
            .quad_list
            .get(index)
            .is_some_and(|q| matches!(q.op, OpCode::Goto | OpCode::GotoF));
        if !is_jump {
            return Err(self.internal(format!("quad {} is not a pending jump", index)));
        }
        self.program.quad_list[index].result = Some(Operand::Jump(target));
        Ok(())
    }

    // ─── storage ──────────────────────────────────────────────────────────

    fn temporary(&mut self, ty: ScalarType) -> Result<usize, CompileError> {
        self.allocator
            .allocate(ty, Segment::Temporary)
            .map_err(|e| self.error(e.into()))
    }

    /// Give back the slot of a consumed operand if it was a temporary.
    fn release(&mut self, entry: &OperandEntry) -> Result<(), CompileError> {
        if self.allocator.is_segment(entry.address, Segment::Temporary) {
            self.allocator
                .release(entry.address)
                .map_err(|e| self.error(e.into()))?;
        }
        Ok(())
    }

    /// Slot of a literal in the constant segment, shared by equal literals.
    fn constant(&mut self, value: Value) -> Result<usize, CompileError> {
        let ty = value.scalar_type();
        if ty == ScalarType::Pointer {
            return Err(self.internal("pointer literals are not supported"));
        }
        let key = (ty, format!("{:?}", value));
        if let Some(address) = self.tables.constants.get(&key) {
            return Ok(*address);
        }

        let address = self
            .allocator
            .allocate(ty, Segment::Constant)
            .map_err(|e| self.error(e.into()))?;
        let label = match &value {
            Value::String(s) => format!("{:?}", s),
            other => other.to_string(),
        };
        self.names.insert(address, label);
        self.program
            .constant_table
            .insert(address, Constant { value, ty });
        self.tables.constants.insert(key, address);
        Ok(address)
    }

    // ─── operand stack ────────────────────────────────────────────────────

    fn push_entry(&mut self, entry: OperandEntry) {
        self.operands.push(entry);
    }

    fn pop_operand(&mut self) -> Result<OperandEntry, CompileError> {
        match self.operands.pop() {
            Some(entry) => Ok(entry),
            None => Err(self.internal("operand stack underflow")),
        }
    }

    /// Push a literal operand.
    pub fn push_constant(&mut self, value: Value) -> Result<(), CompileError> {
        let ty = value.scalar_type();
        let address = self.constant(value)?;
        let name = self.names.display(address);
        self.push_entry(OperandEntry {
            address,
            ty,
            class: None,
            through: false,
            name,
        });
        Ok(())
    }

    /// Push a raw address of a known type.
    pub fn push_operand(
        &mut self,
        address: usize,
        ty: ScalarType,
        class: Option<String>,
    ) -> Result<(), CompileError> {
        if self.allocator.layout().locate(address).map(|r| r.ty) != Some(ty) {
            return Err(self.internal(format!("address {} does not hold a {}", address, ty)));
        }
        let name = self.names.display(address);
        self.push_entry(OperandEntry {
            address,
            ty,
            class,
            through: false,
            name,
        });
        Ok(())
    }

    // ─── completion ───────────────────────────────────────────────────────

    /// Fail if an expression or a control construct is still open.
    fn ensure_closed(&self, scope: &str) -> Result<(), CompileError> {
        let open = [
            ("operand(s)", self.operands.len()),
            ("operator(s)", self.operators.len()),
            ("parenthesis group(s)", self.fences.len()),
            ("if statement(s)", self.conditionals.len()),
            ("loop(s)", self.loops.len()),
            ("call(s)", self.calls.len()),
            ("array access(es)", self.arrays.len()),
        ];
        match open.iter().find(|(_, count)| *count > 0) {
            Some((what, count)) => Err(self.internal(format!(
                "{} {} left open at end of {}",
                count, what, scope
            ))),
            None => Ok(()),
        }
    }

    /// Close compilation and hand out the program with its name table.
    pub fn finish(mut self) -> Result<(Program, AddressNames), CompileError> {
        if let Some(function) = &self.current_function {
            return Err(self.internal(format!("function '{}' is never closed", function)));
        }
        self.ensure_closed("program")?;
        if !self.program.function_data.contains_key(MAIN) {
            return Err(self.error(CompileErrorKind::UndeclaredIdentifier(MAIN.to_string())));
        }
        for ty in ScalarType::ALL {
            self.program.globals.local[ty.index()] = self.allocator.peak(Segment::Global, ty);
        }
        debug!(
            "compiled {} quads, {} functions, {} constants",
            self.program.quad_list.len(),
            self.program.function_data.len(),
            self.program.constant_table.len()
        );
        Ok((self.program, self.names))
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_missing_main() {
        let kind = compile_err(&[function("helper"), Event::EndFunction]);
        assert_eq!(kind, CompileErrorKind::UndeclaredIdentifier("main".into()));
    }

    #[test]
    fn test_constants_are_shared() {
        let mut body = vec![declare("x", ScalarType::Int), declare("y", ScalarType::Int)];
        body.extend(assign("x", vec![int(7)]));
        body.extend(assign("y", vec![int(7)]));
        let (program, names) = compile(&main_with(body)).unwrap();

        assert_eq!(program.constant_table.len(), 1);
        let (address, constant) = program.constant_table.iter().next().unwrap();
        assert_eq!(constant.value, Value::Int(7));
        assert_eq!(names.display(*address), "7");
    }

    #[test]
    fn test_statements_outside_function_rejected() {
        let kind = compile_err(&[declare("g", ScalarType::Int), var("g"), Event::Print]);
        assert!(matches!(kind, CompileErrorKind::Internal(_)));
    }

    #[test]
    fn test_open_group_after_main_rejected() {
        let mut events = main_with(vec![]);
        events.push(Event::OpenParenthesis);
        let kind = compile_err(&events);
        assert!(matches!(kind, CompileErrorKind::Internal(msg) if msg.contains("end of program")));
    }

    #[test]
    fn test_unclosed_function() {
        let kind = compile_err(&[function(MAIN)]);
        assert!(matches!(kind, CompileErrorKind::Internal(msg) if msg.contains("never closed")));
    }

    #[test]
    fn test_global_slot_counts() {
        let mut events = vec![
            declare("a", ScalarType::Int),
            declare("b", ScalarType::Int),
            declare("s", ScalarType::String),
        ];
        events.extend(main_with(vec![]));
        let (program, _) = compile(&events).unwrap();
        assert_eq!(program.globals.local(ScalarType::Int), 2);
        assert_eq!(program.globals.local(ScalarType::String), 1);
        assert_eq!(program.globals.local(ScalarType::Bool), 0);
    }
}
