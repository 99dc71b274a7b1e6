use super::tables::ArrayDim;
use super::{CodeGenerator, OperandEntry};
use crate::bytecode::compile_error::{CompileError, CompileErrorKind};
use crate::bytecode::{OpCode, Operand};
use crate::lang::{ScalarType, TypeName};

/// An indexed access being compiled: `id[i][j]...`.
#[derive(Debug, Clone)]
pub(super) struct ArrayAccess {
    id: String,
    base: usize,
    ty: TypeName,
    dims: Vec<ArrayDim>,
    /// Indices folded so far.
    seen: usize,
    /// Running linear offset.
    offset: Option<OperandEntry>,
}

impl CodeGenerator {
    /// Start an indexed access to array `id`.
    pub fn push_array(&mut self, id: &str) -> Result<(), CompileError> {
        let Some(var) = self.tables.variable(id) else {
            return Err(self.error(CompileErrorKind::UndeclaredIdentifier(id.to_string())));
        };
        if !var.is_array() {
            return Err(self.error(CompileErrorKind::ArrayDimensionMissing {
                array: id.to_string(),
                detail: "not declared with dimensions".to_string(),
            }));
        }
        let access = ArrayAccess {
            id: id.to_string(),
            base: var.address,
            ty: var.ty.clone(),
            dims: var.dims.clone(),
            seen: 0,
            offset: None,
        };
        self.arrays.push(access);
        self.open_parenthesis();
        Ok(())
    }

    /// Fold the index expression just parsed: bounds check, scale by the
    /// dimension multiplier, add to the running offset.
    pub fn push_array_index(&mut self) -> Result<(), CompileError> {
        self.execute_remaining()?;
        let index = self.pop_operand()?;
        let Some(access) = self.arrays.last() else {
            return Err(self.internal("index outside of an array access"));
        };
        if index.ty != ScalarType::Int {
            return Err(self.mismatch(&index.name, "[]", "Int"));
        }
        let Some(dim) = access.dims.get(access.seen).cloned() else {
            return Err(self.error(CompileErrorKind::ArrayDimensionMissing {
                array: access.id.clone(),
                detail: format!("declared with {} dimension(s)", access.dims.len()),
            }));
        };

        self.emit(
            OpCode::Verify,
            Some(index.value_operand()),
            None,
            Some(Operand::Addr(dim.size_const)),
        )?;

        let term = match dim.multiplier_const {
            Some(multiplier) => {
                let scaled = self.temporary(ScalarType::Int)?;
                self.emit(
                    OpCode::Multiply,
                    Some(index.value_operand()),
                    Some(Operand::Addr(multiplier)),
                    Some(Operand::Addr(scaled)),
                )?;
                self.release(&index)?;
                OperandEntry {
                    address: scaled,
                    ty: ScalarType::Int,
                    class: None,
                    through: false,
                    name: index.name,
                }
            }
            None => index,
        };

        let previous = self.arrays.last_mut().and_then(|a| a.offset.take());
        let offset = match previous {
            None => term,
            Some(acc) => {
                let sum = self.temporary(ScalarType::Int)?;
                self.emit(
                    OpCode::Add,
                    Some(acc.value_operand()),
                    Some(term.value_operand()),
                    Some(Operand::Addr(sum)),
                )?;
                self.release(&acc)?;
                self.release(&term)?;
                OperandEntry {
                    address: sum,
                    ty: ScalarType::Int,
                    class: None,
                    through: false,
                    name: "offset".to_string(),
                }
            }
        };

        if let Some(access) = self.arrays.last_mut() {
            access.offset = Some(offset);
            access.seen += 1;
        }
        Ok(())
    }

    /// `POINTER_ADD base offset`: push the element as a through-pointer
    /// operand usable on both sides of an assignment.
    pub fn close_array_access(&mut self) -> Result<(), CompileError> {
        let Some(access) = self.arrays.pop() else {
            return Err(self.internal("end of array access without an array"));
        };
        if access.seen != access.dims.len() {
            return Err(self.error(CompileErrorKind::ArrayDimensionMissing {
                array: access.id,
                detail: format!(
                    "expected {} index(es), got {}",
                    access.dims.len(),
                    access.seen
                ),
            }));
        }
        let Some(offset) = access.offset else {
            return Err(self.internal("array access without an offset"));
        };
        self.close_parenthesis()?;

        let element = self.temporary(ScalarType::Pointer)?;
        self.emit(
            OpCode::PointerAdd,
            Some(Operand::Immediate(access.base)),
            Some(offset.value_operand()),
            Some(Operand::Ref(element)),
        )?;
        self.release(&offset)?;

        self.push_entry(OperandEntry {
            address: element,
            ty: access.ty.storage(),
            class: access.ty.class().map(str::to_string),
            through: true,
            name: format!("{}[]", access.id),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Event;
    use super::*;

    fn declare_array(id: &str, dims: &[usize]) -> Vec<Event> {
        let mut events = vec![declare(id, ScalarType::Int)];
        for size in dims {
            events.push(Event::DeclareArrayDimension { size: *size });
        }
        events.push(Event::AllocateArray);
        events
    }

    fn index(id: &str, indices: &[i64]) -> Vec<Event> {
        let mut events = vec![Event::PushArray { id: id.into() }];
        for i in indices {
            events.push(int(*i));
            events.push(Event::PushArrayIndex);
        }
        events.push(Event::CloseArrayAccess);
        events
    }

    #[test]
    fn test_two_dimensional_access_shape() {
        // m[1][2] = 9 with m: Int[2][3]
        let mut body = declare_array("m", &[2, 3]);
        body.extend(index("m", &[1, 2]));
        body.extend(vec![op("="), int(9), Event::ExecuteRemaining]);

        let (program, _) = compile(&main_with(body)).unwrap();
        assert_eq!(
            ops(&program),
            vec![
                OpCode::Verify,
                OpCode::Multiply,
                OpCode::Verify,
                OpCode::Add,
                OpCode::PointerAdd,
                OpCode::Assign,
                OpCode::EndFunc
            ]
        );
        assert!(matches!(
            program.quad_list[5].result,
            Some(Operand::Deref(_))
        ));
        assert!(matches!(
            program.quad_list[4].left,
            Some(Operand::Immediate(_))
        ));
    }

    #[test]
    fn test_too_many_indices() {
        let mut body = declare_array("v", &[3]);
        body.extend(index("v", &[0, 1]));
        assert!(matches!(
            compile_err(&main_with(body)),
            CompileErrorKind::ArrayDimensionMissing { .. }
        ));
    }

    #[test]
    fn test_too_few_indices() {
        let mut body = declare_array("m", &[2, 2]);
        body.extend(index("m", &[0]));
        assert!(matches!(
            compile_err(&main_with(body)),
            CompileErrorKind::ArrayDimensionMissing { detail, .. } if detail.contains("got 1")
        ));
    }

    #[test]
    fn test_array_used_without_index() {
        let mut body = declare_array("v", &[3]);
        body.extend(print(vec![var("v")]));
        assert!(matches!(
            compile_err(&main_with(body)),
            CompileErrorKind::ArrayDimensionMissing { .. }
        ));
    }

    #[test]
    fn test_index_must_be_int() {
        let mut body = declare_array("v", &[3]);
        body.extend(vec![
            Event::PushArray { id: "v".into() },
            Event::PushConstant {
                value: crate::lang::Value::Bool(true),
            },
            Event::PushArrayIndex,
        ]);
        assert!(matches!(
            compile_err(&main_with(body)),
            CompileErrorKind::TypeMismatch { op, .. } if op == "[]"
        ));
    }

    #[test]
    fn test_nested_index_expression() {
        // v[v[0]] reads an element to index another
        let mut body = declare_array("v", &[4]);
        body.push(Event::PushArray { id: "v".into() });
        body.extend(index("v", &[0]));
        body.push(Event::PushArrayIndex);
        body.push(Event::CloseArrayAccess);
        body.push(Event::ExecuteRemaining);
        body.push(Event::Print);
        let (program, _) = compile(&main_with(body)).unwrap();
        assert_eq!(
            ops(&program),
            vec![
                OpCode::Verify,
                OpCode::PointerAdd,
                OpCode::Verify,
                OpCode::PointerAdd,
                OpCode::Print,
                OpCode::EndFunc
            ]
        );
    }
}
