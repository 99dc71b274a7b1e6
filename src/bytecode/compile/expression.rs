use super::{CodeGenerator, OperandEntry};
use crate::bytecode::compile_error::{CompileError, CompileErrorKind};
use crate::bytecode::{OpCode, Operand, cube};
use crate::lang::{ScalarType, Value};

impl CodeGenerator {
    /// Push a declared scalar or object variable.
    pub fn push_variable(&mut self, id: &str) -> Result<(), CompileError> {
        let Some(var) = self.tables.variable(id) else {
            return Err(self.error(CompileErrorKind::UndeclaredIdentifier(id.to_string())));
        };
        if var.is_array() || !var.pending_dims.is_empty() {
            return Err(self.error(CompileErrorKind::ArrayDimensionMissing {
                array: id.to_string(),
                detail: "an array must be indexed".to_string(),
            }));
        }
        let entry = OperandEntry {
            address: var.address,
            ty: var.ty.storage(),
            class: var.ty.class().map(str::to_string),
            through: false,
            name: id.to_string(),
        };
        self.push_entry(entry);
        Ok(())
    }

    pub fn push_operator(&mut self, op: OpCode) -> Result<(), CompileError> {
        if op.priority().is_none() {
            return Err(self.internal(format!("'{}' is not an expression operator", op)));
        }
        self.operators.push(op);
        Ok(())
    }

    // ─── precedence ───────────────────────────────────────────────────────

    fn fence(&self) -> usize {
        self.fences.last().copied().unwrap_or(0)
    }

    pub fn open_parenthesis(&mut self) {
        self.fences.push(self.operators.len());
    }

    pub fn close_parenthesis(&mut self) -> Result<(), CompileError> {
        self.execute_remaining()?;
        match self.fences.pop() {
            Some(_) => Ok(()),
            None => Err(self.internal("unbalanced parenthesis")),
        }
    }

    /// Reduce the top operator if it binds with exactly `priority` and was
    /// pushed inside the current parenthesis group.
    pub fn execute_if_possible(&mut self, priority: u8) -> Result<(), CompileError> {
        if self.operators.len() <= self.fence() {
            return Ok(());
        }
        match self.operators.last() {
            Some(op) if op.priority() == Some(priority) => self.reduce_top(),
            _ => Ok(()),
        }
    }

    /// Reduce every operator of the current parenthesis group.
    pub fn execute_remaining(&mut self) -> Result<(), CompileError> {
        while self.operators.len() > self.fence() {
            self.reduce_top()?;
        }
        Ok(())
    }

    fn reduce_top(&mut self) -> Result<(), CompileError> {
        let Some(op) = self.operators.pop() else {
            return Err(self.internal("operator stack underflow"));
        };
        let right = self.pop_operand()?;
        let left = self.pop_operand()?;

        match op {
            OpCode::Assign => self.assign(left, right),
            _ if op.compound_base().is_some() => self.compound_assign(left, op, right),
            _ => self.binary(left, op, right),
        }
    }

    fn binary(
        &mut self,
        left: OperandEntry,
        op: OpCode,
        right: OperandEntry,
    ) -> Result<(), CompileError> {
        let Some(ty) = cube::check(op, left.ty, right.ty) else {
            return Err(self.mismatch(&left.name, op.symbol(), &right.name));
        };
        let result = self.temporary(ty)?;
        self.emit(
            op,
            Some(left.value_operand()),
            Some(right.value_operand()),
            Some(Operand::Addr(result)),
        )?;
        self.release(&left)?;
        self.release(&right)?;

        self.push_entry(OperandEntry {
            address: result,
            ty,
            class: None,
            through: false,
            name: format!("({} {} {})", left.name, op.symbol(), right.name),
        });
        Ok(())
    }

    // ─── assignment ───────────────────────────────────────────────────────

    fn assign(&mut self, left: OperandEntry, right: OperandEntry) -> Result<(), CompileError> {
        if left.ty == ScalarType::Pointer || right.ty == ScalarType::Pointer {
            return self.assign_pointer(left, right);
        }
        if cube::check(OpCode::Assign, left.ty, right.ty).is_none() {
            return Err(self.mismatch(&left.name, "=", &right.name));
        }

        // heap cells are untyped, so widen before storing through a pointer
        let source = if left.through && left.ty == ScalarType::Float && right.ty == ScalarType::Int
        {
            let widened = self.temporary(ScalarType::Float)?;
            self.emit(
                OpCode::Assign,
                Some(right.value_operand()),
                None,
                Some(Operand::Addr(widened)),
            )?;
            self.release(&right)?;
            OperandEntry {
                address: widened,
                ty: ScalarType::Float,
                class: None,
                through: false,
                name: right.name.clone(),
            }
        } else {
            right
        };

        self.emit(
            OpCode::Assign,
            Some(source.value_operand()),
            None,
            Some(left.value_operand()),
        )?;
        self.release(&source)?;
        self.release(&left)
    }

    fn assign_pointer(
        &mut self,
        left: OperandEntry,
        right: OperandEntry,
    ) -> Result<(), CompileError> {
        if left.ty != right.ty {
            return Err(self.mismatch(&left.name, "=", &right.name));
        }
        if left.class != right.class {
            return Err(self.error(CompileErrorKind::ClassTypeMismatch {
                expected: left.type_name(),
                found: right.type_name(),
            }));
        }
        self.emit(
            OpCode::PointerAssign,
            Some(right.pointer_operand()),
            None,
            Some(left.pointer_operand()),
        )?;
        self.release(&right)?;
        self.release(&left)
    }

    /// `left op= right` becomes `t = left op right; left = t`.
    fn compound_assign(
        &mut self,
        left: OperandEntry,
        op: OpCode,
        right: OperandEntry,
    ) -> Result<(), CompileError> {
        let (Some(base), Some(ty)) = (op.compound_base(), cube::check(op, left.ty, right.ty))
        else {
            return Err(self.mismatch(&left.name, op.symbol(), &right.name));
        };
        if cube::check(OpCode::Assign, left.ty, ty).is_none() {
            return Err(self.mismatch(&left.name, op.symbol(), &right.name));
        }

        let result = self.temporary(ty)?;
        self.emit(
            base,
            Some(left.value_operand()),
            Some(right.value_operand()),
            Some(Operand::Addr(result)),
        )?;
        self.emit(
            OpCode::Assign,
            Some(Operand::Addr(result)),
            None,
            Some(left.value_operand()),
        )?;
        self.allocator
            .release(result)
            .map_err(|e| self.error(e.into()))?;
        self.release(&right)?;
        self.release(&left)
    }

    // ─── built-ins ────────────────────────────────────────────────────────

    /// Print the value on top of the operand stack.
    pub fn print(&mut self) -> Result<(), CompileError> {
        self.execute_remaining()?;
        let value = self.pop_operand()?;
        self.emit(OpCode::Print, None, None, Some(value.value_operand()))?;
        self.release(&value)
    }

    /// Read a line into a fresh temporary typed like the operand currently
    /// on top of the stack (the assignment target), and push it.
    pub fn input(&mut self, prompt: Option<&str>) -> Result<(), CompileError> {
        let Some(target) = self.operands.last() else {
            return Err(self.internal("input without an assignment target"));
        };
        let ty = target.ty;
        if ty == ScalarType::Pointer {
            return Err(self.mismatch(&target.name, "input", "Pointer"));
        }

        if let Some(prompt) = prompt {
            let address = self.constant(Value::String(prompt.to_string()))?;
            self.emit(OpCode::Print, None, None, Some(Operand::Addr(address)))?;
        }
        let result = self.temporary(ty)?;
        self.emit(OpCode::Input, None, None, Some(Operand::Addr(result)))?;
        self.push_entry(OperandEntry {
            address: result,
            ty,
            class: None,
            through: false,
            name: "input".to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Event;
    use super::*;
    use crate::lang::Segment;

    #[test]
    fn test_precedence_respects_priorities() {
        // x = 1 + 2 * 3
        let mut body = vec![declare("x", ScalarType::Int)];
        body.extend(vec![
            var("x"),
            op("="),
            int(1),
            reduce(4),
            reduce(3),
            op("+"),
            int(2),
            op("*"),
            int(3),
            reduce(4),
            reduce(3),
            Event::ExecuteRemaining,
        ]);
        let (program, _) = compile(&main_with(body)).unwrap();
        assert_eq!(
            ops(&program),
            vec![
                OpCode::Multiply,
                OpCode::Add,
                OpCode::Assign,
                OpCode::EndFunc
            ]
        );
    }

    #[test]
    fn test_left_associative_subtraction() {
        // x = 10 - 4 - 3 reduces the first subtraction before the second
        let body = vec![
            declare("x", ScalarType::Int),
            var("x"),
            op("="),
            int(10),
            reduce(3),
            op("-"),
            int(4),
            reduce(3),
            op("-"),
            int(3),
            reduce(3),
            Event::ExecuteRemaining,
        ];
        let (program, names) = compile(&main_with(body)).unwrap();
        let first = &program.quad_list[0];
        assert_eq!(first.op, OpCode::Subtract);
        match first.left {
            Some(Operand::Addr(a)) => assert_eq!(names.display(a), "10"),
            ref other => panic!("unexpected operand {:?}", other),
        }
        assert_eq!(program.quad_list[1].op, OpCode::Subtract);
    }

    #[test]
    fn test_parenthesis_fence() {
        // x = (1 + 2) * 3
        let body = vec![
            declare("x", ScalarType::Int),
            var("x"),
            op("="),
            Event::OpenParenthesis,
            int(1),
            op("+"),
            int(2),
            Event::CloseParenthesis,
            op("*"),
            int(3),
            reduce(4),
            Event::ExecuteRemaining,
        ];
        let (program, _) = compile(&main_with(body)).unwrap();
        assert_eq!(program.quad_list[0].op, OpCode::Add);
        assert_eq!(program.quad_list[1].op, OpCode::Multiply);
    }

    #[test]
    fn test_type_mismatch_names_both_operands() {
        let mut body = vec![declare("flag", ScalarType::Bool), declare("n", ScalarType::Int)];
        body.extend(print(vec![var("flag"), op("+"), var("n")]));
        let kind = compile_err(&main_with(body));
        assert_eq!(
            kind,
            CompileErrorKind::TypeMismatch {
                left: "flag".into(),
                op: "+".into(),
                right: "n".into()
            }
        );
    }

    #[test]
    fn test_narrowing_assignment_is_mismatch() {
        let mut body = vec![declare("n", ScalarType::Int)];
        body.extend(assign(
            "n",
            vec![Event::PushConstant {
                value: Value::Float(1.5),
            }],
        ));
        assert!(matches!(
            compile_err(&main_with(body)),
            CompileErrorKind::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_compound_assignment_is_two_quads() {
        let mut body = vec![declare("x", ScalarType::Int)];
        body.extend(assign("x", vec![int(1)]));
        body.extend(vec![var("x"), op("+="), int(5), Event::ExecuteRemaining]);
        let (program, _) = compile(&main_with(body)).unwrap();
        assert_eq!(
            ops(&program),
            vec![
                OpCode::Assign,
                OpCode::Add,
                OpCode::Assign,
                OpCode::EndFunc
            ]
        );
        // the temporary written by ADD is what gets copied back
        assert_eq!(program.quad_list[1].result, program.quad_list[2].left);
    }

    #[test]
    fn test_compound_narrowing_rejected() {
        let mut body = vec![declare("x", ScalarType::Int)];
        body.extend(vec![
            var("x"),
            op("*="),
            Event::PushConstant {
                value: Value::Float(0.5),
            },
            Event::ExecuteRemaining,
        ]);
        assert!(matches!(
            compile_err(&main_with(body)),
            CompileErrorKind::TypeMismatch { op, .. } if op == "*="
        ));
    }

    #[test]
    fn test_temporaries_are_reused() {
        // two independent statements reuse the same temporary slot
        let mut body = vec![declare("x", ScalarType::Int)];
        body.extend(assign("x", vec![int(1), op("+"), int(2)]));
        body.extend(assign("x", vec![int(3), op("+"), int(4)]));
        let (program, _) = compile(&main_with(body)).unwrap();
        assert_eq!(program.quad_list[0].result, program.quad_list[2].result);
        let main = program.main().unwrap();
        assert_eq!(main.slot_counts.temporary(ScalarType::Int), 1);
        assert_eq!(main.slot_counts.local(ScalarType::Int), 1);
    }

    #[test]
    fn test_input_prompt_and_target_type() {
        let mut generator = CodeGenerator::new();
        generator.declare_function("main").unwrap();
        generator
            .declare_variable("ratio", ScalarType::Float.into())
            .unwrap();
        generator.push_variable("ratio").unwrap();
        generator.push_operator(OpCode::Assign).unwrap();
        generator.input(Some("ratio?")).unwrap();
        generator.execute_remaining().unwrap();

        let quads = generator.quads();
        assert_eq!(quads[0].op, OpCode::Print);
        assert_eq!(quads[1].op, OpCode::Input);
        let Some(Operand::Addr(temp)) = quads[1].result else {
            panic!("input must write a plain address");
        };
        assert!(generator.allocator.is_segment(temp, Segment::Temporary));
        assert_eq!(generator.allocator.type_of(temp), Some(ScalarType::Float));
        assert_eq!(quads[2].op, OpCode::Assign);
    }

    #[test]
    fn test_unknown_variable() {
        let kind = compile_err(&main_with(print(vec![var("ghost")])));
        assert_eq!(kind, CompileErrorKind::UndeclaredIdentifier("ghost".into()));
    }
}
