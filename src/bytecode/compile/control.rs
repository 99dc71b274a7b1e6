use super::CodeGenerator;
use crate::bytecode::compile_error::CompileError;
use crate::bytecode::{OpCode, Operand};
use crate::lang::ScalarType;

/// Pending jumps of one open `if`.
#[derive(Debug, Clone)]
pub(super) struct ConditionalFrame {
    false_jump: usize,
    exit_jump: Option<usize>,
}

/// One open `while`.
#[derive(Debug, Clone)]
pub(super) struct LoopFrame {
    start: usize,
    exit_jump: Option<usize>,
}

impl CodeGenerator {
    /// Pop a `Bool` condition and emit a `GOTOF` with an open target.
    fn conditional_jump(&mut self, construct: &str) -> Result<usize, CompileError> {
        self.execute_remaining()?;
        let condition = self.pop_operand()?;
        if condition.ty != ScalarType::Bool {
            return Err(self.mismatch(&condition.name, construct, "Bool"));
        }
        let index = self.emit(OpCode::GotoF, Some(condition.value_operand()), None, None)?;
        self.release(&condition)?;
        Ok(index)
    }

    // ─── if / else ────────────────────────────────────────────────────────

    pub fn open_conditional(&mut self) -> Result<(), CompileError> {
        let false_jump = self.conditional_jump("if")?;
        self.conditionals.push(ConditionalFrame {
            false_jump,
            exit_jump: None,
        });
        Ok(())
    }

    /// End the taken branch: jump over the else branch, and send the false
    /// edge just past that jump.
    ///
    /// An `else if` is an `open_conditional` inside the else branch; closing
    /// the chain closes every nested level, so all exits land after it.
    pub fn else_branch(&mut self) -> Result<(), CompileError> {
        let false_jump = match self.conditionals.last() {
            Some(frame) if frame.exit_jump.is_none() => frame.false_jump,
            Some(_) => return Err(self.internal("second else on one if")),
            None => return Err(self.internal("else without if")),
        };
        let exit = self.emit(OpCode::Goto, None, None, None)?;
        if let Some(frame) = self.conditionals.last_mut() {
            frame.exit_jump = Some(exit);
        }
        self.patch(false_jump, exit + 1)
    }

    pub fn close_conditional(&mut self) -> Result<(), CompileError> {
        let Some(frame) = self.conditionals.pop() else {
            return Err(self.internal("end of if without if"));
        };
        let target = self.next_quad();
        match frame.exit_jump {
            Some(exit) => self.patch(exit, target),
            None => self.patch(frame.false_jump, target),
        }
    }

    // ─── while ────────────────────────────────────────────────────────────

    /// Mark the first quad of the loop condition.
    pub fn save_loop_start(&mut self) {
        self.loops.push(LoopFrame {
            start: self.next_quad(),
            exit_jump: None,
        });
    }

    pub fn set_loop_condition(&mut self) -> Result<(), CompileError> {
        let exit = self.conditional_jump("while")?;
        match self.loops.last_mut() {
            Some(frame) => {
                frame.exit_jump = Some(exit);
                Ok(())
            }
            None => Err(self.internal("loop condition without loop start")),
        }
    }

    pub fn close_loop(&mut self) -> Result<(), CompileError> {
        let Some(frame) = self.loops.pop() else {
            return Err(self.internal("end of loop without loop start"));
        };
        let Some(exit) = frame.exit_jump else {
            return Err(self.internal("loop closed without a condition"));
        };
        let back = self.emit(OpCode::Goto, None, None, Some(Operand::Jump(frame.start)))?;
        self.patch(exit, back + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Event;
    use crate::bytecode::compile_error::CompileErrorKind;
    use crate::bytecode::{OpCode, Operand};
    use crate::lang::{ScalarType, Value};

    fn boolean(b: bool) -> Event {
        Event::PushConstant {
            value: Value::Bool(b),
        }
    }

    #[test]
    fn test_if_else_patching() {
        // if (false) { print 1 } else { print 2 }
        let mut body = vec![boolean(false), Event::OpenConditional];
        body.extend(print(vec![int(1)]));
        body.push(Event::ElseBranch);
        body.extend(print(vec![int(2)]));
        body.push(Event::CloseConditional);

        let (program, _) = compile(&main_with(body)).unwrap();
        let quads = &program.quad_list;
        // 0 GOTOF, 1 PRINT, 2 GOTO, 3 PRINT, 4 ENDFUNC
        assert_eq!(quads[0].op, OpCode::GotoF);
        assert_eq!(quads[0].jump_target(), Some(3));
        assert_eq!(quads[2].op, OpCode::Goto);
        assert_eq!(quads[2].jump_target(), Some(4));
    }

    #[test]
    fn test_if_without_else() {
        let mut body = vec![boolean(true), Event::OpenConditional];
        body.extend(print(vec![int(1)]));
        body.push(Event::CloseConditional);
        let (program, _) = compile(&main_with(body)).unwrap();
        assert_eq!(program.quad_list[0].jump_target(), Some(2));
    }

    #[test]
    fn test_else_if_chain_exits_after_chain() {
        // if (a) {p1} else if (b) {p2} else {p3}
        let mut body = vec![boolean(false), Event::OpenConditional];
        body.extend(print(vec![int(1)]));
        body.push(Event::ElseBranch);
        body.extend(vec![boolean(true), Event::OpenConditional]);
        body.extend(print(vec![int(2)]));
        body.push(Event::ElseBranch);
        body.extend(print(vec![int(3)]));
        body.push(Event::CloseConditional);
        body.push(Event::CloseConditional);

        let (program, _) = compile(&main_with(body)).unwrap();
        let quads = &program.quad_list;
        // 0 GOTOF 1 PRINT 2 GOTO 3 GOTOF 4 PRINT 5 GOTO 6 PRINT 7 ENDFUNC
        assert_eq!(quads[0].jump_target(), Some(3));
        assert_eq!(quads[2].jump_target(), Some(7));
        assert_eq!(quads[3].jump_target(), Some(6));
        assert_eq!(quads[5].jump_target(), Some(7));
    }

    #[test]
    fn test_while_loop_shape() {
        // while (i < 3) { i += 1 }
        let mut body = vec![declare("i", ScalarType::Int)];
        body.extend(assign("i", vec![int(0)]));
        body.push(Event::SaveLoopStart);
        body.extend(vec![var("i"), op("<"), int(3), Event::SetLoopCondition]);
        body.extend(vec![var("i"), op("+="), int(1), Event::ExecuteRemaining]);
        body.push(Event::CloseLoop);

        let (program, _) = compile(&main_with(body)).unwrap();
        let quads = &program.quad_list;
        // 0 ASSIGN 1 LT 2 GOTOF 3 ADD 4 ASSIGN 5 GOTO 6 ENDFUNC
        assert_eq!(quads[1].op, OpCode::LessThan);
        assert_eq!(quads[2].jump_target(), Some(6));
        assert_eq!(quads[5].result, Some(Operand::Jump(1)));
    }

    #[test]
    fn test_condition_must_be_bool() {
        let body = vec![int(1), Event::OpenConditional];
        assert_eq!(
            compile_err(&main_with(body)),
            CompileErrorKind::TypeMismatch {
                left: "1".into(),
                op: "if".into(),
                right: "Bool".into()
            }
        );
    }

    #[test]
    fn test_else_without_if() {
        let kind = compile_err(&main_with(vec![Event::ElseBranch]));
        assert!(matches!(kind, CompileErrorKind::Internal(_)));
    }

    #[test]
    fn test_unclosed_if_rejected() {
        let mut body = vec![boolean(true), Event::OpenConditional];
        body.extend(print(vec![int(1)]));
        let kind = compile_err(&main_with(body));
        assert!(matches!(kind, CompileErrorKind::Internal(msg) if msg.contains("if statement")));
    }

    #[test]
    fn test_unclosed_loop_rejected() {
        let mut body = vec![declare("i", ScalarType::Int)];
        body.push(Event::SaveLoopStart);
        body.extend(vec![var("i"), op("<"), int(3), Event::SetLoopCondition]);
        let kind = compile_err(&main_with(body));
        assert!(matches!(kind, CompileErrorKind::Internal(msg) if msg.contains("loop")));
    }
}
