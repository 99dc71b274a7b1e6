use super::{CodeGenerator, OperandEntry};
use crate::bytecode::compile_error::{CompileError, CompileErrorKind};
use crate::bytecode::{OpCode, Operand, cube};
use crate::lang::{ScalarType, Segment, TypeName};
use log::debug;

/// A call whose arguments are being compiled.
#[derive(Debug, Clone)]
pub(super) struct CallFrame {
    function: String,
    arguments: usize,
}

impl CodeGenerator {
    fn signature(&self, function: &str) -> Result<(Vec<TypeName>, Option<TypeName>), CompileError> {
        match self.program.function_data.get(function) {
            Some(data) => Ok((data.param_types.clone(), data.return_type.clone())),
            None => Err(self.error(CompileErrorKind::UndeclaredIdentifier(
                function.to_string(),
            ))),
        }
    }

    /// Whether a value of `found` may be stored in a slot declared `expected`.
    fn accepts(expected: &TypeName, found: &OperandEntry) -> bool {
        match expected {
            TypeName::Class(class) => found.class.as_deref() == Some(class.as_str()),
            TypeName::Scalar(ScalarType::Pointer) => {
                found.ty == ScalarType::Pointer && found.class.is_none()
            }
            TypeName::Scalar(ty) => cube::check(OpCode::Assign, *ty, found.ty).is_some(),
        }
    }

    // ─── call site ────────────────────────────────────────────────────────

    /// `ARE`: reserve the callee frame and open the argument list.
    pub fn call_function(&mut self, id: &str) -> Result<(), CompileError> {
        self.signature(id)?;
        self.emit(OpCode::Are, Some(Operand::Function(id.to_string())), None, None)?;
        self.calls.push(CallFrame {
            function: id.to_string(),
            arguments: 0,
        });
        self.open_parenthesis();
        Ok(())
    }

    /// `PARAM`: pass the finished argument expression as parameter `index`.
    pub fn push_call_argument(&mut self, index: usize) -> Result<(), CompileError> {
        self.execute_remaining()?;
        let argument = self.pop_operand()?;
        let Some(frame) = self.calls.last() else {
            return Err(self.internal("argument outside of a call"));
        };
        let function = frame.function.clone();
        let passed = frame.arguments;
        let (params, _) = self.signature(&function)?;

        // arguments arrive in order, each index exactly once
        if index != passed {
            return Err(self.error(CompileErrorKind::ArityMismatch {
                function,
                expected: params.len(),
                found: index.max(passed) + 1,
            }));
        }

        let Some(expected) = params.get(index) else {
            return Err(self.error(CompileErrorKind::ArityMismatch {
                function,
                expected: params.len(),
                found: index + 1,
            }));
        };
        if !Self::accepts(expected, &argument) {
            return Err(self.error(CompileErrorKind::ParameterTypeMismatch {
                function,
                index,
                expected: expected.to_string(),
                found: argument.type_name(),
            }));
        }

        self.emit(
            OpCode::Param,
            Some(argument.value_operand()),
            None,
            Some(Operand::Immediate(index)),
        )?;
        self.release(&argument)?;
        if let Some(frame) = self.calls.last_mut() {
            frame.arguments += 1;
        }
        Ok(())
    }

    /// `GOSUB`: close the argument list and transfer control.
    pub fn end_call(&mut self) -> Result<(), CompileError> {
        let Some(frame) = self.calls.pop() else {
            return Err(self.internal("end of call without a call"));
        };
        let (params, _) = self.signature(&frame.function)?;
        if frame.arguments != params.len() {
            return Err(self.error(CompileErrorKind::ArityMismatch {
                function: frame.function,
                expected: params.len(),
                found: frame.arguments,
            }));
        }
        self.close_parenthesis()?;
        self.emit(
            OpCode::GoSub,
            Some(Operand::Function(frame.function.clone())),
            None,
            None,
        )?;
        self.finished_call = Some(frame.function);
        Ok(())
    }

    /// `CALL_ASSIGN`: move the returned value into a temporary operand.
    pub fn push_call_result(&mut self) -> Result<(), CompileError> {
        let Some(function) = self.finished_call.take() else {
            return Err(self.internal("call result without a finished call"));
        };
        let (_, returns) = self.signature(&function)?;
        let Some(ty) = returns else {
            return Err(self.mismatch(&function, "call", "Void"));
        };

        let result = self.temporary(ty.storage())?;
        self.emit(
            OpCode::CallAssign,
            Some(Operand::Function(function.clone())),
            None,
            Some(Operand::Addr(result)),
        )?;
        self.push_entry(OperandEntry {
            address: result,
            ty: ty.storage(),
            class: ty.class().map(str::to_string),
            through: false,
            name: format!("{}()", function),
        });
        Ok(())
    }

    // ─── callee side ──────────────────────────────────────────────────────

    fn current_signature(&self) -> Result<(String, Option<TypeName>), CompileError> {
        let Some(function) = self.current_function.clone() else {
            return Err(self.internal("return outside of a function"));
        };
        let (_, returns) = self.signature(&function)?;
        Ok((function, returns))
    }

    /// `RETURN value` followed by `ENDFUNC`.
    pub fn return_value(&mut self) -> Result<(), CompileError> {
        let (function, returns) = self.current_signature()?;
        self.execute_remaining()?;
        let value = self.pop_operand()?;

        let Some(expected) = returns else {
            return Err(self.error(CompileErrorKind::InvalidReturn(format!(
                "void function '{}' cannot return a value",
                function
            ))));
        };
        if !Self::accepts(&expected, &value) {
            return Err(self.error(CompileErrorKind::InvalidReturn(format!(
                "'{}' must return {}, found {}",
                function,
                expected,
                value.type_name()
            ))));
        }

        self.emit(OpCode::Return, None, None, Some(value.value_operand()))?;
        self.release(&value)?;
        self.emit(OpCode::EndFunc, None, None, None)?;
        self.returned = true;
        Ok(())
    }

    pub fn return_void(&mut self) -> Result<(), CompileError> {
        let (function, returns) = self.current_signature()?;
        if let Some(expected) = returns {
            return Err(self.error(CompileErrorKind::InvalidReturn(format!(
                "'{}' must return {}",
                function, expected
            ))));
        }
        self.emit(OpCode::EndFunc, None, None, None)?;
        Ok(())
    }

    /// Close the body: final `ENDFUNC`, record frame sizes, free the scope.
    pub fn end_function(&mut self) -> Result<(), CompileError> {
        let (function, returns) = self.current_signature()?;
        if returns.is_some() && !self.returned {
            return Err(self.error(CompileErrorKind::InvalidReturn(format!(
                "'{}' never returns a value",
                function
            ))));
        }
        self.ensure_closed(&format!("'{}'", function))?;
        self.emit(OpCode::EndFunc, None, None, None)?;

        let mut counts = crate::bytecode::ir::SlotCounts::default();
        for ty in ScalarType::ALL {
            counts.local[ty.index()] = self.allocator.peak(Segment::Local, ty);
            counts.temporary[ty.index()] = self.allocator.peak(Segment::Temporary, ty);
        }
        match self.program.function_data.get_mut(&function) {
            Some(data) => data.slot_counts = counts,
            None => return Err(self.internal(format!("no data for '{}'", function))),
        }

        self.allocator.release_all_in_segment(Segment::Local);
        self.allocator.release_all_in_segment(Segment::Temporary);
        self.tables.locals.clear();
        self.current_function = None;
        self.last_declared = None;
        debug!("function '{}' closed", function);
        Ok(())
    }
}
