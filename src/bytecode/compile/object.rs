use super::{CodeGenerator, OperandEntry};
use crate::bytecode::compile_error::{CompileError, CompileErrorKind};
use crate::bytecode::{OpCode, Operand};
use crate::lang::ScalarType;

impl CodeGenerator {
    /// Push an object variable as the base of a field access, `new` or
    /// `delete`.
    pub fn push_object(&mut self, id: &str) -> Result<(), CompileError> {
        let is_object = match self.tables.variable(id) {
            Some(var) => var.ty.class().is_some(),
            None => {
                return Err(self.error(CompileErrorKind::UndeclaredIdentifier(id.to_string())));
            }
        };
        if !is_object {
            return Err(self.error(CompileErrorKind::ClassTypeMismatch {
                expected: "an object".to_string(),
                found: id.to_string(),
            }));
        }
        self.push_variable(id)
    }

    fn pop_object(&mut self) -> Result<(OperandEntry, String), CompileError> {
        let entry = self.pop_operand()?;
        match entry.class.clone() {
            Some(class) if entry.ty == ScalarType::Pointer => Ok((entry, class)),
            _ => Err(self.error(CompileErrorKind::ClassTypeMismatch {
                expected: "an object".to_string(),
                found: entry.type_name(),
            })),
        }
    }

    /// `POINTER_ADD object offset`: replace the object on top of the stack
    /// with a through-pointer to its field `name`.
    pub fn push_property(&mut self, name: &str) -> Result<(), CompileError> {
        let (object, class) = self.pop_object()?;
        let Some((offset, field_ty)) = self
            .tables
            .classes
            .get(&class)
            .and_then(|info| info.field(name))
            .map(|(offset, ty)| (offset, ty.clone()))
        else {
            return Err(self.error(CompileErrorKind::ClassFieldNotFound {
                class,
                field: name.to_string(),
            }));
        };

        let field = self.temporary(ScalarType::Pointer)?;
        self.emit(
            OpCode::PointerAdd,
            Some(object.pointer_operand()),
            Some(Operand::Immediate(offset)),
            Some(Operand::Ref(field)),
        )?;
        self.release(&object)?;

        self.push_entry(OperandEntry {
            address: field,
            ty: field_ty.storage(),
            class: field_ty.class().map(str::to_string),
            through: true,
            name: format!("{}.{}", object.name, name),
        });
        Ok(())
    }

    /// `POINTER_ASSIGN HEAP size`: point the object on top of the stack at a
    /// fresh heap block sized for `class`.
    pub fn new_object(&mut self, class: &str) -> Result<(), CompileError> {
        let Some(size) = self.tables.classes.get(class).map(|info| info.size()) else {
            return Err(self.error(CompileErrorKind::UndeclaredIdentifier(class.to_string())));
        };
        let (target, target_class) = self.pop_object()?;
        if target_class != class {
            return Err(self.error(CompileErrorKind::ClassTypeMismatch {
                expected: target_class,
                found: class.to_string(),
            }));
        }
        self.emit(
            OpCode::PointerAssign,
            Some(Operand::AllocHeap),
            Some(Operand::Immediate(size)),
            Some(target.pointer_operand()),
        )?;
        self.release(&target)
    }

    /// `DELETE_REF`: release the object on top of the stack and everything
    /// it owns.
    pub fn delete_object(&mut self) -> Result<(), CompileError> {
        let (target, _) = self.pop_object()?;
        self.emit(OpCode::DeleteRef, None, None, Some(target.pointer_operand()))?;
        self.release(&target)
    }
}
