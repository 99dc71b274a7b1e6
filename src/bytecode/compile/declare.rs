use super::tables::{ArrayDim, ClassInfo, Variable};
use super::CodeGenerator;
use crate::bytecode::compile_error::{CompileError, CompileErrorKind};
use crate::bytecode::ir::FunctionData;
use crate::lang::{ScalarType, Segment, TypeName, Value};
use log::debug;

/// What a type annotation currently being read applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTarget {
    /// Return type of the function being declared.
    Function,
    Param(String),
    Variable(String),
}

impl CodeGenerator {
    /// Apply a parsed type annotation to its target.
    pub fn set_type(&mut self, target: TypeTarget, ty: TypeName) -> Result<(), CompileError> {
        if !self.tables.type_exists(&ty) {
            return Err(self.error(CompileErrorKind::UndeclaredIdentifier(ty.to_string())));
        }
        match target {
            TypeTarget::Function => {
                let Some(function) = self.current_function.clone() else {
                    return Err(self.internal("return type outside of a function declaration"));
                };
                match self.program.function_data.get_mut(&function) {
                    Some(data) => data.return_type = Some(ty),
                    None => return Err(self.internal(format!("no data for '{}'", function))),
                }
                Ok(())
            }
            TypeTarget::Param(id) => self.bind_param(&id, ty),
            TypeTarget::Variable(id) => self.bind_variable(&id, ty),
        }
    }

    pub fn set_function_type(&mut self, ty: TypeName) -> Result<(), CompileError> {
        self.set_type(TypeTarget::Function, ty)
    }

    pub fn declare_param(&mut self, id: &str, ty: TypeName) -> Result<(), CompileError> {
        self.set_type(TypeTarget::Param(id.to_string()), ty)
    }

    pub fn declare_variable(&mut self, id: &str, ty: TypeName) -> Result<(), CompileError> {
        self.set_type(TypeTarget::Variable(id.to_string()), ty)
    }

    // ─── functions ────────────────────────────────────────────────────────

    /// Open a function body. Its first quad is the next one emitted.
    pub fn declare_function(&mut self, id: &str) -> Result<(), CompileError> {
        if let Some(open) = &self.current_function {
            return Err(self.internal(format!(
                "function '{}' declared inside '{}'",
                id, open
            )));
        }
        if self.program.function_data.contains_key(id) {
            return Err(self.error(CompileErrorKind::Redeclaration(id.to_string())));
        }

        let data = FunctionData::new(self.next_quad());
        self.program.function_data.insert(id.to_string(), data);
        self.current_function = Some(id.to_string());
        self.tables.locals.clear();
        self.returned = false;
        debug!("function '{}' starts at quad {}", id, self.next_quad());
        Ok(())
    }

    fn bind_param(&mut self, id: &str, ty: TypeName) -> Result<(), CompileError> {
        let Some(function) = self.current_function.clone() else {
            return Err(self.internal(format!("parameter '{}' outside of a function", id)));
        };
        if self.tables.locals.contains_key(id) {
            return Err(self.error(CompileErrorKind::Redeclaration(id.to_string())));
        }

        let address = self
            .allocator
            .allocate(ty.storage(), Segment::Local)
            .map_err(|e| self.error(e.into()))?;
        self.names.insert(address, id);
        self.tables
            .locals
            .insert(id.to_string(), Variable::new(address, ty.clone()));

        match self.program.function_data.get_mut(&function) {
            Some(data) => {
                data.param_types.push(ty);
                data.param_addresses.push(address);
                Ok(())
            }
            None => Err(self.internal(format!("no data for '{}'", function))),
        }
    }

    // ─── variables ────────────────────────────────────────────────────────

    fn bind_variable(&mut self, id: &str, ty: TypeName) -> Result<(), CompileError> {
        let segment = if self.current_function.is_some() {
            Segment::Local
        } else {
            Segment::Global
        };
        let scope = match segment {
            Segment::Local => &self.tables.locals,
            _ => &self.tables.globals,
        };
        if scope.contains_key(id) {
            return Err(self.error(CompileErrorKind::Redeclaration(id.to_string())));
        }

        let address = self
            .allocator
            .allocate(ty.storage(), segment)
            .map_err(|e| self.error(e.into()))?;
        self.names.insert(address, id);

        let variable = Variable::new(address, ty);
        match segment {
            Segment::Local => self.tables.locals.insert(id.to_string(), variable),
            _ => self.tables.globals.insert(id.to_string(), variable),
        };
        self.last_declared = Some(id.to_string());
        Ok(())
    }

    /// Add one dimension to the most recently declared variable.
    pub fn declare_array_dimension(&mut self, size: usize) -> Result<(), CompileError> {
        let id = self.last_declared_id()?;
        if size == 0 {
            return Err(self.error(CompileErrorKind::ArrayDimensionMissing {
                array: id,
                detail: "dimension size must be positive".to_string(),
            }));
        }
        match self.tables.variable_mut(&id) {
            Some(var) => {
                var.pending_dims.push(size);
                Ok(())
            }
            None => Err(self.error(CompileErrorKind::UndeclaredIdentifier(id))),
        }
    }

    /// Lay out the most recently declared array once all dimensions are
    /// known: a contiguous block plus size and multiplier constants.
    pub fn allocate_array(&mut self) -> Result<(), CompileError> {
        let id = self.last_declared_id()?;
        let Some(var) = self.tables.variable(&id) else {
            return Err(self.error(CompileErrorKind::UndeclaredIdentifier(id)));
        };
        if var.pending_dims.is_empty() || var.is_array() {
            return Err(self.error(CompileErrorKind::ArrayDimensionMissing {
                array: id,
                detail: "no dimensions declared".to_string(),
            }));
        }
        let sizes = var.pending_dims.clone();
        let old_address = var.address;
        let storage = var.ty.storage();

        let total = sizes.iter().product();
        let segment = self
            .allocator
            .segment_of(old_address)
            .unwrap_or(Segment::Global);
        self.allocator
            .release(old_address)
            .map_err(|e| self.error(e.into()))?;
        let base = self
            .allocator
            .allocate_block(storage, segment, total)
            .map_err(|e| self.error(e.into()))?;

        let mut dims = Vec::with_capacity(sizes.len());
        for (i, size) in sizes.iter().enumerate() {
            let size_const = self.constant(Value::Int(*size as i64))?;
            let multiplier_const = if i + 1 < sizes.len() {
                let multiplier: usize = sizes[i + 1..].iter().product();
                Some(self.constant(Value::Int(multiplier as i64))?)
            } else {
                None
            };
            dims.push(ArrayDim {
                size: *size,
                size_const,
                multiplier_const,
            });
        }

        self.names.insert(base, id.as_str());
        match self.tables.variable_mut(&id) {
            Some(var) => {
                var.address = base;
                var.pending_dims.clear();
                var.dims = dims;
            }
            None => return Err(self.error(CompileErrorKind::UndeclaredIdentifier(id))),
        }
        debug!("array '{}' at {} with {} cells", id, base, total);
        Ok(())
    }

    fn last_declared_id(&self) -> Result<String, CompileError> {
        match &self.last_declared {
            Some(id) => Ok(id.clone()),
            None => Err(self.internal("array dimension without a declared variable")),
        }
    }

    // ─── classes ──────────────────────────────────────────────────────────

    pub fn declare_class(&mut self, id: &str) -> Result<(), CompileError> {
        if self.current_class.is_some() || self.current_function.is_some() {
            return Err(self.internal(format!("class '{}' must be declared at top level", id)));
        }
        if self.tables.classes.contains_key(id) || ScalarType::from_keyword(id).is_some() {
            return Err(self.error(CompileErrorKind::Redeclaration(id.to_string())));
        }
        self.tables
            .classes
            .insert(id.to_string(), ClassInfo::default());
        self.current_class = Some(id.to_string());
        Ok(())
    }

    /// Fields may refer to their own class, allowing linked structures.
    pub fn declare_field(&mut self, id: &str, ty: TypeName) -> Result<(), CompileError> {
        let Some(class) = self.current_class.clone() else {
            return Err(self.internal(format!("field '{}' outside of a class", id)));
        };
        if !self.tables.type_exists(&ty) {
            return Err(self.error(CompileErrorKind::UndeclaredIdentifier(ty.to_string())));
        }
        let added = match self.tables.classes.get_mut(&class) {
            Some(info) => info.add_field(id, ty),
            None => return Err(self.internal(format!("class '{}' vanished", class))),
        };
        if !added {
            return Err(self.error(CompileErrorKind::Redeclaration(format!("{}.{}", class, id))));
        }
        Ok(())
    }

    pub fn end_class(&mut self) -> Result<(), CompileError> {
        match self.current_class.take() {
            Some(_) => Ok(()),
            None => Err(self.internal("end of class without a class")),
        }
    }
}
