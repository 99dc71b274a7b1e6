use crate::lang::{ScalarType, TypeName};
use std::collections::HashMap;

/// One declared dimension of an array variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayDim {
    pub size: usize,
    /// Constant slot holding `size`, checked by `VERIFY`.
    pub size_const: usize,
    /// Constant slot holding the suffix product of the later dimensions.
    /// `None` for the last dimension.
    pub multiplier_const: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Slot of the variable, or of the first element for arrays.
    pub address: usize,
    pub ty: TypeName,
    /// Sizes declared but not yet laid out.
    pub pending_dims: Vec<usize>,
    pub dims: Vec<ArrayDim>,
}

impl Variable {
    pub fn new(address: usize, ty: TypeName) -> Self {
        Variable {
            address,
            ty,
            pending_dims: Vec::new(),
            dims: Vec::new(),
        }
    }

    pub fn is_array(&self) -> bool {
        !self.dims.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassInfo {
    fields: Vec<(String, TypeName)>,
}

impl ClassInfo {
    /// Number of heap cells an instance occupies.
    pub fn size(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, name: &str) -> Option<(usize, &TypeName)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, (field, _))| field == name)
            .map(|(offset, (_, ty))| (offset, ty))
    }

    /// Returns false when the field already exists.
    pub fn add_field(&mut self, name: &str, ty: TypeName) -> bool {
        if self.field(name).is_some() {
            return false;
        }
        self.fields.push((name.to_string(), ty));
        true
    }
}

/// Name lookup for the code generator: variables, classes and constants.
#[derive(Debug, Default)]
pub struct SymbolTables {
    pub globals: HashMap<String, Variable>,
    pub locals: HashMap<String, Variable>,
    pub classes: HashMap<String, ClassInfo>,
    /// Literal key -> constant slot, so each literal is stored once.
    pub constants: HashMap<(ScalarType, String), usize>,
}

impl SymbolTables {
    /// Locals shadow globals.
    pub fn variable(&self, id: &str) -> Option<&Variable> {
        self.locals.get(id).or_else(|| self.globals.get(id))
    }

    pub fn variable_mut(&mut self, id: &str) -> Option<&mut Variable> {
        match self.locals.get_mut(id) {
            Some(var) => Some(var),
            None => self.globals.get_mut(id),
        }
    }

    /// A class-typed declaration must name a known class.
    pub fn type_exists(&self, ty: &TypeName) -> bool {
        match ty {
            TypeName::Scalar(_) => true,
            TypeName::Class(name) => self.classes.contains_key(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_offsets_follow_declaration_order() {
        let mut class = ClassInfo::default();
        assert!(class.add_field("value", TypeName::Scalar(ScalarType::Int)));
        assert!(class.add_field("next", TypeName::Class("Node".into())));
        assert!(!class.add_field("value", TypeName::Scalar(ScalarType::Float)));

        assert_eq!(class.size(), 2);
        assert_eq!(class.field("next").map(|(offset, _)| offset), Some(1));
        assert!(class.field("missing").is_none());
    }

    #[test]
    fn test_locals_shadow_globals() {
        let mut tables = SymbolTables::default();
        tables
            .globals
            .insert("x".into(), Variable::new(1, ScalarType::Int.into()));
        tables
            .locals
            .insert("x".into(), Variable::new(50, ScalarType::Float.into()));
        assert_eq!(tables.variable("x").map(|v| v.address), Some(50));

        tables.locals.clear();
        assert_eq!(tables.variable("x").map(|v| v.address), Some(1));
        assert!(tables.variable("y").is_none());
    }
}
