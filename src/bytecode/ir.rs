use crate::bytecode::Quad;
use crate::lang::{ScalarType, TypeName, Value};
use crate::memory::{LayoutConfig, MemoryLayout};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Name of the entry-point function.
pub const MAIN: &str = "main";

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("binary program encoding: {0}")]
    Binary(#[from] postcard::Error),

    #[error("cannot encode program as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Slots a frame needs, per scalar type.
///
/// For the global frame only `local` is used and holds the `Global`
/// segment counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCounts {
    pub local: [usize; 5],
    pub temporary: [usize; 5],
}

impl SlotCounts {
    pub fn local(&self, ty: ScalarType) -> usize {
        self.local[ty.index()]
    }

    pub fn temporary(&self, ty: ScalarType) -> usize {
        self.temporary[ty.index()]
    }

    pub fn total(&self, ty: ScalarType) -> usize {
        self.local(ty) + self.temporary(ty)
    }
}

/// Per-function metadata, fixed once the body has been compiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionData {
    pub start_quad: usize,
    /// `None` for void functions.
    pub return_type: Option<TypeName>,
    pub param_types: Vec<TypeName>,
    pub param_addresses: Vec<usize>,
    pub slot_counts: SlotCounts,
}

impl FunctionData {
    pub fn new(start_quad: usize) -> Self {
        FunctionData {
            start_quad,
            return_type: None,
            param_types: Vec::new(),
            param_addresses: Vec::new(),
            slot_counts: SlotCounts::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub value: Value,
    pub ty: ScalarType,
}

/// A compiled quadruple program: the compiler/VM boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Segment sizes the addresses were allocated against.
    pub layout: LayoutConfig,
    pub constant_table: BTreeMap<usize, Constant>,
    pub function_data: BTreeMap<String, FunctionData>,
    pub globals: SlotCounts,
    pub quad_list: Vec<Quad>,
    pub heap_start: usize,
}

impl Program {
    pub fn new(layout: LayoutConfig) -> Self {
        let heap_start = MemoryLayout::new(layout.clone()).heap_start();
        Program {
            layout,
            constant_table: BTreeMap::new(),
            function_data: BTreeMap::new(),
            globals: SlotCounts::default(),
            quad_list: Vec::new(),
            heap_start,
        }
    }

    pub fn memory_layout(&self) -> MemoryLayout {
        MemoryLayout::new(self.layout.clone())
    }

    pub fn main(&self) -> Option<&FunctionData> {
        self.function_data.get(MAIN)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProgramError> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProgramError> {
        Ok(postcard::from_bytes(bytes)?)
    }

    pub fn to_json(&self) -> Result<String, ProgramError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{OpCode, Operand};

    fn sample() -> Program {
        let mut program = Program::new(LayoutConfig::uniform(10));
        program.constant_table.insert(
            150,
            Constant {
                value: Value::Int(3),
                ty: ScalarType::Int,
            },
        );
        let mut main = FunctionData::new(0);
        main.slot_counts.local[ScalarType::Int.index()] = 2;
        program.function_data.insert(MAIN.to_string(), main);
        program.quad_list.push(Quad::new(
            OpCode::Print,
            None,
            None,
            Some(Operand::Addr(150)),
        ));
        program
            .quad_list
            .push(Quad::new(OpCode::EndFunc, None, None, None));
        program
    }

    #[test]
    fn test_heap_start_follows_layout() {
        let program = Program::new(LayoutConfig::uniform(10));
        assert_eq!(program.heap_start, 200);
        assert_eq!(program.memory_layout().heap_start(), 200);
    }

    #[test]
    fn test_binary_encoding_preserves_program() {
        let program = sample();
        let bytes = program.to_bytes().unwrap();
        assert_eq!(Program::from_bytes(&bytes).unwrap(), program);
    }

    #[test]
    fn test_json_dump_names_sections() {
        let json = sample().to_json().unwrap();
        assert!(json.contains("constant_table"));
        assert!(json.contains("quad_list"));
        assert!(json.contains("heap_start"));
    }

    #[test]
    fn test_truncated_bytes_fail() {
        let bytes = sample().to_bytes().unwrap();
        assert!(Program::from_bytes(&bytes[..bytes.len() / 2]).is_err());
    }
}
