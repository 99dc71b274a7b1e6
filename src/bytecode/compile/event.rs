use super::CodeGenerator;
use crate::bytecode::OpCode;
use crate::bytecode::compile_error::CompileError;
use crate::lang::{ScalarType, TypeName, Value};
use log::warn;
use serde::{Deserialize, Serialize};

/// One semantic action reported by a front-end.
///
/// In JSON each event is an object tagged by `"event"`, e.g.
/// `{"event": "declare_variable", "id": "x", "type": "Int"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    // declarations
    DeclareClass {
        id: String,
    },
    DeclareField {
        id: String,
        #[serde(rename = "type")]
        ty: TypeName,
    },
    EndClass,
    DeclareFunction {
        id: String,
    },
    SetFunctionType {
        #[serde(rename = "type")]
        ty: TypeName,
    },
    DeclareParam {
        id: String,
        #[serde(rename = "type")]
        ty: TypeName,
    },
    DeclareVariable {
        id: String,
        #[serde(rename = "type")]
        ty: TypeName,
    },
    DeclareArrayDimension {
        size: usize,
    },
    AllocateArray,
    EndFunction,

    // expressions
    PushVariable {
        id: String,
    },
    PushOperand {
        address: usize,
        #[serde(rename = "type")]
        ty: ScalarType,
        #[serde(default)]
        class: Option<String>,
    },
    PushConstant {
        value: Value,
    },
    PushOperator {
        op: String,
    },
    OpenParenthesis,
    CloseParenthesis,
    Reduce {
        priority: u8,
    },
    ExecuteRemaining,

    // control flow
    OpenConditional,
    ElseBranch,
    CloseConditional,
    SaveLoopStart,
    SetLoopCondition,
    CloseLoop,

    // calls
    CallFunction {
        id: String,
    },
    PushCallArgument {
        index: usize,
    },
    EndCall,
    PushCallResult,
    ReturnValue,
    ReturnVoid,

    // arrays and objects
    PushArray {
        id: String,
    },
    PushArrayIndex,
    CloseArrayAccess,
    PushObject {
        id: String,
    },
    PushProperty {
        name: String,
    },
    NewObject {
        class: String,
    },
    DeleteObject,

    // built-ins
    Print,
    Input {
        #[serde(default)]
        prompt: Option<String>,
    },
}

/// Parse a JSON array of events.
pub fn parse_events(json: &str) -> Result<Vec<Event>, serde_json::Error> {
    serde_json::from_str(json)
}

impl CodeGenerator {
    /// Dispatch one event to its entry point.
    pub fn apply(&mut self, event: &Event) -> Result<(), CompileError> {
        if !matches!(event, Event::PushCallResult) {
            if let Some(function) = self.finished_call.take() {
                let returns = self
                    .program
                    .function_data
                    .get(&function)
                    .and_then(|data| data.return_type.as_ref());
                if let Some(ty) = returns {
                    warn!("{} result of '{}' is discarded", ty, function);
                }
            }
        }

        match event {
            Event::DeclareClass { id } => self.declare_class(id),
            Event::DeclareField { id, ty } => self.declare_field(id, ty.clone()),
            Event::EndClass => self.end_class(),
            Event::DeclareFunction { id } => self.declare_function(id),
            Event::SetFunctionType { ty } => self.set_function_type(ty.clone()),
            Event::DeclareParam { id, ty } => self.declare_param(id, ty.clone()),
            Event::DeclareVariable { id, ty } => self.declare_variable(id, ty.clone()),
            Event::DeclareArrayDimension { size } => self.declare_array_dimension(*size),
            Event::AllocateArray => self.allocate_array(),
            Event::EndFunction => self.end_function(),

            Event::PushVariable { id } => self.push_variable(id),
            Event::PushOperand { address, ty, class } => {
                self.push_operand(*address, *ty, class.clone())
            }
            Event::PushConstant { value } => self.push_constant(value.clone()),
            Event::PushOperator { op } => match OpCode::from_symbol(op) {
                Some(code) => self.push_operator(code),
                None => Err(self.internal(format!("unknown operator '{}'", op))),
            },
            Event::OpenParenthesis => {
                self.open_parenthesis();
                Ok(())
            }
            Event::CloseParenthesis => self.close_parenthesis(),
            Event::Reduce { priority } => self.execute_if_possible(*priority),
            Event::ExecuteRemaining => self.execute_remaining(),

            Event::OpenConditional => self.open_conditional(),
            Event::ElseBranch => self.else_branch(),
            Event::CloseConditional => self.close_conditional(),
            Event::SaveLoopStart => {
                self.save_loop_start();
                Ok(())
            }
            Event::SetLoopCondition => self.set_loop_condition(),
            Event::CloseLoop => self.close_loop(),

            Event::CallFunction { id } => self.call_function(id),
            Event::PushCallArgument { index } => self.push_call_argument(*index),
            Event::EndCall => self.end_call(),
            Event::PushCallResult => self.push_call_result(),
            Event::ReturnValue => self.return_value(),
            Event::ReturnVoid => self.return_void(),

            Event::PushArray { id } => self.push_array(id),
            Event::PushArrayIndex => self.push_array_index(),
            Event::CloseArrayAccess => self.close_array_access(),
            Event::PushObject { id } => self.push_object(id),
            Event::PushProperty { name } => self.push_property(name),
            Event::NewObject { class } => self.new_object(class),
            Event::DeleteObject => self.delete_object(),

            Event::Print => self.print(),
            Event::Input { prompt } => self.input(prompt.as_deref()),
        }
    }
}
