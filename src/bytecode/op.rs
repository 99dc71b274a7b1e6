use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// OPCODES - operators and quadruple instructions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCode {
    // arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,

    // compound assignment (source-level only, lowered before emission)
    AddAssign,
    SubtractAssign,
    MultiplyAssign,
    DivideAssign,

    // comparison
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,

    // logic
    And,
    Or,

    // assignment
    Assign,
    PointerAssign,

    // pointers and arrays
    PointerAdd,
    DeleteRef,
    Verify,

    // jumps
    Goto,
    GotoF,

    // built-ins
    Print,
    Input,

    // call protocol
    Are,
    Param,
    GoSub,
    Return,
    EndFunc,
    CallAssign,
}

/// Dispatch family of an instruction inside the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    Arithmetic,
    PointerArithmetic,
    Array,
    Boolean,
    Jump,
    BuiltIn,
    Function,
    Assignment,
}

impl OpCode {
    /// Binding strength used by the operator-precedence reducer.
    ///
    /// Returns `None` for instructions that never sit on the operator stack.
    pub fn priority(self) -> Option<u8> {
        use OpCode::*;
        match self {
            Assign | AddAssign | SubtractAssign | MultiplyAssign | DivideAssign => Some(0),
            And | Or => Some(1),
            Equal | NotEqual | LessThan | GreaterThan | LessEqual | GreaterEqual => Some(2),
            Add | Subtract => Some(3),
            Multiply | Divide => Some(4),
            _ => None,
        }
    }

    pub fn class(self) -> Option<OpClass> {
        use OpCode::*;
        match self {
            Add | Subtract | Multiply | Divide => Some(OpClass::Arithmetic),
            PointerAdd | PointerAssign | DeleteRef => Some(OpClass::PointerArithmetic),
            Verify => Some(OpClass::Array),
            Equal | NotEqual | LessThan | GreaterThan | LessEqual | GreaterEqual | And | Or => {
                Some(OpClass::Boolean)
            }
            Goto | GotoF => Some(OpClass::Jump),
            Print | Input => Some(OpClass::BuiltIn),
            Are | Param | GoSub | Return | EndFunc | CallAssign => Some(OpClass::Function),
            Assign => Some(OpClass::Assignment),
            AddAssign | SubtractAssign | MultiplyAssign | DivideAssign => None,
        }
    }

    /// The plain operator a compound assignment expands to.
    pub fn compound_base(self) -> Option<OpCode> {
        match self {
            OpCode::AddAssign => Some(OpCode::Add),
            OpCode::SubtractAssign => Some(OpCode::Subtract),
            OpCode::MultiplyAssign => Some(OpCode::Multiply),
            OpCode::DivideAssign => Some(OpCode::Divide),
            _ => None,
        }
    }

    /// Parse a source operator symbol.
    pub fn from_symbol(symbol: &str) -> Option<OpCode> {
        use OpCode::*;
        let op = match symbol {
            "+" => Add,
            "-" => Subtract,
            "*" => Multiply,
            "/" => Divide,
            "+=" => AddAssign,
            "-=" => SubtractAssign,
            "*=" => MultiplyAssign,
            "/=" => DivideAssign,
            "==" => Equal,
            "!=" => NotEqual,
            "<" => LessThan,
            ">" => GreaterThan,
            "<=" => LessEqual,
            ">=" => GreaterEqual,
            "&&" => And,
            "||" => Or,
            "=" => Assign,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(self) -> &'static str {
        use OpCode::*;
        match self {
            Add => "+",
            Subtract => "-",
            Multiply => "*",
            Divide => "/",
            AddAssign => "+=",
            SubtractAssign => "-=",
            MultiplyAssign => "*=",
            DivideAssign => "/=",
            Equal => "==",
            NotEqual => "!=",
            LessThan => "<",
            GreaterThan => ">",
            LessEqual => "<=",
            GreaterEqual => ">=",
            And => "&&",
            Or => "||",
            Assign => "=",
            PointerAssign => "POINTER_ASSIGN",
            PointerAdd => "POINTER_ADD",
            DeleteRef => "DELETE_REF",
            Verify => "VERIFY",
            Goto => "GOTO",
            GotoF => "GOTOF",
            Print => "PRINT",
            Input => "INPUT",
            Are => "ARE",
            Param => "PARAM",
            GoSub => "GOSUB",
            Return => "RETURN",
            EndFunc => "ENDFUNC",
            CallAssign => "CALL_ASSIGN",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

// =============================================================================
// OPERANDS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// A slot read or written directly.
    Addr(usize),
    /// A pointer slot acted on as itself (`&addr`).
    Ref(usize),
    /// The slot the pointer stored at `addr` points to (`*addr`).
    Deref(usize),
    /// Quad index.
    Jump(usize),
    /// Small literal carried in the instruction: offsets, sizes, indices.
    Immediate(usize),
    /// Callee name.
    Function(String),
    /// Request a fresh heap block.
    AllocHeap,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Addr(a) => write!(f, "{}", a),
            Operand::Ref(a) => write!(f, "&{}", a),
            Operand::Deref(a) => write!(f, "*{}", a),
            Operand::Jump(i) => write!(f, "@{}", i),
            Operand::Immediate(n) => write!(f, "#{}", n),
            Operand::Function(name) => write!(f, "{}", name),
            Operand::AllocHeap => write!(f, "HEAP"),
        }
    }
}

// =============================================================================
// QUADRUPLES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub op: OpCode,
    pub left: Option<Operand>,
    pub right: Option<Operand>,
    pub result: Option<Operand>,
}

impl Quad {
    pub fn new(
        op: OpCode,
        left: Option<Operand>,
        right: Option<Operand>,
        result: Option<Operand>,
    ) -> Self {
        Quad {
            op,
            left,
            right,
            result,
        }
    }

    /// Jump target of a `GOTO`/`GOTOF`, if already patched.
    pub fn jump_target(&self) -> Option<usize> {
        match (self.op, &self.result) {
            (OpCode::Goto | OpCode::GotoF, Some(Operand::Jump(target))) => Some(*target),
            _ => None,
        }
    }
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |o: &Option<Operand>| match o {
            Some(operand) => operand.to_string(),
            None => "-".to_string(),
        };
        write!(
            f,
            "({}, {}, {}, {})",
            self.op,
            show(&self.left),
            show(&self.right),
            show(&self.result)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities_increase_with_binding() {
        assert!(OpCode::Assign.priority() < OpCode::Or.priority());
        assert!(OpCode::Or.priority() < OpCode::LessThan.priority());
        assert!(OpCode::LessThan.priority() < OpCode::Add.priority());
        assert!(OpCode::Add.priority() < OpCode::Divide.priority());
        assert_eq!(OpCode::GoSub.priority(), None);
    }

    #[test]
    fn test_symbols_round_trip() {
        for symbol in ["+", "-=", "<=", "&&", "="] {
            assert_eq!(OpCode::from_symbol(symbol).unwrap().symbol(), symbol);
        }
        assert_eq!(OpCode::from_symbol("%"), None);
    }

    #[test]
    fn test_compound_ops_have_no_class() {
        assert_eq!(OpCode::AddAssign.class(), None);
        assert_eq!(OpCode::AddAssign.compound_base(), Some(OpCode::Add));
        assert_eq!(OpCode::Verify.class(), Some(OpClass::Array));
    }

    #[test]
    fn test_quad_display() {
        let quad = Quad::new(
            OpCode::PointerAdd,
            Some(Operand::Ref(5)),
            Some(Operand::Immediate(2)),
            Some(Operand::Ref(9)),
        );
        assert_eq!(quad.to_string(), "(POINTER_ADD, &5, #2, &9)");
    }
}
