//! The type cube: result type of every legal `(operator, left, right)`.

use crate::bytecode::OpCode;
use crate::lang::ScalarType;

/// Result type of `left op right`, or `None` when the combination is illegal.
///
/// For `=` the left side is the assignment target.
pub fn check(op: OpCode, left: ScalarType, right: ScalarType) -> Option<ScalarType> {
    use OpCode::*;
    use ScalarType::*;

    match op {
        Add | Subtract | Multiply | Divide | AddAssign | SubtractAssign | MultiplyAssign
        | DivideAssign => match (left, right) {
            (Int, Int) => Some(Int),
            (Int | Float, Int | Float) => Some(Float),
            _ => None,
        },

        LessThan | GreaterThan | LessEqual | GreaterEqual => match (left, right) {
            (Int | Float, Int | Float) => Some(Bool),
            _ => None,
        },

        Equal | NotEqual => match (left, right) {
            (Int | Float, Int | Float) | (Bool, Bool) => Some(Bool),
            _ => None,
        },

        And | Or => match (left, right) {
            (Bool, Bool) => Some(Bool),
            _ => None,
        },

        Assign => match (left, right) {
            (Float, Int) => Some(Float),
            (l, r) if l == r => Some(l),
            _ => None,
        },

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OpCode::*;
    use ScalarType::*;

    const OPERATORS: [OpCode; 17] = [
        Add,
        Subtract,
        Multiply,
        Divide,
        AddAssign,
        SubtractAssign,
        MultiplyAssign,
        DivideAssign,
        Equal,
        NotEqual,
        LessThan,
        GreaterThan,
        LessEqual,
        GreaterEqual,
        And,
        Or,
        Assign,
    ];

    /// Every legal combination, written out longhand.
    fn documented() -> Vec<(OpCode, ScalarType, ScalarType, ScalarType)> {
        let mut table = Vec::new();
        for op in [
            Add,
            Subtract,
            Multiply,
            Divide,
            AddAssign,
            SubtractAssign,
            MultiplyAssign,
            DivideAssign,
        ] {
            table.push((op, Int, Int, Int));
            table.push((op, Int, Float, Float));
            table.push((op, Float, Int, Float));
            table.push((op, Float, Float, Float));
        }
        for op in [Equal, NotEqual, LessThan, GreaterThan, LessEqual, GreaterEqual] {
            table.push((op, Int, Int, Bool));
            table.push((op, Int, Float, Bool));
            table.push((op, Float, Int, Bool));
            table.push((op, Float, Float, Bool));
        }
        table.push((Equal, Bool, Bool, Bool));
        table.push((NotEqual, Bool, Bool, Bool));
        table.push((And, Bool, Bool, Bool));
        table.push((Or, Bool, Bool, Bool));
        table.push((Assign, Int, Int, Int));
        table.push((Assign, Float, Float, Float));
        table.push((Assign, Float, Int, Float));
        table.push((Assign, Bool, Bool, Bool));
        table.push((Assign, String, String, String));
        table.push((Assign, Pointer, Pointer, Pointer));
        table
    }

    #[test]
    fn test_cube_is_total() {
        let table = documented();
        for op in OPERATORS {
            for left in ScalarType::ALL {
                for right in ScalarType::ALL {
                    let expected = table
                        .iter()
                        .find(|(o, l, r, _)| *o == op && *l == left && *r == right)
                        .map(|(_, _, _, result)| *result);
                    assert_eq!(
                        check(op, left, right),
                        expected,
                        "{} {} {}",
                        left,
                        op,
                        right
                    );
                }
            }
        }
    }

    #[test]
    fn test_narrowing_assignment_rejected() {
        assert_eq!(check(Assign, Int, Float), None);
    }

    #[test]
    fn test_instructions_have_no_entry() {
        assert_eq!(check(Goto, Int, Int), None);
        assert_eq!(check(PointerAdd, Pointer, Int), None);
    }
}
