use super::types::ScalarType;
use serde::{Deserialize, Serialize};

/// Runtime value held in a storage slot.
///
/// Slots themselves are `Option<Value>`: `None` is an uninitialized slot or
/// a null pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// 64-bit signed integer.
    Int(i64),

    /// 64-bit floating-point number.
    Float(f64),

    Bool(bool),

    /// UTF-8 string value.
    String(String),

    /// Address of another slot: a heap cell when at or above the program's
    /// heap start, otherwise a segment slot.
    Pointer(usize),
}

impl Value {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Value::Int(_) => ScalarType::Int,
            Value::Float(_) => ScalarType::Float,
            Value::Bool(_) => ScalarType::Bool,
            Value::String(_) => ScalarType::String,
            Value::Pointer(_) => ScalarType::Pointer,
        }
    }

    /// Numeric view used by mixed Int/Float arithmetic.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Convert a value for storage in a slot of type `ty`.
    ///
    /// Only `Int -> Float` widening is performed; every other mismatch
    /// returns `None`.
    pub fn coerce_to(self, ty: ScalarType) -> Option<Value> {
        match (self, ty) {
            (Value::Int(n), ScalarType::Float) => Some(Value::Float(n as f64)),
            (v, ty) if v.scalar_type() == ty => Some(v),
            _ => None,
        }
    }

    /// Parse one line of input as a value of type `ty`.
    pub fn parse_as(text: &str, ty: ScalarType) -> Option<Value> {
        let text = text.trim_end_matches(['\n', '\r']);
        match ty {
            ScalarType::Int => text.trim().parse().ok().map(Value::Int),
            ScalarType::Float => text.trim().parse().ok().map(Value::Float),
            ScalarType::Bool => match text.trim() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            ScalarType::String => Some(Value::String(text.to_string())),
            ScalarType::Pointer => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{:.1}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bool(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::Pointer(p) => write!(f, "&{}", p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::String("hi".into()).to_string(), "hi");
    }

    #[test]
    fn test_coerce() {
        assert_eq!(Value::Int(2).coerce_to(ScalarType::Float), Some(Value::Float(2.0)));
        assert_eq!(Value::Float(2.5).coerce_to(ScalarType::Int), None);
        assert_eq!(Value::Bool(true).coerce_to(ScalarType::Bool), Some(Value::Bool(true)));
    }

    #[test]
    fn test_parse_as() {
        assert_eq!(Value::parse_as("42\n", ScalarType::Int), Some(Value::Int(42)));
        assert_eq!(Value::parse_as("4.5", ScalarType::Float), Some(Value::Float(4.5)));
        assert_eq!(Value::parse_as("yes", ScalarType::Bool), None);
        assert_eq!(
            Value::parse_as("hello world\r\n", ScalarType::String),
            Some(Value::String("hello world".into()))
        );
        assert_eq!(Value::parse_as("abc", ScalarType::Int), None);
    }
}
