use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// SCALAR TYPES
// =============================================================================

/// The storage type of a single slot.
///
/// The declaration order is also the order of the per-type ranges inside
/// every segment of the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScalarType {
    Int,
    Float,
    Bool,
    String,
    Pointer,
}

impl ScalarType {
    pub const ALL: [ScalarType; 5] = [
        ScalarType::Int,
        ScalarType::Float,
        ScalarType::Bool,
        ScalarType::String,
        ScalarType::Pointer,
    ];

    /// Position of this type inside a segment, used to index per-type tables.
    pub fn index(self) -> usize {
        match self {
            ScalarType::Int => 0,
            ScalarType::Float => 1,
            ScalarType::Bool => 2,
            ScalarType::String => 3,
            ScalarType::Pointer => 4,
        }
    }

    /// Parse a source-level type keyword.
    pub fn from_keyword(word: &str) -> Option<ScalarType> {
        match word {
            "Int" => Some(ScalarType::Int),
            "Float" => Some(ScalarType::Float),
            "Bool" => Some(ScalarType::Bool),
            "String" => Some(ScalarType::String),
            "Pointer" => Some(ScalarType::Pointer),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Int => "Int",
            ScalarType::Float => "Float",
            ScalarType::Bool => "Bool",
            ScalarType::String => "String",
            ScalarType::Pointer => "Pointer",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// SEGMENTS
// =============================================================================

/// A named partition of the virtual address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Segment {
    Global,
    Local,
    Temporary,
    Constant,
}

impl Segment {
    pub const ALL: [Segment; 4] = [
        Segment::Global,
        Segment::Local,
        Segment::Temporary,
        Segment::Constant,
    ];

    pub fn index(self) -> usize {
        match self {
            Segment::Global => 0,
            Segment::Local => 1,
            Segment::Temporary => 2,
            Segment::Constant => 3,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Segment::Global => "global",
            Segment::Local => "local",
            Segment::Temporary => "temporary",
            Segment::Constant => "constant",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// DECLARED TYPES
// =============================================================================

/// A type as written in a declaration.
///
/// Class-typed variables occupy a single `Pointer` slot; the class name
/// travels alongside so field accesses and assignments can be checked.
/// Serialized as the bare type keyword or class name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TypeName {
    Scalar(ScalarType),
    Class(String),
}

impl TypeName {
    /// The slot type used to store a value of this type.
    pub fn storage(&self) -> ScalarType {
        match self {
            TypeName::Scalar(ty) => *ty,
            TypeName::Class(_) => ScalarType::Pointer,
        }
    }

    pub fn class(&self) -> Option<&str> {
        match self {
            TypeName::Scalar(_) => None,
            TypeName::Class(name) => Some(name),
        }
    }

    /// Parse a type keyword; anything that is not a scalar keyword is a class.
    pub fn parse(word: &str) -> TypeName {
        match ScalarType::from_keyword(word) {
            Some(ty) => TypeName::Scalar(ty),
            None => TypeName::Class(word.to_string()),
        }
    }
}

impl From<String> for TypeName {
    fn from(word: String) -> Self {
        TypeName::parse(&word)
    }
}

impl From<TypeName> for String {
    fn from(ty: TypeName) -> Self {
        ty.to_string()
    }
}

impl From<ScalarType> for TypeName {
    fn from(ty: ScalarType) -> Self {
        TypeName::Scalar(ty)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeName::Scalar(ty) => write!(f, "{}", ty),
            TypeName::Class(name) => write!(f, "{}", name),
        }
    }
}
