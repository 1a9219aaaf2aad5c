//! Element types and their mapping onto host array classes.

use mexpipe_abi::{MxClassId, TYPE_CODE_FLOAT, TYPE_CODE_INT, TYPE_CODE_UINT};
use std::fmt;

/// Numeric kind of a pipeline element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    /// Signed integer
    Int,
    /// Unsigned integer
    UInt,
    /// IEEE float
    Float,
}

impl TypeCode {
    /// Convert a metadata type code. Handles and unknown codes yield `None`.
    pub fn from_raw(code: i32) -> Option<Self> {
        match code {
            TYPE_CODE_INT => Some(TypeCode::Int),
            TYPE_CODE_UINT => Some(TypeCode::UInt),
            TYPE_CODE_FLOAT => Some(TypeCode::Float),
            _ => None,
        }
    }
}

/// Element type of a pipeline argument: kind plus width in bits.
///
/// A width of 1 is a boolean whatever the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementType {
    pub code: TypeCode,
    pub bits: u8,
}

impl ElementType {
    pub const fn new(code: TypeCode, bits: u8) -> Self {
        Self { code, bits }
    }

    pub const fn int(bits: u8) -> Self {
        Self::new(TypeCode::Int, bits)
    }

    pub const fn uint(bits: u8) -> Self {
        Self::new(TypeCode::UInt, bits)
    }

    pub const fn float(bits: u8) -> Self {
        Self::new(TypeCode::Float, bits)
    }

    pub const fn bool() -> Self {
        Self::new(TypeCode::UInt, 1)
    }

    pub fn is_bool(&self) -> bool {
        self.bits == 1
    }

    /// Whether the pair is one the marshaling layer can represent.
    pub fn is_supported(&self) -> bool {
        classify(*self) != MxClassId::Unknown
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bool() {
            return write!(f, "bool");
        }
        match self.code {
            TypeCode::Int => write!(f, "int{}", self.bits),
            TypeCode::UInt => write!(f, "uint{}", self.bits),
            TypeCode::Float => write!(f, "float{}", self.bits),
        }
    }
}

/// Host class holding elements of `ty`, or `Unknown` when there is none.
pub fn classify(ty: ElementType) -> MxClassId {
    match ty.code {
        TypeCode::Int => match ty.bits {
            1 => MxClassId::Logical,
            8 => MxClassId::Int8,
            16 => MxClassId::Int16,
            32 => MxClassId::Int32,
            64 => MxClassId::Int64,
            _ => MxClassId::Unknown,
        },
        TypeCode::UInt => match ty.bits {
            1 => MxClassId::Logical,
            8 => MxClassId::UInt8,
            16 => MxClassId::UInt16,
            32 => MxClassId::UInt32,
            64 => MxClassId::UInt64,
            _ => MxClassId::Unknown,
        },
        TypeCode::Float => match ty.bits {
            32 => MxClassId::Single,
            64 => MxClassId::Double,
            _ => MxClassId::Unknown,
        },
    }
}

/// Display name of a host class, as the host itself spells it.
pub fn class_name(id: MxClassId) -> &'static str {
    match id {
        MxClassId::Cell => "cell",
        MxClassId::Struct => "struct",
        MxClassId::Logical => "logical",
        MxClassId::Char => "char",
        MxClassId::Void => "void",
        MxClassId::Double => "double",
        MxClassId::Single => "single",
        MxClassId::Int8 => "int8",
        MxClassId::UInt8 => "uint8",
        MxClassId::Int16 => "int16",
        MxClassId::UInt16 => "uint16",
        MxClassId::Int32 => "int32",
        MxClassId::UInt32 => "uint32",
        MxClassId::Int64 => "int64",
        MxClassId::UInt64 => "uint64",
        MxClassId::Function => "function",
        MxClassId::Opaque => "opaque",
        MxClassId::Object => "object",
        MxClassId::Unknown => "unknown",
    }
}

/// Whether a class stores real numbers (integers or floats).
pub fn is_numeric_class(id: MxClassId) -> bool {
    matches!(
        id,
        MxClassId::Double
            | MxClassId::Single
            | MxClassId::Int8
            | MxClassId::UInt8
            | MxClassId::Int16
            | MxClassId::UInt16
            | MxClassId::Int32
            | MxClassId::UInt32
            | MxClassId::Int64
            | MxClassId::UInt64
    )
}

/// Bytes per element for classes with fixed-size storage.
pub fn class_element_size(id: MxClassId) -> Option<usize> {
    match id {
        MxClassId::Logical | MxClassId::Int8 | MxClassId::UInt8 => Some(1),
        MxClassId::Char | MxClassId::Int16 | MxClassId::UInt16 => Some(2),
        MxClassId::Single | MxClassId::Int32 | MxClassId::UInt32 => Some(4),
        MxClassId::Double | MxClassId::Int64 | MxClassId::UInt64 => Some(8),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_then_name_gives_canonical_names() {
        let cases = [
            (ElementType::int(8), "int8"),
            (ElementType::int(16), "int16"),
            (ElementType::int(32), "int32"),
            (ElementType::int(64), "int64"),
            (ElementType::uint(8), "uint8"),
            (ElementType::uint(16), "uint16"),
            (ElementType::uint(32), "uint32"),
            (ElementType::uint(64), "uint64"),
            (ElementType::float(32), "single"),
            (ElementType::float(64), "double"),
        ];
        for (ty, name) in cases {
            assert_eq!(class_name(classify(ty)), name, "{ty}");
        }
    }

    #[test]
    fn one_bit_is_logical_for_both_integer_kinds() {
        assert_eq!(classify(ElementType::int(1)), MxClassId::Logical);
        assert_eq!(classify(ElementType::uint(1)), MxClassId::Logical);
    }

    #[test]
    fn unsupported_pairs_are_unknown() {
        assert_eq!(classify(ElementType::float(16)), MxClassId::Unknown);
        assert_eq!(classify(ElementType::float(1)), MxClassId::Unknown);
        assert_eq!(classify(ElementType::int(7)), MxClassId::Unknown);
        assert!(!ElementType::uint(128).is_supported());
        assert_eq!(class_name(MxClassId::Unknown), "unknown");
        assert_eq!(class_name(MxClassId::from_raw(42)), "unknown");
    }

    #[test]
    fn type_display_names() {
        assert_eq!(ElementType::int(1).to_string(), "bool");
        assert_eq!(ElementType::float(32).to_string(), "float32");
    }
}
