//! Scalar type vocabulary and the array runtime's dtype codes.
//!
//! Two vocabularies meet here: [`ScalarType`] is what the kernel compiler
//! speaks, [`TypeCode`] is the integer dtype identifier the consuming array
//! runtime speaks. [`TypeCodeRegistry`] is the fixed, total mapping between
//! them. A wrong or out-of-range code handed to the array runtime corrupts
//! memory downstream, so codes can only be minted by the registry; there is
//! no public constructor and no insertion API.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

use crate::{UfuncError, UfuncResult};

/// Scalar types known to the kernel compiler.
///
/// This is a closed vocabulary. The complex types are recognized tokens but
/// carry no dtype code and no codegen support; requesting them surfaces
/// [`UfuncError::UnknownType`] before any compilation happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Complex64,
    Complex128,
}

impl ScalarType {
    /// Parse a compiler type token.
    ///
    /// `"float"` means `Float32` and `"double"` means `Float64`, matching the
    /// C-flavored spellings the token vocabulary inherited.
    pub fn from_token(token: &str) -> UfuncResult<Self> {
        match token {
            "int8" => Ok(Self::Int8),
            "int16" => Ok(Self::Int16),
            "int32" => Ok(Self::Int32),
            "int64" => Ok(Self::Int64),
            "uint8" => Ok(Self::UInt8),
            "uint16" => Ok(Self::UInt16),
            "uint32" => Ok(Self::UInt32),
            "uint64" => Ok(Self::UInt64),
            "float" | "float32" => Ok(Self::Float32),
            "double" | "float64" => Ok(Self::Float64),
            "complex64" => Ok(Self::Complex64),
            "complex128" => Ok(Self::Complex128),
            _ => Err(UfuncError::UnknownType(token.to_string())),
        }
    }

    /// Canonical token for this type.
    pub fn token(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Complex64 => "complex64",
            Self::Complex128 => "complex128",
        }
    }

    /// Bit width of one scalar of this type.
    pub fn bits(self) -> u32 {
        match self {
            Self::Int8 | Self::UInt8 => 8,
            Self::Int16 | Self::UInt16 => 16,
            Self::Int32 | Self::UInt32 | Self::Float32 => 32,
            Self::Int64 | Self::UInt64 | Self::Float64 | Self::Complex64 => 64,
            Self::Complex128 => 128,
        }
    }

    /// True for floating-point types (complex types excluded).
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// True for signed integer types.
    pub fn is_signed_int(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    /// True for any integer type.
    pub fn is_int(self) -> bool {
        self.is_signed_int()
            || matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64)
    }

    /// Result type of a binary operation mixing `a` and `b`.
    ///
    /// Rule: floats beat ints, wider beats narrower, and a same-width
    /// signed/unsigned tie resolves to the signed type. This is the kernel
    /// promotion rule of this crate, not an emulation of any particular
    /// array runtime's casting table.
    pub fn promote(a: ScalarType, b: ScalarType) -> ScalarType {
        if a == b {
            return a;
        }
        match (a.is_float(), b.is_float()) {
            (true, false) => a,
            (false, true) => b,
            (true, true) => {
                if a.bits() >= b.bits() {
                    a
                } else {
                    b
                }
            }
            (false, false) => {
                if a.bits() > b.bits() {
                    a
                } else if b.bits() > a.bits() {
                    b
                } else if a.is_signed_int() {
                    a
                } else {
                    b
                }
            }
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Integer dtype identifier understood by the consuming array runtime.
///
/// Only [`TypeCodeRegistry`] mints values; the inner integer is read-only.
/// The assembler never revalidates codes against the runtime's range; the
/// registry's closed enumeration is the guarantee of validity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeCode(i32);

impl TypeCode {
    /// The raw dtype number, as the array runtime expects it.
    pub fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Debug for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeCode({})", self.0)
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scalar types with a dtype code, paired with the array runtime's numbers
/// (NumPy dtype nums on LP64 platforms).
const DTYPE_TABLE: &[(ScalarType, i32)] = &[
    (ScalarType::Int8, 1),
    (ScalarType::UInt8, 2),
    (ScalarType::Int16, 3),
    (ScalarType::UInt16, 4),
    (ScalarType::Int32, 5),
    (ScalarType::UInt32, 6),
    (ScalarType::Int64, 7),
    (ScalarType::UInt64, 8),
    (ScalarType::Float32, 11),
    (ScalarType::Float64, 12),
];

static DTYPE_CODES: Lazy<HashMap<ScalarType, TypeCode>> = Lazy::new(|| {
    DTYPE_TABLE
        .iter()
        .map(|&(ty, num)| (ty, TypeCode(num)))
        .collect()
});

/// Fixed mapping from compiler scalar types to array-runtime dtype codes.
///
/// Static configuration data, not mutable state. Every type the backend can
/// compile has an entry; absence is a configuration error surfaced as
/// [`UfuncError::UnknownType`], never silently coerced.
#[derive(Debug)]
pub struct TypeCodeRegistry;

impl TypeCodeRegistry {
    /// Resolve a scalar type to its dtype code.
    pub fn resolve(ty: ScalarType) -> UfuncResult<TypeCode> {
        DTYPE_CODES
            .get(&ty)
            .copied()
            .ok_or_else(|| UfuncError::UnknownType(ty.token().to_string()))
    }

    /// True if `ty` has a dtype code.
    pub fn supports(ty: ScalarType) -> bool {
        DTYPE_CODES.contains_key(&ty)
    }

    /// Every scalar type with a dtype code, in table order.
    pub fn supported() -> impl Iterator<Item = ScalarType> {
        DTYPE_TABLE.iter().map(|&(ty, _)| ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_total_over_supported_domain() {
        for ty in TypeCodeRegistry::supported() {
            assert!(
                TypeCodeRegistry::resolve(ty).is_ok(),
                "no code for {ty:?}"
            );
        }
    }

    #[test]
    fn test_resolve_is_deterministic() {
        for ty in TypeCodeRegistry::supported() {
            let a = TypeCodeRegistry::resolve(ty).unwrap();
            let b = TypeCodeRegistry::resolve(ty).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_codes_are_distinct() {
        let codes: Vec<i32> = TypeCodeRegistry::supported()
            .map(|ty| TypeCodeRegistry::resolve(ty).unwrap().as_i32())
            .collect();
        let mut deduped = codes.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(codes.len(), deduped.len());
    }

    #[test]
    fn test_complex_types_have_no_code() {
        assert!(matches!(
            TypeCodeRegistry::resolve(ScalarType::Complex64),
            Err(UfuncError::UnknownType(_))
        ));
        assert!(matches!(
            TypeCodeRegistry::resolve(ScalarType::Complex128),
            Err(UfuncError::UnknownType(_))
        ));
        assert!(!TypeCodeRegistry::supports(ScalarType::Complex128));
    }

    #[test]
    fn test_token_parsing() {
        assert_eq!(
            ScalarType::from_token("int32").unwrap(),
            ScalarType::Int32
        );
        assert_eq!(
            ScalarType::from_token("float").unwrap(),
            ScalarType::Float32
        );
        assert_eq!(
            ScalarType::from_token("double").unwrap(),
            ScalarType::Float64
        );
        assert_eq!(
            ScalarType::from_token("float64").unwrap(),
            ScalarType::Float64
        );
    }

    #[test]
    fn test_unknown_token_is_rejected() {
        assert!(matches!(
            ScalarType::from_token("complex256"),
            Err(UfuncError::UnknownType(t)) if t == "complex256"
        ));
    }

    #[test]
    fn test_token_round_trip() {
        for ty in TypeCodeRegistry::supported() {
            assert_eq!(ScalarType::from_token(ty.token()).unwrap(), ty);
        }
    }

    #[test]
    fn test_promotion_floats_beat_ints() {
        assert_eq!(
            ScalarType::promote(ScalarType::Int64, ScalarType::Float32),
            ScalarType::Float32
        );
        assert_eq!(
            ScalarType::promote(ScalarType::Float32, ScalarType::Float64),
            ScalarType::Float64
        );
    }

    #[test]
    fn test_promotion_wider_int_wins() {
        assert_eq!(
            ScalarType::promote(ScalarType::Int8, ScalarType::Int32),
            ScalarType::Int32
        );
        assert_eq!(
            ScalarType::promote(ScalarType::UInt64, ScalarType::Int16),
            ScalarType::UInt64
        );
    }

    #[test]
    fn test_promotion_same_width_tie_is_signed() {
        assert_eq!(
            ScalarType::promote(ScalarType::UInt32, ScalarType::Int32),
            ScalarType::Int32
        );
        assert_eq!(
            ScalarType::promote(ScalarType::Int16, ScalarType::UInt16),
            ScalarType::Int16
        );
    }
}
