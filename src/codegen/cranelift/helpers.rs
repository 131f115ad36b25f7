use cranelift_codegen::ir::types as cl_types;
use cranelift_codegen::ir::{AbiParam, Signature as ClifSignature};
use cranelift_codegen::isa::CallConv;

use crate::types::ScalarType;
use crate::variant::Signature;
use crate::{UfuncError, UfuncResult};

/// Convert a scalar type to its Cranelift value type.
pub(super) fn scalar_type_to_clif(ty: ScalarType) -> UfuncResult<cl_types::Type> {
    match ty {
        ScalarType::Int8 | ScalarType::UInt8 => Ok(cl_types::I8),
        ScalarType::Int16 | ScalarType::UInt16 => Ok(cl_types::I16),
        ScalarType::Int32 | ScalarType::UInt32 => Ok(cl_types::I32),
        ScalarType::Int64 | ScalarType::UInt64 => Ok(cl_types::I64),
        ScalarType::Float32 => Ok(cl_types::F32),
        ScalarType::Float64 => Ok(cl_types::F64),
        ScalarType::Complex64 | ScalarType::Complex128 => Err(UfuncError::Codegen(format!(
            "unsupported scalar type: {ty}"
        ))),
    }
}

/// Create a Cranelift function signature for one kernel variant.
pub(super) fn make_clif_signature(
    sig: &Signature,
    call_conv: CallConv,
) -> UfuncResult<ClifSignature> {
    let mut clif = ClifSignature::new(call_conv);
    for arg in sig.args() {
        clif.params.push(AbiParam::new(scalar_type_to_clif(*arg)?));
    }
    clif.returns.push(AbiParam::new(scalar_type_to_clif(sig.ret())?));
    Ok(clif)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_type_mapping() {
        assert_eq!(
            scalar_type_to_clif(ScalarType::Int32).unwrap(),
            cl_types::I32
        );
        assert_eq!(
            scalar_type_to_clif(ScalarType::UInt8).unwrap(),
            cl_types::I8
        );
        assert_eq!(
            scalar_type_to_clif(ScalarType::Float64).unwrap(),
            cl_types::F64
        );
        assert!(scalar_type_to_clif(ScalarType::Complex128).is_err());
    }

    #[test]
    fn test_signature_has_one_return() {
        let sig = Signature::from_tokens(&["int32", "int32"], "int32").unwrap();
        let clif = make_clif_signature(&sig, CallConv::SystemV).unwrap();
        assert_eq!(clif.params.len(), 2);
        assert_eq!(clif.returns.len(), 1);
    }
}
