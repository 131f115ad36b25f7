//! Dispatch table assembly.
//!
//! Batches compiled variants, resolves their signatures into dtype codes,
//! extracts entry-point addresses, and emits the immutable table. Assembly
//! is atomic: every failure returns before the table exists, so callers
//! never see a partially valid artifact.

use std::rc::Rc;

use crate::context::EntryPointSource;
use crate::table::DispatchTable;
use crate::types::TypeCodeRegistry;
use crate::variant::CompiledVariant;
use crate::{UfuncError, UfuncResult};

/// Collects an ordered batch of variants and assembles them into a
/// [`DispatchTable`].
///
/// Ordering is preserved: the Nth variant pushed becomes the Nth entry.
/// Callers wanting a dispatch priority (most-specific-type-first, say) order
/// the batch themselves; no reordering or specificity sorting happens here.
/// Resolved dtype codes are not revalidated against any runtime range: the
/// registry's closed enumeration is the validity guarantee.
#[derive(Debug, Default)]
pub struct DispatchTableAssembler {
    variants: Vec<CompiledVariant>,
}

impl DispatchTableAssembler {
    pub fn new() -> Self {
        Self {
            variants: Vec::new(),
        }
    }

    /// Append one variant to the batch.
    pub fn push(&mut self, variant: CompiledVariant) {
        self.variants.push(variant);
    }

    /// Number of variants batched so far.
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Assemble the batch against the context that compiled it.
    ///
    /// Fails with [`UfuncError::EmptyBatch`] on an empty batch,
    /// [`UfuncError::ArityMismatch`] if any variant disagrees with the first
    /// on argument count, [`UfuncError::UnknownType`] if a signature type
    /// has no dtype code, and [`UfuncError::UnresolvedSymbol`] if the
    /// context reports no address for a variant: a build that never
    /// completed linking aborts the whole assembly; no null placeholder is
    /// ever substituted.
    pub fn assemble(self, ctx: Rc<dyn EntryPointSource>) -> UfuncResult<DispatchTable> {
        let arity = self
            .variants
            .first()
            .ok_or(UfuncError::EmptyBatch)?
            .signature()
            .arity();

        for (index, variant) in self.variants.iter().enumerate() {
            let found = variant.signature().arity();
            if found != arity {
                return Err(UfuncError::ArityMismatch {
                    index,
                    expected: arity,
                    found,
                });
            }
        }

        let count = self.variants.len();
        let mut type_codes = Vec::with_capacity(count * (arity + 1));
        let mut entry_points = Vec::with_capacity(count);
        let mut user_data = Vec::with_capacity(count);

        for variant in &self.variants {
            for arg in variant.signature().args() {
                type_codes.push(TypeCodeRegistry::resolve(*arg)?);
            }
            type_codes.push(TypeCodeRegistry::resolve(variant.signature().ret())?);

            let ptr = ctx.entry_point(variant.code()).ok_or_else(|| {
                UfuncError::UnresolvedSymbol(variant.symbol().to_string())
            })?;
            entry_points.push(ptr);
            user_data.push(variant.user_data());
        }

        Ok(DispatchTable::new(
            arity,
            type_codes,
            entry_points,
            user_data,
            ctx,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarType;
    use crate::variant::Signature;
    use cranelift_module::FuncId;
    use std::collections::HashMap;
    use std::ptr::NonNull;

    /// Entry-point source backed by a fixed address map.
    #[derive(Debug, Default)]
    struct FixedAddresses {
        ptrs: HashMap<FuncId, NonNull<u8>>,
    }

    impl FixedAddresses {
        fn with(&mut self, id: FuncId, addr: usize) -> &mut Self {
            self.ptrs
                .insert(id, NonNull::new(addr as *mut u8).unwrap());
            self
        }
    }

    impl EntryPointSource for FixedAddresses {
        fn entry_point(&self, code: FuncId) -> Option<NonNull<u8>> {
            self.ptrs.get(&code).copied()
        }
    }

    fn variant(n: u32, args: Vec<ScalarType>, ret: ScalarType) -> CompiledVariant {
        CompiledVariant::new(
            Signature::new(args, ret),
            FuncId::from_u32(n),
            format!("k${n}"),
        )
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let asm = DispatchTableAssembler::new();
        let ctx = Rc::new(FixedAddresses::default());
        assert!(matches!(
            asm.assemble(ctx),
            Err(UfuncError::EmptyBatch)
        ));
    }

    #[test]
    fn test_arity_mismatch_aborts_whole_assembly() {
        let mut asm = DispatchTableAssembler::new();
        asm.push(variant(
            0,
            vec![ScalarType::Int32, ScalarType::Int32],
            ScalarType::Int32,
        ));
        asm.push(variant(1, vec![ScalarType::Int32], ScalarType::Int32));

        let mut ctx = FixedAddresses::default();
        ctx.with(FuncId::from_u32(0), 0x1000)
            .with(FuncId::from_u32(1), 0x2000);

        let err = asm.assemble(Rc::new(ctx)).unwrap_err();
        assert!(matches!(
            err,
            UfuncError::ArityMismatch {
                index: 1,
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn test_order_is_preserved() {
        let sigs = [
            (vec![ScalarType::Int32, ScalarType::Int32], ScalarType::Int32),
            (
                vec![ScalarType::Float64, ScalarType::Float64],
                ScalarType::Float64,
            ),
            (
                vec![ScalarType::UInt8, ScalarType::UInt8],
                ScalarType::UInt8,
            ),
        ];
        let mut asm = DispatchTableAssembler::new();
        let mut ctx = FixedAddresses::default();
        for (n, (args, ret)) in sigs.iter().cloned().enumerate() {
            asm.push(variant(n as u32, args, ret));
            ctx.with(FuncId::from_u32(n as u32), 0x1000 + n * 0x10);
        }

        let table = asm.assemble(Rc::new(ctx)).unwrap();
        assert_eq!(table.len(), 3);
        for (n, (args, ret)) in sigs.iter().enumerate() {
            let entry = table.entry(n).unwrap();
            let expect: Vec<_> = args
                .iter()
                .map(|t| TypeCodeRegistry::resolve(*t).unwrap())
                .collect();
            assert_eq!(entry.arg_codes, expect.as_slice());
            assert_eq!(entry.ret_code, TypeCodeRegistry::resolve(*ret).unwrap());
            assert_eq!(entry.fn_ptr.as_ptr() as usize, 0x1000 + n * 0x10);
        }
    }

    #[test]
    fn test_unresolved_symbol_aborts_whole_assembly() {
        let mut asm = DispatchTableAssembler::new();
        asm.push(variant(0, vec![ScalarType::Int32], ScalarType::Int32));
        asm.push(variant(1, vec![ScalarType::Int64], ScalarType::Int64));

        // Address for the first variant only; the second never linked.
        let mut ctx = FixedAddresses::default();
        ctx.with(FuncId::from_u32(0), 0x1000);

        let err = asm.assemble(Rc::new(ctx)).unwrap_err();
        assert!(matches!(
            err,
            UfuncError::UnresolvedSymbol(sym) if sym == "k$1"
        ));
    }

    #[test]
    fn test_unknown_type_aborts_whole_assembly() {
        let mut asm = DispatchTableAssembler::new();
        asm.push(variant(0, vec![ScalarType::Complex64], ScalarType::Complex64));
        let mut ctx = FixedAddresses::default();
        ctx.with(FuncId::from_u32(0), 0x1000);
        assert!(matches!(
            asm.assemble(Rc::new(ctx)),
            Err(UfuncError::UnknownType(_))
        ));
    }

    #[test]
    fn test_user_data_slots_default_to_none() {
        let mut asm = DispatchTableAssembler::new();
        asm.push(variant(0, vec![ScalarType::Int32], ScalarType::Int32));
        let mut ctx = FixedAddresses::default();
        ctx.with(FuncId::from_u32(0), 0x1000);
        let table = asm.assemble(Rc::new(ctx)).unwrap();
        assert_eq!(table.user_data(), &[None]);
    }
}
