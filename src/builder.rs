//! Variant builder: one compiled variant per `(kernel, signature)` pair.

use std::fmt;

use crate::codegen::{CraneliftBackend, KernelBackend};
use crate::context::ExecutionContext;
use crate::kernel::KernelDef;
use crate::optimizer::KernelPipeline;
use crate::types::TypeCodeRegistry;
use crate::variant::{CompiledVariant, Signature};
use crate::{UfuncError, UfuncResult};

/// Drives a backend to compile kernel variants, one per build call.
///
/// Generic over the backend strategy, selected at construction. Each build
/// invokes the backend exactly once; the optimizer pipeline runs per build
/// and its failures are demoted to warnings; an unoptimized variant is
/// still a correct variant. No deduplication: building the same pair twice
/// produces two independent variants with distinct symbols and addresses.
pub struct VariantBuilder<B = CraneliftBackend> {
    backend: B,
    pipeline: KernelPipeline,
    warnings: Vec<String>,
}

impl VariantBuilder<CraneliftBackend> {
    /// Builder over the default Cranelift backend.
    pub fn new() -> Self {
        Self::with_backend(CraneliftBackend::new())
    }
}

impl Default for VariantBuilder<CraneliftBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: KernelBackend> VariantBuilder<B> {
    /// Builder over an explicit backend strategy.
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            pipeline: KernelPipeline::new(),
            warnings: Vec::new(),
        }
    }

    /// Compile `def` against `sig` into `ctx`.
    ///
    /// Validation happens before any compilation: the kernel's declared
    /// parameter count must match the signature's arity
    /// ([`UfuncError::SignatureMismatch`]), and every type in the signature
    /// must have a dtype code ([`UfuncError::UnknownType`]). A type the
    /// registry cannot resolve never reaches the backend.
    pub fn build(
        &mut self,
        def: &KernelDef,
        sig: &Signature,
        ctx: &mut ExecutionContext,
    ) -> UfuncResult<CompiledVariant> {
        if def.arity() != sig.arity() {
            return Err(UfuncError::SignatureMismatch {
                kernel: def.name().to_string(),
                declared: def.arity(),
                supplied: sig.arity(),
            });
        }
        for arg in sig.args() {
            TypeCodeRegistry::resolve(*arg)?;
        }
        TypeCodeRegistry::resolve(sig.ret())?;

        let mut optimized = def.clone();
        match self.pipeline.run(&mut optimized) {
            Ok(_changes) => {
                #[cfg(debug_assertions)]
                if _changes > 0 && crate::forge_debug_enabled() {
                    crate::forge_debug_log(format_args!(
                        "ufunc-forge: {} rewrite(s) applied to `{}` {sig}",
                        _changes,
                        def.name()
                    ));
                }
            }
            Err(e) => {
                self.warnings
                    .push(format!("optimization skipped for `{}`: {e}", def.name()));
                optimized = def.clone();
            }
        }

        let (code, symbol) = self.backend.translate(&optimized, sig, ctx)?;
        Ok(CompiledVariant::new(sig.clone(), code, symbol))
    }

    /// Warnings accumulated across builds (optimizer failures only; they
    /// never abort a build).
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Drain accumulated warnings.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// The backend strategy this builder drives.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: KernelBackend> fmt::Debug for VariantBuilder<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantBuilder")
            .field("backend", &self.backend.name())
            .field("warnings", &self.warnings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{BinOp, ScalarExpr as E};
    use crate::types::ScalarType;
    use cranelift_module::FuncId;

    /// Backend stub that counts invocations and never generates code.
    #[derive(Debug, Default)]
    struct CountingBackend {
        calls: u32,
    }

    impl KernelBackend for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn translate(
            &mut self,
            def: &KernelDef,
            _sig: &Signature,
            _ctx: &mut ExecutionContext,
        ) -> UfuncResult<(FuncId, String)> {
            let id = FuncId::from_u32(self.calls);
            let symbol = format!("{}${}", def.name(), self.calls);
            self.calls += 1;
            Ok((id, symbol))
        }
    }

    fn add_kernel() -> KernelDef {
        KernelDef::new("add", 2, E::binary(BinOp::Add, E::param(0), E::param(1))).unwrap()
    }

    #[test]
    fn test_arity_mismatch_fails_before_compilation() {
        let mut builder = VariantBuilder::with_backend(CountingBackend::default());
        let mut ctx = ExecutionContext::new().unwrap();
        let sig = Signature::new(vec![ScalarType::Int32], ScalarType::Int32);
        let err = builder.build(&add_kernel(), &sig, &mut ctx).unwrap_err();
        assert!(matches!(
            err,
            UfuncError::SignatureMismatch {
                declared: 2,
                supplied: 1,
                ..
            }
        ));
        assert_eq!(builder.backend().calls, 0);
    }

    #[test]
    fn test_unknown_type_fails_before_compilation() {
        let mut builder = VariantBuilder::with_backend(CountingBackend::default());
        let mut ctx = ExecutionContext::new().unwrap();
        let sig = Signature::new(
            vec![ScalarType::Complex128, ScalarType::Complex128],
            ScalarType::Complex128,
        );
        let err = builder.build(&add_kernel(), &sig, &mut ctx).unwrap_err();
        assert!(matches!(err, UfuncError::UnknownType(_)));
        assert_eq!(builder.backend().calls, 0);
    }

    #[test]
    fn test_each_build_invokes_backend_once() {
        let mut builder = VariantBuilder::with_backend(CountingBackend::default());
        let mut ctx = ExecutionContext::new().unwrap();
        let sig = Signature::new(
            vec![ScalarType::Int32, ScalarType::Int32],
            ScalarType::Int32,
        );
        let a = builder.build(&add_kernel(), &sig, &mut ctx).unwrap();
        let b = builder.build(&add_kernel(), &sig, &mut ctx).unwrap();
        assert_eq!(builder.backend().calls, 2);
        // Two independent variants, no deduplication.
        assert_ne!(a.code(), b.code());
        assert_ne!(a.symbol(), b.symbol());
    }

    #[test]
    fn test_builds_accumulate_no_warnings_on_success() {
        let mut builder = VariantBuilder::with_backend(CountingBackend::default());
        let mut ctx = ExecutionContext::new().unwrap();
        let sig = Signature::new(
            vec![ScalarType::Float64, ScalarType::Float64],
            ScalarType::Float64,
        );
        builder.build(&add_kernel(), &sig, &mut ctx).unwrap();
        assert!(builder.warnings().is_empty());
    }
}
