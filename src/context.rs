//! Execution context owning JIT-compiled native code.
//!
//! All native code addresses are owned by an [`ExecutionContext`]; variants
//! and dispatch tables hold non-owning handles. Sealing the context
//! finalizes the JIT module, snapshots every entry-point address, and wraps
//! the context in an `Rc` so tables can keep the code alive for as long as
//! they exist. A use-after-teardown is not representable.
//!
//! Single-threaded by design: one context per thread, no internal locking.

use std::collections::HashMap;
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

use cranelift_codegen::ir::Signature as ClifSignature;
use cranelift_codegen::isa::CallConv;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module};
use target_lexicon::Triple;

use crate::{UfuncError, UfuncResult};

/// Anything able to report the entry-point address of compiled code.
///
/// [`ExecutionContext`] is the production implementation; the assembler and
/// the dispatch table only depend on this trait, which is also the seam test
/// doubles use to simulate builds that never completed linking.
pub trait EntryPointSource {
    /// Address of the compiled function behind `code`, or `None` if the
    /// source has no finalized address for it.
    fn entry_point(&self, code: FuncId) -> Option<NonNull<u8>>;
}

/// Owns a Cranelift JIT module and every kernel compiled into it.
///
/// Built mutable, used through two phases: declare/define while variants are
/// compiled, then [`seal`](ExecutionContext::seal) exactly once. Entry
/// points are only observable after sealing. The `opt_level=speed` ISA flag
/// applies to the whole module, so every variant defined here is compiled
/// with the same aggressive setting: co-located variants share one module
/// and are jointly subject to it.
pub struct ExecutionContext {
    module: JITModule,
    defined: Vec<(FuncId, String)>,
    entry_points: HashMap<FuncId, NonNull<u8>>,
    next_symbol: u32,
    sealed: bool,
}

impl ExecutionContext {
    /// Create a context targeting the host, with aggressive optimization.
    pub fn new() -> UfuncResult<Self> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("opt_level", "speed")
            .map_err(|e| UfuncError::Context(e.to_string()))?;

        let isa_builder = cranelift_codegen::isa::lookup(Triple::host())
            .map_err(|e| UfuncError::Context(e.to_string()))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| UfuncError::Context(e.to_string()))?;

        let builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        let module = JITModule::new(builder);

        Ok(Self {
            module,
            defined: Vec::new(),
            entry_points: HashMap::new(),
            next_symbol: 0,
            sealed: false,
        })
    }

    /// Call convention native code in this context is compiled with.
    pub fn call_conv(&self) -> CallConv {
        self.module.isa().default_call_conv()
    }

    /// Declare one kernel under a fresh symbol.
    ///
    /// Symbols are minted per declaration, so declaring the same kernel name
    /// twice yields two independent functions. Deduplication, if wanted, is
    /// the caller's business.
    pub fn declare_kernel(
        &mut self,
        base_name: &str,
        signature: &ClifSignature,
    ) -> UfuncResult<(FuncId, String)> {
        if self.sealed {
            return Err(UfuncError::Context(
                "cannot declare in a sealed context".to_string(),
            ));
        }
        let symbol = format!("{base_name}${}", self.next_symbol);
        self.next_symbol += 1;
        let id = self
            .module
            .declare_function(&symbol, Linkage::Export, signature)
            .map_err(|e| UfuncError::Context(e.to_string()))?;
        Ok((id, symbol))
    }

    /// Define the body of a declared kernel and clear the codegen context
    /// for reuse.
    pub fn define_kernel(
        &mut self,
        id: FuncId,
        symbol: &str,
        ctx: &mut cranelift_codegen::Context,
    ) -> UfuncResult<()> {
        self.module
            .define_function(id, ctx)
            .map_err(|e| UfuncError::Codegen(e.to_string()))?;
        self.module.clear_context(ctx);
        self.defined.push((id, symbol.to_string()));
        Ok(())
    }

    /// Number of kernels defined so far.
    pub fn defined_count(&self) -> usize {
        self.defined.len()
    }

    /// Finalize all definitions, snapshot entry points, and return a shared
    /// handle.
    ///
    /// Consumes the context: nothing can be declared or defined afterwards,
    /// and the snapshot is the only address source the assembler sees.
    pub fn seal(mut self) -> UfuncResult<Rc<Self>> {
        self.module
            .finalize_definitions()
            .map_err(|e| UfuncError::Context(e.to_string()))?;
        for (id, _) in &self.defined {
            let ptr = self.module.get_finalized_function(*id);
            if let Some(ptr) = NonNull::new(ptr as *mut u8) {
                self.entry_points.insert(*id, ptr);
            }
        }
        self.sealed = true;
        Ok(Rc::new(self))
    }
}

impl EntryPointSource for ExecutionContext {
    fn entry_point(&self, code: FuncId) -> Option<NonNull<u8>> {
        self.entry_points.get(&code).copied()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("defined", &self.defined.len())
            .field("sealed", &self.sealed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_codegen::ir::{types, AbiParam};

    fn unary_sig(ctx: &ExecutionContext) -> ClifSignature {
        let mut sig = ClifSignature::new(ctx.call_conv());
        sig.params.push(AbiParam::new(types::I32));
        sig.returns.push(AbiParam::new(types::I32));
        sig
    }

    #[test]
    fn test_symbols_are_unique_per_declaration() {
        let mut ctx = ExecutionContext::new().unwrap();
        let sig = unary_sig(&ctx);
        let (a, sym_a) = ctx.declare_kernel("twice", &sig).unwrap();
        let (b, sym_b) = ctx.declare_kernel("twice", &sig).unwrap();
        assert_ne!(a, b);
        assert_ne!(sym_a, sym_b);
    }

    #[test]
    fn test_entry_points_hidden_until_sealed() {
        let mut ctx = ExecutionContext::new().unwrap();
        let sig = unary_sig(&ctx);
        let (id, _) = ctx.declare_kernel("twice", &sig).unwrap();
        assert!(ctx.entry_point(id).is_none());
    }

    #[test]
    fn test_seal_of_empty_context_is_fine() {
        let ctx = ExecutionContext::new().unwrap();
        let sealed = ctx.seal().unwrap();
        assert!(sealed.entry_point(FuncId::from_u32(0)).is_none());
    }

    #[test]
    fn test_sealed_context_rejects_declarations() {
        let ctx = ExecutionContext::new().unwrap();
        let sealed = ctx.seal().unwrap();
        // Rc gives us no &mut, which is the point; reproduce the guard
        // through a fresh context that is marked sealed.
        drop(sealed);
        let mut ctx = ExecutionContext::new().unwrap();
        ctx.sealed = true;
        let sig = unary_sig(&ctx);
        assert!(matches!(
            ctx.declare_kernel("k", &sig),
            Err(UfuncError::Context(_))
        ));
    }
}
