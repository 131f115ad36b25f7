//! Kernel code generation backends.
//!
//! A backend turns one `(KernelDef, Signature)` pair into native code inside
//! an [`ExecutionContext`]. The trait is the compiler seam of the crate:
//! the variant builder is generic over it, production code uses
//! [`CraneliftBackend`], and tests substitute stubs through the same seam.

pub mod cranelift;

pub use cranelift::CraneliftBackend;

use cranelift_module::FuncId;

use crate::context::ExecutionContext;
use crate::kernel::KernelDef;
use crate::variant::Signature;
use crate::UfuncResult;

/// Translation strategy turning a kernel definition into native code.
pub trait KernelBackend {
    /// Backend name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Compile `def` against `sig` into `ctx`.
    ///
    /// Exactly one native function is declared and defined per call; the
    /// returned handle and symbol identify it inside `ctx`. Callers are
    /// expected to have validated arity and type support beforehand; the
    /// backend may reject what it cannot lower, but never silently
    /// substitutes types.
    fn translate(
        &mut self,
        def: &KernelDef,
        sig: &Signature,
        ctx: &mut ExecutionContext,
    ) -> UfuncResult<(FuncId, String)>;
}
