//! ufunc-forge: elementwise dispatch tables from JIT-compiled scalar kernels
//!
//! This crate assembles a "universal function": one scalar kernel compiled
//! separately for several type signatures, registered into a dispatch table
//! an array-processing runtime can call elementwise, picking the variant that
//! matches the operand dtypes at call time.
//!
//! # Architecture
//!
//! ```text
//! KernelDef + Signature → VariantBuilder → CompiledVariant (per signature)
//!                                             │
//!                     ExecutionContext ←──────┘ (native code lives here)
//!                                             │
//!                       DispatchTableAssembler → DispatchTable
//! ```
//!
//! Native code is produced by a [`KernelBackend`] (Cranelift JIT by default)
//! into an [`ExecutionContext`]. The assembler resolves every signature
//! through [`TypeCodeRegistry`] into the array runtime's dtype codes,
//! extracts entry-point addresses from the sealed context, and emits an
//! immutable [`DispatchTable`] whose entries are index-aligned with the input
//! variants. The table keeps a shared handle to the context, so an entry
//! point can never outlive the module that owns it.

use std::rc::Rc;

use thiserror::Error;

pub mod assembler;
pub mod builder;
pub mod codegen;
pub mod context;
pub mod kernel;
pub mod optimizer;
pub mod table;
pub mod types;
pub mod variant;

pub use assembler::DispatchTableAssembler;
pub use builder::VariantBuilder;
pub use codegen::{CraneliftBackend, KernelBackend};
pub use context::{EntryPointSource, ExecutionContext};
pub use kernel::{BinOp, KernelDef, ScalarExpr, UnaryOp};
pub use optimizer::{KernelPass, KernelPipeline};
pub use table::{DispatchEntry, DispatchTable};
pub use types::{ScalarType, TypeCode, TypeCodeRegistry};
pub use variant::{CompiledVariant, Signature};

/// Errors raised while building variants or assembling dispatch tables.
#[derive(Debug, Error)]
pub enum UfuncError {
    /// Scalar type with no registered dtype code
    #[error("Unknown scalar type: {0}")]
    UnknownType(String),

    /// Kernel parameter count and signature arity disagree
    #[error("Kernel `{kernel}` declares {declared} parameter(s) but the signature supplies {supplied}")]
    SignatureMismatch {
        kernel: String,
        declared: usize,
        supplied: usize,
    },

    /// Variants in one batch disagree on arity
    #[error("Variant {index} has arity {found}, expected {expected}")]
    ArityMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    /// Compiled code with no retrievable entry-point address
    #[error("No entry point for compiled kernel `{0}`")]
    UnresolvedSymbol(String),

    /// Assembly requested for an empty variant batch
    #[error("Cannot assemble a dispatch table from an empty batch")]
    EmptyBatch,

    /// Malformed kernel definition
    #[error("Invalid kernel definition: {0}")]
    InvalidKernel(String),

    /// Kernel lowering or native definition failed
    #[error("Code generation error: {0}")]
    Codegen(String),

    /// Execution context creation or sealing failed
    #[error("Execution context error: {0}")]
    Context(String),
}

/// Result type for ufunc assembly operations
pub type UfuncResult<T> = Result<T, UfuncError>;

/// Check if build debug logging is enabled via the `UFUNC_FORGE_DEBUG` env var.
/// Only available in debug builds to avoid any cost in release.
#[cfg(debug_assertions)]
pub(crate) fn forge_debug_enabled() -> bool {
    use std::sync::OnceLock;
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| std::env::var("UFUNC_FORGE_DEBUG").is_ok())
}

/// Emit build debug logs in debug builds without relying on `eprintln!`.
#[cfg(debug_assertions)]
pub(crate) fn forge_debug_log(args: std::fmt::Arguments<'_>) {
    use std::io::Write;
    let _ = writeln!(std::io::stderr(), "{args}");
}

/// Convenience driver tying the core components together.
///
/// Owns one [`ExecutionContext`] and one [`VariantBuilder`] for a single
/// kernel definition. Each [`add`](Vectorizer::add) compiles one signature
/// eagerly; [`build`](Vectorizer::build) seals the context and assembles the
/// table. Everything it does can also be done with the core components
/// directly; no invariant is enforced here that the core does not enforce
/// itself.
#[derive(Debug)]
pub struct Vectorizer {
    def: KernelDef,
    context: ExecutionContext,
    builder: VariantBuilder<CraneliftBackend>,
    variants: Vec<CompiledVariant>,
}

impl Vectorizer {
    /// Create a vectorizer for one kernel definition.
    pub fn new(def: KernelDef) -> UfuncResult<Self> {
        Ok(Self {
            def,
            context: ExecutionContext::new()?,
            builder: VariantBuilder::new(),
            variants: Vec::new(),
        })
    }

    /// Compile the kernel for one more signature.
    ///
    /// Compilation happens eagerly; the variant is queued for assembly in
    /// call order. Adding the same signature twice produces two independent
    /// variants with distinct symbols.
    pub fn add(&mut self, signature: Signature) -> UfuncResult<&mut Self> {
        let variant = self
            .builder
            .build(&self.def, &signature, &mut self.context)?;
        self.variants.push(variant);
        Ok(self)
    }

    /// Warnings accumulated by the optimizer across `add` calls.
    pub fn warnings(&self) -> &[String] {
        self.builder.warnings()
    }

    /// Number of variants compiled so far.
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// True if no signature has been added yet.
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Seal the context and assemble the dispatch table.
    ///
    /// Fails with [`UfuncError::EmptyBatch`] if no signature was added.
    pub fn build(self) -> UfuncResult<DispatchTable> {
        #[cfg(debug_assertions)]
        if forge_debug_enabled() {
            forge_debug_log(format_args!(
                "ufunc-forge: assembling `{}` with {} variant(s)",
                self.def.name(),
                self.variants.len()
            ));
        }
        let context: Rc<dyn EntryPointSource> = self.context.seal()?;
        let mut assembler = DispatchTableAssembler::new();
        for variant in self.variants {
            assembler.push(variant);
        }
        assembler.assemble(context)
    }
}
