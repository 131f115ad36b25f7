//! Signatures and compiled kernel variants.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use cranelift_module::FuncId;

use crate::types::ScalarType;
use crate::UfuncResult;

/// Ordered argument types plus a return type for one compiled variant.
///
/// Exactly one output value; multi-output signatures are not representable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    args: Vec<ScalarType>,
    ret: ScalarType,
}

impl Signature {
    pub fn new(args: Vec<ScalarType>, ret: ScalarType) -> Self {
        Self { args, ret }
    }

    /// Build a signature from compiler type tokens, e.g.
    /// `Signature::from_tokens(&["int32", "int32"], "int32")`.
    pub fn from_tokens(args: &[&str], ret: &str) -> UfuncResult<Self> {
        let args = args
            .iter()
            .map(|t| ScalarType::from_token(t))
            .collect::<UfuncResult<Vec<_>>>()?;
        Ok(Self::new(args, ScalarType::from_token(ret)?))
    }

    pub fn args(&self) -> &[ScalarType] {
        &self.args
    }

    pub fn ret(&self) -> ScalarType {
        self.ret
    }

    /// Argument count.
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

/// One compiled kernel variant: its signature plus the handle of its native
/// code inside the execution context that produced it.
///
/// Immutable after construction. The handle is meaningless outside that
/// context; the variant owns nothing and may be dropped freely.
#[derive(Debug, Clone)]
pub struct CompiledVariant {
    signature: Signature,
    code: FuncId,
    symbol: String,
    user_data: Option<NonNull<c_void>>,
}

impl CompiledVariant {
    pub fn new(signature: Signature, code: FuncId, symbol: impl Into<String>) -> Self {
        Self {
            signature,
            code,
            symbol: symbol.into(),
            user_data: None,
        }
    }

    /// Attach an opaque closure-data pointer, forwarded verbatim into the
    /// variant's dispatch-table slot. The pointee must stay valid for as
    /// long as any table built from this variant is in use.
    pub fn with_user_data(mut self, data: NonNull<c_void>) -> Self {
        self.user_data = Some(data);
        self
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn code(&self) -> FuncId {
        self.code
    }

    /// Symbol the variant was declared under in its execution context.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn user_data(&self) -> Option<NonNull<c_void>> {
        self.user_data
    }
}
