//! Scalar kernel definitions.
//!
//! A [`KernelDef`] is the type-generic computation a ufunc applies to each
//! element: an expression tree over numbered parameters. Concrete types come
//! from the [`Signature`](crate::variant::Signature) each variant is compiled
//! against, so one definition compiles into any number of typed variants.

use crate::{UfuncError, UfuncResult};

/// Binary arithmetic operators available to kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// Truncating division for integer operands, exact for floats.
    Div,
}

/// Unary operators available to kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

/// Expression tree of a scalar kernel.
///
/// Constants are untyped at definition time: integer literals lower as
/// `int64` and float literals as `float64`, then follow the promotion rule
/// of [`ScalarType::promote`](crate::types::ScalarType::promote) wherever
/// they are used.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarExpr {
    /// Zero-based reference to a kernel parameter
    Param(usize),
    IntConst(i64),
    FloatConst(f64),
    Binary {
        op: BinOp,
        lhs: Box<ScalarExpr>,
        rhs: Box<ScalarExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<ScalarExpr>,
    },
}

impl ScalarExpr {
    /// Reference to parameter `index`.
    pub fn param(index: usize) -> Self {
        Self::Param(index)
    }

    /// Integer literal.
    pub fn int(value: i64) -> Self {
        Self::IntConst(value)
    }

    /// Float literal.
    pub fn float(value: f64) -> Self {
        Self::FloatConst(value)
    }

    /// Binary operation node.
    pub fn binary(op: BinOp, lhs: ScalarExpr, rhs: ScalarExpr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Arithmetic negation node.
    pub fn neg(operand: ScalarExpr) -> Self {
        Self::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(operand),
        }
    }

    /// Largest parameter index referenced, if any parameter is referenced.
    pub fn max_param(&self) -> Option<usize> {
        match self {
            Self::Param(i) => Some(*i),
            Self::IntConst(_) | Self::FloatConst(_) => None,
            Self::Binary { lhs, rhs, .. } => match (lhs.max_param(), rhs.max_param()) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            },
            Self::Unary { operand, .. } => operand.max_param(),
        }
    }
}

/// A named scalar kernel: declared parameter count plus its expression body.
///
/// Immutable once constructed. The declared arity must match the arity of
/// every signature the kernel is compiled against.
#[derive(Debug, Clone)]
pub struct KernelDef {
    name: String,
    arity: usize,
    body: ScalarExpr,
}

impl KernelDef {
    /// Create a kernel definition, validating parameter references.
    pub fn new(name: impl Into<String>, arity: usize, body: ScalarExpr) -> UfuncResult<Self> {
        let name = name.into();
        if let Some(max) = body.max_param() {
            if max >= arity {
                return Err(UfuncError::InvalidKernel(format!(
                    "kernel `{name}` references parameter {max} but declares only {arity}"
                )));
            }
        }
        Ok(Self { name, arity, body })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn body(&self) -> &ScalarExpr {
        &self.body
    }

    pub(crate) fn body_mut(&mut self) -> &mut ScalarExpr {
        &mut self.body
    }
}
