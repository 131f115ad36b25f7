//! Kernel optimization passes.
//!
//! Passes rewrite the kernel expression tree before lowering. They are best
//! effort: a failing pass is reported as a warning by the variant builder
//! and the unoptimized definition is compiled instead. Passes never change a
//! kernel's arity or the types of a compiled variant, and running the
//! pipeline twice leaves the tree unchanged the second time.
//!
//! Native code is immutable once defined in the execution context, so this
//! is where whole-pipeline rewrites happen; the context's `opt_level=speed`
//! ISA flag covers the machine-level side for every function in the module.

use std::fmt;
use std::mem;

use crate::kernel::{BinOp, KernelDef, ScalarExpr, UnaryOp};
use crate::UfuncResult;

/// One rewrite pass over a kernel expression tree.
pub trait KernelPass: fmt::Debug {
    /// Name of this pass, for warnings and debug logs.
    fn name(&self) -> &'static str;

    /// Rewrite the expression in place. Returns true if anything changed.
    fn run(&self, expr: &mut ScalarExpr) -> UfuncResult<bool>;
}

// ============================================================================
// Constant Folding
// ============================================================================

/// Evaluates operations on constant operands at build time, replacing
/// expressions like `2 + 3` with `5`.
///
/// Folds reproduce lowering semantics exactly: integer literals are 64-bit
/// with wrapping arithmetic, mixed int/float operands promote to float, and
/// integer division by a zero constant is left in place (it traps at run
/// time either way).
#[derive(Debug, Default)]
pub struct ConstantFolding;

impl ConstantFolding {
    pub fn new() -> Self {
        Self
    }

    fn fold_binary(op: BinOp, lhs: &ScalarExpr, rhs: &ScalarExpr) -> Option<ScalarExpr> {
        match (lhs, rhs) {
            (ScalarExpr::IntConst(a), ScalarExpr::IntConst(b)) => Self::fold_ints(op, *a, *b),
            (ScalarExpr::FloatConst(a), ScalarExpr::FloatConst(b)) => {
                Some(Self::fold_floats(op, *a, *b))
            }
            (ScalarExpr::IntConst(a), ScalarExpr::FloatConst(b)) => {
                Some(Self::fold_floats(op, *a as f64, *b))
            }
            (ScalarExpr::FloatConst(a), ScalarExpr::IntConst(b)) => {
                Some(Self::fold_floats(op, *a, *b as f64))
            }
            _ => None,
        }
    }

    fn fold_ints(op: BinOp, a: i64, b: i64) -> Option<ScalarExpr> {
        let folded = match op {
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
            BinOp::Mul => a.wrapping_mul(b),
            BinOp::Div => {
                if b == 0 {
                    return None;
                }
                a.wrapping_div(b)
            }
        };
        Some(ScalarExpr::IntConst(folded))
    }

    fn fold_floats(op: BinOp, a: f64, b: f64) -> ScalarExpr {
        ScalarExpr::FloatConst(match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
        })
    }

    fn fold_expr(expr: &mut ScalarExpr) -> bool {
        match expr {
            ScalarExpr::Binary { op, lhs, rhs } => {
                let mut changed = Self::fold_expr(lhs);
                changed |= Self::fold_expr(rhs);
                if let Some(folded) = Self::fold_binary(*op, lhs, rhs) {
                    *expr = folded;
                    changed = true;
                }
                changed
            }
            ScalarExpr::Unary {
                op: UnaryOp::Neg,
                operand,
            } => {
                let mut changed = Self::fold_expr(operand);
                match operand.as_ref() {
                    ScalarExpr::IntConst(v) => {
                        *expr = ScalarExpr::IntConst(v.wrapping_neg());
                        changed = true;
                    }
                    ScalarExpr::FloatConst(v) => {
                        *expr = ScalarExpr::FloatConst(-v);
                        changed = true;
                    }
                    _ => {}
                }
                changed
            }
            ScalarExpr::Param(_) | ScalarExpr::IntConst(_) | ScalarExpr::FloatConst(_) => false,
        }
    }
}

impl KernelPass for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn run(&self, expr: &mut ScalarExpr) -> UfuncResult<bool> {
        Ok(Self::fold_expr(expr))
    }
}

// ============================================================================
// Algebraic Simplification
// ============================================================================

/// Removes exact arithmetic identities: `x * 1`, `x / 1`, `- -x`.
///
/// Zero-addition is deliberately not rewritten: with float operands
/// `fadd(-0.0, 0.0)` is `0.0`, so dropping `x + 0` would change an
/// observable result.
#[derive(Debug, Default)]
pub struct AlgebraicSimplify;

enum Keep {
    Lhs,
    Rhs,
}

impl AlgebraicSimplify {
    pub fn new() -> Self {
        Self
    }

    fn is_one(expr: &ScalarExpr) -> bool {
        matches!(expr, ScalarExpr::IntConst(1))
            || matches!(expr, ScalarExpr::FloatConst(v) if *v == 1.0)
    }

    fn simplify(expr: &mut ScalarExpr) -> bool {
        match expr {
            ScalarExpr::Binary { op, lhs, rhs } => {
                let mut changed = Self::simplify(lhs);
                changed |= Self::simplify(rhs);
                let keep = match op {
                    BinOp::Mul if Self::is_one(lhs) => Some(Keep::Rhs),
                    BinOp::Mul if Self::is_one(rhs) => Some(Keep::Lhs),
                    BinOp::Div if Self::is_one(rhs) => Some(Keep::Lhs),
                    _ => None,
                };
                if let Some(keep) = keep {
                    let side = match keep {
                        Keep::Lhs => lhs,
                        Keep::Rhs => rhs,
                    };
                    *expr = mem::replace(side.as_mut(), ScalarExpr::IntConst(0));
                    changed = true;
                }
                changed
            }
            ScalarExpr::Unary {
                op: UnaryOp::Neg,
                operand,
            } => {
                let mut changed = Self::simplify(operand);
                if let ScalarExpr::Unary {
                    op: UnaryOp::Neg,
                    operand: inner,
                } = operand.as_mut()
                {
                    *expr = mem::replace(inner.as_mut(), ScalarExpr::IntConst(0));
                    changed = true;
                }
                changed
            }
            ScalarExpr::Param(_) | ScalarExpr::IntConst(_) | ScalarExpr::FloatConst(_) => false,
        }
    }
}

impl KernelPass for AlgebraicSimplify {
    fn name(&self) -> &'static str {
        "algebraic-simplify"
    }

    fn run(&self, expr: &mut ScalarExpr) -> UfuncResult<bool> {
        Ok(Self::simplify(expr))
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Fixed pass pipeline run on every kernel before lowering.
///
/// Iterates the passes until a full round makes no change, bounded by
/// `max_iterations` so a misbehaving pass cannot loop forever.
#[derive(Debug)]
pub struct KernelPipeline {
    passes: Vec<Box<dyn KernelPass>>,
    max_iterations: usize,
}

impl Default for KernelPipeline {
    fn default() -> Self {
        Self {
            passes: vec![
                Box::new(ConstantFolding::new()),
                Box::new(AlgebraicSimplify::new()),
            ],
            max_iterations: 4,
        }
    }
}

impl KernelPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every pass to fixpoint. Returns the number of changed rounds
    /// summed over passes.
    pub fn run(&self, def: &mut KernelDef) -> UfuncResult<usize> {
        let mut total = 0;
        for _ in 0..self.max_iterations {
            let mut changed = 0;
            for pass in &self.passes {
                if pass.run(def.body_mut())? {
                    changed += 1;
                }
            }
            total += changed;
            if changed == 0 {
                break;
            }
        }
        Ok(total)
    }
}
