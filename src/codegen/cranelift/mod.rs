//! Cranelift kernel backend.
//!
//! Lowers a [`KernelDef`] against one concrete [`Signature`] into native
//! code inside an [`ExecutionContext`]. Every kernel is a single basic
//! block: parameters in, one value out. Operand types follow the signature;
//! mixed-type expressions promote per [`ScalarType::promote`] and the result
//! converts to the declared return type.

mod helpers;

use cranelift_codegen::ir::types as cl_types;
use cranelift_codegen::ir::{Function, InstBuilder, UserFuncName, Value};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::FuncId;

use crate::context::ExecutionContext;
use crate::kernel::{BinOp, KernelDef, ScalarExpr, UnaryOp};
use crate::types::ScalarType;
use crate::variant::Signature;
use crate::{UfuncError, UfuncResult};

use super::KernelBackend;
use helpers::{make_clif_signature, scalar_type_to_clif};

/// Cranelift-based kernel backend.
///
/// The function builder context and codegen context are reused across
/// translations, as the JIT module expects.
pub struct CraneliftBackend {
    builder_context: FunctionBuilderContext,
    ctx: cranelift_codegen::Context,
}

impl CraneliftBackend {
    pub fn new() -> Self {
        Self {
            builder_context: FunctionBuilderContext::new(),
            ctx: cranelift_codegen::Context::new(),
        }
    }
}

impl Default for CraneliftBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CraneliftBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CraneliftBackend").finish_non_exhaustive()
    }
}

impl KernelBackend for CraneliftBackend {
    fn name(&self) -> &'static str {
        "cranelift"
    }

    fn translate(
        &mut self,
        def: &KernelDef,
        sig: &Signature,
        ctx: &mut ExecutionContext,
    ) -> UfuncResult<(FuncId, String)> {
        let clif_sig = make_clif_signature(sig, ctx.call_conv())?;
        let (func_id, symbol) = ctx.declare_kernel(def.name(), &clif_sig)?;

        self.ctx.func =
            Function::with_name_signature(UserFuncName::user(0, func_id.as_u32()), clif_sig);

        {
            let mut builder = FunctionBuilder::new(&mut self.ctx.func, &mut self.builder_context);
            let entry = builder.create_block();
            builder.append_block_params_for_function_params(entry);
            builder.switch_to_block(entry);
            builder.seal_block(entry);

            let params: Vec<TypedValue> = builder
                .block_params(entry)
                .iter()
                .zip(sig.args())
                .map(|(&value, &ty)| TypedValue { value, ty })
                .collect();

            let result = lower_expr(&mut builder, def.body(), &params)?;
            let result = convert(&mut builder, result, sig.ret())?;
            builder.ins().return_(&[result.value]);
            builder.finalize();
        }

        ctx.define_kernel(func_id, &symbol, &mut self.ctx)?;
        Ok((func_id, symbol))
    }
}

/// An SSA value tagged with its scalar type.
#[derive(Debug, Clone, Copy)]
struct TypedValue {
    value: Value,
    ty: ScalarType,
}

fn lower_expr(
    builder: &mut FunctionBuilder,
    expr: &ScalarExpr,
    params: &[TypedValue],
) -> UfuncResult<TypedValue> {
    match expr {
        ScalarExpr::Param(index) => params.get(*index).copied().ok_or_else(|| {
            UfuncError::Codegen(format!("parameter {index} out of range"))
        }),
        ScalarExpr::IntConst(v) => Ok(TypedValue {
            value: builder.ins().iconst(cl_types::I64, *v),
            ty: ScalarType::Int64,
        }),
        ScalarExpr::FloatConst(v) => Ok(TypedValue {
            value: builder.ins().f64const(*v),
            ty: ScalarType::Float64,
        }),
        ScalarExpr::Binary { op, lhs, rhs } => {
            let lhs = lower_expr(builder, lhs, params)?;
            let rhs = lower_expr(builder, rhs, params)?;
            let ty = ScalarType::promote(lhs.ty, rhs.ty);
            let lhs = convert(builder, lhs, ty)?;
            let rhs = convert(builder, rhs, ty)?;
            let value = lower_binop(builder, *op, lhs.value, rhs.value, ty);
            Ok(TypedValue { value, ty })
        }
        ScalarExpr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => {
            let operand = lower_expr(builder, operand, params)?;
            let value = if operand.ty.is_float() {
                builder.ins().fneg(operand.value)
            } else {
                builder.ins().ineg(operand.value)
            };
            Ok(TypedValue {
                value,
                ty: operand.ty,
            })
        }
    }
}

fn lower_binop(
    builder: &mut FunctionBuilder,
    op: BinOp,
    lhs: Value,
    rhs: Value,
    ty: ScalarType,
) -> Value {
    if ty.is_float() {
        match op {
            BinOp::Add => builder.ins().fadd(lhs, rhs),
            BinOp::Sub => builder.ins().fsub(lhs, rhs),
            BinOp::Mul => builder.ins().fmul(lhs, rhs),
            BinOp::Div => builder.ins().fdiv(lhs, rhs),
        }
    } else {
        match op {
            BinOp::Add => builder.ins().iadd(lhs, rhs),
            BinOp::Sub => builder.ins().isub(lhs, rhs),
            BinOp::Mul => builder.ins().imul(lhs, rhs),
            BinOp::Div => {
                if ty.is_signed_int() {
                    builder.ins().sdiv(lhs, rhs)
                } else {
                    builder.ins().udiv(lhs, rhs)
                }
            }
        }
    }
}

/// Convert a typed value to another scalar type.
///
/// Integer narrowing truncates, widening extends per source signedness,
/// float/int conversions round toward zero and trap on overflow.
fn convert(
    builder: &mut FunctionBuilder,
    from: TypedValue,
    to: ScalarType,
) -> UfuncResult<TypedValue> {
    if from.ty == to {
        return Ok(from);
    }
    let to_cl = scalar_type_to_clif(to)?;
    let value = match (from.ty.is_float(), to.is_float()) {
        (true, true) => {
            if to.bits() > from.ty.bits() {
                builder.ins().fpromote(to_cl, from.value)
            } else {
                builder.ins().fdemote(to_cl, from.value)
            }
        }
        (false, true) => {
            if from.ty.is_signed_int() {
                builder.ins().fcvt_from_sint(to_cl, from.value)
            } else {
                builder.ins().fcvt_from_uint(to_cl, from.value)
            }
        }
        (true, false) => {
            if to.is_signed_int() {
                builder.ins().fcvt_to_sint(to_cl, from.value)
            } else {
                builder.ins().fcvt_to_uint(to_cl, from.value)
            }
        }
        (false, false) => {
            if to.bits() > from.ty.bits() {
                if from.ty.is_signed_int() {
                    builder.ins().sextend(to_cl, from.value)
                } else {
                    builder.ins().uextend(to_cl, from.value)
                }
            } else if to.bits() < from.ty.bits() {
                builder.ins().ireduce(to_cl, from.value)
            } else {
                // Same width, sign reinterpretation only: bits unchanged.
                from.value
            }
        }
    };
    Ok(TypedValue { value, ty: to })
}
