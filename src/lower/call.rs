//! Call lowering (spec.md §4.2 "Function calls"): `PRECALL`/`PUSHARG`
//! bracketing around `CALL`, right-to-left argument evaluation, and the
//! register/stack split at `MAX_REG_ARGS`.

use crate::ast::{Expr, Type};
use crate::ir::{Ir, Opcode, Payload, SizeClass, VReg};
use crate::settings::Flags;

use super::expr::{gen_expr, size_class_of};
use super::FuncLowerer;

const MAX_REG_ARGS: usize = Flags::MAX_REG_ARGS;

pub fn gen_call(lo: &mut FuncLowerer, expr: &Expr) -> VReg {
    let (callee, args, ty) = match expr {
        Expr::Call { callee, args, ty } => (callee, args, ty),
        _ => unreachable!("gen_call invoked on a non-Call expression"),
    };

    let returns_struct = matches!(ty.ret, Type::Struct(_) | Type::Union(_));
    let hidden_ret_slot = if returns_struct {
        Some(lo.func.new_frame_slot(ty.ret.size().max(1) as u32, ty.ret.align().max(1) as u32))
    } else {
        None
    };

    // Classify each argument into a register or stack slot, hidden struct
    // return pointer occupying the first register slot when present.
    let mut reg_args = 0usize;
    let mut float_reg_args = 0usize;
    let mut stack_bytes = 0u32;
    let mut slots = Vec::with_capacity(args.len());
    if hidden_ret_slot.is_some() {
        reg_args += 1;
    }
    for arg in args {
        let is_float = arg.ty().is_float();
        let (idx, on_stack) = if is_float {
            if float_reg_args < MAX_REG_ARGS {
                let i = float_reg_args;
                float_reg_args += 1;
                (i, false)
            } else {
                let off = stack_bytes;
                stack_bytes += 8;
                (off as usize, true)
            }
        } else if reg_args < MAX_REG_ARGS {
            let i = reg_args;
            reg_args += 1;
            (i, false)
        } else {
            let off = stack_bytes;
            stack_bytes += 8;
            (off as usize, true)
        };
        slots.push((idx, on_stack, is_float));
    }

    lo.func.push(lo.curbb, Ir::new(Opcode::Precall).with_payload(Payload::StackArgsSize(stack_bytes)));

    // Arguments are evaluated right-to-left (spec.md §4.2), matching C's
    // unspecified-but-conventional evaluation order for this family of
    // compilers, then each is PUSHARG'd in its assigned slot.
    let mut values = vec![None; args.len()];
    for i in (0..args.len()).rev() {
        values[i] = Some(gen_expr(lo, &args[i]));
    }
    if let Some(slot) = hidden_ret_slot {
        let dst = lo.new_vreg(SizeClass::I64);
        lo.func.push(lo.curbb, Ir::new(Opcode::Bofs).with_dst(dst).with_payload(Payload::Frame(slot)));
        lo.func.push(lo.curbb, Ir::new(Opcode::Pusharg).with_opr1(dst).with_payload(Payload::ArgSlot(0)));
    }
    for (i, v) in values.into_iter().enumerate() {
        let v = v.unwrap();
        let (idx, on_stack, _is_float) = slots[i];
        let slot_index = if on_stack { MAX_REG_ARGS + idx / 8 } else { idx };
        lo.func.push(lo.curbb, Ir::new(Opcode::Pusharg).with_opr1(v).with_payload(Payload::ArgSlot(slot_index)));
    }

    let callee_symbol = match callee.as_ref() {
        Expr::Variable(var) if matches!(var.storage, crate::ast::StorageClass::Global | crate::ast::StorageClass::Extern) => {
            Some(var.name.clone())
        }
        _ => None,
    };

    let variadic_after = if ty.variadic { Some(ty.params.len()) } else { None };

    let mut call_inst = Ir::new(Opcode::Call).with_payload(Payload::Call { symbol: callee_symbol.clone(), variadic_after });
    if callee_symbol.is_none() {
        let target = gen_expr(lo, callee);
        call_inst = call_inst.with_opr1(target);
    }
    let call_dst = if matches!(ty.ret, Type::Void) || returns_struct { None } else { Some(lo.new_vreg(size_class_of(&ty.ret))) };
    if let Some(dst) = call_dst {
        call_inst = call_inst.with_dst(dst);
    }
    lo.func.push(lo.curbb, call_inst);

    if let Some(slot) = hidden_ret_slot {
        let addr = lo.new_vreg(SizeClass::I64);
        lo.func.push(lo.curbb, Ir::new(Opcode::Bofs).with_dst(addr).with_payload(Payload::Frame(slot)));
        addr
    } else {
        call_dst.unwrap_or_else(|| lo.new_vreg(SizeClass::I32))
    }
}
