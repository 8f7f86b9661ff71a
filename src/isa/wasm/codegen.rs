//! Per-function AST-to-bytecode lowering for the WebAssembly back-end
//! (spec.md §4.7). Structured control flow maps directly onto Wasm's
//! `block`/`loop`/`if`, so there is no BB graph or register allocation
//! here at all — values are produced and consumed strictly stack-wise.
//!
//! Scalars with no address ever taken live in flat Wasm locals; anything
//! else (globals, string literals, arrays, structs) lives in linear
//! memory and is addressed with `i32.const <offset>` plus a typed
//! load/store. A local whose address is taken isn't representable in
//! this scheme — the front-end boundary this crate consumes guarantees
//! the native path's frame-slot machinery handles those instead, so the
//! Wasm back-end only ever sees scalar locals (spec.md §4.7 Non-goals).

use crate::ast::{BinOp, Expr, Function as AstFunction, Stmt, StorageClass, Type, UnOp};
use crate::context::CompilerContext;

use super::control::{ControlStack, FrameKind};
use super::leb::{write_sleb128, write_uleb128};
use super::locals::WasmLocals;
use super::{ValType, WasmModuleBuilder};

struct Cg<'a> {
    ctx: &'a mut CompilerContext,
    module: &'a mut WasmModuleBuilder,
    locals: WasmLocals,
    control: ControlStack,
    code: Vec<u8>,
}

pub fn lower_function(ctx: &mut CompilerContext, module: &mut WasmModuleBuilder, func: &AstFunction) -> Vec<u8> {
    let param_types: Vec<ValType> = func.params.iter().map(|p| ValType::of(&p.ty)).collect();
    let mut locals = WasmLocals::new(&param_types);
    for (i, p) in func.params.iter().enumerate() {
        locals.bind_param(i as u32, &p.name);
    }

    ctx.push_scope();
    for p in func.params.iter() {
        ctx.scope_stack.last_mut().unwrap().locals.insert(p.name.clone(), p.clone());
    }

    let mut cg = Cg { ctx, module, locals, control: ControlStack::new(), code: Vec::new() };
    cg.gen_stmt(&func.body);
    cg.code.push(0x0b); // end
    cg.ctx.pop_scope();

    let mut out = Vec::new();
    let runs = cg.locals.declared_runs();
    write_uleb128(&mut out, runs.len() as u64);
    for (count, ty) in runs {
        write_uleb128(&mut out, count as u64);
        out.push(ty.encode());
    }
    out.extend(cg.code);
    out
}

impl<'a> Cg<'a> {
    fn op(&mut self, byte: u8) {
        self.code.push(byte);
    }

    fn op2(&mut self, a: u8, b: u8) {
        self.code.push(a);
        self.code.push(b);
    }

    fn uleb(&mut self, v: u64) {
        write_uleb128(&mut self.code, v);
    }

    fn sleb(&mut self, v: i64) {
        write_sleb128(&mut self.code, v);
    }

    fn mem_arg(&mut self, align: u32) {
        self.uleb(align as u64);
        self.uleb(0); // offset folded into the preceding i32.const address
    }

    fn gen_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(e) => self.gen_expr_discard(e),
            Stmt::Block(stmts) => {
                self.ctx.push_scope();
                for s in stmts {
                    self.gen_stmt(s);
                }
                self.ctx.pop_scope();
            }
            Stmt::If { cond, then_branch, else_branch } => {
                self.gen_expr_bool(cond);
                self.op2(0x04, 0x40); // if (void)
                self.gen_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.op(0x05); // else
                    self.gen_stmt(else_branch);
                }
                self.op(0x0b); // end
            }
            Stmt::While { cond, body } => {
                self.op2(0x02, 0x40); // block
                self.control.push(FrameKind::Block);
                self.op2(0x03, 0x40); // loop
                self.control.push(FrameKind::Loop);
                self.gen_expr_bool(cond);
                self.op(0x45); // i32.eqz
                self.uleb_br_if_out(1); // exit block if condition false
                self.gen_stmt(body);
                self.br_to_loop();
                self.op(0x0b); // end loop
                self.control.pop();
                self.op(0x0b); // end block
                self.control.pop();
            }
            Stmt::DoWhile { body, cond } => {
                self.op2(0x02, 0x40); // block (break target)
                self.control.push(FrameKind::Block);
                self.op2(0x03, 0x40); // loop (continue target)
                self.control.push(FrameKind::Loop);
                self.gen_stmt(body);
                self.gen_expr_bool(cond);
                self.op(0x0d); // br_if 0 -> loop again
                self.uleb(0);
                self.op(0x0b); // end loop
                self.control.pop();
                self.op(0x0b); // end block
                self.control.pop();
            }
            Stmt::For { init, cond, step, body } => {
                self.ctx.push_scope();
                if let Some(init) = init {
                    self.gen_stmt(init);
                }
                self.op2(0x02, 0x40); // block (break)
                self.control.push(FrameKind::Block);
                self.op2(0x03, 0x40); // loop (continue lands here, steps, then rechecks)
                self.control.push(FrameKind::Loop);
                if let Some(cond) = cond {
                    self.gen_expr_bool(cond);
                    self.op(0x45);
                    self.uleb_br_if_out(1);
                }
                self.gen_stmt(body);
                if let Some(step) = step {
                    self.gen_expr_discard(step);
                }
                self.br_to_loop();
                self.op(0x0b);
                self.control.pop();
                self.op(0x0b);
                self.control.pop();
                self.ctx.pop_scope();
            }
            Stmt::Switch { cond, cases, body } => self.gen_switch(cond, cases, body),
            Stmt::Return(value) => {
                if let Some(value) = value {
                    self.gen_expr(value);
                }
                self.op(0x0f); // return
            }
            Stmt::Break => {
                let depth = self.control.depth_to_nearest(FrameKind::Block).unwrap_or(0);
                self.op(0x0c);
                self.uleb(depth as u64);
            }
            Stmt::Continue => {
                let depth = self.control.depth_to_nearest(FrameKind::Loop).unwrap_or(0);
                self.op(0x0c);
                self.uleb(depth as u64);
            }
            Stmt::Goto(_) | Stmt::Label(..) => {
                // Arbitrary goto has no structured-control-flow encoding
                // in Wasm without a full relooper pass; this back-end's
                // input is restricted to loop/switch-shaped control flow
                // (spec.md §4.7 Non-goals).
            }
            Stmt::Asm(_) => {
                // Inline assembly has no Wasm equivalent; skipped with a
                // diagnostic rather than silently miscompiling.
                self.ctx.report(crate::error::CodegenError::Unsupported {
                    loc: self.ctx.here(),
                    detail: "inline asm is not representable in the WebAssembly back-end".to_string(),
                });
            }
            Stmt::VarDecl(var, init) => {
                let ty = ValType::of(&var.ty);
                let idx = self.locals.declare(&var.name, ty);
                self.ctx.scope_stack.last_mut().unwrap().locals.insert(var.name.clone(), var.clone());
                if let Some(init) = init {
                    self.gen_expr(init);
                    self.op(0x21); // local.set
                    self.uleb(idx as u64);
                }
            }
        }
    }

    fn br_to_loop(&mut self) {
        self.op(0x0c); // br
        self.uleb(0); // the innermost enclosing loop
    }

    fn uleb_br_if_out(&mut self, depth: u64) {
        self.op(0x0d); // br_if
        self.uleb(depth);
    }

    /// `switch` without a dense-jump-table fast path (spec.md §4.7
    /// Non-goals: no computed-`br_table` construction here) — an
    /// if/else-if cascade compares the scrutinee against each case.
    fn gen_switch(&mut self, cond: &Expr, cases: &[(Option<i64>, usize)], body: &Stmt) {
        let stmts: Vec<Stmt> = match body {
            Stmt::Block(v) => v.clone(),
            other => vec![other.clone()],
        };

        self.op2(0x02, 0x40); // block (break target)
        self.control.push(FrameKind::Block);

        let ty = ValType::of(&resolved_type(cond));
        let scrut_idx = self.locals.declare("__switch_scrutinee", ty);
        self.gen_expr(cond);
        self.op(0x21);
        self.uleb(scrut_idx as u64);

        // One nested block per reachable case/default boundary, innermost
        // first, matching a straightforward Duff-free "goto-equivalent"
        // chain: `br` into the right nesting level then fall through.
        let mut boundaries: Vec<usize> = cases.iter().map(|(_, idx)| *idx).collect();
        boundaries.sort_unstable();
        boundaries.dedup();

        for _ in &boundaries {
            self.op2(0x02, 0x40);
            self.control.push(FrameKind::Scope);
        }

        for (value, idx) in cases {
            if let Some(v) = value {
                let depth = boundaries.iter().rev().position(|&b| b == *idx).unwrap() as u32;
                self.op(0x20); // local.get
                self.uleb(scrut_idx as u64);
                self.const_typed(ty, *v);
                self.op(eq_op(ty));
                self.op(0x0d); // br_if
                self.uleb(depth as u64);
            }
        }
        if let Some((_, default_idx)) = cases.iter().find(|(v, _)| v.is_none()) {
            let depth = boundaries.iter().rev().position(|&b| b == *default_idx).unwrap() as u32;
            self.op(0x0c);
            self.uleb(depth as u64);
        } else {
            // No default: fall through to the outer block, skipping the body.
            self.op(0x0c);
            self.uleb(boundaries.len() as u64);
        }

        for (i, &boundary) in boundaries.iter().enumerate() {
            self.op(0x0b); // close the i-th nested block, landing exactly at `boundary`
            self.control.pop();
            let end = boundaries.get(i + 1).copied().unwrap_or(stmts.len());
            for stmt in &stmts[boundary..end] {
                self.gen_stmt(stmt);
            }
        }
        self.op(0x0b); // end outer block
        self.control.pop();
    }

    fn gen_expr_bool(&mut self, expr: &Expr) {
        self.gen_expr(expr);
        let expr_ty = resolved_type(expr);
        if !matches!(expr_ty, Type::Bool) {
            let ty = ValType::of(&expr_ty);
            match ty {
                ValType::I32 => {}
                ValType::I64 => {
                    self.op(0x42);
                    self.sleb(0);
                    self.op(0x52); // i64.ne
                }
                ValType::F32 => {
                    self.op(0x43);
                    self.code.extend_from_slice(&0f32.to_le_bytes());
                    self.op(0x5c); // f32.ne
                }
                ValType::F64 => {
                    self.op(0x44);
                    self.code.extend_from_slice(&0f64.to_le_bytes());
                    self.op(0x62); // f64.ne
                }
            }
        }
    }

    fn const_typed(&mut self, ty: ValType, v: i64) {
        match ty {
            ValType::I32 => {
                self.op(0x41);
                self.sleb(v);
            }
            ValType::I64 => {
                self.op(0x42);
                self.sleb(v);
            }
            ValType::F32 => {
                self.op(0x43);
                self.code.extend_from_slice(&(v as f32).to_le_bytes());
            }
            ValType::F64 => {
                self.op(0x44);
                self.code.extend_from_slice(&(v as f64).to_le_bytes());
            }
        }
    }

    fn gen_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::IntLit(v, ty) => self.const_typed(ValType::of(ty), *v),
            Expr::FloatLit(v, ty) => {
                let ty = ValType::of(ty);
                match ty {
                    ValType::F32 => {
                        self.op(0x43);
                        self.code.extend_from_slice(&(*v as f32).to_le_bytes());
                    }
                    _ => {
                        self.op(0x44);
                        self.code.extend_from_slice(&v.to_le_bytes());
                    }
                }
            }
            Expr::StrLit(s) => {
                let offset = self.module.intern_string(self.ctx, s);
                self.op(0x41);
                self.sleb(offset as i64);
            }
            Expr::Variable(var) => self.gen_variable_load(var),
            Expr::Unary(UnOp::AddrOf, inner) => self.gen_address(inner),
            Expr::Unary(UnOp::Deref, inner) => {
                self.gen_expr(inner);
                let ty = resolved_type(expr);
                self.emit_load(ValType::of(&ty), &ty);
            }
            Expr::Unary(UnOp::Neg, inner) => {
                let ty = ValType::of(&resolved_type(inner));
                match ty {
                    ValType::F32 | ValType::F64 => {
                        self.gen_expr(inner);
                        self.op(if ty == ValType::F32 { 0x8c } else { 0x9a });
                    }
                    _ => {
                        self.const_typed(ty, 0);
                        self.gen_expr(inner);
                        self.op(sub_op(ty));
                    }
                }
            }
            Expr::Unary(UnOp::BitNot, inner) => {
                let ty = ValType::of(&resolved_type(inner));
                self.gen_expr(inner);
                self.const_typed(ty, -1);
                self.op(xor_op(ty));
            }
            Expr::Unary(UnOp::LogNot, inner) => {
                self.gen_expr_bool(inner);
                self.op(0x45); // i32.eqz
            }
            Expr::Unary(UnOp::PreInc | UnOp::PreDec | UnOp::PostInc | UnOp::PostDec, inner) => {
                self.gen_incdec(expr, inner);
            }
            Expr::Binary(BinOp::LogAnd, l, r) => self.gen_logical(true, l, r),
            Expr::Binary(BinOp::LogOr, l, r) => self.gen_logical(false, l, r),
            Expr::Binary(op, l, r) if is_compare(*op) => {
                let lty = resolved_type(l);
                let ty = ValType::of(&lty);
                let unsigned = lty.is_unsigned();
                self.gen_expr(l);
                self.gen_expr(r);
                self.op(compare_op(ty, *op, unsigned));
            }
            Expr::Binary(op, l, r) => {
                let lty = resolved_type(l);
                let ty = ValType::of(&lty);
                let unsigned = lty.is_unsigned();
                self.gen_expr(l);
                self.gen_expr(r);
                self.op(arith_op(ty, *op, unsigned));
            }
            Expr::Assign(target, value) => self.gen_assign(target, value, true),
            Expr::CompoundAssign(op, target, value) => self.gen_compound_assign(*op, target, value),
            Expr::Ternary(cond, t, f) => {
                self.gen_expr_bool(cond);
                let ty = ValType::of(&resolved_type(t));
                self.op(0x04);
                self.op(ty.encode());
                self.gen_expr(t);
                self.op(0x05);
                self.gen_expr(f);
                self.op(0x0b);
            }
            Expr::Cast(ty, inner) => {
                self.gen_expr(inner);
                self.emit_cast(&resolved_type(inner), ty);
            }
            Expr::Member { .. } | Expr::Index(..) => {
                self.gen_address(expr);
                let ty = resolved_type(expr);
                self.emit_load(ValType::of(&ty), &ty);
            }
            Expr::Call { .. } => self.gen_call(expr),
            Expr::Comma(a, b) => {
                self.gen_expr_discard(a);
                self.gen_expr(b);
            }
        }
    }

    /// Lowers `expr` purely for effect, leaving the stack exactly as it
    /// was before — assignment forms skip materializing their own
    /// result value rather than pushing it just to immediately `drop` it.
    fn gen_expr_discard(&mut self, expr: &Expr) {
        match expr {
            Expr::Assign(target, value) => self.gen_assign(target, value, false),
            Expr::CompoundAssign(op, target, value) => {
                self.gen_compound_assign(*op, target, value);
                self.op(0x1a);
            }
            _ => {
                self.gen_expr(expr);
                if expr_produces_value(expr) {
                    self.op(0x1a);
                }
            }
        }
    }

    fn gen_logical(&mut self, is_and: bool, l: &Expr, r: &Expr) {
        self.gen_expr_bool(l);
        if is_and {
            self.op2(0x04, 0x7f); // if (result i32)
            self.gen_expr_bool(r);
            self.op(0x05);
            self.op(0x41);
            self.sleb(0);
            self.op(0x0b);
        } else {
            self.op2(0x04, 0x7f);
            self.op(0x41);
            self.sleb(1);
            self.op(0x05);
            self.gen_expr_bool(r);
            self.op(0x0b);
        }
    }

    /// Pushes the address (an `i32`) of an l-value expression.
    fn gen_address(&mut self, expr: &Expr) {
        match expr {
            Expr::Variable(var) => {
                let offset = self.global_offset_of(var);
                self.op(0x41);
                self.sleb(offset as i64);
            }
            Expr::Unary(UnOp::Deref, inner) => self.gen_expr(inner),
            Expr::Member { base, member, arrow } => {
                if *arrow {
                    self.gen_expr(base);
                } else {
                    self.gen_address(base);
                }
                let struct_ty = if *arrow { resolved_type(base).pointee().cloned().unwrap_or(Type::Void) } else { resolved_type(base) };
                let offset = match &struct_ty {
                    Type::Struct(s) | Type::Union(s) => s.members.get(*member).map(|m| m.offset).unwrap_or(0),
                    _ => 0,
                };
                if offset != 0 {
                    self.op(0x41);
                    self.sleb(offset as i64);
                    self.op(0x6a); // i32.add
                }
            }
            Expr::Index(base, index) => {
                self.gen_expr(base);
                self.gen_expr(index);
                let elem_size = resolved_type(base).pointee().map(|t| t.size()).unwrap_or(1).max(1);
                if elem_size != 1 {
                    self.op(0x41);
                    self.sleb(elem_size as i64);
                    self.op(0x6c); // i32.mul
                }
                self.op(0x6a); // i32.add
            }
            _ => self.gen_expr(expr),
        }
    }

    fn global_offset_of(&mut self, var: &crate::ast::VarInfo) -> i32 {
        self.module.global_offset(&var.name).unwrap_or(0)
    }

    fn gen_variable_load(&mut self, var: &crate::ast::VarInfo) {
        match var.storage {
            StorageClass::Local | StorageClass::Param => {
                if let Some(idx) = self.locals.lookup(&var.name) {
                    self.op(0x20); // local.get
                    self.uleb(idx as u64);
                } else {
                    let ty = ValType::of(&var.ty);
                    let idx = self.locals.declare(&var.name, ty);
                    self.op(0x20);
                    self.uleb(idx as u64);
                }
            }
            StorageClass::Global | StorageClass::Extern | StorageClass::Static => {
                self.gen_address(&Expr::Variable(std::rc::Rc::new(var.clone())));
                self.emit_load(ValType::of(&var.ty), &var.ty);
            }
        }
    }

    fn emit_load(&mut self, ty: ValType, src_ty: &Type) {
        let op = match (ty, src_ty) {
            (ValType::I32, Type::Int { width: 1, signed: true }) => 0x2c,
            (ValType::I32, Type::Int { width: 1, signed: false }) => 0x2d,
            (ValType::I32, Type::Bool) => 0x2d,
            (ValType::I32, Type::Int { width: 2, signed: true }) => 0x2e,
            (ValType::I32, Type::Int { width: 2, signed: false }) => 0x2f,
            (ValType::I32, _) => 0x28,
            (ValType::I64, _) => 0x29,
            (ValType::F32, _) => 0x2a,
            (ValType::F64, _) => 0x2b,
        };
        self.op(op);
        let align = if matches!(src_ty, Type::Int { width: 1, .. } | Type::Bool) {
            0
        } else if matches!(src_ty, Type::Int { width: 2, .. }) {
            1
        } else {
            natural_align(ty)
        };
        self.mem_arg(align);
    }

    fn emit_store(&mut self, ty: ValType, dst_ty: &Type) {
        let op = match (ty, dst_ty) {
            (ValType::I32, Type::Int { width: 1, .. }) => 0x3a,
            (ValType::I32, Type::Bool) => 0x3a,
            (ValType::I32, Type::Int { width: 2, .. }) => 0x3b,
            (ValType::I32, _) => 0x36,
            (ValType::I64, _) => 0x37,
            (ValType::F32, _) => 0x38,
            (ValType::F64, _) => 0x39,
        };
        self.op(op);
        let align = if matches!(dst_ty, Type::Int { width: 1, .. } | Type::Bool) {
            0
        } else if matches!(dst_ty, Type::Int { width: 2, .. }) {
            1
        } else {
            natural_align(ty)
        };
        self.mem_arg(align);
    }

    fn gen_assign(&mut self, target: &Expr, value: &Expr, leave_value: bool) {
        match target {
            Expr::Variable(var) if matches!(var.storage, StorageClass::Local | StorageClass::Param) => {
                let ty = ValType::of(&var.ty);
                let idx = self.locals.lookup(&var.name).unwrap_or_else(|| self.locals.declare(&var.name, ty));
                self.gen_expr(value);
                if leave_value {
                    self.op(0x22); // local.tee
                } else {
                    self.op(0x21); // local.set
                }
                self.uleb(idx as u64);
            }
            _ => {
                self.gen_address(target);
                self.gen_expr(value);
                let target_ty = resolved_type(target);
                let ty = ValType::of(&target_ty);
                if leave_value {
                    // No memory `tee`: stash in a scratch local to leave
                    // the stored value as this expression's result.
                    let scratch = self.locals.declare("__store_scratch", ty);
                    self.op(0x22);
                    self.uleb(scratch as u64);
                    self.emit_store(ty, &target_ty);
                    self.op(0x20);
                    self.uleb(scratch as u64);
                } else {
                    self.emit_store(ty, &target_ty);
                }
            }
        }
    }

    fn gen_compound_assign(&mut self, op: BinOp, target: &Expr, value: &Expr) {
        let target_ty = resolved_type(target);
        let ty = ValType::of(&target_ty);
        let unsigned = target_ty.is_unsigned();
        match target {
            Expr::Variable(var) if matches!(var.storage, StorageClass::Local | StorageClass::Param) => {
                let idx = self.locals.lookup(&var.name).unwrap_or_else(|| self.locals.declare(&var.name, ty));
                self.op(0x20);
                self.uleb(idx as u64);
                self.gen_expr(value);
                self.op(arith_op(ty, op, unsigned));
                self.op(0x22); // local.tee leaves the new value
                self.uleb(idx as u64);
            }
            _ => {
                self.gen_address(target);
                let addr_scratch = self.locals.declare("__addr_scratch", ValType::I32);
                self.op(0x22);
                self.uleb(addr_scratch as u64);
                self.emit_load(ty, &target_ty);
                self.gen_expr(value);
                self.op(arith_op(ty, op, unsigned));
                let val_scratch = self.locals.declare("__cassign_scratch", ty);
                self.op(0x22);
                self.uleb(val_scratch as u64);
                self.op(0x20);
                self.uleb(addr_scratch as u64);
                self.op(0x20);
                self.uleb(val_scratch as u64);
                self.emit_store(ty, &target_ty);
                self.op(0x20);
                self.uleb(val_scratch as u64);
            }
        }
    }

    fn gen_incdec(&mut self, expr: &Expr, inner: &Expr) {
        let post = matches!(expr, Expr::Unary(UnOp::PostInc | UnOp::PostDec, _));
        let inc = matches!(expr, Expr::Unary(UnOp::PreInc | UnOp::PostInc, _));
        let inner_ty = resolved_type(inner);
        let ty = ValType::of(&inner_ty);
        let step = inner_ty.pointee().map(|t| t.size().max(1) as i64).unwrap_or(1);
        let delta = if inc { step } else { -step };

        if let Expr::Variable(var) = inner {
            if matches!(var.storage, StorageClass::Local | StorageClass::Param) {
                let idx = self.locals.lookup(&var.name).unwrap_or_else(|| self.locals.declare(&var.name, ty));
                if post {
                    let old = self.locals.declare("__postfix_old", ty);
                    self.op(0x20);
                    self.uleb(idx as u64);
                    self.op(0x22);
                    self.uleb(old as u64);
                    self.op(0x20);
                    self.uleb(old as u64);
                    self.const_typed(ty, delta);
                    self.op(arith_op(ty, BinOp::Add, false));
                    self.op(0x21);
                    self.uleb(idx as u64);
                    self.op(0x20);
                    self.uleb(old as u64);
                } else {
                    self.op(0x20);
                    self.uleb(idx as u64);
                    self.const_typed(ty, delta);
                    self.op(arith_op(ty, BinOp::Add, false));
                    self.op(0x22);
                    self.uleb(idx as u64);
                }
                return;
            }
        }

        self.gen_address(inner);
        let addr_scratch = self.locals.declare("__incdec_addr", ValType::I32);
        self.op(0x22);
        self.uleb(addr_scratch as u64);
        self.emit_load(ty, &inner_ty);
        let old = self.locals.declare("__incdec_old", ty);
        self.op(0x22);
        self.uleb(old as u64);
        self.op(0x20);
        self.uleb(addr_scratch as u64);
        self.op(0x20);
        self.uleb(old as u64);
        self.const_typed(ty, delta);
        self.op(arith_op(ty, BinOp::Add, false));
        let new = self.locals.declare("__incdec_new", ty);
        self.op(0x22);
        self.uleb(new as u64);
        self.emit_store(ty, &inner_ty);
        self.op(0x20);
        self.uleb(if post { old } else { new } as u64);
    }

    fn emit_cast(&mut self, from: &Type, to: &Type) {
        let from_ty = ValType::of(from);
        let to_ty = ValType::of(to);
        if from_ty == to_ty {
            return;
        }
        let op = match (from_ty, to_ty) {
            (ValType::I64, ValType::I32) => 0xa7, // i32.wrap_i64
            (ValType::I32, ValType::I64) => {
                if from.is_unsigned() {
                    0xad
                } else {
                    0xac
                }
            } // i64.extend_i32_{u,s}
            (ValType::F64, ValType::F32) => 0xb6, // f32.demote_f64
            (ValType::F32, ValType::F64) => 0xbb, // f64.promote_f32
            (ValType::I32, ValType::F32) => {
                if from.is_unsigned() {
                    0xb3
                } else {
                    0xb2
                }
            }
            (ValType::I32, ValType::F64) => {
                if from.is_unsigned() {
                    0xb8
                } else {
                    0xb7
                }
            }
            (ValType::I64, ValType::F32) => {
                if from.is_unsigned() {
                    0xb5
                } else {
                    0xb4
                }
            }
            (ValType::I64, ValType::F64) => {
                if from.is_unsigned() {
                    0xba
                } else {
                    0xb9
                }
            }
            (ValType::F32, ValType::I32) => {
                if to.is_unsigned() {
                    0xa9
                } else {
                    0xa8
                }
            }
            (ValType::F64, ValType::I32) => {
                if to.is_unsigned() {
                    0xab
                } else {
                    0xaa
                }
            }
            (ValType::F32, ValType::I64) => {
                if to.is_unsigned() {
                    0xae
                } else {
                    0xad
                }
            }
            (ValType::F64, ValType::I64) => {
                if to.is_unsigned() {
                    0xb1
                } else {
                    0xb0
                }
            }
            _ => unreachable!("from_ty == to_ty handled above"),
        };
        self.op(op);
    }

    fn gen_call(&mut self, expr: &Expr) {
        let (callee, args) = match expr {
            Expr::Call { callee, args, .. } => (callee, args),
            _ => unreachable!(),
        };
        for a in args {
            self.gen_expr(a);
        }
        let name = match callee.as_ref() {
            Expr::Variable(var) => var.name.clone(),
            _ => {
                self.ctx.report(crate::error::CodegenError::Unsupported {
                    loc: self.ctx.here(),
                    detail: "indirect calls are not supported by the WebAssembly back-end".to_string(),
                });
                return;
            }
        };
        let idx = self.module.function_index(&name).unwrap_or(0);
        self.op(0x10); // call
        self.uleb(idx as u64);
    }
}

fn natural_align(ty: ValType) -> u32 {
    match ty {
        ValType::I32 | ValType::F32 => 2,
        ValType::I64 | ValType::F64 => 3,
    }
}

fn is_compare(op: BinOp) -> bool {
    matches!(op, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
}

fn eq_op(ty: ValType) -> u8 {
    match ty {
        ValType::I32 => 0x46,
        ValType::I64 => 0x51,
        ValType::F32 => 0x5b,
        ValType::F64 => 0x61,
    }
}

fn compare_op(ty: ValType, op: BinOp, unsigned: bool) -> u8 {
    match (ty, op) {
        (ValType::I32, BinOp::Eq) => 0x46,
        (ValType::I32, BinOp::Ne) => 0x47,
        (ValType::I32, BinOp::Lt) => if unsigned { 0x49 } else { 0x48 },
        (ValType::I32, BinOp::Gt) => if unsigned { 0x4b } else { 0x4a },
        (ValType::I32, BinOp::Le) => if unsigned { 0x4d } else { 0x4c },
        (ValType::I32, BinOp::Ge) => if unsigned { 0x4f } else { 0x4e },
        (ValType::I64, BinOp::Eq) => 0x51,
        (ValType::I64, BinOp::Ne) => 0x52,
        (ValType::I64, BinOp::Lt) => if unsigned { 0x54 } else { 0x53 },
        (ValType::I64, BinOp::Gt) => if unsigned { 0x56 } else { 0x55 },
        (ValType::I64, BinOp::Le) => if unsigned { 0x58 } else { 0x57 },
        (ValType::I64, BinOp::Ge) => if unsigned { 0x5a } else { 0x59 },
        (ValType::F32, BinOp::Eq) => 0x5b,
        (ValType::F32, BinOp::Ne) => 0x5c,
        (ValType::F32, BinOp::Lt) => 0x5d,
        (ValType::F32, BinOp::Gt) => 0x5e,
        (ValType::F32, BinOp::Le) => 0x5f,
        (ValType::F32, BinOp::Ge) => 0x60,
        (ValType::F64, BinOp::Eq) => 0x61,
        (ValType::F64, BinOp::Ne) => 0x62,
        (ValType::F64, BinOp::Lt) => 0x63,
        (ValType::F64, BinOp::Gt) => 0x64,
        (ValType::F64, BinOp::Le) => 0x65,
        (ValType::F64, BinOp::Ge) => 0x66,
        _ => unreachable!("not a comparison"),
    }
}

fn sub_op(ty: ValType) -> u8 {
    match ty {
        ValType::I32 => 0x6b,
        ValType::I64 => 0x7d,
        ValType::F32 => 0x93,
        ValType::F64 => 0xa1,
    }
}

fn xor_op(ty: ValType) -> u8 {
    match ty {
        ValType::I32 => 0x73,
        ValType::I64 => 0x85,
        _ => unreachable!("no bitwise ops on floats"),
    }
}

fn arith_op(ty: ValType, op: BinOp, unsigned: bool) -> u8 {
    match (ty, op) {
        (ValType::I32, BinOp::Add) => 0x6a,
        (ValType::I32, BinOp::Sub) => 0x6b,
        (ValType::I32, BinOp::Mul) => 0x6c,
        (ValType::I32, BinOp::Div) => if unsigned { 0x6e } else { 0x6d },
        (ValType::I32, BinOp::Mod) => if unsigned { 0x70 } else { 0x6f },
        (ValType::I32, BinOp::BitAnd) => 0x71,
        (ValType::I32, BinOp::BitOr) => 0x72,
        (ValType::I32, BinOp::BitXor) => 0x73,
        (ValType::I32, BinOp::Shl) => 0x74,
        (ValType::I32, BinOp::Shr) => if unsigned { 0x76 } else { 0x75 },
        (ValType::I64, BinOp::Add) => 0x7c,
        (ValType::I64, BinOp::Sub) => 0x7d,
        (ValType::I64, BinOp::Mul) => 0x7e,
        (ValType::I64, BinOp::Div) => if unsigned { 0x80 } else { 0x7f },
        (ValType::I64, BinOp::Mod) => if unsigned { 0x82 } else { 0x81 },
        (ValType::I64, BinOp::BitAnd) => 0x83,
        (ValType::I64, BinOp::BitOr) => 0x84,
        (ValType::I64, BinOp::BitXor) => 0x85,
        (ValType::I64, BinOp::Shl) => 0x86,
        (ValType::I64, BinOp::Shr) => if unsigned { 0x88 } else { 0x87 },
        (ValType::F32, BinOp::Add) => 0x92,
        (ValType::F32, BinOp::Sub) => 0x93,
        (ValType::F32, BinOp::Mul) => 0x94,
        (ValType::F32, BinOp::Div) => 0x95,
        (ValType::F64, BinOp::Add) => 0xa0,
        (ValType::F64, BinOp::Sub) => 0xa1,
        (ValType::F64, BinOp::Mul) => 0xa2,
        (ValType::F64, BinOp::Div) => 0xa3,
        _ => unreachable!("unsupported arithmetic op/type pairing"),
    }
}

/// Whether lowering `e` as a statement leaves a value on the stack that
/// must be dropped (every expression except a bare call to a void
/// function or an assignment used purely for effect already balances
/// its own stack in this lowering, but conservatively: everything but a
/// void-typed call produces one value here).
fn expr_produces_value(e: &Expr) -> bool {
    !matches!(resolved_type(e), Type::Void)
}

/// `Expr::ty()` can't resolve a `Member` access against its struct
/// layout on its own (ast.rs leaves that to lowering), and every type
/// that composes around one inherits the same placeholder `Type::Void`
/// through `ast::Expr::ty()`'s naive recursion. This mirrors `ty()` but
/// recurses through its own resolution everywhere a `Member` could hide.
fn resolved_type(expr: &Expr) -> Type {
    match expr {
        Expr::Member { base, member, arrow } => {
            let struct_ty = if *arrow {
                resolved_type(base).pointee().cloned().unwrap_or(Type::Void)
            } else {
                resolved_type(base)
            };
            match &struct_ty {
                Type::Struct(s) | Type::Union(s) => s.members.get(*member).map(|m| m.ty.clone()).unwrap_or(Type::Void),
                _ => Type::Void,
            }
        }
        Expr::Unary(UnOp::Deref, inner) => resolved_type(inner).pointee().cloned().unwrap_or(Type::Void),
        Expr::Unary(UnOp::AddrOf, inner) => Type::Pointer(std::rc::Rc::new(resolved_type(inner))),
        Expr::Unary(_, inner) => resolved_type(inner),
        Expr::Binary(op, l, _) if is_compare(*op) || matches!(op, BinOp::LogAnd | BinOp::LogOr) => {
            let _ = l;
            Type::Int { width: 4, signed: true }
        }
        Expr::Binary(_, l, _) => resolved_type(l),
        Expr::Assign(l, _) | Expr::CompoundAssign(_, l, _) => resolved_type(l),
        Expr::Ternary(_, t, _) => resolved_type(t),
        Expr::Index(base, _) => resolved_type(base).pointee().cloned().unwrap_or(Type::Void),
        Expr::Comma(_, r) => resolved_type(r),
        _ => expr.ty(),
    }
}
