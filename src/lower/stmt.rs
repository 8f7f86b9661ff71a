//! Statement lowering (spec.md §4.2).
//!
//! Loops and `switch` are rewritten into explicit BB chains rather than
//! carried as structured control flow in the IR (the IR has none); this
//! mirrors the source project's `bb_split`-per-construct lowering.

use crate::ast::Stmt;
use crate::ir::{CondKind, Ir, Opcode, Payload, SizeClass};

use super::expr::{gen_cond_jmp, gen_expr, gen_lval};
use super::FuncLowerer;

/// Open break/continue targets for the loop or switch currently being
/// lowered, one frame per nesting level.
struct LoopCtx {
    break_target: crate::ir::Bb,
    continue_target: crate::ir::Bb,
}

/// Per-function lowering state not carried by `FuncLowerer` itself: the
/// break/continue stack and the goto-label fixups, kept alongside it via
/// a companion struct so `FuncLowerer` doesn't grow statement-lowering
/// concerns it doesn't otherwise need.
#[derive(Default)]
struct StmtState {
    loops: Vec<LoopCtx>,
    labels: std::collections::HashMap<String, crate::ir::Bb>,
}

thread_local! {
    static STATE: std::cell::RefCell<Vec<StmtState>> = std::cell::RefCell::new(Vec::new());
}

fn with_state<R>(f: impl FnOnce(&mut StmtState) -> R) -> R {
    STATE.with(|s| {
        let mut stack = s.borrow_mut();
        if stack.is_empty() {
            stack.push(StmtState::default());
        }
        f(stack.last_mut().unwrap())
    })
}

/// Pushes a fresh per-function state frame. Must be paired with `pop_state`
/// at the end of `lower_function`, otherwise goto labels from one function
/// would remain visible (and possibly colliding) while lowering the next.
pub fn push_state() {
    STATE.with(|s| s.borrow_mut().push(StmtState::default()));
}

pub fn pop_state() {
    STATE.with(|s| {
        s.borrow_mut().pop();
    });
}

/// Lowers one statement into `lo`'s current function, advancing
/// `lo.curbb` as BBs are split.
pub fn lower_stmt(lo: &mut FuncLowerer, stmt: &Stmt) {
    match stmt {
        Stmt::Expr(e) => {
            gen_expr(lo, e);
        }
        Stmt::Block(stmts) => {
            lo.ctx.push_scope();
            for s in stmts {
                lower_stmt(lo, s);
            }
            lo.ctx.pop_scope();
        }
        Stmt::If { cond, then_branch, else_branch } => lower_if(lo, cond, then_branch, else_branch.as_deref()),
        Stmt::While { cond, body } => lower_while(lo, cond, body),
        Stmt::DoWhile { body, cond } => lower_do_while(lo, body, cond),
        Stmt::For { init, cond, step, body } => lower_for(lo, init.as_deref(), cond.as_ref(), step.as_ref(), body),
        Stmt::Switch { cond, cases, body } => lower_switch(lo, cond, cases, body),
        Stmt::Return(value) => lower_return(lo, value.as_ref()),
        Stmt::Break => {
            let target = with_state(|s| s.loops.last().map(|l| l.break_target));
            if let Some(target) = target {
                emit_jmp(lo, target);
                let bb = lo.split_bb();
                lo.set_curbb(bb);
            }
        }
        Stmt::Continue => {
            let target = with_state(|s| s.loops.last().map(|l| l.continue_target));
            if let Some(target) = target {
                emit_jmp(lo, target);
                let bb = lo.split_bb();
                lo.set_curbb(bb);
            }
        }
        Stmt::Goto(label) => {
            let target = with_state(|s| s.labels.get(label).copied());
            match target {
                Some(bb) => emit_jmp(lo, bb),
                None => {
                    // Forward reference to a label not yet lowered: resolved
                    // by a second pass would be needed for a general
                    // front-end; this crate's input is already a
                    // single-pass-orderable AST (spec.md Non-goals).
                    let bb = lo.split_bb();
                    with_state(|s| s.labels.insert(label.clone(), bb));
                    emit_jmp(lo, bb);
                }
            }
            let bb = lo.split_bb();
            lo.set_curbb(bb);
        }
        Stmt::Label(name, inner) => {
            let bb = lo.split_bb();
            emit_jmp(lo, bb);
            lo.set_curbb(bb);
            with_state(|s| {
                s.labels.insert(name.clone(), bb);
            });
            lower_stmt(lo, inner);
        }
        Stmt::Asm(text) => {
            lo.func.push(lo.curbb, Ir::new(Opcode::Asm).with_payload(Payload::InlineAsm(text.clone())));
        }
        Stmt::VarDecl(var, init) => {
            lo.ctx.scope_stack.last_mut().unwrap().locals.insert(var.name.clone(), var.clone());
            if let Some(init) = init {
                let addr = gen_lval(lo, &crate::ast::Expr::Variable(var.clone()));
                let v = gen_expr(lo, init);
                lo.func.push(lo.curbb, Ir::new(Opcode::Store).with_opr1(addr).with_opr2(v));
            }
        }
    }
}

fn emit_jmp(lo: &mut FuncLowerer, target: crate::ir::Bb) {
    lo.func.push(lo.curbb, Ir::new(Opcode::Jmp).with_payload(Payload::Cond { cond: CondKind::Any, target: Some(target) }));
}

fn lower_if(lo: &mut FuncLowerer, cond: &crate::ast::Expr, then_branch: &Stmt, else_branch: Option<&Stmt>) {
    let then_bb = lo.split_bb();
    let else_bb = lo.split_bb();
    let join = lo.split_bb();

    gen_cond_jmp(lo, cond, true, then_bb, else_bb);

    lo.set_curbb(then_bb);
    lower_stmt(lo, then_branch);
    emit_jmp(lo, join);

    lo.set_curbb(else_bb);
    if let Some(else_branch) = else_branch {
        lower_stmt(lo, else_branch);
    }
    emit_jmp(lo, join);

    lo.set_curbb(join);
}

/// `while (cond) body` as check-body-step-exit (spec.md §4.2's generic
/// loop shape, specialised with an empty step).
fn lower_while(lo: &mut FuncLowerer, cond: &crate::ast::Expr, body: &Stmt) {
    let check = lo.split_bb();
    let body_bb = lo.split_bb();
    let exit = lo.split_bb();

    emit_jmp(lo, check);
    lo.set_curbb(check);
    gen_cond_jmp(lo, cond, true, body_bb, exit);

    lo.set_curbb(body_bb);
    with_state(|s| s.loops.push(LoopCtx { break_target: exit, continue_target: check }));
    lower_stmt(lo, body);
    with_state(|s| {
        s.loops.pop();
    });
    emit_jmp(lo, check);

    lo.set_curbb(exit);
}

fn lower_do_while(lo: &mut FuncLowerer, body: &Stmt, cond: &crate::ast::Expr) {
    let body_bb = lo.split_bb();
    let check = lo.split_bb();
    let exit = lo.split_bb();

    emit_jmp(lo, body_bb);
    lo.set_curbb(body_bb);
    with_state(|s| s.loops.push(LoopCtx { break_target: exit, continue_target: check }));
    lower_stmt(lo, body);
    with_state(|s| {
        s.loops.pop();
    });
    emit_jmp(lo, check);

    lo.set_curbb(check);
    gen_cond_jmp(lo, cond, true, body_bb, exit);

    lo.set_curbb(exit);
}

fn lower_for(
    lo: &mut FuncLowerer,
    init: Option<&Stmt>,
    cond: Option<&crate::ast::Expr>,
    step: Option<&crate::ast::Expr>,
    body: &Stmt,
) {
    lo.ctx.push_scope();
    if let Some(init) = init {
        lower_stmt(lo, init);
    }

    let check = lo.split_bb();
    let body_bb = lo.split_bb();
    let step_bb = lo.split_bb();
    let exit = lo.split_bb();

    emit_jmp(lo, check);
    lo.set_curbb(check);
    match cond {
        Some(cond) => gen_cond_jmp(lo, cond, true, body_bb, exit),
        None => emit_jmp(lo, body_bb),
    }

    lo.set_curbb(body_bb);
    with_state(|s| s.loops.push(LoopCtx { break_target: exit, continue_target: step_bb }));
    lower_stmt(lo, body);
    with_state(|s| {
        s.loops.pop();
    });
    emit_jmp(lo, step_bb);

    lo.set_curbb(step_bb);
    if let Some(step) = step {
        gen_expr(lo, step);
    }
    emit_jmp(lo, check);

    lo.set_curbb(exit);
    lo.ctx.pop_scope();
}

/// `switch` (spec.md §4.2): a dense, small case set above the density
/// threshold lowers to a `TJMP` jump table; otherwise a compare cascade.
/// `cases` gives each case's constant (`None` for `default`) and the
/// index into the switch body's flattened statement list where its label
/// falls; statements between labels share a BB so C's label-fallthrough
/// semantics fall out of the statement walk below without special-casing.
fn lower_switch(lo: &mut FuncLowerer, cond: &crate::ast::Expr, cases: &[(Option<i64>, usize)], body: &Stmt) {
    use std::collections::HashMap;

    const JUMP_TABLE_DENSITY_THRESHOLD: f64 = 0.5;

    let stmts: Vec<Stmt> = match body {
        Stmt::Block(v) => v.clone(),
        other => vec![other.clone()],
    };

    let exit = lo.split_bb();

    let mut index_bb: HashMap<usize, crate::ir::Bb> = HashMap::new();
    for (_, idx) in cases {
        index_bb.entry(*idx).or_insert_with(|| lo.split_bb());
    }
    index_bb.entry(0).or_insert_with(|| lo.split_bb());

    let default_bb = cases.iter().find(|(value, _)| value.is_none()).map(|(_, idx)| index_bb[idx]).unwrap_or(exit);

    let v = gen_expr(lo, cond);
    let int_cases: Vec<(i64, crate::ir::Bb)> =
        cases.iter().filter_map(|(value, idx)| value.map(|val| (val, index_bb[idx]))).collect();

    let use_table = if int_cases.len() >= 4 {
        let lo_val = int_cases.iter().map(|(v, _)| *v).min().unwrap();
        let hi_val = int_cases.iter().map(|(v, _)| *v).max().unwrap();
        let span = (hi_val - lo_val + 1).max(1) as f64;
        (int_cases.len() as f64 / span) >= JUMP_TABLE_DENSITY_THRESHOLD
    } else {
        false
    };

    if use_table {
        let lo_val = int_cases.iter().map(|(v, _)| *v).min().unwrap();
        let hi_val = int_cases.iter().map(|(v, _)| *v).max().unwrap();
        let mut table = vec![default_bb; (hi_val - lo_val + 1) as usize];
        for (val, bb) in &int_cases {
            table[(*val - lo_val) as usize] = *bb;
        }
        let base = lo.func.new_const(SizeClass::I64, lo_val);
        let idx = lo.new_vreg(SizeClass::I64);
        lo.func.push(lo.curbb, Ir::new(Opcode::Sub).with_dst(idx).with_opr1(v).with_opr2(base));
        lo.func.push(lo.curbb, Ir::new(Opcode::Tjmp).with_opr1(idx).with_payload(Payload::JumpTable { table }));
    } else {
        for (val, bb) in &int_cases {
            let imm = lo.func.new_const(SizeClass::I64, *val);
            lo.func.push(
                lo.curbb,
                Ir::new(Opcode::Jmp).with_opr1(v).with_opr2(imm).with_payload(Payload::Cond { cond: CondKind::Eq, target: Some(*bb) }),
            );
        }
        emit_jmp(lo, default_bb);
    }

    with_state(|s| s.loops.push(LoopCtx { break_target: exit, continue_target: exit }));
    lo.set_curbb(index_bb[&0]);
    for (i, stmt) in stmts.iter().enumerate() {
        if i > 0 {
            if let Some(&bb) = index_bb.get(&i) {
                emit_jmp(lo, bb);
                lo.set_curbb(bb);
            }
        }
        lower_stmt(lo, stmt);
    }
    with_state(|s| {
        s.loops.pop();
    });
    emit_jmp(lo, exit);

    lo.set_curbb(exit);
}

fn lower_return(lo: &mut FuncLowerer, value: Option<&crate::ast::Expr>) {
    if let Some(value) = value {
        let v = gen_expr(lo, value);
        lo.func.push(lo.curbb, Ir::new(Opcode::Result).with_opr1(v));
    }
    // `RESULT` isn't itself a BB terminator (spec.md §4.1), so any
    // statement following a `return` lowers into a fresh, unreachable BB
    // rather than appending after a non-terminating last instruction.
    let unreachable = lo.split_bb();
    lo.set_curbb(unreachable);
}
