//! Liveness analysis (spec.md §4.3 steps 1-2).
//!
//! Numbers every instruction across the linearised BB sequence, then walks
//! backward to compute a `[def, last_use]` interval per VReg, merging
//! conservatively across jumps: any VReg live at a jump's source is
//! considered live through any BB the jump may reach. A `TJMP`'s jump
//! table targets all count as successors here (spec.md §9's Open Question
//! on `TJMP` liveness, resolved explicitly rather than left implicit).

use std::collections::HashMap;

use crate::ir::{Bb, Function, Inst, Opcode, Payload, VReg};

/// `[start, end]` inclusive instruction-index interval over which a VReg
/// is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveInterval {
    pub start: u32,
    pub end: u32,
}

impl LiveInterval {
    pub fn overlaps(&self, other: &LiveInterval) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

pub struct Liveness {
    /// Global instruction index for each `(Bb, local index)` pair, in
    /// container order (spec.md §4.3 step 1).
    pub inst_index: HashMap<(Bb, usize), u32>,
    pub intervals: HashMap<VReg, LiveInterval>,
}

/// Successor BBs of `bb`'s terminator, including every jump-table entry
/// for a `TJMP`, plus the fallthrough BB when the block doesn't end in an
/// unconditional jump.
pub fn successors(func: &Function, bb: Bb) -> Vec<Bb> {
    let block = &func.bbs[bb];
    let mut out = Vec::new();
    if let Some(term) = block.terminator() {
        match (&term.opcode, &term.payload) {
            (Opcode::Jmp, Payload::Cond { target: Some(t), cond }) => {
                out.push(*t);
                if *cond != crate::ir::CondKind::Any {
                    if let Some(n) = block.next {
                        out.push(n);
                    }
                }
            }
            (Opcode::Tjmp, Payload::JumpTable { table }) => {
                out.extend(table.iter().copied());
            }
            _ => {}
        }
    } else if let Some(n) = block.next {
        out.push(n);
    }
    out
}

pub fn compute(func: &Function) -> Liveness {
    let mut inst_index = HashMap::new();
    let mut order: Vec<(Bb, usize)> = Vec::new();
    let mut n: u32 = 0;
    for &bb in &func.bb_order {
        for i in 0..func.bbs[bb].insts.len() {
            inst_index.insert((bb, i), n);
            order.push((bb, i));
            n += 1;
        }
    }

    let mut intervals: HashMap<VReg, LiveInterval> = HashMap::new();
    let extend = |reg: VReg, idx: u32, intervals: &mut HashMap<VReg, LiveInterval>| {
        intervals
            .entry(reg)
            .and_modify(|iv| {
                iv.start = iv.start.min(idx);
                iv.end = iv.end.max(idx);
            })
            .or_insert(LiveInterval { start: idx, end: idx });
    };

    // Backward walk per instruction for def/use extents.
    for &(bb, i) in order.iter().rev() {
        let idx = inst_index[&(bb, i)];
        let ir = &func.bbs[bb].insts[i];
        if let Some(d) = ir.dst {
            extend(d, idx, &mut intervals);
        }
        for u in ir.uses() {
            extend(u, idx, &mut intervals);
        }
    }

    // Conservative cross-jump merge: anything live at the *start* of a
    // successor BB is considered live through the jump's source
    // instruction too, so an interval never ends strictly before a branch
    // that can still observe it (spec.md §4.3 step 2: "approximated here
    // by the union at BB boundaries").
    for &bb in &func.bb_order {
        let Some(last) = func.bbs[bb].insts.len().checked_sub(1) else { continue };
        let source_idx = inst_index[&(bb, last)];
        for succ in successors(func, bb) {
            let Some(&first_idx) = func.bbs[succ]
                .insts
                .iter()
                .enumerate()
                .next()
                .and_then(|_| inst_index.get(&(succ, 0)))
            else {
                continue;
            };
            for (reg, iv) in intervals.iter_mut() {
                let _ = reg;
                if iv.start <= first_idx && iv.end >= first_idx && iv.end < source_idx {
                    iv.end = source_idx;
                }
            }
        }
    }

    Liveness { inst_index, intervals }
}

/// Global index of the numbered instruction, used for reporting and for
/// `detect_extra_occupied` hooks that key off a specific IR point.
pub fn index_of(liveness: &Liveness, bb: Bb, local: usize) -> Option<u32> {
    liveness.inst_index.get(&(bb, local)).copied()
}

pub type InstId = Inst;
