//! The function-level backend record (spec.md §3): owns the BB container,
//! the VReg arena, the frame size, and per-call metadata. Created when
//! lowering begins and destroyed after emission.

use cranelift_entity::PrimaryMap;

use super::bb::BasicBlock;
use super::entities::{Bb, FrameSlot, VReg};
use super::instruction::Ir;
use super::vreg::{SizeClass, VRegData};
use crate::ast::FunctionType;
use std::rc::Rc;

/// Per-spilled-VReg frame slot info (spec.md §3: "Frame info").
#[derive(Debug, Clone, Copy)]
pub struct FrameSlotInfo {
    pub size: u32,
    pub align: u32,
    /// Byte offset from the frame pointer; negative = below FP.
    pub offset: i32,
}

/// Caller-save snapshot taken at a `PRECALL`, used by the emitter to push
/// and pop the right registers around the paired `CALL`.
#[derive(Debug, Clone, Default)]
pub struct CallSite {
    pub precall_inst: Option<Inst>,
    pub call_inst: Option<Inst>,
    pub stack_args_size: u32,
    pub saved_int_regs: Vec<u16>,
    pub saved_float_regs: Vec<u16>,
}

use super::entities::Inst;

pub struct Function {
    pub name: String,
    pub sig: Rc<FunctionType>,
    pub bbs: PrimaryMap<Bb, BasicBlock>,
    /// Container order: `bb_order[i]` is the i-th BB, matching the
    /// container invariant `next(bb_order[i]) == bb_order[i+1]`.
    pub bb_order: Vec<Bb>,
    pub vregs: PrimaryMap<VReg, VRegData>,
    pub frame_slots: PrimaryMap<FrameSlot, FrameSlotInfo>,
    /// Total frame size in bytes, a non-negative multiple of the platform
    /// stack alignment once finalised by the register allocator / emitter.
    pub frame_size: u32,
    /// True once a call, an address-taken local, or any spill forces this
    /// function to materialise a stack frame.
    pub needs_frame: bool,
    pub is_vararg: bool,
    pub calls: Vec<CallSite>,
    next_inst: u32,
}

impl Function {
    pub fn new(name: impl Into<String>, sig: Rc<FunctionType>) -> Self {
        let is_vararg = sig.variadic;
        let mut f = Function {
            name: name.into(),
            sig,
            bbs: PrimaryMap::new(),
            bb_order: Vec::new(),
            vregs: PrimaryMap::new(),
            frame_slots: PrimaryMap::new(),
            frame_size: 0,
            needs_frame: false,
            is_vararg,
            calls: Vec::new(),
            next_inst: 0,
        };
        f.new_bb();
        f
    }

    pub fn new_bb(&mut self) -> Bb {
        let bb = self.bbs.push(BasicBlock::default());
        self.bb_order.push(bb);
        bb
    }

    /// Splits the current (last) BB by creating a new one and returning it;
    /// matches the source project's `bb_split(curbb)` used throughout
    /// short-circuit/ternary/loop lowering.
    pub fn split_bb(&mut self) -> Bb {
        self.new_bb()
    }

    pub fn new_vreg(&mut self, size: SizeClass) -> VReg {
        self.vregs.push(VRegData::new_value(size))
    }

    pub fn new_const(&mut self, size: SizeClass, value: i64) -> VReg {
        self.vregs.push(VRegData::new_const(size, value))
    }

    pub fn push(&mut self, bb: Bb, inst: Ir) -> Inst {
        self.bbs[bb].push(inst);
        // `Inst` ids are handed out in program order as instructions are
        // appended, so they double as the numbering the register allocator
        // needs (spec.md §4.3 step 1) as long as nothing is pushed out of
        // container order.
        let id = Inst::from_u32(self.next_inst);
        self.next_inst += 1;
        id
    }

    pub fn new_frame_slot(&mut self, size: u32, align: u32) -> FrameSlot {
        self.frame_slots.push(FrameSlotInfo { size, align, offset: 0 })
    }

    /// Finalise `next` links to match `bb_order` (spec.md §3 invariant).
    pub fn finish_bb_links(&mut self) {
        for w in 0..self.bb_order.len() {
            let next = self.bb_order.get(w + 1).copied();
            self.bbs[self.bb_order[w]].next = next;
        }
    }

    /// Iterate instructions in container order, the numbering the register
    /// allocator relies on (spec.md §4.3 step 1).
    pub fn instructions_in_order(&self) -> impl Iterator<Item = (Bb, usize, &Ir)> {
        self.bb_order.iter().flat_map(move |&bb| {
            self.bbs[bb].insts.iter().enumerate().map(move |(i, ir)| (bb, i, ir))
        })
    }
}
