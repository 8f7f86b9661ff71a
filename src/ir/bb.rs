//! Basic blocks and their container (spec.md §3: "Basic block (BB)" and
//! "BB container").

use super::entities::Bb;
use super::instruction::Ir;

/// A label, an ordered instruction list, and an implicit fallthrough
/// successor (the next BB in the container). Invariant: only the last
/// instruction may be a terminator; each BB belongs to exactly one
/// function (enforced by living in that function's `BbContainer`).
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub label: Option<String>,
    pub insts: Vec<Ir>,
    /// Filled in once the container is finalised; `None` for the last BB.
    pub next: Option<Bb>,
}

impl BasicBlock {
    pub fn push(&mut self, inst: Ir) {
        debug_assert!(
            self.insts.last().map_or(true, |last| !last.is_terminator()),
            "pushed an instruction after a BB terminator"
        );
        self.insts.push(inst);
    }

    pub fn terminator(&self) -> Option<&Ir> {
        self.insts.last().filter(|i| i.is_terminator())
    }

    /// True if control can fall off the end of this BB into `next` (i.e.
    /// there is no unconditional terminator). `Tjmp` (a switch's jump
    /// table) always dispatches to one of its targets and never falls
    /// through, regardless of its payload shape.
    pub fn falls_through(&self) -> bool {
        use super::opcode::Opcode;
        match self.terminator() {
            None => true,
            Some(ir) if ir.opcode == Opcode::Tjmp => false,
            Some(ir) => {
                use super::instruction::Payload;
                !matches!(&ir.payload, Payload::Cond { cond: super::opcode::CondKind::Any, .. })
            }
        }
    }
}
