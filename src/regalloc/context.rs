//! Linear-scan register allocation (spec.md §4.3).
//!
//! Two parallel allocators — integer and float — share one liveness pass
//! but draw from distinct physical pools and spill slots (spec.md §9
//! design note). Allocation never fails: once both pools are exhausted the
//! farthest-ending interval is spilled to a fresh frame slot.

use crate::ir::{Function, Location, VReg};
use crate::isa::TargetIsa;

use super::liveness::{self, LiveInterval};
use super::register_set::RegisterSet;

/// Per-function allocator state (spec.md §3: "RegAlloc state").
pub struct RegAllocResult {
    pub int_regs: RegisterSet,
    pub float_regs: RegisterSet,
    pub needs_frame: bool,
}

struct ActiveInterval {
    reg_vreg: VReg,
    interval: LiveInterval,
    phys: u16,
}

/// Assign every non-constant VReg in `func` a physical register or a
/// spill slot. Returns the allocator state so the emitter can query used
/// callee-saves for the prologue.
pub fn allocate(func: &mut Function, isa: &dyn TargetIsa) -> RegAllocResult {
    let liveness = liveness::compute(func);

    let mut int_regs = RegisterSet::new(isa.int_register_layout());
    let mut float_regs = RegisterSet::new(isa.float_register_layout());

    // detect_extra_occupied: target-specific reservations (e.g. FP when a
    // frame is required) applied before the scan starts, matching the
    // per-target hook from spec.md §4.3 step 4.
    let mut needs_frame = function_needs_frame(func);
    isa.detect_extra_occupied(func, &mut int_regs, &mut float_regs, needs_frame);

    // Sort VRegs by interval start (stable: ties keep VReg creation order,
    // which keeps allocation deterministic per spec.md §5).
    let mut order: Vec<(VReg, LiveInterval)> = func
        .vregs
        .keys()
        .filter(|&v| !func.vregs[v].flags.constant)
        .filter_map(|v| liveness.intervals.get(&v).map(|iv| (v, *iv)))
        .collect();
    order.sort_by(|a, b| a.1.start.cmp(&b.1.start).then(a.0.cmp(&b.0)));

    let mut active_int: Vec<ActiveInterval> = Vec::new();
    let mut active_float: Vec<ActiveInterval> = Vec::new();

    for (vreg, interval) in order {
        let is_float = func.vregs[vreg].flags.flonum;
        let (regs, active) = if is_float {
            (&mut float_regs, &mut active_float)
        } else {
            (&mut int_regs, &mut active_int)
        };

        // Release intervals whose end has passed.
        active.retain(|a| {
            if a.interval.end < interval.start {
                regs.release(a.phys);
                false
            } else {
                true
            }
        });

        if let Some(phys) = regs.allocate() {
            func.vregs[vreg].location = Location::Reg(phys);
            active.push(ActiveInterval { reg_vreg: vreg, interval, phys });
        } else {
            // Spill the active interval with the farthest end, unless the
            // new interval itself ends later (then the new one is spilled
            // instead and nothing about the active set changes).
            let farthest = active
                .iter()
                .enumerate()
                .max_by_key(|(_, a)| a.interval.end)
                .map(|(i, a)| (i, a.interval.end));

            match farthest {
                Some((idx, end)) if end > interval.end => {
                    let victim = active.remove(idx);
                    spill(func, victim.reg_vreg, &mut needs_frame);
                    func.vregs[vreg].location = Location::Reg(victim.phys);
                    active.push(ActiveInterval { reg_vreg: vreg, interval, phys: victim.phys });
                }
                _ => {
                    spill(func, vreg, &mut needs_frame);
                }
            }
        }
    }

    func.needs_frame = needs_frame;
    RegAllocResult { int_regs, float_regs, needs_frame }
}

fn function_needs_frame(func: &Function) -> bool {
    func.needs_frame
        || !func.calls.is_empty()
        || func.vregs.values().any(|v| v.flags.reference_taken)
}

fn spill(func: &mut Function, vreg: VReg, needs_frame: &mut bool) {
    *needs_frame = true;
    let data = &func.vregs[vreg];
    let bytes = data.size.bytes().max(1);
    let slot = func.new_frame_slot(bytes, bytes);
    func.vregs[vreg].location = Location::Spilled(slot);
}

/// Mapping used by the prologue (spec.md §4.3 step 5): the physical
/// register a given parameter index arrives in, per-target.
pub fn needs_param_move(isa: &dyn TargetIsa, param_index: usize, assigned: crate::ir::Location) -> bool {
    match assigned {
        Location::Reg(phys) => isa.param_reg_mapping().get(param_index).copied() != Some(phys),
        _ => true,
    }
}
