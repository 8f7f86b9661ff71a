//! Register allocation (spec.md §4.3): liveness, physical assignment, and
//! spilling to a per-function stack frame.

pub mod context;
pub mod liveness;
pub mod register_set;

pub use context::{allocate, RegAllocResult};
pub use liveness::{compute as compute_liveness, LiveInterval, Liveness};
pub use register_set::{RegClassLayout, RegisterSet};
