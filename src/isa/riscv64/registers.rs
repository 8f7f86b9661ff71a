//! RISC-V64 ABI register names (`x0`..`x31`), indexed by raw register
//! number so the allocator's bitmask lines up with the ISA numbering.

const NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "fp", "s1", "a0", "a1", "a2", "a3", "a4", "a5", "a6", "a7",
    "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4", "t5", "t6",
];

pub fn int_name(reg: u16) -> &'static str {
    NAMES[reg as usize]
}

pub fn float_name(reg: u16) -> String {
    format!("f{reg}")
}

/// The scratch register reserved via `detect_extra_occupied` for
/// indirect jumps and stores whose address must be materialised first
/// (spec.md §4.3 step 4).
pub const SCRATCH: u16 = 5; // t0
