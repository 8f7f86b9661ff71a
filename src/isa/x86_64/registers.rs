//! x86-64 register names, ordered to match cranelift-codegen's
//! `isa::x86::registers` numbering (rax=0 .. r15=15).

const INT_NAMES: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15",
];

pub fn int_name(reg: u16) -> &'static str {
    INT_NAMES[reg as usize]
}

pub fn float_name(reg: u16) -> String {
    format!("xmm{reg}")
}
