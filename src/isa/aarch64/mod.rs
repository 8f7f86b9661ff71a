//! AArch64 back-end (AAPCS64): target IR tweaking and instruction
//! emission (spec.md §4.4, §4.5).

mod registers;

use registers::{float_name, int_name};

use crate::binemit::{AsmWriter, Section};
use crate::error::{CodegenError, CodegenResult};
use crate::ir::{CondKind, Function, IrFlags, Location, Opcode, Payload, VReg};
use crate::isa::{shared, CallConv, TargetIsa};
use crate::regalloc::{RegAllocResult, RegClassLayout, RegisterSet};
use crate::settings::Flags;

pub struct Aarch64Isa {
    #[allow(dead_code)]
    flags: Flags,
}

impl Aarch64Isa {
    pub fn new(flags: Flags) -> Self {
        Aarch64Isa { flags }
    }

    fn operand(&self, func: &Function, v: VReg) -> String {
        let data = &func.vregs[v];
        if data.flags.constant {
            return format!("#{}", data.const_value.unwrap_or(0));
        }
        match data.location {
            Location::Reg(r) => {
                if data.flags.flonum {
                    format!("{}", float_name(r))
                } else {
                    format!("{}", int_name(r))
                }
            }
            Location::Spilled(slot) => format!("[x29, #{}]", func.frame_slots[slot].offset),
            Location::Unassigned => "<unassigned>".to_string(),
        }
    }

    fn cond_suffix(cond: CondKind) -> &'static str {
        match cond {
            CondKind::Eq => "eq",
            CondKind::Ne => "ne",
            CondKind::Lt => "lt",
            CondKind::Le => "le",
            CondKind::Gt => "gt",
            CondKind::Ge => "ge",
            CondKind::Any => "",
            CondKind::None => "",
        }
    }
}

impl TargetIsa for Aarch64Isa {
    fn name(&self) -> &'static str {
        "aarch64"
    }

    fn call_conv(&self) -> CallConv {
        CallConv::Aapcs64
    }

    fn pointer_bytes(&self) -> u32 {
        8
    }

    fn int_register_layout(&self) -> RegClassLayout {
        RegClassLayout {
            num_regs: 29, // x0..x28 (x29=FP, x30=LR, sp excluded from pool)
            temporaries: (9..=15).collect(),      // x9-x15
            callee_saves: (19..=28).collect(),    // x19-x28
        }
    }

    fn float_register_layout(&self) -> RegClassLayout {
        RegClassLayout {
            num_regs: 32,
            temporaries: (16..=31).collect(),
            callee_saves: (8..=15).collect(),
        }
    }

    fn detect_extra_occupied(
        &self,
        _func: &Function,
        int_regs: &mut RegisterSet,
        _float_regs: &mut RegisterSet,
        needs_frame: bool,
    ) {
        // x29 (FP) is reserved whenever the function requires a stack
        // frame; it never lives in the allocatable pool regardless, so
        // this documents rather than changes behaviour today. Should the
        // pool ever widen to include x29, this reservation is what keeps
        // it out when a frame is present.
        let _ = (int_regs, needs_frame);
    }

    fn param_reg_mapping(&self) -> &[u16] {
        &[0, 1, 2, 3, 4, 5, 6, 7]
    }

    fn float_param_reg_mapping(&self) -> &[u16] {
        &[0, 1, 2, 3, 4, 5, 6, 7]
    }

    fn max_immediate_bits(&self) -> u32 {
        16
    }

    fn inline_memcpy_threshold(&self) -> usize {
        64
    }

    fn tweak_ir(&self, func: &mut Function, alloc: &mut RegAllocResult) {
        shared::legalize(func, alloc, self.max_immediate_bits());
    }

    fn emit_function(&self, func: &Function, alloc: &RegAllocResult, w: &mut AsmWriter) -> CodegenResult<()> {
        w.switch_section(Section::Text);
        w.global(&func.name);
        w.align(4);
        let entry_label = w.mangle(&func.name);
        w.label(&entry_label);

        let callee_saves = alloc.int_regs.used_callee_saves();
        let frame_size = align16(func.frame_size);

        if func.needs_frame {
            w.instr("stp", "x29, x30, [sp, #-16]!");
            w.instr("mov", "x29, sp");
            for pair in callee_saves.chunks(2) {
                match pair {
                    [a, b] => w.instr("stp", &format!("x{a}, x{b}, [sp, #-16]!")),
                    [a] => w.instr("str", &format!("x{a}, [sp, #-16]!")),
                    _ => {}
                }
            }
            if frame_size > 0 {
                w.instr("sub", &format!("sp, sp, #{frame_size}"));
            }
        }

        for (i, &bb) in func.bb_order.iter().enumerate() {
            w.label(&format!(".L{}{}", func.name, i));
            for ir in &func.bbs[bb].insts {
                self.emit_inst(func, ir, w)?;
            }
        }

        if func.bb_order.last().map_or(true, |&bb| func.bbs[bb].falls_through()) {
            self.emit_epilogue(func, &callee_saves, frame_size, w);
        }
        shared::emit_jump_tables(func, w);
        Ok(())
    }
}

fn align16(n: u32) -> u32 {
    (n + 15) & !15
}

impl Aarch64Isa {
    fn emit_epilogue(&self, func: &Function, callee_saves: &[u16], frame_size: u32, w: &mut AsmWriter) {
        if func.needs_frame {
            if frame_size > 0 {
                w.instr("add", &format!("sp, sp, #{frame_size}"));
            }
            for pair in callee_saves.chunks(2).collect::<Vec<_>>().iter().rev() {
                match *pair {
                    [a, b] => w.instr("ldp", &format!("x{a}, x{b}, [sp], #16")),
                    [a] => w.instr("ldr", &format!("x{a}, [sp], #16")),
                    _ => {}
                }
            }
            w.instr("ldp", "x29, x30, [sp], #16");
        }
        w.instr("ret", "");
    }

    fn emit_inst(&self, func: &Function, ir: &crate::ir::Ir, w: &mut AsmWriter) -> CodegenResult<()> {
        match ir.opcode {
            Opcode::Mov => {
                let dst = ir.dst.ok_or_else(|| CodegenError::Assertion("MOV missing dst".into()))?;
                let src = ir.opr1.ok_or_else(|| CodegenError::Assertion("MOV missing src".into()))?;
                let mnem = if ir.flags.contains(IrFlags::FLONUM) { "fmov" } else { "mov" };
                w.instr(mnem, &format!("{}, {}", self.operand(func, dst), self.operand(func, src)));
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::BitAnd | Opcode::BitOr | Opcode::BitXor => {
                let dst = ir.dst.unwrap();
                let (o1, o2) = (ir.opr1.unwrap(), ir.opr2.unwrap());
                let float = ir.flags.contains(IrFlags::FLONUM);
                let mnem = match (ir.opcode, float) {
                    (Opcode::Add, true) => "fadd",
                    (Opcode::Sub, true) => "fsub",
                    (Opcode::Mul, true) => "fmul",
                    (Opcode::Add, false) => "add",
                    (Opcode::Sub, false) => "sub",
                    (Opcode::Mul, false) => "mul",
                    (Opcode::BitAnd, _) => "and",
                    (Opcode::BitOr, _) => "orr",
                    (Opcode::BitXor, _) => "eor",
                    _ => "add",
                };
                w.instr(mnem, &format!("{}, {}, {}", self.operand(func, dst), self.operand(func, o1), self.operand(func, o2)));
            }
            Opcode::Neg => {
                let dst = ir.dst.unwrap();
                let src = ir.opr1.unwrap();
                w.instr("neg", &format!("{}, {}", self.operand(func, dst), self.operand(func, src)));
            }
            Opcode::Load => {
                let dst = ir.dst.unwrap();
                let addr = ir.opr1.unwrap();
                w.instr("ldr", &format!("{}, [{}]", self.operand(func, dst), self.operand(func, addr)));
            }
            Opcode::Store => {
                let addr = ir.opr1.unwrap();
                let val = ir.opr2.unwrap();
                w.instr("str", &format!("{}, [{}]", self.operand(func, val), self.operand(func, addr)));
            }
            Opcode::Bofs => {
                let dst = ir.dst.unwrap();
                if let Payload::Frame(slot) = ir.payload {
                    let off = func.frame_slots[slot].offset;
                    w.instr("add", &format!("{}, x29, #{off}", self.operand(func, dst)));
                }
            }
            Opcode::Iofs => {
                let dst = ir.dst.unwrap();
                if let Payload::Label { symbol, .. } = &ir.payload {
                    let sym = w.mangle(symbol);
                    w.instr("adrp", &format!("{}, {}", self.operand(func, dst), sym));
                    w.instr("add", &format!("{}, {}, :lo12:{}", self.operand(func, dst), self.operand(func, dst), sym));
                }
            }
            Opcode::Cond => {
                let dst = ir.dst.unwrap();
                let (o1, o2) = (ir.opr1.unwrap(), ir.opr2.unwrap());
                if let Payload::Cond { cond, .. } = ir.payload {
                    w.instr("cmp", &format!("{}, {}", self.operand(func, o1), self.operand(func, o2)));
                    w.instr("cset", &format!("{}, {}", self.operand(func, dst), Self::cond_suffix(cond)));
                }
            }
            Opcode::Jmp => {
                if let Payload::Cond { cond, target } = &ir.payload {
                    if let (Some(o1), Some(o2)) = (ir.opr1, ir.opr2) {
                        w.instr("cmp", &format!("{}, {}", self.operand(func, o1), self.operand(func, o2)));
                    }
                    let label = target.map(|t| format!(".L{}{}", func.name, t.as_u32())).unwrap_or_default();
                    match cond {
                        CondKind::Any => w.instr("b", &label),
                        CondKind::None => {}
                        c => w.instr(&format!("b.{}", Self::cond_suffix(*c)), &label),
                    }
                }
            }
            Opcode::Tjmp => {
                let idx = ir.opr1.unwrap();
                w.instr("adrp", &format!("x16, {}.jmptab", func.name));
                w.instr("ldr", &format!("x16, [x16, {}, lsl #3]", self.operand(func, idx)));
                w.instr("br", "x16");
            }
            Opcode::Precall => {
                if let Payload::StackArgsSize(size) = ir.payload {
                    if size > 0 {
                        w.instr("sub", &format!("sp, sp, #{size}"));
                    }
                }
            }
            Opcode::Pusharg => {
                let v = ir.opr1.unwrap();
                if let Payload::ArgSlot(i) = ir.payload {
                    let regs = if func.vregs[v].flags.flonum { self.float_param_reg_mapping() } else { self.param_reg_mapping() };
                    if let Some(&phys) = regs.get(i) {
                        let name = if func.vregs[v].flags.flonum { float_name(phys) } else { int_name(phys).to_string() };
                        w.instr("mov", &format!("{}, {}", name, self.operand(func, v)));
                    }
                }
            }
            Opcode::Call => {
                if let Payload::Call { symbol: Some(sym), .. } = &ir.payload {
                    let mangled = w.mangle(sym);
                    w.instr("bl", &mangled);
                } else if let Some(target) = ir.opr1 {
                    w.instr("blr", &self.operand(func, target));
                }
            }
            Opcode::Result => {
                if let Some(dst) = ir.dst {
                    let name = if func.vregs[dst].flags.flonum { "d0" } else { "x0" };
                    w.instr("mov", &format!("{}, {name}", self.operand(func, dst)));
                }
            }
            Opcode::Subsp => {
                if let Some(amount) = ir.opr1 {
                    w.instr("sub", &format!("sp, sp, {}", self.operand(func, amount)));
                }
            }
            Opcode::Cast => {
                let dst = ir.dst.unwrap();
                let src = ir.opr1.unwrap();
                w.instr("sxtw", &format!("{}, {}", self.operand(func, dst), self.operand(func, src)));
            }
            Opcode::Asm => {
                if let Payload::InlineAsm(text) = &ir.payload {
                    w.raw(text);
                }
            }
            Opcode::BitNot => {
                let dst = ir.dst.unwrap();
                let src = ir.opr1.unwrap();
                w.instr("mvn", &format!("{}, {}", self.operand(func, dst), self.operand(func, src)));
            }
            Opcode::Sofs => {
                let dst = ir.dst.unwrap();
                if let Payload::Frame(slot) = ir.payload {
                    let off = func.frame_slots[slot].offset;
                    w.instr("add", &format!("{}, x29, #{off}", self.operand(func, dst)));
                }
            }
            Opcode::LoadS => {
                let dst = ir.dst.unwrap();
                if let Payload::Frame(slot) = ir.payload {
                    let off = func.frame_slots[slot].offset;
                    w.instr("ldr", &format!("{}, [x29, #{off}]", self.operand(func, dst)));
                }
            }
            Opcode::StoreS => {
                let val = ir.opr2.ok_or_else(|| CodegenError::Assertion("STORE_S missing value".into()))?;
                if let Payload::Frame(slot) = ir.payload {
                    let off = func.frame_slots[slot].offset;
                    w.instr("str", &format!("{}, [x29, #{off}]", self.operand(func, val)));
                }
            }
            Opcode::Div => {
                let dst = ir.dst.unwrap();
                let (o1, o2) = (ir.opr1.unwrap(), ir.opr2.unwrap());
                let mnem = if ir.flags.contains(IrFlags::UNSIGNED) { "udiv" } else { "sdiv" };
                w.instr(mnem, &format!("{}, {}, {}", self.operand(func, dst), self.operand(func, o1), self.operand(func, o2)));
            }
            Opcode::Mod => {
                // No hardware remainder: `q = o1 / o2; dst = o1 - q*o2`.
                let dst = ir.dst.unwrap();
                let (o1, o2) = (ir.opr1.unwrap(), ir.opr2.unwrap());
                let div_mnem = if ir.flags.contains(IrFlags::UNSIGNED) { "udiv" } else { "sdiv" };
                w.instr(div_mnem, &format!("{}, {}, {}", self.operand(func, dst), self.operand(func, o1), self.operand(func, o2)));
                w.instr("msub", &format!("{}, {}, {}, {}", self.operand(func, dst), self.operand(func, dst), self.operand(func, o2), self.operand(func, o1)));
            }
            Opcode::Lshift => {
                let dst = ir.dst.unwrap();
                let (o1, o2) = (ir.opr1.unwrap(), ir.opr2.unwrap());
                w.instr("lsl", &format!("{}, {}, {}", self.operand(func, dst), self.operand(func, o1), self.operand(func, o2)));
            }
            Opcode::Rshift => {
                let dst = ir.dst.unwrap();
                let (o1, o2) = (ir.opr1.unwrap(), ir.opr2.unwrap());
                let mnem = if ir.flags.contains(IrFlags::UNSIGNED) { "lsr" } else { "asr" };
                w.instr(mnem, &format!("{}, {}, {}", self.operand(func, dst), self.operand(func, o1), self.operand(func, o2)));
            }
        }
        Ok(())
    }
}
