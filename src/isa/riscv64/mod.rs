//! RISC-V64 (LP64D) back-end: target IR tweaking and instruction
//! emission (spec.md §4.4, §4.5).

mod registers;

use registers::{float_name, int_name, SCRATCH};

use crate::binemit::{AsmWriter, Section};
use crate::error::{CodegenError, CodegenResult};
use crate::ir::{CondKind, Function, Ir, IrFlags, Location, Opcode, Payload, VReg};
use crate::isa::{shared, CallConv, TargetIsa};
use crate::regalloc::{RegAllocResult, RegClassLayout, RegisterSet};
use crate::settings::Flags;

pub struct Riscv64Isa {
    #[allow(dead_code)]
    flags: Flags,
}

impl Riscv64Isa {
    pub fn new(flags: Flags) -> Self {
        Riscv64Isa { flags }
    }

    fn operand(&self, func: &Function, v: VReg) -> String {
        let data = &func.vregs[v];
        if data.flags.constant {
            return format!("{}", data.const_value.unwrap_or(0));
        }
        match data.location {
            Location::Reg(r) => {
                if data.flags.flonum {
                    float_name(r)
                } else {
                    int_name(r).to_string()
                }
            }
            Location::Spilled(slot) => format!("{}(fp)", func.frame_slots[slot].offset),
            Location::Unassigned => "<unassigned>".to_string(),
        }
    }

    /// Compare-with-nonzero EQ/NE rewrite (spec.md §4.4): RISC-V has no
    /// single compare-and-set for `==`/`!=` against an arbitrary value, so
    /// this lowers to a `SUB` followed by a `COND ... 0`.
    fn legalize_eqne(&self, func: &mut Function) {
        for &bb in func.bb_order.clone().iter() {
            let len = func.bbs[bb].insts.len();
            for i in 0..len {
                let ir = func.bbs[bb].insts[i].clone();
                if ir.opcode == Opcode::Cond {
                    if let Payload::Cond { cond, .. } = ir.payload {
                        if matches!(cond, CondKind::Eq | CondKind::Ne) {
                            if let (Some(o1), Some(o2)) = (ir.opr1, ir.opr2) {
                                let size = func.vregs[o1].size;
                                let diff = func.new_vreg(size);
                                let zero = func.new_const(size, 0);
                                let sub = Ir::new(Opcode::Sub).with_dst(diff).with_opr1(o1).with_opr2(o2);
                                let mut cond2 = ir.clone();
                                cond2.opr1 = Some(diff);
                                cond2.opr2 = Some(zero);
                                func.bbs[bb].insts[i] = sub;
                                func.bbs[bb].insts.insert(i + 1, cond2);
                            }
                        }
                    }
                }
            }
        }
    }
}

impl TargetIsa for Riscv64Isa {
    fn name(&self) -> &'static str {
        "riscv64"
    }

    fn call_conv(&self) -> CallConv {
        CallConv::Lp64d
    }

    fn pointer_bytes(&self) -> u32 {
        8
    }

    fn int_register_layout(&self) -> RegClassLayout {
        RegClassLayout {
            num_regs: 32,
            temporaries: vec![6, 7, 28, 29, 30, 31, 10, 11, 12, 13, 14, 15, 16, 17], // t1-t2, t3-t6, a0-a7
            callee_saves: vec![9, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27],           // s1, s2-s11
        }
    }

    fn float_register_layout(&self) -> RegClassLayout {
        RegClassLayout {
            num_regs: 32,
            temporaries: vec![0, 1, 2, 3, 4, 5, 6, 7, 28, 29, 30, 31, 10, 11, 12, 13, 14, 15, 16, 17],
            callee_saves: vec![8, 9, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27],
        }
    }

    fn detect_extra_occupied(
        &self,
        _func: &Function,
        int_regs: &mut RegisterSet,
        _float_regs: &mut RegisterSet,
        _needs_frame: bool,
    ) {
        // t0 is held back from general allocation as the scratch register
        // indirect jumps and constant-base loads/stores materialise their
        // address into (spec.md §4.3 step 4).
        int_regs.reserve(SCRATCH);
    }

    fn param_reg_mapping(&self) -> &[u16] {
        &[10, 11, 12, 13, 14, 15, 16, 17] // a0..a7
    }

    fn float_param_reg_mapping(&self) -> &[u16] {
        &[10, 11, 12, 13, 14, 15, 16, 17] // fa0..fa7
    }

    fn max_immediate_bits(&self) -> u32 {
        12
    }

    fn inline_memcpy_threshold(&self) -> usize {
        64
    }

    fn tweak_ir(&self, func: &mut Function, alloc: &mut RegAllocResult) {
        self.legalize_eqne(func);
        shared::legalize(func, alloc, self.max_immediate_bits());
    }

    fn emit_function(&self, func: &Function, alloc: &RegAllocResult, w: &mut AsmWriter) -> CodegenResult<()> {
        w.switch_section(Section::Text);
        w.global(&func.name);
        w.align(2);
        let entry_label = w.mangle(&func.name);
        w.label(&entry_label);

        let callee_saves = alloc.int_regs.used_callee_saves();
        let frame_size = align16(func.frame_size);

        if func.needs_frame {
            if frame_size > 0 {
                w.instr("addi", &format!("sp, sp, -{frame_size}"));
            }
            w.instr("sd", &format!("ra, {}(sp)", frame_size.saturating_sub(8)));
            w.instr("sd", &format!("fp, {}(sp)", frame_size.saturating_sub(16)));
            w.instr("addi", &format!("fp, sp, {frame_size}"));
            for (i, &r) in callee_saves.iter().enumerate() {
                let off = frame_size.saturating_sub(24 + i as u32 * 8);
                w.instr("sd", &format!("{}, {}(sp)", int_name(r), off));
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

impl Riscv64Isa {
    fn emit_epilogue(&self, func: &Function, callee_saves: &[u16], frame_size: u32, w: &mut AsmWriter) {
        if func.needs_frame {
            for (i, &r) in callee_saves.iter().enumerate() {
                let off = frame_size.saturating_sub(24 + i as u32 * 8);
                w.instr("ld", &format!("{}, {}(sp)", int_name(r), off));
            }
            w.instr("ld", &format!("ra, {}(sp)", frame_size.saturating_sub(8)));
            w.instr("ld", &format!("fp, {}(sp)", frame_size.saturating_sub(16)));
            if frame_size > 0 {
                w.instr("addi", &format!("sp, sp, {frame_size}"));
            }
        }
        w.instr("ret", "");
    }

    fn emit_inst(&self, func: &Function, ir: &crate::ir::Ir, w: &mut AsmWriter) -> CodegenResult<()> {
        match ir.opcode {
            Opcode::Mov => {
                let dst = ir.dst.ok_or_else(|| CodegenError::Assertion("MOV missing dst".into()))?;
                let src = ir.opr1.ok_or_else(|| CodegenError::Assertion("MOV missing src".into()))?;
                let mnem = if ir.flags.contains(IrFlags::FLONUM) { "fmv.d" } else { "mv" };
                w.instr(mnem, &format!("{}, {}", self.operand(func, dst), self.operand(func, src)));
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::BitAnd | Opcode::BitOr | Opcode::BitXor => {
                let dst = ir.dst.unwrap();
                let (o1, o2) = (ir.opr1.unwrap(), ir.opr2.unwrap());
                let float = ir.flags.contains(IrFlags::FLONUM);
                let mnem = match (ir.opcode, float) {
                    (Opcode::Add, true) => "fadd.d",
                    (Opcode::Sub, true) => "fsub.d",
                    (Opcode::Mul, true) => "fmul.d",
                    (Opcode::Add, false) => "add",
                    (Opcode::Sub, false) => "sub",
                    (Opcode::Mul, false) => "mul",
                    (Opcode::BitAnd, _) => "and",
                    (Opcode::BitOr, _) => "or",
                    (Opcode::BitXor, _) => "xor",
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
                w.instr("ld", &format!("{}, 0({})", self.operand(func, dst), self.operand(func, addr)));
            }
            Opcode::Store => {
                let addr = ir.opr1.unwrap();
                let val = ir.opr2.unwrap();
                w.instr("sd", &format!("{}, 0({})", self.operand(func, val), self.operand(func, addr)));
            }
            Opcode::Bofs => {
                let dst = ir.dst.unwrap();
                if let Payload::Frame(slot) = ir.payload {
                    let off = func.frame_slots[slot].offset;
                    w.instr("addi", &format!("{}, fp, {off}", self.operand(func, dst)));
                }
            }
            Opcode::Iofs => {
                let dst = ir.dst.unwrap();
                if let Payload::Label { symbol, .. } = &ir.payload {
                    let sym = w.mangle(symbol);
                    w.instr("la", &format!("{}, {}", self.operand(func, dst), sym));
                }
            }
            Opcode::Cond => {
                let dst = ir.dst.unwrap();
                let (o1, o2) = (ir.opr1.unwrap(), ir.opr2.unwrap());
                if let Payload::Cond { cond, .. } = ir.payload {
                    let op = match cond {
                        CondKind::Lt => "slt",
                        CondKind::Gt => "sgt",
                        _ => "sub",
                    };
                    w.instr(op, &format!("{}, {}, {}", self.operand(func, dst), self.operand(func, o1), self.operand(func, o2)));
                }
            }
            Opcode::Jmp => {
                if let Payload::Cond { cond, target } = &ir.payload {
                    let label = target.map(|t| format!(".L{}{}", func.name, t.as_u32())).unwrap_or_default();
                    match cond {
                        CondKind::Any => w.instr("j", &label),
                        CondKind::None => {}
                        c => {
                            if let (Some(o1), Some(o2)) = (ir.opr1, ir.opr2) {
                                let mnem = match c {
                                    CondKind::Eq => "beq",
                                    CondKind::Ne => "bne",
                                    CondKind::Lt => "blt",
                                    CondKind::Ge => "bge",
                                    CondKind::Le => "ble",
                                    CondKind::Gt => "bgt",
                                    _ => "beq",
                                };
                                w.instr(mnem, &format!("{}, {}, {}", self.operand(func, o1), self.operand(func, o2), label));
                            }
                        }
                    }
                }
            }
            Opcode::Tjmp => {
                let idx = ir.opr1.unwrap();
                w.instr("la", &format!("{}, {}.jmptab", int_name(SCRATCH), func.name));
                w.instr("slli", &format!("{}, {}, 3", int_name(SCRATCH + 1), self.operand(func, idx)));
                w.instr("add", &format!("{}, {}, {}", int_name(SCRATCH), int_name(SCRATCH), int_name(SCRATCH + 1)));
                w.instr("ld", &format!("{}, 0({})", int_name(SCRATCH), int_name(SCRATCH)));
                w.instr("jr", int_name(SCRATCH));
            }
            Opcode::Precall => {
                if let Payload::StackArgsSize(size) = ir.payload {
                    if size > 0 {
                        w.instr("addi", &format!("sp, sp, -{size}"));
                    }
                }
            }
            Opcode::Pusharg => {
                let v = ir.opr1.unwrap();
                if let Payload::ArgSlot(i) = ir.payload {
                    let regs = if func.vregs[v].flags.flonum { self.float_param_reg_mapping() } else { self.param_reg_mapping() };
                    if let Some(&phys) = regs.get(i) {
                        let name: String = if func.vregs[v].flags.flonum { float_name(phys) } else { int_name(phys).to_string() };
                        w.instr("mv", &format!("{name}, {}", self.operand(func, v)));
                    }
                }
            }
            Opcode::Call => {
                if let Payload::Call { symbol: Some(sym), .. } = &ir.payload {
                    let mangled = w.mangle(sym);
                    w.instr("call", &mangled);
                } else if let Some(target) = ir.opr1 {
                    w.instr("jalr", &self.operand(func, target));
                }
            }
            Opcode::Result => {
                if let Some(dst) = ir.dst {
                    let name = if func.vregs[dst].flags.flonum { "fa0" } else { "a0" };
                    w.instr("mv", &format!("{}, {name}", self.operand(func, dst)));
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
                w.instr("sext.w", &format!("{}, {}", self.operand(func, dst), self.operand(func, src)));
            }
            Opcode::Asm => {
                if let Payload::InlineAsm(text) = &ir.payload {
                    w.raw(text);
                }
            }
            Opcode::BitNot => {
                let dst = ir.dst.unwrap();
                let src = ir.opr1.unwrap();
                w.instr("not", &format!("{}, {}", self.operand(func, dst), self.operand(func, src)));
            }
            Opcode::Sofs => {
                let dst = ir.dst.unwrap();
                if let Payload::Frame(slot) = ir.payload {
                    let off = func.frame_slots[slot].offset;
                    w.instr("addi", &format!("{}, fp, {off}", self.operand(func, dst)));
                }
            }
            Opcode::LoadS => {
                let dst = ir.dst.unwrap();
                if let Payload::Frame(slot) = ir.payload {
                    let off = func.frame_slots[slot].offset;
                    w.instr("ld", &format!("{}, {off}(fp)", self.operand(func, dst)));
                }
            }
            Opcode::StoreS => {
                let val = ir.opr2.ok_or_else(|| CodegenError::Assertion("STORE_S missing value".into()))?;
                if let Payload::Frame(slot) = ir.payload {
                    let off = func.frame_slots[slot].offset;
                    w.instr("sd", &format!("{}, {off}(fp)", self.operand(func, val)));
                }
            }
            Opcode::Div => {
                let dst = ir.dst.unwrap();
                let (o1, o2) = (ir.opr1.unwrap(), ir.opr2.unwrap());
                let mnem = if ir.flags.contains(IrFlags::UNSIGNED) { "divu" } else { "div" };
                w.instr(mnem, &format!("{}, {}, {}", self.operand(func, dst), self.operand(func, o1), self.operand(func, o2)));
            }
            Opcode::Mod => {
                let dst = ir.dst.unwrap();
                let (o1, o2) = (ir.opr1.unwrap(), ir.opr2.unwrap());
                let mnem = if ir.flags.contains(IrFlags::UNSIGNED) { "remu" } else { "rem" };
                w.instr(mnem, &format!("{}, {}, {}", self.operand(func, dst), self.operand(func, o1), self.operand(func, o2)));
            }
            Opcode::Lshift => {
                let dst = ir.dst.unwrap();
                let (o1, o2) = (ir.opr1.unwrap(), ir.opr2.unwrap());
                let mnem = if func.vregs[o2].flags.constant { "slli" } else { "sll" };
                w.instr(mnem, &format!("{}, {}, {}", self.operand(func, dst), self.operand(func, o1), self.operand(func, o2)));
            }
            Opcode::Rshift => {
                let dst = ir.dst.unwrap();
                let (o1, o2) = (ir.opr1.unwrap(), ir.opr2.unwrap());
                let unsigned = ir.flags.contains(IrFlags::UNSIGNED);
                let mnem = match (unsigned, func.vregs[o2].flags.constant) {
                    (true, true) => "srli",
                    (true, false) => "srl",
                    (false, true) => "srai",
                    (false, false) => "sra",
                };
                w.instr(mnem, &format!("{}, {}, {}", self.operand(func, dst), self.operand(func, o1), self.operand(func, o2)));
            }
        }
        Ok(())
    }
}
