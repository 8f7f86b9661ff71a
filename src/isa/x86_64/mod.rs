//! x86-64 back-end (System V ABI): target IR tweaking and instruction
//! emission (spec.md §4.4, §4.5).

mod registers;

use registers::{float_name, int_name};

use crate::binemit::{AsmWriter, Section};
use crate::error::{CodegenError, CodegenResult};
use crate::ir::{CondKind, Function, IrFlags, Location, Opcode, Payload, VReg};
use crate::isa::{shared, CallConv, TargetIsa};
use crate::regalloc::{RegAllocResult, RegClassLayout, RegisterSet};
use crate::settings::Flags;

pub struct X86_64Isa {
    flags: Flags,
}

impl X86_64Isa {
    pub fn new(flags: Flags) -> Self {
        X86_64Isa { flags }
    }

    fn operand(&self, func: &Function, v: VReg) -> String {
        let data = &func.vregs[v];
        if data.flags.constant {
            return format!("${}", data.const_value.unwrap_or(0));
        }
        match data.location {
            Location::Reg(r) => {
                if data.flags.flonum {
                    format!("%{}", float_name(r))
                } else {
                    format!("%{}", int_name(r))
                }
            }
            Location::Spilled(slot) => {
                let off = func.frame_slots[slot].offset;
                format!("{off}(%rbp)")
            }
            Location::Unassigned => "<unassigned>".to_string(),
        }
    }

    fn mnemonic(&self, opcode: Opcode, flags: IrFlags) -> &'static str {
        let float = flags.contains(IrFlags::FLONUM);
        match (opcode, float) {
            (Opcode::Add, false) => "addq",
            (Opcode::Add, true) => "addsd",
            (Opcode::Sub, false) => "subq",
            (Opcode::Sub, true) => "subsd",
            (Opcode::Mul, false) => "imulq",
            (Opcode::Mul, true) => "mulsd",
            (Opcode::BitAnd, _) => "andq",
            (Opcode::BitOr, _) => "orq",
            (Opcode::BitXor, _) => "xorq",
            (Opcode::Neg, _) => "negq",
            (Opcode::BitNot, _) => "notq",
            (Opcode::Mov, false) => "movq",
            (Opcode::Mov, true) => "movsd",
            _ => "nop",
        }
    }

    fn cond_suffix(cond: CondKind, unsigned: bool) -> &'static str {
        match (cond, unsigned) {
            (CondKind::Eq, _) => "e",
            (CondKind::Ne, _) => "ne",
            (CondKind::Lt, false) => "l",
            (CondKind::Le, false) => "le",
            (CondKind::Gt, false) => "g",
            (CondKind::Ge, false) => "ge",
            (CondKind::Lt, true) => "b",
            (CondKind::Le, true) => "be",
            (CondKind::Gt, true) => "a",
            (CondKind::Ge, true) => "ae",
            (CondKind::Any, _) => "mp",
            (CondKind::None, _) => "",
        }
    }
}

impl TargetIsa for X86_64Isa {
    fn name(&self) -> &'static str {
        "x86_64"
    }

    fn call_conv(&self) -> CallConv {
        CallConv::SystemV
    }

    fn pointer_bytes(&self) -> u32 {
        8
    }

    fn int_register_layout(&self) -> RegClassLayout {
        RegClassLayout {
            num_regs: 16,
            // rax, rcx, rdx, rsi, rdi, r8-r11 (System V caller-save).
            temporaries: vec![0, 1, 2, 6, 7, 8, 9, 10, 11],
            // rbx, r12-r15. rsp(4)/rbp(5) are never placed in the pool.
            callee_saves: vec![3, 12, 13, 14, 15],
        }
    }

    fn float_register_layout(&self) -> RegClassLayout {
        RegClassLayout {
            num_regs: 16,
            temporaries: (0..16).collect(),
            callee_saves: vec![], // xmm regs are all caller-save in SysV.
        }
    }

    fn detect_extra_occupied(
        &self,
        _func: &Function,
        _int_regs: &mut RegisterSet,
        _float_regs: &mut RegisterSet,
        _needs_frame: bool,
    ) {
        // rbp/rsp are excluded from the pool entirely, so no extra
        // reservation is needed once a frame is required.
    }

    fn param_reg_mapping(&self) -> &[u16] {
        &[7, 6, 2, 1, 8, 9] // rdi, rsi, rdx, rcx, r8, r9
    }

    fn float_param_reg_mapping(&self) -> &[u16] {
        &[0, 1, 2, 3, 4, 5, 6, 7] // xmm0..xmm7
    }

    fn max_immediate_bits(&self) -> u32 {
        32
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
        let entry_label = w.mangle(&func.name);
        w.label(&entry_label);

        let callee_saves = alloc.int_regs.used_callee_saves();
        let frame_size = align16(func.frame_size);

        if func.needs_frame {
            w.instr("pushq", "%rbp");
            w.instr("movq", "%rsp, %rbp");
            for &r in &callee_saves {
                w.instr("pushq", &format!("%{}", int_name(r)));
            }
            if frame_size > 0 {
                w.instr("subq", &format!("${frame_size}, %rsp"));
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

impl X86_64Isa {
    fn emit_epilogue(&self, func: &Function, callee_saves: &[u16], frame_size: u32, w: &mut AsmWriter) {
        if func.needs_frame {
            if frame_size > 0 {
                w.instr("addq", &format!("${frame_size}, %rsp"));
            }
            for &r in callee_saves.iter().rev() {
                w.instr("popq", &format!("%{}", int_name(r)));
            }
            w.instr("popq", "%rbp");
        }
        w.instr("ret", "");
    }

    fn emit_inst(&self, func: &Function, ir: &crate::ir::Ir, w: &mut AsmWriter) -> CodegenResult<()> {
        match ir.opcode {
            Opcode::Mov => {
                let dst = ir.dst.ok_or_else(|| CodegenError::Assertion("MOV missing dst".into()))?;
                let src = ir.opr1.ok_or_else(|| CodegenError::Assertion("MOV missing src".into()))?;
                w.instr(self.mnemonic(Opcode::Mov, ir.flags), &format!("{}, {}", self.operand(func, src), self.operand(func, dst)));
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::BitAnd | Opcode::BitOr | Opcode::BitXor => {
                let dst = ir.dst.ok_or_else(|| CodegenError::Assertion("binop missing dst".into()))?;
                let src = ir.opr2.ok_or_else(|| CodegenError::Assertion("binop missing rhs".into()))?;
                w.instr(self.mnemonic(ir.opcode, ir.flags), &format!("{}, {}", self.operand(func, src), self.operand(func, dst)));
            }
            Opcode::Neg | Opcode::BitNot => {
                let dst = ir.dst.ok_or_else(|| CodegenError::Assertion("unary missing dst".into()))?;
                w.instr(self.mnemonic(ir.opcode, ir.flags), &self.operand(func, dst));
            }
            Opcode::Load => {
                let dst = ir.dst.unwrap();
                let addr = ir.opr1.unwrap();
                w.instr("movq", &format!("({}), {}", self.operand(func, addr), self.operand(func, dst)));
            }
            Opcode::Store => {
                let addr = ir.opr1.unwrap();
                let val = ir.opr2.unwrap();
                w.instr("movq", &format!("{}, ({})", self.operand(func, val), self.operand(func, addr)));
            }
            Opcode::Bofs => {
                let dst = ir.dst.unwrap();
                if let Payload::Frame(slot) = ir.payload {
                    let off = func.frame_slots[slot].offset;
                    w.instr("leaq", &format!("{off}(%rbp), {}", self.operand(func, dst)));
                }
            }
            Opcode::Iofs => {
                let dst = ir.dst.unwrap();
                if let Payload::Label { symbol, .. } = &ir.payload {
                    let sym = w.mangle(symbol);
                    w.instr("leaq", &format!("{}(%rip), {}", sym, self.operand(func, dst)));
                }
            }
            Opcode::Cond => {
                let dst = ir.dst.unwrap();
                let (o1, o2) = (ir.opr1.unwrap(), ir.opr2.unwrap());
                if let Payload::Cond { cond, .. } = ir.payload {
                    w.instr("cmpq", &format!("{}, {}", self.operand(func, o2), self.operand(func, o1)));
                    w.instr(&format!("set{}", Self::cond_suffix(cond, ir.flags.contains(IrFlags::UNSIGNED))), &self.operand(func, dst));
                }
            }
            Opcode::Jmp => {
                if let Payload::Cond { cond, target } = &ir.payload {
                    if let (Some(o1), Some(o2)) = (ir.opr1, ir.opr2) {
                        w.instr("cmpq", &format!("{}, {}", self.operand(func, o2), self.operand(func, o1)));
                    }
                    let label = target.map(|t| format!(".L{}{}", func.name, t.as_u32())).unwrap_or_default();
                    match cond {
                        CondKind::Any => w.instr("jmp", &label),
                        CondKind::None => {}
                        c => w.instr(&format!("j{}", Self::cond_suffix(*c, ir.flags.contains(IrFlags::UNSIGNED))), &label),
                    }
                }
            }
            Opcode::Tjmp => {
                if let Payload::JumpTable { .. } = &ir.payload {
                    let idx = ir.opr1.unwrap();
                    w.instr("leaq", &format!("{}.jmptab(%rip), %r11", func.name));
                    w.instr("jmpq", &format!("*(%r11,{},8)", self.operand(func, idx)));
                }
            }
            Opcode::Precall => {
                if let Payload::StackArgsSize(size) = ir.payload {
                    if size > 0 {
                        w.instr("subq", &format!("${size}, %rsp"));
                    }
                }
            }
            Opcode::Pusharg => {
                let v = ir.opr1.unwrap();
                if let Payload::ArgSlot(i) = ir.payload {
                    let regs = if func.vregs[v].flags.flonum { self.float_param_reg_mapping() } else { self.param_reg_mapping() };
                    if let Some(&phys) = regs.get(i) {
                        let name: String = if func.vregs[v].flags.flonum { float_name(phys) } else { int_name(phys).to_string() };
                        w.instr("movq", &format!("{}, %{}", self.operand(func, v), name));
                    }
                }
            }
            Opcode::Call => {
                if let Payload::Call { symbol: Some(sym), .. } = &ir.payload {
                    let mangled = w.mangle(sym);
                    w.instr("call", &mangled);
                } else if let Some(target) = ir.opr1 {
                    w.instr("call", &format!("*{}", self.operand(func, target)));
                }
            }
            Opcode::Result => {
                if let Some(dst) = ir.dst {
                    let name = if func.vregs[dst].flags.flonum { "%xmm0" } else { "%rax" };
                    w.instr("movq", &format!("{name}, {}", self.operand(func, dst)));
                }
            }
            Opcode::Subsp => {
                if let Some(amount) = ir.opr1 {
                    w.instr("subq", &format!("{}, %rsp", self.operand(func, amount)));
                }
            }
            Opcode::Cast => {
                let dst = ir.dst.unwrap();
                let src = ir.opr1.unwrap();
                w.instr("movsx", &format!("{}, {}", self.operand(func, src), self.operand(func, dst)));
            }
            Opcode::Asm => {
                if let Payload::InlineAsm(text) = &ir.payload {
                    w.raw(text);
                }
            }
            Opcode::Sofs => {
                let dst = ir.dst.unwrap();
                if let Payload::Frame(slot) = ir.payload {
                    let off = func.frame_slots[slot].offset;
                    w.instr("leaq", &format!("{off}(%rbp), {}", self.operand(func, dst)));
                }
            }
            Opcode::LoadS => {
                let dst = ir.dst.unwrap();
                if let Payload::Frame(slot) = ir.payload {
                    let off = func.frame_slots[slot].offset;
                    w.instr("movq", &format!("{off}(%rbp), {}", self.operand(func, dst)));
                }
            }
            Opcode::StoreS => {
                let val = ir.opr2.ok_or_else(|| CodegenError::Assertion("STORE_S missing value".into()))?;
                if let Payload::Frame(slot) = ir.payload {
                    let off = func.frame_slots[slot].offset;
                    w.instr("movq", &format!("{}, {off}(%rbp)", self.operand(func, val)));
                }
            }
            Opcode::Div | Opcode::Mod => {
                let dst = ir.dst.ok_or_else(|| CodegenError::Assertion("DIV/MOD missing dst".into()))?;
                let lhs = ir.opr1.ok_or_else(|| CodegenError::Assertion("DIV/MOD missing lhs".into()))?;
                let rhs = ir.opr2.ok_or_else(|| CodegenError::Assertion("DIV/MOD missing rhs".into()))?;
                let unsigned = ir.flags.contains(IrFlags::UNSIGNED);

                w.instr("movq", &format!("{}, %rax", self.operand(func, lhs)));
                // idiv/div take a register or memory divisor, never an
                // immediate; materialise a constant divisor into a scratch
                // register first.
                let divisor = if func.vregs[rhs].flags.constant {
                    w.instr("movq", &format!("{}, %r11", self.operand(func, rhs)));
                    "%r11".to_string()
                } else {
                    self.operand(func, rhs)
                };
                if unsigned {
                    w.instr("xorq", "%rdx, %rdx");
                    w.instr("divq", &divisor);
                } else {
                    w.instr("cqto", "");
                    w.instr("idivq", &divisor);
                }
                let result_reg = if ir.opcode == Opcode::Div { "%rax" } else { "%rdx" };
                w.instr("movq", &format!("{result_reg}, {}", self.operand(func, dst)));
            }
            Opcode::Lshift | Opcode::Rshift => {
                let dst = ir.dst.ok_or_else(|| CodegenError::Assertion("shift missing dst".into()))?;
                let count = ir.opr2.ok_or_else(|| CodegenError::Assertion("shift missing count".into()))?;
                let mnemonic = match (ir.opcode, ir.flags.contains(IrFlags::UNSIGNED)) {
                    (Opcode::Lshift, _) => "shlq",
                    (Opcode::Rshift, true) => "shrq",
                    (Opcode::Rshift, false) => "sarq",
                    _ => unreachable!(),
                };
                // Variable shift counts must be in %cl; immediates encode
                // directly.
                if func.vregs[count].flags.constant {
                    w.instr(mnemonic, &format!("{}, {}", self.operand(func, count), self.operand(func, dst)));
                } else {
                    w.instr("movq", &format!("{}, %rcx", self.operand(func, count)));
                    w.instr(mnemonic, &format!("%cl, {}", self.operand(func, dst)));
                }
            }
        }
        Ok(())
    }
}
