//! IR instruction record (spec.md §3: "IR instruction").

use super::entities::{Bb, FrameSlot, VReg};
use super::opcode::{CondKind, IrFlags, Opcode};

/// Opcode-specific payload that doesn't fit the generic
/// dest/operand1/operand2 shape.
#[derive(Debug, Clone)]
pub enum Payload {
    None,
    /// `BOFS`/`LOAD_S`/`STORE_S`: a spilled-slot / frame-local reference.
    Frame(FrameSlot),
    /// `IOFS`: a label offset. `global` distinguishes an externally visible
    /// symbol from a file-local one for mangling purposes.
    Label { symbol: String, global: bool },
    /// `JMP`/`COND`: the condition and (for `JMP`) the explicit successor.
    Cond { cond: CondKind, target: Option<Bb> },
    /// `TJMP`: an indirect jump through a dense jump table; `table` holds
    /// one successor BB per case, in case-value order.
    JumpTable { table: Vec<Bb> },
    /// `CALL`: target symbol for a direct call, or `None` for an indirect
    /// call through `operand1`.
    Call { symbol: Option<String>, variadic_after: Option<usize> },
    /// `PUSHARG`: which ABI argument slot (register or stack index) this
    /// argument occupies.
    ArgSlot(usize),
    /// `PRECALL`: bytes of outgoing stack-argument area to reserve.
    StackArgsSize(u32),
    /// `ASM`: an opaque inline-assembly string, passed through verbatim.
    InlineAsm(String),
}

/// One IR instruction. Invariant (spec.md §3): operand/destination arity
/// matches the opcode; at most one operand is a constant except where the
/// opcode explicitly permits it (e.g. store-immediate); comparisons carry
/// a `cond` kind via `Payload::Cond`.
#[derive(Debug, Clone)]
pub struct Ir {
    pub opcode: Opcode,
    pub dst: Option<VReg>,
    pub opr1: Option<VReg>,
    pub opr2: Option<VReg>,
    pub flags: IrFlags,
    pub payload: Payload,
}

impl Ir {
    pub fn new(opcode: Opcode) -> Self {
        Ir { opcode, dst: None, opr1: None, opr2: None, flags: IrFlags::empty(), payload: Payload::None }
    }

    pub fn with_dst(mut self, dst: VReg) -> Self {
        self.dst = Some(dst);
        self
    }

    pub fn with_opr1(mut self, v: VReg) -> Self {
        self.opr1 = Some(v);
        self
    }

    pub fn with_opr2(mut self, v: VReg) -> Self {
        self.opr2 = Some(v);
        self
    }

    pub fn with_flags(mut self, flags: IrFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Every VReg this instruction reads, in left-to-right order.
    pub fn uses(&self) -> impl Iterator<Item = VReg> + '_ {
        self.opr1.into_iter().chain(self.opr2)
    }

    pub fn is_terminator(&self) -> bool {
        self.opcode.is_terminator()
    }
}
