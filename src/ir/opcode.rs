//! The closed opcode set from spec.md §4.1, modeled as a tagged sum rather
//! than the source project's function-pointer dispatch table (per the
//! design note in spec.md §9: "a modern implementation should use a tagged
//! sum over opcodes with exhaustive pattern matching").

/// Condition kind for `COND`/`JMP`. `Any` is a synthetic unconditional
/// jump; `None` is a no-op placeholder used while a conditional jump's
/// target is still being patched in during lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondKind {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Any,
    None,
}

impl CondKind {
    /// The condition for the branch not taken, used when a `JMP` is
    /// inverted during legalisation (e.g. to fall through instead of jump).
    pub fn negate(self) -> CondKind {
        match self {
            CondKind::Eq => CondKind::Ne,
            CondKind::Ne => CondKind::Eq,
            CondKind::Lt => CondKind::Ge,
            CondKind::Le => CondKind::Gt,
            CondKind::Gt => CondKind::Le,
            CondKind::Ge => CondKind::Lt,
            CondKind::Any => CondKind::None,
            CondKind::None => CondKind::Any,
        }
    }
}

bitflags::bitflags! {
    /// Per-instruction flags. `UNSIGNED` applies to arithmetic and
    /// comparisons; `FLONUM` marks a float operand/opcode pairing; `CONST`
    /// marks that an operand carries a literal value on its VReg rather
    /// than occupying a register or slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IrFlags: u8 {
        const UNSIGNED = 0b001;
        const FLONUM   = 0b010;
        const CONST    = 0b100;
    }
}

/// The closed opcode set (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    // Memory/address
    Bofs,
    Iofs,
    Sofs,
    Load,
    LoadS,
    Store,
    StoreS,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    Lshift,
    Rshift,
    // Data movement
    Mov,
    Cast,
    // Control
    Cond,
    Jmp,
    Tjmp,
    // Calls/returns
    Precall,
    Pusharg,
    Call,
    Result,
    Subsp,
    // Misc
    Asm,
}

impl Opcode {
    /// Opcodes that terminate a basic block: control transfer that may not
    /// fall through (spec.md §3 BB invariant: "only the last instruction
    /// may be a terminator").
    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::Tjmp)
    }

    pub fn is_commutative(self) -> bool {
        matches!(self, Opcode::Add | Opcode::Mul | Opcode::BitAnd | Opcode::BitOr | Opcode::BitXor)
    }
}
