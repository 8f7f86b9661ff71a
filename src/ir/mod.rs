//! The intermediate representation (spec.md §4.1 and §3 data model):
//! opcodes, instructions, basic blocks, and the per-function arenas that
//! own them.

pub mod bb;
pub mod entities;
pub mod function;
pub mod instruction;
pub mod opcode;
pub mod vreg;

pub use bb::BasicBlock;
pub use entities::{Bb, FrameSlot, Inst, VReg};
pub use function::Function;
pub use instruction::{Ir, Payload};
pub use opcode::{CondKind, IrFlags, Opcode};
pub use vreg::{Location, SizeClass, VRegData, VRegFlags};
