//! Virtual register data (spec.md §3: "Virtual register (VReg)").

use super::entities::FrameSlot;

/// log2(byte width) for integers, or one of the two float classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl SizeClass {
    pub fn bytes(self) -> u32 {
        match self {
            SizeClass::I8 => 1,
            SizeClass::I16 => 2,
            SizeClass::I32 | SizeClass::F32 => 4,
            SizeClass::I64 | SizeClass::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, SizeClass::F32 | SizeClass::F64)
    }

    pub fn from_bytes(bytes: u32, float: bool) -> SizeClass {
        if float {
            if bytes <= 4 { SizeClass::F32 } else { SizeClass::F64 }
        } else {
            match bytes {
                1 => SizeClass::I8,
                2 => SizeClass::I16,
                4 => SizeClass::I32,
                _ => SizeClass::I64,
            }
        }
    }
}

/// Where a VReg's value actually lives once allocation has run. Before
/// allocation every VReg starts `Unassigned` (or `Const` if it already
/// carries a literal). Invariant: a VReg never moves between these kinds
/// once allocation has assigned one — category (int/float) and size are
/// fixed at construction and never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Unassigned,
    /// Physical register index within the VReg's class (integer or float
    /// pool; which pool is determined by `SizeClass::is_float`).
    Reg(u16),
    Spilled(FrameSlot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VRegFlags {
    pub constant: bool,
    pub flonum: bool,
    /// Set when `&v` is taken anywhere; such a VReg is never kept live
    /// purely in a register across a call boundary assumption and forces
    /// the function to require a stack frame.
    pub reference_taken: bool,
    pub unsigned: bool,
}

#[derive(Debug, Clone)]
pub struct VRegData {
    pub size: SizeClass,
    pub flags: VRegFlags,
    /// Present only when `flags.constant` is set.
    pub const_value: Option<i64>,
    pub location: Location,
}

impl VRegData {
    pub fn new_value(size: SizeClass) -> Self {
        VRegData {
            size,
            flags: VRegFlags { flonum: size.is_float(), ..Default::default() },
            const_value: None,
            location: Location::Unassigned,
        }
    }

    pub fn new_const(size: SizeClass, value: i64) -> Self {
        VRegData {
            size,
            flags: VRegFlags { flonum: size.is_float(), constant: true, ..Default::default() },
            const_value: Some(value),
            location: Location::Unassigned,
        }
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self.location, Location::Spilled(_))
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self.location, Location::Reg(_))
    }
}
