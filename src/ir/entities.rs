//! Opaque entity references into a function's arenas.
//!
//! Per the design note on cyclic references (spec.md §9: "BBs refer to
//! successor BBs; IR refers to BBs and VRegs"), every reference between
//! these types is a small `Copy` index rather than a pointer or `Rc`. Each
//! function owns one arena per entity kind (`PrimaryMap<K, V>`), and
//! `SecondaryMap` attaches liveness/allocation metadata without touching
//! the arena itself — the same representation cranelift-codegen uses for
//! `Value`/`Ebb`/`Inst`.

use cranelift_entity::entity_impl;

/// A virtual register: a pre-allocation value holder.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VReg(u32);
entity_impl!(VReg, "v");

/// A basic block.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bb(u32);
entity_impl!(Bb, "bb");

/// An IR instruction.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// A spill/local frame slot, referenced from `BOFS`/`LOAD_S`/`STORE_S`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameSlot(u32);
entity_impl!(FrameSlot, "ss");
