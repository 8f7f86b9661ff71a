//! Global/static data emission (spec.md §4.6): scalar, float, string,
//! array, struct/union, and bitfield-coalesced initializers, placed into
//! `.rodata`/`.data`/`.bss` and named per the mangling rules below.

use crate::ast::{GlobalScope, Initializer, StorageClass, Type, VarInfo};
use crate::binemit::{c_escape, AsmWriter, Section};
use crate::context::CompilerContext;

/// Emits every global variable in `scope`, plus any interned string
/// literals recorded on `ctx` during lowering.
pub fn emit_globals(ctx: &CompilerContext, scope: &GlobalScope, w: &mut AsmWriter) {
    for var in scope.iter() {
        emit_global(var, w);
    }
    for (symbol, text) in &ctx.string_literals {
        emit_string_literal(symbol, text, w);
    }
}

fn emit_string_literal(symbol: &str, text: &str, w: &mut AsmWriter) {
    w.switch_section(Section::Rodata);
    w.label(symbol);
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    w.ascii(&c_escape(&bytes));
}

fn emit_global(var: &VarInfo, w: &mut AsmWriter) {
    // `extern` declarations with no definition in this translation unit
    // emit nothing; the linker resolves them against another unit.
    if matches!(var.storage, StorageClass::Extern) && var.initializer.is_none() {
        return;
    }

    let symbol = var.mangled_name.clone().unwrap_or_else(|| var.name.clone());
    let size = var.ty.size().max(1);
    let align = var.ty.align().max(1);

    let is_zero_or_absent = match &var.initializer {
        None => true,
        Some(Initializer::Int(0)) => true,
        Some(Initializer::NonConstant) => true,
        _ => false,
    };

    if is_zero_or_absent {
        // Uninitialized (or all-zero) data goes to `.bss`; static-linkage
        // globals additionally get `.local` so they stay file-scoped.
        if matches!(var.storage, StorageClass::Static) {
            w.local(&symbol);
        } else {
            w.global(&symbol);
        }
        w.bss(&symbol, size, align);
        return;
    }

    if matches!(var.storage, StorageClass::Static) {
        w.local(&symbol);
    } else {
        w.global(&symbol);
    }
    w.switch_section(if var.is_const { Section::Rodata } else { Section::Data });
    w.align(align as u32);
    w.label(&symbol);
    emit_initializer(var.initializer.as_ref().unwrap(), &var.ty, w);
}

/// Recursively emits one initializer tree against its declared type.
/// Struct/union initializers walk `Type::Struct`'s member layout and pad
/// between members (and bitfields sharing a storage unit are coalesced
/// by the front-end into a single `Initializer::Int` before reaching
/// here, per spec.md §4.6 "Bitfields in initializers").
fn emit_initializer(init: &Initializer, ty: &Type, w: &mut AsmWriter) {
    match (init, ty) {
        (Initializer::Int(v), Type::Float) => {
            w.long((*v as i32 as f32).to_bits());
        }
        (Initializer::Int(v), Type::Double) => {
            w.quad((*v as f64).to_bits());
        }
        (Initializer::Float(v), Type::Float) => {
            w.long((*v as f32).to_bits());
        }
        (Initializer::Float(v), Type::Double) => {
            w.quad(v.to_bits());
        }
        (Initializer::Int(v), Type::Pointer(_)) => {
            w.quad(*v as u64);
        }
        (Initializer::Int(v), Type::Int { width, .. }) => emit_int_scalar(*v, *width, w),
        (Initializer::Int(v), Type::Bool) => w.byte(if *v != 0 { 1 } else { 0 }),
        (Initializer::SymbolOffset { symbol, offset }, _) => w.quad_symbol(symbol, *offset),
        (Initializer::Str(text), Type::Array { elem, len }) if matches!(**elem, Type::Int { width: 1, .. }) => {
            let mut bytes = text.as_bytes().to_vec();
            bytes.push(0);
            if let Some(len) = len {
                bytes.resize(*len, 0);
            }
            w.ascii(&c_escape(&bytes));
        }
        (Initializer::List(entries), Type::Array { elem, len }) => {
            let elem_size = elem.size().max(1);
            let mut cursor = 0usize;
            for (index, value) in entries {
                if *index > cursor {
                    w.zero((*index - cursor) * elem_size);
                }
                emit_initializer(value, elem, w);
                cursor = index + 1;
            }
            if let Some(len) = len {
                if cursor < *len {
                    w.zero((*len - cursor) * elem_size);
                }
            }
        }
        (Initializer::List(entries), Type::Struct(st)) => {
            let mut cursor = 0usize;
            for (member_index, value) in entries {
                let member = &st.members[*member_index];
                if member.offset > cursor {
                    w.zero(member.offset - cursor);
                }
                emit_initializer(value, &member.ty, w);
                cursor = member.offset + member.ty.size().max(if member.bitfield.is_some() { 0 } else { 1 });
            }
            if st.size > cursor {
                w.zero(st.size - cursor);
            }
        }
        (Initializer::List(entries), Type::Union(st)) => {
            // A union initializer sets exactly one member; pad to the
            // union's full size afterward.
            if let Some((member_index, value)) = entries.first() {
                let member = &st.members[*member_index];
                emit_initializer(value, &member.ty, w);
                let written = member.ty.size().max(1);
                if st.size > written {
                    w.zero(st.size - written);
                }
            } else {
                w.zero(st.size);
            }
        }
        (Initializer::NonConstant, _) => {
            // Reported by the front-end already (spec.md §5 error class
            // 2); treated as zero here so emission still produces valid
            // output for the rest of the translation unit.
            w.zero(ty.size().max(1));
        }
        _ => w.zero(ty.size().max(1)),
    }
}

fn emit_int_scalar(v: i64, width: u32, w: &mut AsmWriter) {
    match width {
        1 => w.byte(v as u8),
        2 => w.word(v as u16),
        4 => w.long(v as u32),
        _ => w.quad(v as u64),
    }
}
