//! The WebAssembly alternative back-end (spec.md §4.7): a direct,
//! single-pass AST-to-bytecode stack-machine lowering that bypasses the
//! IR and register allocator entirely. Locals live in Wasm's own local
//! slots; everything with its address taken, and every global, lives in
//! linear memory instead.

pub mod codegen;
pub mod control;
pub mod leb;
pub mod locals;

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{FunctionType, Function as AstFunction, GlobalScope, Initializer, StorageClass, TopLevel, Type};
use crate::context::CompilerContext;
use leb::{with_length_prefix, write_sleb128, write_uleb128};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
}

impl ValType {
    pub fn encode(self) -> u8 {
        match self {
            ValType::I32 => 0x7f,
            ValType::I64 => 0x7e,
            ValType::F32 => 0x7d,
            ValType::F64 => 0x7c,
        }
    }

    pub fn of(ty: &Type) -> ValType {
        match ty {
            Type::Float => ValType::F32,
            Type::Double => ValType::F64,
            Type::Int { width, .. } if *width <= 4 => ValType::I32,
            Type::Int { .. } => ValType::I64,
            Type::Bool => ValType::I32,
            _ => ValType::I32, // pointers, arrays-by-decay, struct addresses
        }
    }
}

type Sig = (Vec<ValType>, Vec<ValType>);

/// Accumulates every section's contents as the module is built, section
/// identity kept separate from emission order so layout and codegen can
/// run as two clean passes.
pub struct WasmModuleBuilder {
    types: Vec<Sig>,
    type_index: HashMap<Sig, u32>,
    /// Imported functions, assigned the lowest function indices per the
    /// format's "imports come first" rule.
    imports: Vec<(String, String, u32)>,
    import_index: HashMap<String, u32>,
    /// Defined functions, in declaration order; index = import count + i.
    defined: Vec<(String, u32)>,
    bodies: Vec<Vec<u8>>,
    exports: Vec<(String, u8, u32)>,
    data: Vec<(i32, Vec<u8>)>,
    memory_offset: i32,
    global_offsets: HashMap<String, i32>,
    string_offsets: HashMap<String, i32>,
}

impl WasmModuleBuilder {
    fn new() -> Self {
        WasmModuleBuilder {
            types: Vec::new(),
            type_index: HashMap::new(),
            imports: Vec::new(),
            import_index: HashMap::new(),
            defined: Vec::new(),
            bodies: Vec::new(),
            exports: Vec::new(),
            data: Vec::new(),
            // Reserve the first 8 bytes so offset 0 never aliases a real
            // object (a cheap null-pointer tripwire).
            memory_offset: 8,
            global_offsets: HashMap::new(),
            string_offsets: HashMap::new(),
        }
    }

    fn intern_type(&mut self, sig: Sig) -> u32 {
        if let Some(&idx) = self.type_index.get(&sig) {
            return idx;
        }
        let idx = self.types.len() as u32;
        self.type_index.insert(sig.clone(), idx);
        self.types.push(sig);
        idx
    }

    fn signature_of(ty: &FunctionType) -> Sig {
        let params = ty.params.iter().map(ValType::of).collect();
        let results = if matches!(ty.ret, Type::Void) { Vec::new() } else { vec![ValType::of(&ty.ret)] };
        (params, results)
    }

    fn declare_import(&mut self, name: &str, ty: &FunctionType) -> u32 {
        if let Some(&idx) = self.import_index.get(name) {
            return idx;
        }
        let sig = Self::signature_of(ty);
        let type_idx = self.intern_type(sig);
        let idx = self.imports.len() as u32;
        self.imports.push(("env".to_string(), name.to_string(), type_idx));
        self.import_index.insert(name.to_string(), idx);
        idx
    }

    fn declare_function(&mut self, name: &str, ty: &FunctionType) -> u32 {
        let sig = Self::signature_of(ty);
        let type_idx = self.intern_type(sig);
        let idx = self.imports.len() as u32 + self.defined.len() as u32;
        self.defined.push((name.to_string(), type_idx));
        idx
    }

    /// Function index for `name`, whether it resolves to an import or a
    /// function defined in this module.
    pub fn function_index(&self, name: &str) -> Option<u32> {
        if let Some(&idx) = self.import_index.get(name) {
            return Some(idx);
        }
        self.defined
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| self.imports.len() as u32 + i as u32)
    }

    fn alloc_global(&mut self, name: &str, size: usize, align: usize, bytes: Vec<u8>) {
        let align = align.max(1) as i32;
        self.memory_offset = (self.memory_offset + align - 1) / align * align;
        let offset = self.memory_offset;
        self.global_offsets.insert(name.to_string(), offset);
        self.memory_offset += size.max(1) as i32;
        if bytes.iter().any(|&b| b != 0) {
            self.data.push((offset, bytes));
        }
    }

    pub fn global_offset(&self, name: &str) -> Option<i32> {
        self.global_offsets.get(name).copied()
    }

    pub fn intern_string(&mut self, ctx: &mut CompilerContext, text: &str) -> i32 {
        if let Some(&off) = self.string_offsets.get(text) {
            return off;
        }
        let symbol = ctx.intern_string(text);
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        let offset = self.memory_offset;
        self.memory_offset += bytes.len() as i32;
        self.data.push((offset, bytes));
        self.string_offsets.insert(text.to_string(), offset);
        let _ = symbol;
        offset
    }

    fn push_export(&mut self, name: &str, kind: u8, index: u32) {
        self.exports.push((name.to_string(), kind, index));
    }

    fn encode(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&[0x00, 0x61, 0x73, 0x6d]);
        out.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]);

        section(&mut out, 1, encode_type_section(&self.types));
        if !self.imports.is_empty() {
            section(&mut out, 2, encode_import_section(&self.imports));
        }
        section(&mut out, 3, encode_function_section(&self.defined));
        section(&mut out, 5, encode_memory_section());
        section(&mut out, 7, encode_export_section(&self.exports));
        section(&mut out, 10, encode_code_section(&self.bodies));
        if !self.data.is_empty() {
            section(&mut out, 11, encode_data_section(&self.data));
        }
        out
    }
}

fn section(out: &mut Vec<u8>, id: u8, body: Vec<u8>) {
    out.push(id);
    out.extend(with_length_prefix(body));
}

fn vec_prefixed<T>(items: &[T], mut encode_one: impl FnMut(&T, &mut Vec<u8>)) -> Vec<u8> {
    let mut buf = Vec::new();
    write_uleb128(&mut buf, items.len() as u64);
    for item in items {
        encode_one(item, &mut buf);
    }
    buf
}

fn encode_type_section(types: &[Sig]) -> Vec<u8> {
    vec_prefixed(types, |(params, results), buf| {
        buf.push(0x60);
        write_uleb128(buf, params.len() as u64);
        for p in params {
            buf.push(p.encode());
        }
        write_uleb128(buf, results.len() as u64);
        for r in results {
            buf.push(r.encode());
        }
    })
}

fn encode_import_section(imports: &[(String, String, u32)]) -> Vec<u8> {
    vec_prefixed(imports, |(module, name, type_idx), buf| {
        write_uleb128(buf, module.len() as u64);
        buf.extend_from_slice(module.as_bytes());
        write_uleb128(buf, name.len() as u64);
        buf.extend_from_slice(name.as_bytes());
        buf.push(0x00); // function import
        write_uleb128(buf, *type_idx as u64);
    })
}

fn encode_function_section(defined: &[(String, u32)]) -> Vec<u8> {
    vec_prefixed(defined, |(_, type_idx), buf| {
        write_uleb128(buf, *type_idx as u64);
    })
}

fn encode_memory_section() -> Vec<u8> {
    let mut buf = Vec::new();
    write_uleb128(&mut buf, 1); // one memory
    buf.push(0x00); // no maximum
    write_uleb128(&mut buf, 1); // 1 initial page (64 KiB)
    buf
}

fn encode_export_section(exports: &[(String, u8, u32)]) -> Vec<u8> {
    vec_prefixed(exports, |(name, kind, index), buf| {
        write_uleb128(buf, name.len() as u64);
        buf.extend_from_slice(name.as_bytes());
        buf.push(*kind);
        write_uleb128(buf, *index as u64);
    })
}

fn encode_code_section(bodies: &[Vec<u8>]) -> Vec<u8> {
    vec_prefixed(bodies, |body, buf| {
        buf.extend(with_length_prefix(body.clone()));
    })
}

fn encode_data_section(data: &[(i32, Vec<u8>)]) -> Vec<u8> {
    vec_prefixed(data, |(offset, bytes), buf| {
        write_uleb128(buf, 0); // memory index 0, active segment
        buf.push(0x41); // i32.const
        write_sleb128(buf, *offset as i64);
        buf.push(0x0b); // end
        write_uleb128(buf, bytes.len() as u64);
        buf.extend_from_slice(bytes);
    })
}

/// Lays out every global into linear memory and records import/function
/// signatures, without emitting any code yet.
fn layout_globals(builder: &mut WasmModuleBuilder, scope: &GlobalScope) {
    for var in scope.iter() {
        if let Type::Function(fty) = &var.ty {
            if matches!(var.storage, StorageClass::Extern) {
                builder.declare_import(&var.name, fty);
            }
            continue;
        }
        let size = var.ty.size().max(1);
        let align = var.ty.align().max(1);
        let mut bytes = vec![0u8; size];
        if let Some(init) = &var.initializer {
            write_initializer_bytes(init, &var.ty, 0, &mut bytes);
        }
        builder.alloc_global(&var.name, size, align, bytes);
    }
}

/// Writes an initializer's bytes at `base` into `out` (`out` is already
/// zero-filled to the object's full size). Only the scalar/array/struct
/// shapes this crate's data model can produce are handled; anything else
/// is left zeroed, matching the native emitter's `NonConstant` fallback.
fn write_initializer_bytes(init: &Initializer, ty: &Type, base: usize, out: &mut [u8]) {
    match (init, ty) {
        (Initializer::Int(v), Type::Int { width, .. }) => write_le(out, base, *v as u64, *width as usize),
        (Initializer::Int(v), Type::Pointer(_)) => write_le(out, base, *v as u64, 8),
        (Initializer::Int(v), Type::Bool) => write_le(out, base, if *v != 0 { 1 } else { 0 }, 1),
        (Initializer::Int(v), Type::Float) => write_le(out, base, (*v as f32).to_bits() as u64, 4),
        (Initializer::Int(v), Type::Double) => write_le(out, base, (*v as f64).to_bits(), 8),
        (Initializer::Float(v), Type::Float) => write_le(out, base, (*v as f32).to_bits() as u64, 4),
        (Initializer::Float(v), Type::Double) => write_le(out, base, v.to_bits(), 8),
        (Initializer::Str(text), Type::Array { elem, .. }) if matches!(**elem, Type::Int { width: 1, .. }) => {
            let bytes = text.as_bytes();
            let n = bytes.len().min(out.len().saturating_sub(base).saturating_sub(1));
            out[base..base + n].copy_from_slice(&bytes[..n]);
        }
        (Initializer::List(entries), Type::Array { elem, .. }) => {
            let elem_size = elem.size().max(1);
            for (index, value) in entries {
                write_initializer_bytes(value, elem, base + index * elem_size, out);
            }
        }
        (Initializer::List(entries), Type::Struct(st)) | (Initializer::List(entries), Type::Union(st)) => {
            for (member_index, value) in entries {
                let member = &st.members[*member_index];
                write_initializer_bytes(value, &member.ty, base + member.offset, out);
            }
        }
        _ => {}
    }
}

fn write_le(out: &mut [u8], base: usize, value: u64, width: usize) {
    let bytes = value.to_le_bytes();
    out[base..base + width].copy_from_slice(&bytes[..width]);
}

/// Compiles every top-level declaration into one Wasm module.
///
/// `exports` is the `-e` flag's export list (spec.md §6 `wcc` CLI shape);
/// `None` falls back to exporting every non-static function by its C name,
/// the behavior a bare `wcc` invocation with no `-e` gets.
pub fn compile_module(ctx: &mut CompilerContext, decls: &[TopLevel], exports: Option<&[String]>) -> Vec<u8> {
    let mut builder = WasmModuleBuilder::new();
    layout_globals(&mut builder, &ctx.global_scope);

    let mut functions: Vec<Rc<AstFunction>> = Vec::new();
    for decl in decls {
        if let TopLevel::Function(f) = decl {
            builder.declare_function(&f.name, &f.ty);
            functions.push(f.clone());
        }
    }

    for f in &functions {
        let body = codegen::lower_function(ctx, &mut builder, f);
        builder.bodies.push(body);
    }

    for f in &functions {
        let should_export = match exports {
            Some(names) => names.iter().any(|n| n == &f.name),
            None => !f.is_static,
        };
        if should_export {
            let idx = builder.function_index(&f.name).unwrap();
            builder.push_export(&f.name, 0x00, idx);
        }
    }

    builder.encode()
}
