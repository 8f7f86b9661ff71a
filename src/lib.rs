//! Mid-end and multi-target back-end for a small self-hosting C compiler:
//! IR construction, register allocation, per-architecture instruction
//! emission, and an alternative WebAssembly back-end.
//!
//! This crate is a library consumed by an external lexer/parser/semantic
//! analysis front-end (out of scope here); see [`ast`] for the input
//! boundary it hands its typed AST across. The `xcc` and `wcc` binaries
//! are thin CLI drivers over [`compile_native`] and [`isa::wasm::compile_module`].

pub mod ast;
pub mod binemit;
pub mod context;
pub mod data;
pub mod error;
pub mod ir;
pub mod isa;
pub mod lower;
pub mod regalloc;
pub mod settings;

use ast::TopLevel;
use binemit::AsmWriter;
use context::CompilerContext;
use error::CodegenResult;
use isa::TargetIsa;

/// Compiles one translation unit to assembly text for a native target
/// (spec.md §2 pipeline A–E): lower every function to IR, allocate
/// registers, legalise per-target, emit instructions, then emit globals.
///
/// Mirrors cranelift-codegen's `Context::compile` loop, generalised to a
/// whole translation unit rather than one function at a time, since this
/// crate's CLI compiles a full input file per invocation.
pub fn compile_native(ctx: &mut CompilerContext, decls: &[TopLevel], isa: &dyn TargetIsa) -> CodegenResult<String> {
    let units = lower::lower_translation_unit(ctx, decls);

    let mut w = AsmWriter::new(ctx.flags.asm_syntax);
    for (ast_func, mut ir_func) in units {
        log::debug!("compiling function `{}`", ast_func.name);
        let mut alloc = regalloc::allocate(&mut ir_func, isa);
        isa.tweak_ir(&mut ir_func, &mut alloc);
        isa.emit_function(&ir_func, &alloc, &mut w)?;
    }

    data::emit_globals(ctx, &ctx.global_scope, &mut w);
    Ok(w.finish())
}
