//! Compile-time configuration shared by every pipeline stage.
//!
//! Modeled on cranelift-codegen's `settings::Flags`: one small, cheaply
//! cloned record threaded through lowering, allocation, and emission,
//! rather than ad hoc globals or per-function parameters.

use target_lexicon::{Architecture, Triple};

/// Assembler textual dialect for native targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmSyntax {
    /// GNU `as` syntax, used on Linux and BSD hosts.
    Gnu,
    /// Apple `as` syntax: leading-underscore symbol mangling, `.section`
    /// spelling differences.
    Apple,
}

/// Optimization level. Per the Non-goals in the specification, this crate
/// performs no SSA-based optimization; "speed" only enables the AST-level
/// peephole rewrites already described for compare/pointer lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    #[default]
    None,
    Speed,
}

/// One of the native code-generation targets, or the WebAssembly
/// alternative back-end that bypasses IR/allocation entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    X86_64,
    Aarch64,
    Riscv64,
    Wasm32,
}

impl Target {
    /// Pick a target from a `target-lexicon` triple, defaulting to the
    /// triple's architecture when recognised.
    pub fn from_triple(triple: &Triple) -> Option<Target> {
        match triple.architecture {
            Architecture::X86_64 => Some(Target::X86_64),
            Architecture::Aarch64(_) => Some(Target::Aarch64),
            Architecture::Riscv64(_) => Some(Target::Riscv64),
            Architecture::Wasm32 => Some(Target::Wasm32),
            _ => None,
        }
    }

    pub fn is_native(self) -> bool {
        !matches!(self, Target::Wasm32)
    }
}

/// Flags threaded through the whole pipeline.
#[derive(Debug, Clone)]
pub struct Flags {
    pub target: Target,
    pub opt_level: OptLevel,
    pub asm_syntax: AsmSyntax,
    /// Position-independent addressing for globals (only meaningful for
    /// native targets; the host assembler/linker does the rest).
    pub pic: bool,
    /// `-I` search paths, forwarded opaquely to the front-end; this crate
    /// never opens these itself.
    pub include_dirs: Vec<String>,
}

impl Flags {
    pub fn new(target: Target) -> Self {
        Flags {
            target,
            opt_level: OptLevel::None,
            asm_syntax: if cfg!(target_os = "macos") {
                AsmSyntax::Apple
            } else {
                AsmSyntax::Gnu
            },
            pic: false,
            include_dirs: Vec::new(),
        }
    }

    pub const MAX_REG_ARGS: usize = 8;
    pub const STACK_ALIGN: u32 = 16;
}
