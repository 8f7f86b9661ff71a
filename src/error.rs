//! Error taxonomy for the mid-end/back-end pipeline.
//!
//! Mirrors the four classes in the project's error-handling design: a
//! passthrough front-end error, two non-fatal back-end diagnostics that are
//! reported but do not abort layout, and an internal assertion that is a
//! programming error.

use std::fmt;

/// A source location as reported by the (external) front-end.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Errors produced while lowering, allocating, legalising, or emitting.
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    /// A syntax or type error surfaced from the front-end while this crate
    /// walked the AST. Counts toward the front-end's error threshold.
    #[error("{loc}: {message}")]
    FrontEnd { loc: SourceLoc, message: String },

    /// A global/static initializer was not a compile-time constant.
    /// Non-fatal: the caller should continue with zero-filled padding so
    /// downstream layout stays consistent.
    #[error("{loc}: initializer is not a compile-time constant: {detail}")]
    UnrepresentableInitializer { loc: SourceLoc, detail: String },

    /// More register arguments were required than the ABI and the
    /// variadic-argument machinery support. Non-fatal: the caller should
    /// truncate to the supported count.
    #[error("{loc}: call exceeds the supported argument-register count ({max})")]
    AbiOverflow { loc: SourceLoc, max: usize },

    /// A construct the target back-end cannot represent (e.g. inline asm
    /// or an indirect call reaching the WebAssembly back-end). Non-fatal:
    /// the caller should skip the construct and keep lowering.
    #[error("{loc}: not representable in this back-end: {detail}")]
    Unsupported { loc: SourceLoc, detail: String },

    /// An internal invariant was violated (malformed IR, impossible
    /// opcode/operand combination). Always a programming error; callers
    /// should treat this as fatal and abort rather than recover.
    #[error("internal codegen assertion failed: {0}")]
    Assertion(String),
}

impl CodegenError {
    /// Non-fatal diagnostics (classes 2 and 3) can be reported and the
    /// pipeline may continue; fatal ones (classes 1 and 4) should stop it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CodegenError::FrontEnd { .. } | CodegenError::Assertion(_))
    }
}

/// Convenience result alias used throughout the crate.
pub type CodegenResult<T> = Result<T, CodegenError>;
