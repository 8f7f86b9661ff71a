//! The compiler context: the single mutable record threaded through the
//! pipeline in place of the source project's process-wide globals
//! (`curfunc`, `curscope`, error counters, `global_scope`).
//!
//! Immutable, genuinely global tables (opcode descriptors, target
//! descriptors) stay as `const`/`static` data; everything that the source
//! mutated as it walked the AST lives here instead.

use crate::ast::GlobalScope;
use crate::error::{CodegenError, SourceLoc};
use crate::ir::entities::FrameSlot;
use crate::ir::function::Function as IrFunction;
use crate::settings::Flags;
use std::collections::HashMap;

/// Front-end errors are reported and counted up to this threshold before
/// the process is expected to exit (spec.md §5).
pub const ERROR_THRESHOLD: usize = 25;

/// A lexical scope mapping local names to their frame slot/VReg info. A
/// stack of these models nested blocks; only the back-end cares about the
/// resolved `ast::VarInfo`, so this just threads name resolution.
#[derive(Debug, Default)]
pub struct Scope {
    pub locals: HashMap<String, std::rc::Rc<crate::ast::VarInfo>>,
    /// Frame slot assigned to each local/param the first time lowering
    /// takes its address, so repeated references share one slot.
    pub slots: HashMap<String, FrameSlot>,
}

/// Threaded through lowering, allocation, legalisation, and emission.
pub struct CompilerContext {
    pub flags: Flags,
    pub global_scope: GlobalScope,
    pub scope_stack: Vec<Scope>,
    /// The IR function currently being built by the lowering pass, if any.
    pub curfunc: Option<IrFunction>,
    pub diagnostics: Vec<CodegenError>,
    /// String literals interned during lowering, in first-use order, as
    /// `(symbol, bytes)` pairs handed to the data emitter for `.rodata`.
    pub string_literals: Vec<(String, String)>,
    error_count: usize,
    label_counter: u32,
    static_local_counter: u32,
    string_counter: u32,
}

impl CompilerContext {
    pub fn new(flags: Flags) -> Self {
        CompilerContext {
            flags,
            global_scope: GlobalScope::default(),
            scope_stack: Vec::new(),
            curfunc: None,
            diagnostics: Vec::new(),
            string_literals: Vec::new(),
            error_count: 0,
            label_counter: 0,
            static_local_counter: 0,
            string_counter: 0,
        }
    }

    /// Interns a string literal, returning its `.rodata` symbol. Each call
    /// site gets its own symbol even for identical text, matching C's
    /// string-literal-has-unspecified-identity semantics.
    pub fn intern_string(&mut self, s: &str) -> String {
        let n = self.string_counter;
        self.string_counter += 1;
        let symbol = format!(".LC{n}");
        self.string_literals.push((symbol.clone(), s.to_string()));
        symbol
    }

    pub fn push_scope(&mut self) {
        self.scope_stack.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        self.scope_stack.pop();
    }

    pub fn lookup_local(&self, name: &str) -> Option<std::rc::Rc<crate::ast::VarInfo>> {
        self.scope_stack
            .iter()
            .rev()
            .find_map(|s| s.locals.get(name).cloned())
    }

    /// The frame slot already assigned to `name`, if lowering has taken
    /// its address before.
    pub fn local_slot(&self, name: &str) -> Option<FrameSlot> {
        self.scope_stack.iter().rev().find_map(|s| s.slots.get(name).copied())
    }

    /// Records the frame slot assigned to `name` in the innermost scope
    /// that declares it (falling back to the current top scope).
    pub fn bind_local_slot(&mut self, name: &str, slot: FrameSlot) {
        for scope in self.scope_stack.iter_mut().rev() {
            if scope.locals.contains_key(name) {
                scope.slots.insert(name.to_string(), slot);
                return;
            }
        }
        if let Some(top) = self.scope_stack.last_mut() {
            top.slots.insert(name.to_string(), slot);
        }
    }

    /// Fresh label suffix for compiler-generated BB names (`.L<n>`), as the
    /// source project's `im_label` counter does.
    pub fn fresh_label(&mut self) -> u32 {
        let n = self.label_counter;
        self.label_counter += 1;
        n
    }

    /// Mangled symbol for a static local variable, unique across the whole
    /// translation unit.
    pub fn mangle_static_local(&mut self, func_name: &str, var_name: &str) -> String {
        let n = self.static_local_counter;
        self.static_local_counter += 1;
        format!(".L.{func_name}.{var_name}.{n}")
    }

    /// Report a non-fatal diagnostic (classes 2/3 in the error taxonomy)
    /// and keep going.
    pub fn report(&mut self, err: CodegenError) {
        if matches!(err, CodegenError::FrontEnd { .. }) {
            self.error_count += 1;
        }
        self.diagnostics.push(err);
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn should_abort_frontend(&self) -> bool {
        self.error_count >= ERROR_THRESHOLD
    }

    /// Used when the AST carries no location info for a synthesized error.
    pub fn here(&self) -> SourceLoc {
        SourceLoc::default()
    }
}
