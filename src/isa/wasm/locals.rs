//! Flat indexed local allocation for one function's Wasm body (spec.md
//! §4.7 supplement): parameters occupy the low indices in declaration
//! order, then declared locals are appended as they're encountered
//! during the single-pass body walk.

use super::ValType;

#[derive(Debug, Default)]
pub struct WasmLocals {
    /// Value type per local index; indices `0..param_count` are params.
    types: Vec<ValType>,
    param_count: u32,
    names: std::collections::HashMap<String, u32>,
}

impl WasmLocals {
    pub fn new(param_types: &[ValType]) -> Self {
        WasmLocals { types: param_types.to_vec(), param_count: param_types.len() as u32, names: std::collections::HashMap::new() }
    }

    pub fn bind_param(&mut self, index: u32, name: &str) {
        self.names.insert(name.to_string(), index);
    }

    /// Declares a new local of `ty`, returning its index.
    pub fn declare(&mut self, name: &str, ty: ValType) -> u32 {
        if let Some(&idx) = self.names.get(name) {
            return idx;
        }
        let idx = self.types.len() as u32;
        self.types.push(ty);
        self.names.insert(name.to_string(), idx);
        idx
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.names.get(name).copied()
    }

    pub fn param_count(&self) -> u32 {
        self.param_count
    }

    /// Local declarations past the parameters, run-length-encoded by
    /// type as the `local` vector in a function body requires.
    pub fn declared_runs(&self) -> Vec<(u32, ValType)> {
        let mut runs = Vec::new();
        for &ty in &self.types[self.param_count as usize..] {
            match runs.last_mut() {
                Some((count, last_ty)) if *last_ty == ty => *count += 1,
                _ => runs.push((1u32, ty)),
            }
        }
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_occupy_the_low_indices() {
        let mut locals = WasmLocals::new(&[ValType::I32, ValType::F64]);
        locals.bind_param(0, "a");
        locals.bind_param(1, "b");
        assert_eq!(locals.lookup("a"), Some(0));
        assert_eq!(locals.lookup("b"), Some(1));
        assert_eq!(locals.param_count(), 2);
    }

    #[test]
    fn declare_is_idempotent_for_the_same_name() {
        let mut locals = WasmLocals::new(&[]);
        let first = locals.declare("x", ValType::I32);
        let second = locals.declare("x", ValType::I32);
        assert_eq!(first, second);
    }

    #[test]
    fn declared_runs_are_run_length_encoded_past_params() {
        let mut locals = WasmLocals::new(&[ValType::I32]);
        locals.declare("a", ValType::I32);
        locals.declare("b", ValType::I32);
        locals.declare("c", ValType::F64);
        assert_eq!(locals.declared_runs(), vec![(2, ValType::I32), (1, ValType::F64)]);
    }
}
