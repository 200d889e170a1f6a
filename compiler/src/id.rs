// id.rs — Explicit counters for one compilation
//
// Every counter an analysis needs is owned by a value threaded through the
// call graph, never a global, so independent analyses can run side by side.
//
// Preconditions: one allocator per compilation.
// Postconditions: generated names are unique within that compilation and
// deterministic for a given source.
// Failure modes: none.
// Side effects: none.

use std::collections::HashMap;

/// Allocates names for literal type variables (`lit_0`, `lit_1`, ...) and
/// synthetic flow expressions (`expression_0`, ...).
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next_literal: u32,
    next_expression: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_literal(&mut self) -> String {
        let id = format!("lit_{}", self.next_literal);
        self.next_literal += 1;
        id
    }

    pub fn alloc_expression(&mut self) -> String {
        let id = format!("expression_{}", self.next_expression);
        self.next_expression += 1;
        id
    }
}

/// Generates IR node keys of the form `role_name_N` (or `role_N` when the
/// node has no semantic name). Counters are kept per base, so `on_a_0` and
/// `on_b_0` can coexist.
#[derive(Debug, Default)]
pub struct KeyGenerator {
    occurrences: HashMap<String, u32>,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(&mut self, role: &str, name: &str) -> String {
        let base = if name.is_empty() {
            role.to_string()
        } else {
            format!("{role}_{name}")
        };
        let count = self.occurrences.entry(base.clone()).or_insert(0);
        let key = format!("{base}_{count}");
        *count += 1;
        key
    }

    /// Stage entry keys are deterministic; no counter is involved.
    pub fn entry(&self, sequence: &str, stage: &str) -> String {
        format!("entry_{sequence}_{stage}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_names_are_sequential() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.alloc_literal(), "lit_0");
        assert_eq!(ids.alloc_literal(), "lit_1");
        assert_eq!(ids.alloc_expression(), "expression_0");
    }

    #[test]
    fn keys_count_per_base() {
        let mut kg = KeyGenerator::new();
        assert_eq!(kg.generate("on", "sensor"), "on_sensor_0");
        assert_eq!(kg.generate("on", "sensor"), "on_sensor_1");
        assert_eq!(kg.generate("on", "other"), "on_other_0");
        assert_eq!(kg.generate("const", ""), "const_0");
        assert_eq!(kg.generate("const", ""), "const_1");
    }

    #[test]
    fn entry_keys_are_deterministic() {
        let kg = KeyGenerator::new();
        assert_eq!(kg.entry("main", "precheck"), "entry_main_precheck");
        assert_eq!(kg.entry("main", "precheck"), "entry_main_precheck");
    }

    #[test]
    fn roles_spelling_the_same_base_share_a_counter() {
        let mut kg = KeyGenerator::new();
        assert_eq!(kg.generate("on_sensor", ""), "on_sensor_0");
        assert_eq!(kg.generate("on", "sensor"), "on_sensor_1");
        assert_eq!(kg.generate("on_sensor", ""), "on_sensor_2");
        assert_eq!(kg.generate("on_sensor_0", ""), "on_sensor_0_0");
    }
}
