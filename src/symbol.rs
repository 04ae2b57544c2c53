use std::collections::HashMap;

use crate::ir::{BlockId, ValueId};

/// What a name is bound to during lowering.
///
/// Almost everything is a value (a stack slot or an SSA argument); the one
/// block binding is the function's return block, stashed under
/// `__retval__BB` so `return` statements can branch to it from anywhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    Value(ValueId),
    Block(BlockId),
}

/// A lexical scope: name to IR binding.
///
/// Entering an inner scope takes a full copy of the parent (`child`).
/// Additions and rebindings in the copy never propagate back, which is
/// exactly what gives block scoping.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Binding>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        self.clone()
    }

    /// Bind a fresh name. Returns false if the name already exists in this
    /// scope (a duplicate definition).
    pub fn insert(&mut self, name: &str, binding: Binding) -> bool {
        if self.symbols.contains_key(name) {
            return false;
        }
        self.symbols.insert(name.to_string(), binding);
        true
    }

    /// Bind a name, replacing any inherited binding. Returns true if an
    /// existing binding was shadowed.
    pub fn bind_shadowing(&mut self, name: &str, binding: Binding) -> bool {
        self.symbols.insert(name.to_string(), binding).is_some()
    }

    pub fn lookup(&self, name: &str) -> Option<Binding> {
        self.symbols.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Bound names in sorted order, for error dumps.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.symbols.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(n: u32) -> Binding {
        Binding::Value(ValueId(n))
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut table = SymbolTable::new();
        assert!(table.insert("a", value(0)));
        assert_eq!(table.lookup("a"), Some(value(0)));
        assert_eq!(table.lookup("b"), None);
    }

    #[test]
    fn test_duplicate_insert_fails() {
        let mut table = SymbolTable::new();
        assert!(table.insert("a", value(0)));
        assert!(!table.insert("a", value(1)));
        // the original binding wins
        assert_eq!(table.lookup("a"), Some(value(0)));
    }

    #[test]
    fn test_child_inherits_parent_bindings() {
        let mut parent = SymbolTable::new();
        parent.insert("a", value(0));
        let child = parent.child();
        assert_eq!(child.lookup("a"), Some(value(0)));
    }

    #[test]
    fn test_child_changes_do_not_propagate() {
        let mut parent = SymbolTable::new();
        parent.insert("a", value(0));
        let mut child = parent.child();
        child.insert("b", value(1));
        child.bind_shadowing("a", value(2));
        assert_eq!(parent.lookup("b"), None);
        assert_eq!(parent.lookup("a"), Some(value(0)));
        assert_eq!(child.lookup("a"), Some(value(2)));
    }

    #[test]
    fn test_bind_shadowing_reports_shadow() {
        let mut table = SymbolTable::new();
        assert!(!table.bind_shadowing("a", value(0)));
        assert!(table.bind_shadowing("a", value(1)));
        assert_eq!(table.lookup("a"), Some(value(1)));
    }

    #[test]
    fn test_block_binding() {
        let mut table = SymbolTable::new();
        table.insert("__retval__BB", Binding::Block(BlockId(1)));
        assert_eq!(table.lookup("__retval__BB"), Some(Binding::Block(BlockId(1))));
    }

    #[test]
    fn test_names_are_sorted() {
        let mut table = SymbolTable::new();
        table.insert("zeta", value(0));
        table.insert("alpha", value(1));
        table.insert("mid", value(2));
        assert_eq!(table.names(), vec!["alpha", "mid", "zeta"]);
    }
}
