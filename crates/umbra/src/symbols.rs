use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Interned name. The index is only meaningful within the process that
/// interned it, so hashers must always go through [`SymbolTable::resolve`]
/// and hash the resolved bytes, never the index itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(u32);

impl Symbol {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Append-only interning table mapping names to [`Symbol`]s and back.
///
/// The hashing engine only ever reads it; interning happens on the
/// evaluator side while the program is being resolved.
#[derive(Debug, Default)]
pub struct SymbolTable {
    names: Vec<String>,
    lookup: HashMap<String, u32>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(&index) = self.lookup.get(name) {
            return Symbol(index);
        }
        let index = u32::try_from(self.names.len()).unwrap_or(u32::MAX);
        self.names.push(name.to_string());
        self.lookup.insert(name.to_string(), index);
        Symbol(index)
    }

    pub fn resolve(&self, symbol: Symbol) -> &str {
        self.names
            .get(symbol.index())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
