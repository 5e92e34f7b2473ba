//! Symbol interning.
//!
//! Symbols are cheap copyable handles into a `SymbolTable` owned by the run
//! context. Equality is index identity. Nonterminal labels use the bracketed
//! surface form `[X]`, so terminal-ness is a property of the interned string
//! and survives grammar file round-trips.

use std::collections::HashMap;

/// Interned symbol handle; equality and ordering follow the intern index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u32);

impl Symbol {
    /// The catch-all out-of-vocabulary class, pre-interned at slot 0.
    pub const UNK: Symbol = Symbol(0);
    /// The distinguished goal label, pre-interned at slot 1.
    pub const GOAL: Symbol = Symbol(1);

    /// Intern index of this symbol.
    pub fn id(self) -> usize {
        self.0 as usize
    }
}

/// Append-only interning table; indices are stable for the life of the run.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    strings: Vec<String>,
    index: HashMap<String, Symbol>,
}

impl SymbolTable {
    /// Create a table with the distinguished `UNK` and `GOAL` slots filled.
    pub fn new() -> Self {
        let mut table = Self {
            strings: Vec::new(),
            index: HashMap::new(),
        };
        let unk = table.intern("<unk>");
        let goal = table.intern("[GOAL]");
        debug_assert_eq!(unk, Symbol::UNK);
        debug_assert_eq!(goal, Symbol::GOAL);
        table
    }

    /// Intern a string exactly as given.
    pub fn intern(&mut self, s: &str) -> Symbol {
        if let Some(&sym) = self.index.get(s) {
            return sym;
        }
        let sym = Symbol(self.strings.len() as u32);
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), sym);
        sym
    }

    /// Intern a label in its bracketed nonterminal form.
    pub fn nonterminal(&mut self, label: &str) -> Symbol {
        if label.starts_with('[') && label.ends_with(']') {
            self.intern(label)
        } else {
            self.intern(&format!("[{}]", label))
        }
    }

    /// Look up a string without interning.
    pub fn get(&self, s: &str) -> Option<Symbol> {
        self.index.get(s).copied()
    }

    /// The surface form of a symbol.
    pub fn resolve(&self, sym: Symbol) -> &str {
        &self.strings[sym.id()]
    }

    /// Whether the symbol is a nonterminal label (`[X]` form).
    pub fn is_nonterminal(&self, sym: Symbol) -> bool {
        let s = self.resolve(sym);
        s.len() >= 2 && s.starts_with('[') && s.ends_with(']')
    }

    /// Whether the symbol is a terminal (word or OOV class).
    pub fn is_terminal(&self, sym: Symbol) -> bool {
        !self.is_nonterminal(sym)
    }

    /// Label text with the nonterminal brackets stripped.
    pub fn strip(&self, sym: Symbol) -> &str {
        let s = self.resolve(sym);
        if self.is_nonterminal(sym) {
            &s[1..s.len() - 1]
        } else {
            s
        }
    }

    /// Number of interned symbols.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether the table holds only the pre-interned constants.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
