//! Word signatures.
//!
//! A signature maps a rare or unseen word to a normalized OOV class symbol.
//! Language-specific heuristics live outside this crate; the grammar only
//! requires the capability below. Returning [`Symbol::UNK`] is always a
//! legal answer and is what the stock `none` signature does for every word.

use crate::symbol::{Symbol, SymbolTable};

/// Deterministic word-to-OOV-class mapping.
pub trait Signature {
    /// The OOV class for a word. The table is append-only, so
    /// implementations may intern new class symbols.
    fn signature(&self, table: &mut SymbolTable, word: Symbol) -> Symbol;

    /// Name used to select this signature from configuration.
    fn name(&self) -> &str {
        "custom"
    }
}

/// The `none` signature: every word maps to the catch-all `UNK` class.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnkSignature;

impl Signature for UnkSignature {
    fn signature(&self, _table: &mut SymbolTable, _word: Symbol) -> Symbol {
        Symbol::UNK
    }

    fn name(&self) -> &str {
        "none"
    }
}

impl<F> Signature for F
where
    F: Fn(&mut SymbolTable, Symbol) -> Symbol,
{
    fn signature(&self, table: &mut SymbolTable, word: Symbol) -> Symbol {
        self(table, word)
    }
}

/// Look up a signature implementation by name.
pub fn create(name: &str) -> Option<Box<dyn Signature>> {
    match name {
        "none" => Some(Box::new(UnkSignature)),
        _ => None,
    }
}
