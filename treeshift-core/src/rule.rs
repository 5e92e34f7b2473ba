//! Grammar rules.
//!
//! A rule is a value type `(lhs, rhs)` with one or two right-hand symbols.
//! Hashing and ordering cover the full content, so deduplicating sets hold
//! at most one copy of each rule and iterate deterministically.

use std::fmt;

use crate::symbol::{Symbol, SymbolTable};
use crate::{GrammarError, GrammarResult};

/// A binarized grammar rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rule {
    pub lhs: Symbol,
    pub rhs: Vec<Symbol>,
}

impl Rule {
    /// Rule with a single right-hand symbol.
    pub fn unary(lhs: Symbol, child: Symbol) -> Self {
        Self {
            lhs,
            rhs: vec![child],
        }
    }

    /// Rule with two right-hand symbols.
    pub fn binary(lhs: Symbol, left: Symbol, right: Symbol) -> Self {
        Self {
            lhs,
            rhs: vec![left, right],
        }
    }

    /// Unary rule: one child, and the child is a nonterminal.
    pub fn is_unary(&self, table: &SymbolTable) -> bool {
        self.rhs.len() == 1 && table.is_nonterminal(self.rhs[0])
    }

    /// Preterminal rule: one child, and the child is a terminal word.
    pub fn is_preterminal(&self, table: &SymbolTable) -> bool {
        self.rhs.len() == 1 && table.is_terminal(self.rhs[0])
    }

    /// Binary rule: two children, both nonterminal.
    pub fn is_binary(&self, table: &SymbolTable) -> bool {
        self.rhs.len() == 2
            && table.is_nonterminal(self.rhs[0])
            && table.is_nonterminal(self.rhs[1])
    }

    /// Parse the `LHS -> RHS1 [RHS2]` text form.
    pub fn parse(table: &mut SymbolTable, line: &str) -> GrammarResult<Rule> {
        let mut tokens = line.split_whitespace();
        let lhs = tokens
            .next()
            .ok_or_else(|| GrammarError::Parse(format!("missing lhs: {line:?}")))?;
        match tokens.next() {
            Some("->") => {}
            _ => return Err(GrammarError::Parse(format!("missing '->': {line:?}"))),
        }
        let rhs: Vec<Symbol> = tokens.map(|t| table.intern(t)).collect();
        if rhs.is_empty() || rhs.len() > 2 {
            return Err(GrammarError::Parse(format!(
                "rule arity must be 1 or 2: {line:?}"
            )));
        }
        Ok(Rule {
            lhs: table.intern(lhs),
            rhs,
        })
    }

    /// Display adapter writing the `LHS -> RHS` text form.
    pub fn display<'a>(&'a self, table: &'a SymbolTable) -> RuleDisplay<'a> {
        RuleDisplay { rule: self, table }
    }
}

/// Displays a rule in its text form.
pub struct RuleDisplay<'a> {
    rule: &'a Rule,
    table: &'a SymbolTable,
}

impl fmt::Display for RuleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ->", self.table.resolve(self.rule.lhs))?;
        for &sym in &self.rule.rhs {
            write!(f, " {}", self.table.resolve(sym))?;
        }
        Ok(())
    }
}
