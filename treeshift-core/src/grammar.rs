//! Grammar extraction, OOV normalization and runtime lookup.
//!
//! Extraction walks binarized trees and harvests deduplicated binary,
//! unary and preterminal rule sets plus a sentence-root histogram. The
//! cutoff pass replaces rare terminals with their signature class and
//! guarantees exactly one `UNK` fallback layer. The runtime [`Grammar`]
//! reorganizes the same rules into O(1) lookup maps for the parser.
//!
//! Histograms are `BTreeMap` and rule sets `BTreeSet`: iteration order is
//! a pure function of the input, so extracting the same treebank twice
//! writes byte-identical grammar files.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::binarize::Binarize;
use crate::rule::Rule;
use crate::signature::Signature;
use crate::symbol::{Symbol, SymbolTable};
use crate::tree::Tree;
use crate::{GrammarError, GrammarResult};

/// Terminal (or label) occurrence counts.
pub type Unigram = BTreeMap<Symbol, u64>;

/// Deduplicated rule sets harvested from a treebank.
#[derive(Debug, Clone, Default)]
pub struct ExtractedGrammar {
    /// Goal label shared by every tree in the run.
    pub goal: Option<Symbol>,
    /// Histogram of labels directly under the binarized root.
    pub sentence: Unigram,
    pub binary: BTreeSet<Rule>,
    pub unary: BTreeSet<Rule>,
    pub preterminal: BTreeSet<Rule>,
}

impl ExtractedGrammar {
    /// The designated sentence symbol: the most frequent sentence-root
    /// entry, ties broken by the first in iteration order.
    pub fn sentence_symbol(&self) -> Option<Symbol> {
        let mut best: Option<(Symbol, u64)> = None;
        for (&sym, &count) in &self.sentence {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((sym, count));
            }
        }
        best.map(|(sym, _)| sym)
    }

    /// Write the grammar text format: goal, sentence, then blank-separated
    /// unary / binary / preterminal sections.
    pub fn write<W: Write>(&self, table: &SymbolTable, mut out: W) -> GrammarResult<()> {
        let sentence = self
            .sentence_symbol()
            .ok_or(GrammarError::EmptySentenceRoot)?;
        let goal = self.goal.ok_or(GrammarError::EmptySentenceRoot)?;

        writeln!(out, "{}", table.resolve(goal))?;
        writeln!(out, "{}", table.resolve(sentence))?;
        writeln!(out)?;
        for rule in &self.unary {
            writeln!(out, "{}", rule.display(table))?;
        }
        writeln!(out)?;
        for rule in &self.binary {
            writeln!(out, "{}", rule.display(table))?;
        }
        writeln!(out)?;
        for rule in &self.preterminal {
            writeln!(out, "{}", rule.display(table))?;
        }
        Ok(())
    }

    /// Write to a file path.
    pub fn write_to_file<P: AsRef<Path>>(
        &self,
        table: &SymbolTable,
        path: P,
    ) -> GrammarResult<()> {
        let file = File::create(path)?;
        self.write(table, BufWriter::new(file))
    }
}

/// Walks binarized trees and fills an [`ExtractedGrammar`].
#[derive(Debug, Default)]
pub struct GrammarExtractor {
    pub grammar: ExtractedGrammar,
    /// Terminal occurrence counts, consumed by [`cutoff_terminal`].
    pub unigram: Unigram,
    /// Deepest unary chain seen, for diagnostics.
    pub unary_max: usize,
    direction: Binarize,
}

impl GrammarExtractor {
    pub fn new(direction: Binarize) -> Self {
        Self {
            direction,
            ..Self::default()
        }
    }

    /// Binarize one tree and extract its rules.
    ///
    /// The first tree establishes the goal label; any later tree with a
    /// different root label is a fatal configuration error.
    pub fn extract_tree(&mut self, table: &SymbolTable, tree: &Tree) -> GrammarResult<()> {
        let binarized = self.direction.apply(tree);

        match self.grammar.goal {
            None => self.grammar.goal = Some(binarized.label),
            Some(goal) if goal != binarized.label => {
                return Err(GrammarError::GoalConflict {
                    previous: table.resolve(goal).to_string(),
                    current: table.resolve(binarized.label).to_string(),
                });
            }
            Some(_) => {}
        }

        match binarized.children.len() {
            1 => {
                *self
                    .grammar
                    .sentence
                    .entry(binarized.children[0].label)
                    .or_insert(0) += 1;
            }
            2 => {
                for child in &binarized.children {
                    *self.grammar.sentence.entry(child.label).or_insert(0) += 1;
                }
            }
            _ => return Err(GrammarError::InvalidBinaryTree),
        }

        let mut unary = 0;
        self.extract(table, &binarized, &mut unary)
    }

    fn extract(
        &mut self,
        table: &SymbolTable,
        tree: &Tree,
        unary: &mut usize,
    ) -> GrammarResult<()> {
        match tree.children.len() {
            1 => {
                let child = &tree.children[0];
                let rule = Rule::unary(tree.label, child.label);
                if rule.is_unary(table) {
                    *unary += 1;
                    self.grammar.unary.insert(rule);
                    self.extract(table, child, unary)
                } else if rule.is_preterminal(table) {
                    *self.unigram.entry(child.label).or_insert(0) += 1;
                    self.grammar.preterminal.insert(rule);
                    Ok(())
                } else {
                    Err(GrammarError::InvalidRule(
                        rule.display(table).to_string(),
                    ))
                }
            }
            2 => {
                self.unary_max = self.unary_max.max(*unary);

                let rule = Rule::binary(
                    tree.label,
                    tree.children[0].label,
                    tree.children[1].label,
                );
                if !rule.is_binary(table) {
                    return Err(GrammarError::InvalidRule(
                        rule.display(table).to_string(),
                    ));
                }
                self.grammar.binary.insert(rule);

                let mut unary_left = 0;
                self.extract(table, &tree.children[0], &mut unary_left)?;
                let mut unary_right = 0;
                self.extract(table, &tree.children[1], &mut unary_right)
            }
            _ => Err(GrammarError::InvalidBinaryTree),
        }
    }
}

/// Replace rare terminals with their signature class.
///
/// A terminal survives verbatim when its count reaches `cutoff` or its
/// surface form carries the treebank open-quote marker. Every replaced
/// preterminal stages a parallel `(lhs, UNK)` rule; the staged set merges
/// in only when no signature class resolved to `UNK` naturally, so exactly
/// one `UNK` fallback layer exists.
pub fn cutoff_terminal(
    table: &mut SymbolTable,
    signature: &dyn Signature,
    grammar: &mut ExtractedGrammar,
    unigram: &mut Unigram,
    cutoff: u64,
) {
    let mut kept = Unigram::new();
    for (&word, &count) in unigram.iter() {
        if count >= cutoff || table.resolve(word).contains("``") {
            kept.insert(word, count);
        } else {
            let class = signature.signature(table, word);
            *kept.entry(class).or_insert(0) += count;
        }
    }
    *unigram = kept;

    let mut preterminal = BTreeSet::new();
    let mut preterminal_oov = BTreeSet::new();
    let mut has_fallback = false;

    for rule in &grammar.preterminal {
        let word = rule.rhs[0];
        if unigram.contains_key(&word) {
            preterminal.insert(rule.clone());
        } else {
            let class = signature.signature(table, word);
            preterminal.insert(Rule::unary(rule.lhs, class));
            preterminal_oov.insert(Rule::unary(rule.lhs, Symbol::UNK));
            has_fallback |= class == Symbol::UNK;
        }
    }

    if !has_fallback {
        preterminal.extend(preterminal_oov);
    }
    grammar.preterminal = preterminal;
}

/// Runtime grammar: the same rules indexed for O(1) lookup.
#[derive(Debug, Clone)]
pub struct Grammar {
    pub goal: Symbol,
    pub sentence: Symbol,
    binary: HashMap<(Symbol, Symbol), Vec<Rule>>,
    unary: HashMap<Symbol, Vec<Rule>>,
    preterminal: HashMap<Symbol, Vec<Rule>>,
    /// Terminal vocabulary (preterminal right-hand sides), sorted.
    pub terminals: Vec<Symbol>,
    /// Nonterminal label vocabulary, sorted. Sizes the model's per-label
    /// tensor blocks.
    pub nonterminals: Vec<Symbol>,
}

impl Grammar {
    /// Read the grammar text format. The unary/binary/preterminal
    /// partition is reconstructed purely from rule arity and child
    /// terminal-ness, never from file position.
    pub fn read<R: BufRead>(table: &mut SymbolTable, reader: R) -> GrammarResult<Grammar> {
        let mut header = Vec::new();
        let mut rules = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if header.len() < 2 && !line.contains("->") {
                header.push(table.intern(line));
            } else {
                rules.push(Rule::parse(table, line)?);
            }
        }
        let [goal, sentence] = header[..] else {
            return Err(GrammarError::Parse(
                "missing goal or sentence header line".to_string(),
            ));
        };

        let mut binary: HashMap<(Symbol, Symbol), Vec<Rule>> = HashMap::new();
        let mut unary: HashMap<Symbol, Vec<Rule>> = HashMap::new();
        let mut preterminal: HashMap<Symbol, Vec<Rule>> = HashMap::new();
        let mut terminals = BTreeSet::new();
        let mut nonterminals = BTreeSet::new();

        for rule in rules {
            nonterminals.insert(rule.lhs);
            if rule.is_binary(table) {
                nonterminals.extend(rule.rhs.iter().copied());
                binary
                    .entry((rule.rhs[0], rule.rhs[1]))
                    .or_default()
                    .push(rule);
            } else if rule.is_unary(table) {
                nonterminals.insert(rule.rhs[0]);
                unary.entry(rule.rhs[0]).or_default().push(rule);
            } else if rule.is_preterminal(table) {
                terminals.insert(rule.rhs[0]);
                preterminal.entry(rule.rhs[0]).or_default().push(rule);
            } else {
                return Err(GrammarError::InvalidRule(
                    rule.display(table).to_string(),
                ));
            }
        }

        Ok(Grammar {
            goal,
            sentence,
            binary,
            unary,
            preterminal,
            terminals: terminals.into_iter().collect(),
            nonterminals: nonterminals.into_iter().collect(),
        })
    }

    /// Open a grammar file.
    pub fn open<P: AsRef<Path>>(table: &mut SymbolTable, path: P) -> GrammarResult<Grammar> {
        let file = File::open(path)?;
        Self::read(table, BufReader::new(file))
    }

    /// Rules rewriting to the exact `(left, right)` pair; no fallback.
    pub fn binary(&self, left: Symbol, right: Symbol) -> &[Rule] {
        self.binary
            .get(&(left, right))
            .map_or(&[], |rules| rules.as_slice())
    }

    /// Unary rules over the exact child label; no fallback.
    pub fn unary(&self, child: Symbol) -> &[Rule] {
        self.unary.get(&child).map_or(&[], |rules| rules.as_slice())
    }

    /// Preterminal rules for a word with layered OOV fallback: exact word,
    /// then its signature class, then the global `UNK` entry. The first
    /// non-empty tier wins.
    pub fn preterminal(
        &self,
        table: &mut SymbolTable,
        signature: &dyn Signature,
        word: Symbol,
    ) -> &[Rule] {
        if let Some(rules) = self.preterminal.get(&word) {
            return rules;
        }
        let class = signature.signature(table, word);
        if let Some(rules) = self.preterminal.get(&class) {
            return rules;
        }
        self.preterminal
            .get(&Symbol::UNK)
            .map_or(&[], |rules| rules.as_slice())
    }

    pub fn binary_size(&self) -> usize {
        self.binary.values().map(Vec::len).sum()
    }

    pub fn unary_size(&self) -> usize {
        self.unary.values().map(Vec::len).sum()
    }

    pub fn preterminal_size(&self) -> usize {
        self.preterminal.values().map(Vec::len).sum()
    }
}
