//! Constituency trees and s-expression I/O.
//!
//! Trees are recursive `(label, children)` nodes. The text form is the usual
//! treebank s-expression, one tree per non-empty line: labels intern as
//! bracketed nonterminals, leaf tokens as terminal words.

use std::fmt;
use std::io::BufRead;

use crate::symbol::{Symbol, SymbolTable};
use crate::{TreeError, TreeResult};

/// A constituency tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub label: Symbol,
    pub children: Vec<Tree>,
}

impl Tree {
    /// Create a leaf node.
    pub fn leaf(label: Symbol) -> Self {
        Self {
            label,
            children: Vec::new(),
        }
    }

    /// Create an internal node.
    pub fn node(label: Symbol, children: Vec<Tree>) -> Self {
        Self { label, children }
    }

    /// Whether this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Parse one s-expression tree. Returns `None` for the empty tree `()`.
    pub fn parse(table: &mut SymbolTable, input: &str) -> TreeResult<Option<Tree>> {
        let tokens = tokenize(input);
        let mut pos = 0;
        let tree = parse_node(table, &tokens, &mut pos)?;
        if pos != tokens.len() {
            return Err(TreeError::Parse(format!(
                "trailing input after tree: {input}"
            )));
        }
        Ok(tree)
    }

    /// Display adapter writing the s-expression form back out.
    pub fn display<'a>(&'a self, table: &'a SymbolTable) -> TreeDisplay<'a> {
        TreeDisplay { tree: self, table }
    }
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Open,
    Close,
    Atom(&'a str),
}

fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = input;
    while let Some(idx) = rest.find(|c: char| !c.is_whitespace()) {
        rest = &rest[idx..];
        match rest.as_bytes()[0] {
            b'(' => {
                tokens.push(Token::Open);
                rest = &rest[1..];
            }
            b')' => {
                tokens.push(Token::Close);
                rest = &rest[1..];
            }
            _ => {
                let end = rest
                    .find(|c: char| c.is_whitespace() || c == '(' || c == ')')
                    .unwrap_or(rest.len());
                tokens.push(Token::Atom(&rest[..end]));
                rest = &rest[end..];
            }
        }
    }
    tokens
}

fn parse_node(
    table: &mut SymbolTable,
    tokens: &[Token<'_>],
    pos: &mut usize,
) -> TreeResult<Option<Tree>> {
    match tokens.get(*pos) {
        Some(Token::Open) => *pos += 1,
        other => {
            return Err(TreeError::Parse(format!(
                "expected '(' but found {other:?}"
            )))
        }
    }

    let label = match tokens.get(*pos) {
        Some(Token::Atom(s)) => {
            *pos += 1;
            Some(table.nonterminal(s))
        }
        _ => None,
    };

    let mut children = Vec::new();
    loop {
        match tokens.get(*pos) {
            Some(Token::Close) => {
                *pos += 1;
                break;
            }
            Some(Token::Open) => {
                if let Some(child) = parse_node(table, tokens, pos)? {
                    children.push(child);
                }
            }
            Some(Token::Atom(word)) => {
                children.push(Tree::leaf(table.intern(word)));
                *pos += 1;
            }
            None => return Err(TreeError::Parse("unbalanced parentheses".to_string())),
        }
    }

    match label {
        Some(label) => Ok(Some(Tree::node(label, children))),
        // A bare "(...)" wrapper: unwrap a single child, treat "()" as empty.
        None => match children.len() {
            0 => Ok(None),
            1 => Ok(children.pop()),
            _ => Err(TreeError::Parse(
                "node without label has multiple children".to_string(),
            )),
        },
    }
}

/// Displays a tree in s-expression form.
pub struct TreeDisplay<'a> {
    tree: &'a Tree,
    table: &'a SymbolTable,
}

impl fmt::Display for TreeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_tree(self.tree, self.table, f)
    }
}

fn fmt_tree(tree: &Tree, table: &SymbolTable, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if tree.is_leaf() && table.is_terminal(tree.label) {
        return write!(f, "{}", table.resolve(tree.label));
    }
    write!(f, "({}", table.strip(tree.label))?;
    for child in &tree.children {
        write!(f, " ")?;
        fmt_tree(child, table, f)?;
    }
    write!(f, ")")
}

/// Lazy tree reader: pulls one tree per non-empty input line.
///
/// The stream is consumed forward only; restarting means re-opening the
/// source. Empty trees (`()`) and blank lines are skipped.
pub struct TreeReader<R: BufRead> {
    reader: R,
    line: String,
}

impl<R: BufRead> TreeReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }

    /// Read the next non-empty tree, or `None` at end of input.
    pub fn read_tree(&mut self, table: &mut SymbolTable) -> TreeResult<Option<Tree>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            if self.line.trim().is_empty() {
                continue;
            }
            if let Some(tree) = Tree::parse(table, &self.line)? {
                return Ok(Some(tree));
            }
        }
    }
}
