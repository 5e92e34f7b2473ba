//! Tree binarization.
//!
//! Converts arbitrary-arity trees into strictly binary (or unary-chain)
//! trees. Collapse nodes reuse the parent's label, so no new labels are
//! introduced. Left-heavy binarization groups the leftmost children first;
//! each introduced binary node takes the next original child as its right
//! child. Right-heavy is the mirror image.

use crate::tree::Tree;

/// Binarization direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Binarize {
    #[default]
    Left,
    Right,
}

impl Binarize {
    /// Binarize a tree in this direction.
    pub fn apply(self, tree: &Tree) -> Tree {
        match self {
            Binarize::Left => binarize_left(tree),
            Binarize::Right => binarize_right(tree),
        }
    }
}

/// Left-heavy binarization: `(X a b c d)` becomes `(X (X (X a b) c) d)`.
pub fn binarize_left(tree: &Tree) -> Tree {
    let mut iter = tree.children.iter().map(binarize_left);
    match (iter.next(), iter.next()) {
        (Some(first), Some(second)) => {
            let mut acc = Tree::node(tree.label, vec![first, second]);
            for next in iter {
                acc = Tree::node(tree.label, vec![acc, next]);
            }
            acc
        }
        (Some(only), None) => Tree::node(tree.label, vec![only]),
        _ => Tree::leaf(tree.label),
    }
}

/// Right-heavy binarization: `(X a b c d)` becomes `(X a (X b (X c d)))`.
pub fn binarize_right(tree: &Tree) -> Tree {
    let mut iter = tree.children.iter().rev().map(binarize_right);
    match (iter.next(), iter.next()) {
        (Some(last), Some(second_last)) => {
            let mut acc = Tree::node(tree.label, vec![second_last, last]);
            for prev in iter {
                acc = Tree::node(tree.label, vec![prev, acc]);
            }
            acc
        }
        (Some(only), None) => Tree::node(tree.label, vec![only]),
        _ => Tree::leaf(tree.label),
    }
}

/// Undo a left-heavy binarization by collapsing same-label left spines.
///
/// Diagnostics helper: a genuine `(S (S a b) c)` collapses too, so this is
/// an inverse only for trees produced by [`binarize_left`].
pub fn flatten_left(tree: &Tree) -> Tree {
    if tree.children.len() != 2 {
        let children = tree.children.iter().map(flatten_left).collect();
        return Tree::node(tree.label, children);
    }
    let mut reversed = vec![flatten_left(&tree.children[1])];
    let mut cur = &tree.children[0];
    while cur.label == tree.label && cur.children.len() == 2 {
        reversed.push(flatten_left(&cur.children[1]));
        cur = &cur.children[0];
    }
    reversed.push(flatten_left(cur));
    reversed.reverse();
    Tree::node(tree.label, reversed)
}

/// Undo a right-heavy binarization by collapsing same-label right spines.
pub fn flatten_right(tree: &Tree) -> Tree {
    if tree.children.len() != 2 {
        let children = tree.children.iter().map(flatten_right).collect();
        return Tree::node(tree.label, children);
    }
    let mut children = vec![flatten_right(&tree.children[0])];
    let mut cur = &tree.children[1];
    while cur.label == tree.label && cur.children.len() == 2 {
        children.push(flatten_right(&cur.children[0]));
        cur = &cur.children[1];
    }
    children.push(flatten_right(cur));
    Tree::node(tree.label, children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;

    fn parse(table: &mut SymbolTable, s: &str) -> Tree {
        Tree::parse(table, s).unwrap().unwrap()
    }

    #[test]
    fn test_binary_tree_is_identity() {
        let mut table = SymbolTable::new();
        let tree = parse(&mut table, "(S (NP (NN dog)) (VP (VBZ barks)))");
        assert_eq!(binarize_left(&tree), tree);
        assert_eq!(binarize_right(&tree), tree);
    }

    #[test]
    fn test_unary_chain_passes_through() {
        let mut table = SymbolTable::new();
        let tree = parse(&mut table, "(S (NP (NN dog)))");
        assert_eq!(binarize_left(&tree), tree);
    }

    #[test]
    fn test_left_heavy_grouping() {
        let mut table = SymbolTable::new();
        let tree = parse(&mut table, "(X (A a) (B b) (C c) (D d))");
        let bin = binarize_left(&tree);
        let expected = parse(&mut table, "(X (X (X (A a) (B b)) (C c)) (D d))");
        assert_eq!(bin, expected);
    }

    #[test]
    fn test_right_heavy_grouping() {
        let mut table = SymbolTable::new();
        let tree = parse(&mut table, "(X (A a) (B b) (C c) (D d))");
        let bin = binarize_right(&tree);
        let expected = parse(&mut table, "(X (A a) (X (B b) (X (C c) (D d))))");
        assert_eq!(bin, expected);
    }

    #[test]
    fn test_flatten_round_trip() {
        let mut table = SymbolTable::new();
        let tree = parse(
            &mut table,
            "(S (A a) (B b) (C c) (D d) (E e))",
        );
        assert_eq!(flatten_left(&binarize_left(&tree)), tree);
        assert_eq!(flatten_right(&binarize_right(&tree)), tree);
    }

    #[test]
    fn test_flatten_nested() {
        let mut table = SymbolTable::new();
        let tree = parse(&mut table, "(S (NP (A a) (B b) (C c)) (VP (V v) (W w) (U u)))");
        assert_eq!(flatten_left(&binarize_left(&tree)), tree);
        assert_eq!(flatten_right(&binarize_right(&tree)), tree);
    }
}
