//! XPath-like path expressions over the auth.conf tree.
//!
//! ```text
//! /path[.='/facts']/method/*
//! path[operator][count(allow)=0][last()]
//! ```
//!
//! See [`expr`] for the grammar.

pub mod errors;
pub mod eval;
pub mod expr;

pub use errors::QueryError;
pub use eval::{evaluate, evaluate_from};
pub use expr::PathExpr;

use crate::tree::NodeId;

/// Nodes selected by an expression, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSet {
    nodes: Vec<NodeId>,
}

impl MatchSet {
    pub(crate) fn new(nodes: Vec<NodeId>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn first(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    /// The only match, if there is exactly one.
    pub fn single(&self) -> Option<NodeId> {
        match self.nodes.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub fn into_vec(self) -> Vec<NodeId> {
        self.nodes
    }
}

impl IntoIterator for MatchSet {
    type Item = NodeId;
    type IntoIter = std::vec::IntoIter<NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

/// Quote `value` as a string literal for use in a path expression.
///
/// Prefers single quotes; falls back to double quotes, and doubles the quote
/// character when the value contains both.
pub fn quote(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{value}'")
    } else if !value.contains('"') {
        format!("\"{value}\"")
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lens::parse;

    #[test]
    fn quoted_values_survive_parsing() {
        let tree = parse("path /it's\"odd\nallow *\n").unwrap();
        for value in ["/it's\"odd"] {
            let expr = PathExpr::parse(&format!("path[.={}]", quote(value))).unwrap();
            assert_eq!(evaluate(&tree, &expr).len(), 1);
        }
        assert_eq!(quote("plain"), "'plain'");
        assert_eq!(quote("it's"), "\"it's\"");
    }

    #[test]
    fn single_requires_exactly_one() {
        let tree = parse("path /a\npath /b\n").unwrap();
        let all = evaluate(&tree, &PathExpr::parse("path").unwrap());
        assert_eq!(all.len(), 2);
        assert!(all.single().is_none());
        let one = evaluate(&tree, &PathExpr::parse("path[2]").unwrap());
        assert_eq!(tree.value(one.single().unwrap()), Some("/b"));
    }
}
