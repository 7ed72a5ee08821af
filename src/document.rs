//! A parsed auth.conf file with path-expression access.
//!
//! [`Document`] owns the [`Tree`] for one target and is the surface the rule
//! mapper and the transaction work through. Expressions are parsed on every
//! call and evaluated against the current tree, so a query issued after a
//! mutation sees it.

use crate::lens::{self, RenderError, SyntaxError};
use crate::query::eval::select_steps;
use crate::query::expr::{NameTest, PathExpr};
use crate::query::{self, MatchSet, QueryError};
use crate::tree::{NodeId, Position, Tree, TreeError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("cannot create a node for '{expr}': {reason}")]
    Create { expr: String, reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    tree: Tree,
}

impl Document {
    /// An empty document.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, SyntaxError> {
        Ok(Self {
            tree: lens::parse(text)?,
        })
    }

    pub fn serialize(&self) -> Result<String, RenderError> {
        lens::serialize(&self.tree)
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn has_changes(&self) -> bool {
        self.tree.has_changes()
    }

    pub fn matches(&self, expr: &str) -> Result<MatchSet, QueryError> {
        let expr = PathExpr::parse(expr)?;
        Ok(query::evaluate(&self.tree, &expr))
    }

    /// Evaluate `expr` relative to `context`.
    pub fn matches_from(&self, context: NodeId, expr: &str) -> Result<MatchSet, QueryError> {
        let expr = PathExpr::parse(expr)?;
        Ok(query::evaluate_from(&self.tree, context, &expr))
    }

    pub fn count(&self, expr: &str) -> Result<usize, QueryError> {
        self.matches(expr).map(|found| found.len())
    }

    /// Value of the single node matching `expr`.
    ///
    /// Fails with [`QueryError::NoValue`] unless exactly one node matches.
    pub fn get(&self, expr: &str) -> Result<Option<&str>, QueryError> {
        let found = self.matches(expr)?;
        match found.single() {
            Some(node) => Ok(self.tree.value(node)),
            None => Err(QueryError::NoValue {
                expr: expr.to_string(),
                count: found.len(),
            }),
        }
    }

    /// Set the value of the node matching `expr`, creating it when nothing
    /// matches.
    ///
    /// Creation needs the last step to be a bare label and the steps before
    /// it to select exactly one parent; the new node is appended there.
    pub fn set(&mut self, expr: &str, value: &str) -> Result<NodeId, DocumentError> {
        let parsed = PathExpr::parse(expr)?;
        let found = query::evaluate(&self.tree, &parsed);
        if found.len() > 1 {
            return Err(QueryError::NoValue {
                expr: expr.to_string(),
                count: found.len(),
            }
            .into());
        }
        let node = match found.single() {
            Some(node) => node,
            None => self.create_for(expr, &parsed)?,
        };
        self.tree.set_value(node, Some(value.to_string()))?;
        Ok(node)
    }

    fn create_for(&mut self, expr: &str, parsed: &PathExpr) -> Result<NodeId, DocumentError> {
        let create_error = |reason: &str| DocumentError::Create {
            expr: expr.to_string(),
            reason: reason.to_string(),
        };
        let Some((last, parents)) = parsed.steps().split_last() else {
            return Err(create_error("empty expression"));
        };
        let label = match &last.name {
            NameTest::Label(label) if last.predicates.is_empty() => label.clone(),
            _ => return Err(create_error("the last step must be a plain label")),
        };
        let parent = if parents.is_empty() {
            self.tree.root()
        } else {
            let candidates = select_steps(&self.tree, self.tree.root(), parents);
            match candidates.as_slice() {
                [only] => *only,
                [] => return Err(create_error("no parent node matches")),
                _ => return Err(create_error("more than one parent node matches")),
            }
        };
        Ok(self.tree.create_child(parent, label, Position::Last)?)
    }

    /// Create a `label` sibling right before or after the single node
    /// matching `anchor`.
    pub fn insert(
        &mut self,
        anchor: &str,
        label: &str,
        before: bool,
    ) -> Result<NodeId, DocumentError> {
        let found = self.matches(anchor)?;
        let Some(anchor_node) = found.single() else {
            return Err(QueryError::NoValue {
                expr: anchor.to_string(),
                count: found.len(),
            }
            .into());
        };
        let parent = self
            .tree
            .parent(anchor_node)
            .ok_or(TreeError::RootImmutable)?;
        let position = if before {
            Position::Before(anchor_node)
        } else {
            Position::After(anchor_node)
        };
        Ok(self.tree.create_child(parent, label, position)?)
    }

    /// Delete every subtree matching `expr`. Returns how many nodes went away.
    pub fn remove(&mut self, expr: &str) -> Result<usize, DocumentError> {
        let found = self.matches(expr)?;
        let mut removed = 0;
        // Every match sits at the same depth, so none is inside another.
        for node in found {
            removed += self.tree.delete_subtree(node)?;
        }
        Ok(removed)
    }

    /// Print every node matching `expr`, and everything beneath it, one
    /// `/path[3]/method/1 = "find"` line per node.
    pub fn dump(&self, expr: &str) -> Result<String, QueryError> {
        let mut out = String::new();
        for node in self.matches(expr)? {
            for current in self.tree.descendants(node) {
                out.push_str(&self.tree.path_of(current));
                if let Some(value) = self.tree.value(current) {
                    out.push_str(&format!(" = \"{value}\""));
                }
                out.push('\n');
            }
        }
        Ok(out)
    }
}
