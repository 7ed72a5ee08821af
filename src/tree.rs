//! Ordered, labeled tree store.
//!
//! Nodes live in an arena owned by [`Tree`] and are addressed by [`NodeId`]
//! handles. A handle stays valid until its node is deleted; using a handle of
//! a deleted node is a [`TreeError::MissingNode`].
//!
//! Every structural or value mutation is appended to a change journal so the
//! save path can tell an untouched document from a modified one without
//! re-rendering it.

use std::fmt;
use thiserror::Error;

/// Handle to a node inside a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source text a node was parsed from.
///
/// `canonical` is what the lens would render for the node's values at parse
/// time. As long as rendering the current values yields the same string, the
/// serializer emits `raw` instead, which keeps untouched lines byte-identical.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceText {
    /// Exact text of the line(s) owned by the node, newline included.
    pub raw: String,
    /// Canonical rendering of the node as parsed.
    pub canonical: String,
    /// Leading whitespace of the node's first line.
    pub indent: String,
    /// Keyword as spelled in the file.
    pub keyword: String,
}

#[derive(Debug, Clone)]
pub struct Node {
    label: String,
    value: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    source: Option<SourceText>,
}

impl Node {
    fn new(label: String, parent: Option<NodeId>) -> Self {
        Self {
            label,
            value: None,
            parent,
            children: Vec::new(),
            source: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn source(&self) -> Option<&SourceText> {
        self.source.as_ref()
    }
}

/// Where a new or moved node goes among its parent's children.
///
/// Relative positions are resolved against the tree at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    First,
    Last,
    /// Zero-based index; `len` appends.
    Index(usize),
    Before(NodeId),
    After(NodeId),
}

/// One journaled mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Created {
        node: NodeId,
        label: String,
    },
    ValueSet {
        node: NodeId,
        label: String,
        old: Option<String>,
        new: Option<String>,
    },
    Deleted {
        label: String,
        nodes: usize,
    },
    Moved {
        node: NodeId,
        label: String,
    },
    Relabeled {
        node: NodeId,
        old: String,
        new: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0} does not exist")]
    MissingNode(NodeId),

    #[error("node {node} is not a child of {parent}")]
    NotAChild { node: NodeId, parent: NodeId },

    #[error("index {index} is out of bounds for {len} children")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("the root node cannot be changed")]
    RootImmutable,

    #[error("cannot move {node} beneath its own subtree")]
    Cycle { node: NodeId },
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Option<Node>>,
    root: NodeId,
    journal: Vec<Change>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Create a tree holding only an unlabeled root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(Node::new(String::new(), None))],
            root: NodeId(0),
            journal: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(Node::label)
    }

    pub fn value(&self, id: NodeId) -> Option<&str> {
        self.node(id).and_then(Node::value)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(Node::parent)
    }

    /// Children of `id`, empty for a missing node.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(Node::children).unwrap_or(&[])
    }

    /// Children of `id` carrying `label`, in order.
    pub fn children_labeled<'a>(
        &'a self,
        id: NodeId,
        label: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id)
            .iter()
            .copied()
            .filter(move |child| self.label(*child) == Some(label))
    }

    /// `id` and all of its descendants in document (pre-)order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Absolute path of `id`, e.g. `/path[3]/method/1`.
    ///
    /// A segment gets a `[n]` index only when its label repeats among siblings.
    pub fn path_of(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            let label = self.label(current).unwrap_or_default();
            let same: Vec<NodeId> = self.children_labeled(parent, label).collect();
            if same.len() > 1 {
                let index = same.iter().position(|node| *node == current).unwrap_or(0) + 1;
                segments.push(format!("{label}[{index}]"));
            } else {
                segments.push(label.to_string());
            }
            current = parent;
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    pub fn create_child(
        &mut self,
        parent: NodeId,
        label: impl Into<String>,
        position: Position,
    ) -> Result<NodeId, TreeError> {
        let index = self.resolve(parent, position)?;
        let label = label.into();
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node::new(label.clone(), Some(parent))));
        self.node_mut(parent)?.children.insert(index, id);
        self.journal.push(Change::Created { node: id, label });
        Ok(id)
    }

    /// Set or clear the value of `id`. Returns whether the value changed.
    pub fn set_value(&mut self, id: NodeId, value: Option<String>) -> Result<bool, TreeError> {
        let node = self.node_mut(id)?;
        if node.value == value {
            return Ok(false);
        }
        let old = std::mem::replace(&mut node.value, value.clone());
        let label = node.label.clone();
        self.journal.push(Change::ValueSet {
            node: id,
            label,
            old,
            new: value,
        });
        Ok(true)
    }

    /// Rename `id`. Returns whether the label changed.
    pub fn set_label(&mut self, id: NodeId, label: impl Into<String>) -> Result<bool, TreeError> {
        if id == self.root {
            return Err(TreeError::RootImmutable);
        }
        let label = label.into();
        let node = self.node_mut(id)?;
        if node.label == label {
            return Ok(false);
        }
        let old = std::mem::replace(&mut node.label, label.clone());
        self.journal.push(Change::Relabeled {
            node: id,
            old,
            new: label,
        });
        Ok(true)
    }

    /// Delete `id` and everything beneath it. Returns the number of nodes removed.
    pub fn delete_subtree(&mut self, id: NodeId) -> Result<usize, TreeError> {
        if id == self.root {
            return Err(TreeError::RootImmutable);
        }
        let label = self.node(id).ok_or(TreeError::MissingNode(id))?.label.clone();
        self.detach(id)?;
        let doomed = self.descendants(id);
        for node in &doomed {
            self.nodes[node.0] = None;
        }
        self.journal.push(Change::Deleted {
            label,
            nodes: doomed.len(),
        });
        Ok(doomed.len())
    }

    /// Delete every child subtree of `id`.
    pub fn clear_children(&mut self, id: NodeId) -> Result<usize, TreeError> {
        let children = self.node(id).ok_or(TreeError::MissingNode(id))?.children.clone();
        let mut removed = 0;
        for child in children {
            removed += self.delete_subtree(child)?;
        }
        Ok(removed)
    }

    /// Move `id` under `parent` at `position`.
    pub fn move_node(
        &mut self,
        id: NodeId,
        parent: NodeId,
        position: Position,
    ) -> Result<(), TreeError> {
        if id == self.root {
            return Err(TreeError::RootImmutable);
        }
        if !self.contains(parent) {
            return Err(TreeError::MissingNode(parent));
        }
        if self.descendants(id).contains(&parent) {
            return Err(TreeError::Cycle { node: id });
        }
        let old_index = self
            .parent(id)
            .and_then(|old| self.children(old).iter().position(|child| *child == id));
        let old_parent = self.detach(id)?;
        let index = match self.resolve(parent, position) {
            Ok(index) => index,
            Err(err) => {
                // Reattach where it was so a bad position leaves the tree intact.
                if let (Some(old), Some(at)) = (old_parent, old_index) {
                    self.node_mut(old)?.children.insert(at, id);
                }
                return Err(err);
            }
        };
        self.node_mut(parent)?.children.insert(index, id);
        let node = self.node_mut(id)?;
        node.parent = Some(parent);
        let label = node.label.clone();
        self.journal.push(Change::Moved { node: id, label });
        Ok(())
    }

    pub fn has_changes(&self) -> bool {
        !self.journal.is_empty()
    }

    pub fn changes(&self) -> &[Change] {
        &self.journal
    }

    pub fn clear_changes(&mut self) {
        self.journal.clear();
    }

    pub(crate) fn set_source(&mut self, id: NodeId, source: SourceText) -> Result<(), TreeError> {
        self.node_mut(id)?.source = Some(source);
        Ok(())
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(TreeError::MissingNode(id))
    }

    fn detach(&mut self, id: NodeId) -> Result<Option<NodeId>, TreeError> {
        let parent = self.node(id).ok_or(TreeError::MissingNode(id))?.parent;
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|child| *child != id);
        }
        Ok(parent)
    }

    fn resolve(&self, parent: NodeId, position: Position) -> Result<usize, TreeError> {
        let siblings = self.node(parent).ok_or(TreeError::MissingNode(parent))?.children();
        let index_of = |node: NodeId| {
            siblings
                .iter()
                .position(|child| *child == node)
                .ok_or(TreeError::NotAChild { node, parent })
        };
        match position {
            Position::First => Ok(0),
            Position::Last => Ok(siblings.len()),
            Position::Index(index) if index <= siblings.len() => Ok(index),
            Position::Index(index) => Err(TreeError::IndexOutOfBounds {
                index,
                len: siblings.len(),
            }),
            Position::Before(node) => index_of(node),
            Position::After(node) => index_of(node).map(|index| index + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(tree: &Tree, id: NodeId) -> Vec<&str> {
        tree.children(id)
            .iter()
            .filter_map(|child| tree.label(*child))
            .collect()
    }

    #[test]
    fn test_create_child_positions() {
        let mut tree = Tree::new();
        let root = tree.root();
        let b = tree.create_child(root, "b", Position::Last).unwrap();
        tree.create_child(root, "a", Position::First).unwrap();
        tree.create_child(root, "d", Position::Last).unwrap();
        tree.create_child(root, "c", Position::After(b)).unwrap();
        tree.create_child(root, "a0", Position::Before(b)).unwrap();
        tree.create_child(root, "z", Position::Index(0)).unwrap();
        assert_eq!(labels(&tree, root), ["z", "a", "a0", "b", "c", "d"]);
    }

    #[test]
    fn test_index_out_of_bounds() {
        let mut tree = Tree::new();
        let root = tree.root();
        let err = tree.create_child(root, "x", Position::Index(3)).unwrap_err();
        assert_eq!(err, TreeError::IndexOutOfBounds { index: 3, len: 0 });
    }

    #[test]
    fn test_relative_position_requires_sibling() {
        let mut tree = Tree::new();
        let root = tree.root();
        let path = tree.create_child(root, "path", Position::Last).unwrap();
        let method = tree.create_child(path, "method", Position::Last).unwrap();
        let err = tree
            .create_child(root, "path", Position::Before(method))
            .unwrap_err();
        assert!(matches!(err, TreeError::NotAChild { .. }));
    }

    #[test]
    fn test_set_value_journals_only_real_changes() {
        let mut tree = Tree::new();
        let root = tree.root();
        let path = tree.create_child(root, "path", Position::Last).unwrap();
        tree.clear_changes();

        assert!(tree.set_value(path, Some("/facts".into())).unwrap());
        assert!(!tree.set_value(path, Some("/facts".into())).unwrap());
        assert_eq!(tree.changes().len(), 1);
        assert_eq!(tree.value(path), Some("/facts"));
    }

    #[test]
    fn test_delete_subtree_invalidates_handles() {
        let mut tree = Tree::new();
        let root = tree.root();
        let path = tree.create_child(root, "path", Position::Last).unwrap();
        let method = tree.create_child(path, "method", Position::Last).unwrap();
        let one = tree.create_child(method, "1", Position::Last).unwrap();

        assert_eq!(tree.delete_subtree(path).unwrap(), 3);
        assert!(tree.children(root).is_empty());
        assert!(!tree.contains(one));
        assert_eq!(
            tree.set_value(one, Some("find".into())),
            Err(TreeError::MissingNode(one))
        );
    }

    #[test]
    fn test_root_is_immutable() {
        let mut tree = Tree::new();
        let root = tree.root();
        assert_eq!(tree.delete_subtree(root), Err(TreeError::RootImmutable));
    }

    #[test]
    fn test_clear_children() {
        let mut tree = Tree::new();
        let root = tree.root();
        let method = tree.create_child(root, "method", Position::Last).unwrap();
        tree.create_child(method, "1", Position::Last).unwrap();
        tree.create_child(method, "2", Position::Last).unwrap();
        assert_eq!(tree.clear_children(method).unwrap(), 2);
        assert!(tree.children(method).is_empty());
        assert!(tree.contains(method));
    }

    #[test]
    fn test_move_node_reorders() {
        let mut tree = Tree::new();
        let root = tree.root();
        let a = tree.create_child(root, "a", Position::Last).unwrap();
        tree.create_child(root, "b", Position::Last).unwrap();
        let c = tree.create_child(root, "c", Position::Last).unwrap();
        tree.move_node(c, root, Position::Before(a)).unwrap();
        assert_eq!(labels(&tree, root), ["c", "a", "b"]);
        assert!(matches!(tree.changes().last(), Some(Change::Moved { .. })));
    }

    #[test]
    fn test_move_node_rejects_cycles() {
        let mut tree = Tree::new();
        let root = tree.root();
        let a = tree.create_child(root, "a", Position::Last).unwrap();
        let b = tree.create_child(a, "b", Position::Last).unwrap();
        assert_eq!(
            tree.move_node(a, b, Position::Last),
            Err(TreeError::Cycle { node: a })
        );
        assert_eq!(tree.parent(b), Some(a));
    }

    #[test]
    fn test_descendants_preorder() {
        let mut tree = Tree::new();
        let root = tree.root();
        let a = tree.create_child(root, "a", Position::Last).unwrap();
        tree.create_child(a, "a1", Position::Last).unwrap();
        tree.create_child(root, "b", Position::Last).unwrap();
        let order: Vec<_> = tree
            .descendants(root)
            .into_iter()
            .filter_map(|id| tree.label(id).map(str::to_string))
            .collect();
        assert_eq!(order, ["", "a", "a1", "b"]);
    }

    #[test]
    fn test_set_label_is_journaled() {
        let mut tree = Tree::new();
        let root = tree.root();
        let item = tree.create_child(root, "2", Position::Last).unwrap();
        tree.clear_changes();
        assert_eq!(tree.set_label(item, "2"), Ok(false));
        assert!(!tree.has_changes());
        assert_eq!(tree.set_label(item, "1"), Ok(true));
        assert_eq!(tree.label(item), Some("1"));
        assert!(matches!(tree.changes().last(), Some(Change::Relabeled { .. })));
        assert_eq!(tree.set_label(root, "x"), Err(TreeError::RootImmutable));
    }
}
