//! Translation between [`AuthRule`] records and `path` stanzas.
//!
//! A rule is identified by the name the mapper last applied it under, and
//! otherwise by its path value together with the presence of the regex
//! operator. Names given to rules created or modified through a mapper are
//! remembered for the lifetime of that mapper only; everything else is listed
//! under a name synthesized from its path.

use crate::document::Document;
use crate::lens::grammar::{Attribute, OPERATOR, PATH, REGEX_OPERATOR};
use crate::query::quote;
use crate::rules::errors::MapperError;
use crate::rules::model::{anchor_expression, AuthRule, Authenticated, Ensure, Instance};
use crate::tree::{NodeId, Position, Tree, TreeError};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Created,
    Modified,
    Unchanged,
    Removed,
    AlreadyAbsent,
}

impl RuleOutcome {
    pub fn changed(self) -> bool {
        matches!(
            self,
            RuleOutcome::Created | RuleOutcome::Modified | RuleOutcome::Removed
        )
    }
}

impl fmt::Display for RuleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RuleOutcome::Created => "created",
            RuleOutcome::Modified => "modified",
            RuleOutcome::Unchanged => "unchanged",
            RuleOutcome::Removed => "removed",
            RuleOutcome::AlreadyAbsent => "already absent",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleMapper {
    names: HashMap<NodeId, String>,
}

impl RuleMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every rule in `doc`, in file order.
    pub fn instances(&self, doc: &Document) -> Result<Vec<Instance>, MapperError> {
        let tree = doc.tree();
        let mut seen = HashSet::new();
        let mut instances = Vec::new();
        for node in tree.children_labeled(tree.root(), PATH) {
            let instance = self.instance(tree, node);
            if !seen.insert(instance.name.clone()) {
                return Err(MapperError::DuplicateName {
                    name: instance.name,
                });
            }
            instances.push(instance);
        }
        Ok(instances)
    }

    fn instance(&self, tree: &Tree, node: NodeId) -> Instance {
        let path = tree.value(node).unwrap_or_default().to_string();
        let path_regex = tree.children_labeled(node, OPERATOR).next().is_some();
        let authenticated = tree
            .children_labeled(node, Attribute::Auth.label())
            .next()
            .and_then(|auth| tree.value(auth))
            .and_then(|value| value.parse().ok())
            .unwrap_or(Authenticated::Absent);
        let name = self
            .names
            .get(&node)
            .cloned()
            .unwrap_or_else(|| Instance::synthesized_name(&path, path_regex));
        Instance {
            name,
            ensure: Ensure::Present,
            path,
            path_regex,
            environments: list_values(tree, node, Attribute::Environment),
            methods: list_values(tree, node, Attribute::Method),
            allow: list_values(tree, node, Attribute::Allow),
            allow_ip: list_values(tree, node, Attribute::AllowIp),
            authenticated,
            node,
        }
    }

    /// The stanza `rule` refers to, if any.
    pub fn find(&self, doc: &Document, rule: &AuthRule) -> Result<Option<NodeId>, MapperError> {
        let tree = doc.tree();
        let named: Vec<NodeId> = self
            .names
            .iter()
            .filter(|(node, name)| **name == rule.name && tree.contains(**node))
            .map(|(node, _)| *node)
            .collect();
        match named.as_slice() {
            [node] => return Ok(Some(*node)),
            [] => {}
            many => {
                return Err(MapperError::AmbiguousMatch {
                    path: rule.effective_path().to_string(),
                    count: many.len(),
                });
            }
        }

        let path = rule.effective_path();
        let operator = if rule.path_regex {
            "[operator]"
        } else {
            "[count(operator)=0]"
        };
        let found = doc.matches(&format!("path[.={}]{operator}", quote(path)))?;
        match found.len() {
            0 => Ok(None),
            1 => match found.first() {
                // Tracked under another name: two rules claim this stanza.
                Some(node) if self.names.get(&node).is_some_and(|name| *name != rule.name) => {
                    Err(MapperError::AmbiguousMatch {
                        path: path.to_string(),
                        count: 2,
                    })
                }
                node => Ok(node),
            },
            count => Err(MapperError::AmbiguousMatch {
                path: path.to_string(),
                count,
            }),
        }
    }

    /// Bring `doc` in line with `rule`.
    ///
    /// A present rule that already exists is modified in place, so applying
    /// the same rule twice leaves one stanza. Removing a missing rule is
    /// [`RuleOutcome::AlreadyAbsent`].
    pub fn apply(&mut self, doc: &mut Document, rule: &AuthRule) -> Result<RuleOutcome, MapperError> {
        rule.validate()?;
        match rule.ensure {
            Ensure::Present => match self.find(doc, rule)? {
                Some(node) => {
                    if self.update(doc, node, rule)? {
                        Ok(RuleOutcome::Modified)
                    } else {
                        Ok(RuleOutcome::Unchanged)
                    }
                }
                None => {
                    self.create(doc, rule)?;
                    Ok(RuleOutcome::Created)
                }
            },
            Ensure::Absent => match self.remove(doc, rule) {
                Ok(_) => Ok(RuleOutcome::Removed),
                Err(MapperError::NotFound { .. }) => Ok(RuleOutcome::AlreadyAbsent),
                Err(err) => Err(err),
            },
        }
    }

    /// Insert a new stanza for `rule` at its anchor, or at the end.
    pub fn create(&mut self, doc: &mut Document, rule: &AuthRule) -> Result<NodeId, MapperError> {
        rule.validate()?;
        let position = insertion_point(doc, rule)?;
        let root = doc.tree().root();
        let node = doc.tree_mut().create_child(root, PATH, position)?;
        self.update(doc, node, rule)?;
        debug!(
            "created rule '{}' at {}",
            rule.name,
            doc.tree().path_of(node)
        );
        Ok(node)
    }

    /// Update the existing stanza for `rule`. Returns whether anything changed.
    pub fn modify(&mut self, doc: &mut Document, rule: &AuthRule) -> Result<bool, MapperError> {
        rule.validate()?;
        let node = self.find(doc, rule)?.ok_or_else(|| MapperError::NotFound {
            path: rule.effective_path().to_string(),
        })?;
        self.update(doc, node, rule)
    }

    /// Delete the stanza for `rule`. Returns how many nodes went away.
    pub fn remove(&mut self, doc: &mut Document, rule: &AuthRule) -> Result<usize, MapperError> {
        let node = self.find(doc, rule)?.ok_or_else(|| MapperError::NotFound {
            path: rule.effective_path().to_string(),
        })?;
        let removed = doc.tree_mut().delete_subtree(node)?;
        self.names.remove(&node);
        debug!("removed rule '{}' ({removed} nodes)", rule.name);
        Ok(removed)
    }

    fn update(&mut self, doc: &mut Document, node: NodeId, rule: &AuthRule) -> Result<bool, MapperError> {
        let tree = doc.tree_mut();
        let mut changed = tree.set_value(node, Some(rule.effective_path().to_string()))?;
        changed |= sync_operator(tree, node, rule.path_regex)?;
        if let Some(auth) = rule.authenticated {
            changed |= sync_auth(tree, node, auth)?;
        }
        for attr in [
            Attribute::Environment,
            Attribute::Method,
            Attribute::Allow,
            Attribute::AllowIp,
        ] {
            if let Some(values) = rule.list(attr) {
                changed |= sync_list(tree, node, attr, values)?;
            }
        }
        self.names.insert(node, rule.name.clone());
        Ok(changed)
    }
}

fn insertion_point(doc: &Document, rule: &AuthRule) -> Result<Position, MapperError> {
    let (anchor, before) = match (&rule.ins_before, &rule.ins_after) {
        (Some(anchor), _) => (anchor, true),
        (None, Some(anchor)) => (anchor, false),
        (None, None) => return Ok(Position::Last),
    };
    let tree = doc.tree();
    let found: Vec<NodeId> = doc
        .matches(anchor_expression(anchor))?
        .iter()
        .filter(|node| tree.parent(*node) == Some(tree.root()) && tree.label(*node) == Some(PATH))
        .collect();
    match found.as_slice() {
        [node] if before => Ok(Position::Before(*node)),
        [node] => Ok(Position::After(*node)),
        _ => Err(MapperError::Anchor {
            anchor: anchor.clone(),
            count: found.len(),
        }),
    }
}

fn list_values(tree: &Tree, node: NodeId, attr: Attribute) -> Vec<String> {
    tree.children_labeled(node, attr.label())
        .flat_map(|list| tree.children(list).iter().copied())
        .filter_map(|item| tree.value(item).map(str::to_string))
        .collect()
}

/// Where a new `attr` line goes: after the last attribute that sorts at or
/// before it, else right after the path line.
fn attribute_position(tree: &Tree, node: NodeId, attr: Attribute) -> Position {
    let anchor = tree
        .children(node)
        .iter()
        .copied()
        .filter(|child| {
            tree.label(*child)
                .and_then(Attribute::from_label)
                .is_some_and(|other| other.rank() <= attr.rank())
        })
        .last();
    match anchor.or_else(|| tree.children_labeled(node, OPERATOR).last()) {
        Some(anchor) => Position::After(anchor),
        None => Position::First,
    }
}

fn delete_all(tree: &mut Tree, nodes: &[NodeId]) -> Result<bool, TreeError> {
    for node in nodes {
        tree.delete_subtree(*node)?;
    }
    Ok(!nodes.is_empty())
}

fn sync_operator(tree: &mut Tree, node: NodeId, regex: bool) -> Result<bool, TreeError> {
    let operators: Vec<NodeId> = tree.children_labeled(node, OPERATOR).collect();
    if !regex {
        return delete_all(tree, &operators);
    }
    match operators.split_first() {
        Some((first, rest)) => {
            let changed = tree.set_value(*first, Some(REGEX_OPERATOR.to_string()))?;
            Ok(delete_all(tree, rest)? || changed)
        }
        None => {
            let operator = tree.create_child(node, OPERATOR, Position::First)?;
            tree.set_value(operator, Some(REGEX_OPERATOR.to_string()))?;
            Ok(true)
        }
    }
}

fn sync_auth(tree: &mut Tree, node: NodeId, auth: Authenticated) -> Result<bool, TreeError> {
    let label = Attribute::Auth.label();
    let existing: Vec<NodeId> = tree.children_labeled(node, label).collect();
    if auth == Authenticated::Absent {
        return delete_all(tree, &existing);
    }
    match existing.split_first() {
        Some((first, rest)) => {
            let changed = tree.set_value(*first, Some(auth.as_str().to_string()))?;
            Ok(delete_all(tree, rest)? || changed)
        }
        None => {
            let position = attribute_position(tree, node, Attribute::Auth);
            let created = tree.create_child(node, label, position)?;
            tree.set_value(created, Some(auth.as_str().to_string()))?;
            Ok(true)
        }
    }
}

/// Rewrite the `attr` lines of a stanza to hold exactly `values`, merging
/// repeated lines into the first.
fn sync_list(
    tree: &mut Tree,
    node: NodeId,
    attr: Attribute,
    values: &[String],
) -> Result<bool, TreeError> {
    let existing: Vec<NodeId> = tree.children_labeled(node, attr.label()).collect();
    if values.is_empty() {
        return delete_all(tree, &existing);
    }

    let mut changed = false;
    let list = match existing.split_first() {
        Some((first, rest)) => {
            changed |= delete_all(tree, rest)?;
            *first
        }
        None => {
            changed = true;
            let position = attribute_position(tree, node, attr);
            tree.create_child(node, attr.label(), position)?
        }
    };

    let items = tree.children(list).to_vec();
    for (index, value) in values.iter().enumerate() {
        match items.get(index) {
            Some(item) => changed |= tree.set_value(*item, Some(value.clone()))?,
            None => {
                let item = tree.create_child(list, (index + 1).to_string(), Position::Last)?;
                tree.set_value(item, Some(value.clone()))?;
                changed = true;
            }
        }
    }
    if items.len() > values.len() {
        changed |= delete_all(tree, &items[values.len()..])?;
    }
    for (index, item) in tree.children(list).to_vec().into_iter().enumerate() {
        changed |= tree.set_label(item, (index + 1).to_string())?;
    }
    Ok(changed)
}
