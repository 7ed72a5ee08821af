//! Evaluation of [`PathExpr`] against a [`Tree`].
//!
//! Each step selects the matching children of every context node, then
//! applies its predicates left to right. A positional predicate indexes the
//! list left by the predicates before it, so `path[count(allow)=0][1]` is the
//! first stanza without `allow`, not the first stanza if it has none.

use crate::query::expr::{NameTest, Operand, PathExpr, Predicate, Step};
use crate::query::MatchSet;
use crate::tree::{NodeId, Tree};

/// Evaluate `expr` from the root of `tree`.
pub fn evaluate(tree: &Tree, expr: &PathExpr) -> MatchSet {
    evaluate_from(tree, tree.root(), expr)
}

/// Evaluate `expr` relative to `context`. Absolute expressions ignore it.
pub fn evaluate_from(tree: &Tree, context: NodeId, expr: &PathExpr) -> MatchSet {
    let start = if expr.is_absolute() { tree.root() } else { context };
    MatchSet::new(select(tree, vec![start], expr.steps()))
}

/// Apply `steps` starting from `start`, as if they formed a relative path.
pub(crate) fn select_steps(tree: &Tree, start: NodeId, steps: &[Step]) -> Vec<NodeId> {
    select(tree, vec![start], steps)
}

fn select(tree: &Tree, contexts: Vec<NodeId>, steps: &[Step]) -> Vec<NodeId> {
    let mut current = contexts;
    for step in steps {
        let mut next = Vec::new();
        for context in current {
            next.extend(apply_step(tree, context, step));
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }
    current
}

fn apply_step(tree: &Tree, context: NodeId, step: &Step) -> Vec<NodeId> {
    let mut nodes: Vec<NodeId> = tree
        .children(context)
        .iter()
        .copied()
        .filter(|child| matches_name(tree, *child, &step.name))
        .collect();
    for predicate in &step.predicates {
        nodes = filter(tree, nodes, predicate);
    }
    nodes
}

fn matches_name(tree: &Tree, node: NodeId, name: &NameTest) -> bool {
    name.matches(tree.label(node))
}

fn filter(tree: &Tree, nodes: Vec<NodeId>, predicate: &Predicate) -> Vec<NodeId> {
    match predicate {
        Predicate::Index(index) => index
            .checked_sub(1)
            .and_then(|at| nodes.get(at))
            .copied()
            .into_iter()
            .collect(),
        Predicate::Last(back) => nodes
            .len()
            .checked_sub(1)
            .and_then(|last| last.checked_sub(*back))
            .and_then(|at| nodes.get(at))
            .copied()
            .into_iter()
            .collect(),
        Predicate::Exists(path) => nodes
            .into_iter()
            .filter(|node| !select(tree, vec![*node], path).is_empty())
            .collect(),
        Predicate::Count { path, op, count } => nodes
            .into_iter()
            .filter(|node| op.holds(&select(tree, vec![*node], path).len(), count))
            .collect(),
        Predicate::Compare { operand, op, value } => nodes
            .into_iter()
            .filter(|node| match operand {
                Operand::Current => {
                    op.holds(tree.value(*node).unwrap_or_default(), value.as_str())
                }
                Operand::Path(path) => select(tree, vec![*node], path).iter().any(|found| {
                    op.holds(tree.value(*found).unwrap_or_default(), value.as_str())
                }),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lens::parse;

    const TEXT: &str = "\
# leading comment
path ~ ^/catalog/([^/]+)$
method find
allow $1

path /certificate_revocation_list/ca
method find
allow *

path /report
method save
allow *

path /
auth any
";

    fn eval(tree: &Tree, expr: &str) -> Vec<String> {
        let expr = PathExpr::parse(expr).unwrap();
        evaluate(tree, &expr)
            .iter()
            .map(|node| tree.value(node).unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn label_steps_select_in_document_order() {
        let tree = parse(TEXT).unwrap();
        assert_eq!(
            eval(&tree, "/path"),
            ["^/catalog/([^/]+)$", "/certificate_revocation_list/ca", "/report", "/"]
        );
        assert_eq!(eval(&tree, "path/method/1"), ["find", "find", "save"]);
    }

    #[test]
    fn positional_predicates() {
        let tree = parse(TEXT).unwrap();
        assert_eq!(eval(&tree, "path[1]"), ["^/catalog/([^/]+)$"]);
        assert_eq!(eval(&tree, "path[last()]"), ["/"]);
        assert_eq!(eval(&tree, "path[last()-1]"), ["/report"]);
        assert!(eval(&tree, "path[9]").is_empty());
        assert!(eval(&tree, "path[last()-9]").is_empty());
    }

    #[test]
    fn predicates_apply_in_order() {
        let tree = parse(TEXT).unwrap();
        assert_eq!(eval(&tree, "path[allow][last()]"), ["/report"]);
        assert_eq!(eval(&tree, "path[count(allow)=0][1]"), ["/"]);
        assert_eq!(eval(&tree, "path[allow][1]"), ["^/catalog/([^/]+)$"]);
    }

    #[test]
    fn value_comparisons() {
        let tree = parse(TEXT).unwrap();
        assert_eq!(eval(&tree, "path[.='/report']"), ["/report"]);
        assert_eq!(eval(&tree, "path[.='/report']/method/*"), ["save"]);
        assert_eq!(eval(&tree, "path[operator]"), ["^/catalog/([^/]+)$"]);
        assert_eq!(
            eval(&tree, "path[count(operator)=0][method/1='find']"),
            ["/certificate_revocation_list/ca"]
        );
        assert_eq!(eval(&tree, "path[auth!='yes']"), ["/"]);
        assert_eq!(eval(&tree, "path[count(method/*)>=1]").len(), 3);
    }

    #[test]
    fn top_level_trivia_is_addressable() {
        let tree = parse(TEXT).unwrap();
        assert_eq!(eval(&tree, "#comment"), ["leading comment"]);
        assert_eq!(eval(&tree, "*").len(), 8);
    }

    #[test]
    fn relative_evaluation() {
        let tree = parse(TEXT).unwrap();
        let report = evaluate(&tree, &PathExpr::parse("path[3]").unwrap())
            .first()
            .unwrap();
        let methods = evaluate_from(&tree, report, &PathExpr::parse("method/*").unwrap());
        assert_eq!(methods.len(), 1);
        let absolute = evaluate_from(&tree, report, &PathExpr::parse("/path").unwrap());
        assert_eq!(absolute.len(), 4);
    }

    #[test]
    fn out_of_range_positions_select_nothing() {
        let tree = parse(TEXT).unwrap();
        let far = format!("path[last()-{}]", usize::MAX);
        assert!(eval(&tree, &far).is_empty());
        assert!(eval(&tree, "path[last()-4]").is_empty());
        assert_eq!(eval(&tree, "path[last()-3]"), ["^/catalog/([^/]+)$"]);

        let paths: Vec<NodeId> = tree.children_labeled(tree.root(), "path").collect();
        assert!(filter(&tree, paths.clone(), &Predicate::Index(0)).is_empty());
        assert!(filter(&tree, Vec::new(), &Predicate::Last(0)).is_empty());
        assert_eq!(filter(&tree, paths.clone(), &Predicate::Last(0)), [paths[3]]);
    }
}
