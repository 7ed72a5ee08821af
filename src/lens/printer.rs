//! Tree to auth.conf text.
//!
//! A node that still renders to the canonical text it was parsed with is
//! emitted from its original source; anything else is rendered fresh. New
//! lines reuse the indentation of sibling attributes.

use crate::lens::errors::RenderError;
use crate::lens::grammar::{
    check_path_value, Attribute, COMMENT, EMPTY, OPERATOR, PATH, REGEX_OPERATOR,
};
use crate::tree::{NodeId, Tree};

pub(crate) fn render_path(indent: &str, value: &str, regex: bool) -> String {
    if regex {
        format!("{indent}{PATH} {REGEX_OPERATOR} {value}\n")
    } else {
        format!("{indent}{PATH} {value}\n")
    }
}

pub(crate) fn render_list<S: AsRef<str>>(indent: &str, keyword: &str, items: &[S]) -> String {
    let items: Vec<&str> = items.iter().map(AsRef::as_ref).collect();
    format!("{indent}{keyword} {}\n", items.join(", "))
}

pub(crate) fn render_auth(indent: &str, keyword: &str, value: &str) -> String {
    format!("{indent}{keyword} {value}\n")
}

pub(crate) fn render_comment(indent: &str, text: &str) -> String {
    if text.is_empty() {
        format!("{indent}#\n")
    } else {
        format!("{indent}# {text}\n")
    }
}

pub(crate) fn render_empty() -> String {
    "\n".to_string()
}

/// Serialize `tree` back to auth.conf text.
pub fn serialize(tree: &Tree) -> Result<String, RenderError> {
    let mut printer = Printer {
        tree,
        out: String::new(),
    };
    for child in tree.children(tree.root()) {
        match tree.label(*child) {
            Some(PATH) => printer.stanza(*child)?,
            Some(COMMENT) | Some(EMPTY) => printer.trivia(*child, "")?,
            _ => {
                return Err(printer.error(
                    *child,
                    "only path stanzas, comments and blank lines may appear at the top level",
                ));
            }
        }
    }
    Ok(printer.out)
}

struct Printer<'t> {
    tree: &'t Tree,
    out: String,
}

impl Printer<'_> {
    fn error(&self, node: NodeId, message: impl Into<String>) -> RenderError {
        RenderError {
            node: self.tree.path_of(node),
            message: message.into(),
        }
    }

    /// Emit the original text of `node` when `rendered` matches what it was
    /// parsed as, `rendered` otherwise.
    fn emit(&mut self, node: NodeId, rendered: String) {
        let tree = self.tree;
        let source = tree.node(node).and_then(|node| node.source());
        let text = match source {
            Some(source) if source.canonical == rendered => source.raw.as_str(),
            _ => rendered.as_str(),
        };
        // The last input line may lack a newline; anything after it needs one.
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
        self.out.push_str(text);
    }

    fn indent_of(&self, node: NodeId) -> Option<String> {
        self.tree
            .node(node)
            .and_then(|node| node.source())
            .map(|source| source.indent.clone())
    }

    fn keyword_of(&self, node: NodeId) -> Option<String> {
        self.tree
            .node(node)
            .and_then(|node| node.source())
            .map(|source| source.keyword.clone())
    }

    fn trivia(&mut self, node: NodeId, default_indent: &str) -> Result<(), RenderError> {
        let tree = self.tree;
        let rendered = match tree.label(node) {
            Some(COMMENT) => {
                let indent = self
                    .indent_of(node)
                    .unwrap_or_else(|| default_indent.to_string());
                let text = tree.value(node).unwrap_or_default();
                if text.contains('\n') {
                    return Err(self.error(node, "comment spans several lines"));
                }
                render_comment(&indent, text)
            }
            _ => render_empty(),
        };
        self.emit(node, rendered);
        Ok(())
    }

    fn stanza(&mut self, path: NodeId) -> Result<(), RenderError> {
        let tree = self.tree;
        let value = tree
            .value(path)
            .ok_or_else(|| self.error(path, "path stanza has no value"))?;
        check_path_value(value).map_err(|message| self.error(path, message))?;

        let operators: Vec<NodeId> = tree.children_labeled(path, OPERATOR).collect();
        if operators.len() > 1 {
            return Err(self.error(path, "more than one operator"));
        }
        if let Some(operator) = operators.first() {
            if tree.value(*operator) != Some(REGEX_OPERATOR) {
                return Err(self.error(*operator, format!("operator must be '{REGEX_OPERATOR}'")));
            }
        }

        let indent = self.indent_of(path).unwrap_or_default();
        let header = render_path(&indent, value, !operators.is_empty());
        self.emit(path, header);

        // New attribute lines line up with their parsed siblings.
        let attr_indent = tree
            .children(path)
            .iter()
            .filter(|child| {
                tree.label(**child)
                    .and_then(Attribute::from_label)
                    .is_some()
            })
            .find_map(|child| self.indent_of(*child))
            .unwrap_or_default();

        for child in tree.children(path) {
            match tree.label(*child) {
                Some(OPERATOR) => {}
                Some(COMMENT) | Some(EMPTY) => self.trivia(*child, &attr_indent)?,
                Some(label) => match Attribute::from_label(label) {
                    Some(attr) => self.attribute(*child, attr, &attr_indent)?,
                    None => {
                        return Err(self.error(*child, format!("unknown attribute '{label}'")));
                    }
                },
                None => {}
            }
        }
        Ok(())
    }

    fn attribute(
        &mut self,
        node: NodeId,
        attr: Attribute,
        default_indent: &str,
    ) -> Result<(), RenderError> {
        let tree = self.tree;
        let indent = self
            .indent_of(node)
            .unwrap_or_else(|| default_indent.to_string());
        let keyword = self
            .keyword_of(node)
            .unwrap_or_else(|| attr.label().to_string());

        let rendered = if attr.is_list() {
            let mut items = Vec::new();
            for item in tree.children(node) {
                let value = tree
                    .value(*item)
                    .ok_or_else(|| self.error(*item, "list entry has no value"))?;
                attr.check_value(value)
                    .map_err(|message| self.error(*item, message))?;
                items.push(value);
            }
            if items.is_empty() {
                return Err(self.error(node, format!("'{}' has no entries", attr.label())));
            }
            render_list(&indent, &keyword, &items)
        } else {
            let value = tree
                .value(node)
                .ok_or_else(|| self.error(node, format!("'{}' has no value", attr.label())))?;
            attr.check_value(value)
                .map_err(|message| self.error(node, message))?;
            render_auth(&indent, &keyword, value)
        };
        self.emit(node, rendered);
        Ok(())
    }
}
