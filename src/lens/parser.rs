//! Recursive-descent parser from auth.conf text to a [`Tree`].
//!
//! The parser works a line at a time. Every input line ends up in the
//! [`SourceText::raw`] of exactly one node, which is what lets the printer
//! reproduce untouched input byte for byte.

use crate::lens::errors::SyntaxError;
use crate::lens::grammar::{
    check_path_value, suggest_keyword, Attribute, COMMENT, EMPTY, OPERATOR, PATH, REGEX_OPERATOR,
};
use crate::lens::printer::{render_auth, render_comment, render_empty, render_list, render_path};
use crate::tree::{NodeId, Position, SourceText, Tree};

/// Parse `text` into a tree. The returned tree has an empty change journal.
pub fn parse(text: &str) -> Result<Tree, SyntaxError> {
    let mut parser = Parser::new(text);
    parser.parse_file()?;
    let mut tree = parser.tree;
    tree.clear_changes();
    Ok(tree)
}

#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    number: usize,
    start: usize,
    /// Line including its newline, if any.
    full: &'a str,
    /// Line without its newline.
    body: &'a str,
}

impl<'a> Line<'a> {
    fn indent(&self) -> &'a str {
        let trimmed = self.body.trim_start();
        &self.body[..self.body.len() - trimmed.len()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind<'a> {
    Blank,
    Comment,
    Path,
    Attribute(Attribute, &'a str),
    Unknown(&'a str),
}

impl LineKind<'_> {
    fn is_trivia(&self) -> bool {
        matches!(self, LineKind::Blank | LineKind::Comment)
    }
}

fn classify<'a>(line: &Line<'a>) -> LineKind<'a> {
    let trimmed = line.body.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if trimmed.starts_with('#') {
        return LineKind::Comment;
    }
    let word = trimmed.split_whitespace().next().unwrap_or(trimmed);
    if word == PATH {
        return LineKind::Path;
    }
    match Attribute::from_keyword(word) {
        Some(attr) => LineKind::Attribute(attr, word),
        None => LineKind::Unknown(word),
    }
}

/// Whitespace-delimited tokens of `s` with their byte offsets.
fn tokens(s: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = None;
    for (idx, ch) in s.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(begin)) => {
                out.push((begin, &s[begin..idx]));
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(begin) = start {
        out.push((begin, &s[begin..]));
    }
    out
}

struct Parser<'a> {
    lines: Vec<Line<'a>>,
    pos: usize,
    end: usize,
    tree: Tree,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        let mut lines = Vec::new();
        let mut offset = 0;
        for (idx, full) in text.split_inclusive('\n').enumerate() {
            lines.push(Line {
                number: idx + 1,
                start: offset,
                full,
                body: full.strip_suffix('\n').unwrap_or(full),
            });
            offset += full.len();
        }
        Self {
            lines,
            pos: 0,
            end: text.len(),
            tree: Tree::new(),
        }
    }

    fn peek(&self) -> Option<Line<'a>> {
        self.lines.get(self.pos).copied()
    }

    fn error(&self, line: &Line<'_>, column: usize, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            offset: line.start + column,
            line: line.number,
            column: column + 1,
            message: message.into(),
        }
    }

    fn eof_error(&self, message: impl Into<String>) -> SyntaxError {
        let (line, column) = match self.lines.last() {
            Some(last) => (last.number, last.body.len() + 1),
            None => (1, 1),
        };
        SyntaxError {
            offset: self.end,
            line,
            column,
            message: message.into(),
        }
    }

    fn append(
        &mut self,
        parent: NodeId,
        label: &str,
        value: Option<&str>,
        line: &Line<'_>,
    ) -> Result<NodeId, SyntaxError> {
        let node = self
            .tree
            .create_child(parent, label, Position::Last)
            .map_err(|err| self.error(line, 0, err.to_string()))?;
        if let Some(value) = value {
            self.tree
                .set_value(node, Some(value.to_string()))
                .map_err(|err| self.error(line, 0, err.to_string()))?;
        }
        Ok(node)
    }

    fn attach(&mut self, node: NodeId, source: SourceText, line: &Line<'_>) -> Result<(), SyntaxError> {
        self.tree
            .set_source(node, source)
            .map_err(|err| self.error(line, 0, err.to_string()))
    }

    fn parse_file(&mut self) -> Result<(), SyntaxError> {
        let root = self.tree.root();
        while let Some(line) = self.peek() {
            match classify(&line) {
                LineKind::Blank | LineKind::Comment => self.parse_trivia(root, line)?,
                LineKind::Path => self.parse_stanza(root, line)?,
                LineKind::Attribute(_, keyword) => {
                    let column = line.indent().len();
                    return Err(self.error(
                        &line,
                        column,
                        format!("'{keyword}' must follow a 'path' line"),
                    ));
                }
                LineKind::Unknown(word) => return Err(self.unknown_directive(&line, word)),
            }
        }
        Ok(())
    }

    fn unknown_directive(&self, line: &Line<'_>, word: &str) -> SyntaxError {
        let column = line.indent().len();
        let message = match suggest_keyword(word) {
            Some(keyword) => format!("unknown directive '{word}' (did you mean '{keyword}'?)"),
            None => format!("unknown directive '{word}'"),
        };
        self.error(line, column, message)
    }

    fn parse_trivia(&mut self, parent: NodeId, line: Line<'a>) -> Result<(), SyntaxError> {
        self.pos += 1;
        let indent = line.indent();
        let trimmed = line.body.trim();
        let (node, canonical, keyword) = match trimmed.strip_prefix('#') {
            Some(text) => {
                let text = text.trim();
                let node = self.append(parent, COMMENT, Some(text), &line)?;
                (node, render_comment(indent, text), "#")
            }
            None => (self.append(parent, EMPTY, None, &line)?, render_empty(), ""),
        };
        self.attach(
            node,
            SourceText {
                raw: line.full.to_string(),
                canonical,
                indent: indent.to_string(),
                keyword: keyword.to_string(),
            },
            &line,
        )
    }

    fn parse_stanza(&mut self, root: NodeId, line: Line<'a>) -> Result<(), SyntaxError> {
        self.pos += 1;
        let words = tokens(line.body);
        // words[0] is "path"
        let (first_at, first) = match words.get(1) {
            Some(word) => *word,
            None => {
                return Err(self.error(&line, line.body.len(), "expected a path after 'path'"));
            }
        };
        let (regex, value_at, value, rest) = if first == REGEX_OPERATOR {
            match words.get(2) {
                Some((at, value)) => (true, *at, *value, &words[3..]),
                None => {
                    return Err(self.error(
                        &line,
                        line.body.len(),
                        "expected a pattern after '~'",
                    ));
                }
            }
        } else {
            (false, first_at, first, &words[2..])
        };
        if let Some((at, extra)) = rest.first() {
            return Err(self.error(
                &line,
                *at,
                format!("unexpected token '{extra}' after path '{value}'"),
            ));
        }
        check_path_value(value).map_err(|message| self.error(&line, value_at, message))?;

        let path = self.append(root, PATH, Some(value), &line)?;
        if regex {
            self.append(path, OPERATOR, Some(REGEX_OPERATOR), &line)?;
        }
        let indent = line.indent();
        self.attach(
            path,
            SourceText {
                raw: line.full.to_string(),
                canonical: render_path(indent, value, regex),
                indent: indent.to_string(),
                keyword: PATH.to_string(),
            },
            &line,
        )?;

        self.parse_body(path)
    }

    fn parse_body(&mut self, path: NodeId) -> Result<(), SyntaxError> {
        while let Some(line) = self.peek() {
            match classify(&line) {
                LineKind::Attribute(attr, keyword) => self.parse_attribute(path, line, attr, keyword)?,
                kind if kind.is_trivia() => {
                    // Comments and blank lines belong to the stanza only when
                    // another attribute follows them; otherwise they lead into
                    // whatever comes next and stay at the top level.
                    let next = self.lines[self.pos..]
                        .iter()
                        .position(|candidate| !classify(candidate).is_trivia())
                        .map(|offset| self.pos + offset);
                    let absorbed = match next {
                        Some(index) => matches!(classify(&self.lines[index]), LineKind::Attribute(..)),
                        None => false,
                    };
                    if !absorbed {
                        return Ok(());
                    }
                    let until = next.unwrap_or(self.pos);
                    while self.pos < until {
                        let trivia = self.lines[self.pos];
                        self.parse_trivia(path, trivia)?;
                    }
                }
                _ => return Ok(()),
            }
        }
        Ok(())
    }

    fn parse_attribute(
        &mut self,
        path: NodeId,
        line: Line<'a>,
        attr: Attribute,
        keyword: &str,
    ) -> Result<(), SyntaxError> {
        if attr.is_list() {
            return self.parse_list(path, line, attr, keyword);
        }

        self.pos += 1;
        let indent = line.indent();
        let words = tokens(line.body);
        let (value_at, value) = match words.get(1) {
            Some(word) => *word,
            None => {
                return Err(self.error(
                    &line,
                    line.body.len(),
                    format!("expected a value after '{keyword}'"),
                ));
            }
        };
        if let Some((at, extra)) = words.get(2) {
            return Err(self.error(&line, *at, format!("unexpected token '{extra}'")));
        }
        attr.check_value(value)
            .map_err(|message| self.error(&line, value_at, message))?;

        let node = self.append(path, attr.label(), Some(value), &line)?;
        self.attach(
            node,
            SourceText {
                raw: line.full.to_string(),
                canonical: render_auth(indent, keyword, value),
                indent: indent.to_string(),
                keyword: keyword.to_string(),
            },
            &line,
        )
    }

    /// `keyword item (, item)*` where a trailing comma continues the list on
    /// the next line.
    fn parse_list(
        &mut self,
        path: NodeId,
        first: Line<'a>,
        attr: Attribute,
        keyword: &str,
    ) -> Result<(), SyntaxError> {
        self.pos += 1;
        let indent = first.indent();
        let mut raw = String::from(first.full);
        let mut items: Vec<&'a str> = Vec::new();
        let mut line = first;
        let mut segment_start = indent.len() + keyword.len();

        loop {
            let segment = &line.body[segment_start..];
            let continues = segment.trim_end().ends_with(',');
            let pieces: Vec<&str> = segment.split(',').collect();
            let mut cursor = segment_start;

            for (idx, piece) in pieces.iter().enumerate() {
                let at = cursor + (piece.len() - piece.trim_start().len());
                cursor += piece.len() + 1;
                let is_last = idx + 1 == pieces.len();
                let item = piece.trim();

                if item.is_empty() {
                    if is_last && continues {
                        break;
                    }
                    let message = if items.is_empty() && pieces.len() == 1 {
                        format!("expected a value after '{keyword}'")
                    } else {
                        "empty list element".to_string()
                    };
                    return Err(self.error(&line, at.min(line.body.len()), message));
                }
                let words = tokens(item);
                if let Some((offset, _)) = words.get(1) {
                    return Err(self.error(
                        &line,
                        at + offset,
                        "expected ',' between list items",
                    ));
                }
                attr.check_value(item)
                    .map_err(|message| self.error(&line, at, message))?;
                items.push(item);
            }

            if !continues {
                break;
            }
            let next = match self.peek() {
                Some(next) => next,
                None => return Err(self.eof_error(format!("'{keyword}' list continues past end of file"))),
            };
            if next.body.trim().is_empty() || next.body.trim_start().starts_with('#') {
                return Err(self.error(&next, 0, format!("expected a '{keyword}' value after ','")));
            }
            self.pos += 1;
            raw.push_str(next.full);
            line = next;
            segment_start = 0;
        }

        let node = self.append(path, attr.label(), None, &first)?;
        for (idx, item) in items.iter().enumerate() {
            self.append(node, &(idx + 1).to_string(), Some(item), &first)?;
        }
        self.attach(
            node,
            SourceText {
                raw,
                canonical: render_list(indent, keyword, &items),
                indent: indent.to_string(),
                keyword: keyword.to_string(),
            },
            &first,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child_values(tree: &Tree, node: NodeId) -> Vec<String> {
        tree.children(node)
            .iter()
            .filter_map(|child| tree.value(*child).map(str::to_string))
            .collect()
    }

    fn paths(tree: &Tree) -> Vec<NodeId> {
        tree.children_labeled(tree.root(), PATH).collect()
    }

    #[test]
    fn parse_empty_input() {
        let tree = parse("").unwrap();
        assert!(tree.children(tree.root()).is_empty());
        assert!(!tree.has_changes());
    }

    #[test]
    fn parse_regex_stanza() {
        let tree = parse("path ~ ^/catalog/([^/]+)$\nmethod find\nallow $1\n").unwrap();
        let path = paths(&tree)[0];
        assert_eq!(tree.value(path), Some("^/catalog/([^/]+)$"));
        let operator: Vec<_> = tree.children_labeled(path, OPERATOR).collect();
        assert_eq!(operator.len(), 1);
        assert_eq!(tree.value(operator[0]), Some("~"));
        let allow: Vec<_> = tree.children_labeled(path, "allow").collect();
        assert_eq!(child_values(&tree, allow[0]), ["$1"]);
    }

    #[test]
    fn parse_list_with_continuation() {
        let text = "path /certificate_request\nmethod find,\n    save\nallow a, b,\n  c\n";
        let tree = parse(text).unwrap();
        let path = paths(&tree)[0];
        let method = tree.children_labeled(path, "method").next().unwrap();
        assert_eq!(child_values(&tree, method), ["find", "save"]);
        let allow = tree.children_labeled(path, "allow").next().unwrap();
        assert_eq!(child_values(&tree, allow), ["a", "b", "c"]);
        assert_eq!(tree.label(tree.children(allow)[2]), Some("3"));
    }

    #[test]
    fn parse_authenticated_alias() {
        let tree = parse("path /\nauthenticated any\n").unwrap();
        let path = paths(&tree)[0];
        let auth = tree.children_labeled(path, "auth").next().unwrap();
        assert_eq!(tree.value(auth), Some("any"));
        assert_eq!(tree.node(auth).unwrap().source().unwrap().keyword, "authenticated");
    }

    #[test]
    fn trailing_comments_stay_at_top_level() {
        let text = "path /a\nallow *\n\n# next rule\npath /b\n";
        let tree = parse(text).unwrap();
        let root = tree.root();
        let labels: Vec<_> = tree
            .children(root)
            .iter()
            .filter_map(|id| tree.label(*id))
            .collect();
        assert_eq!(labels, ["path", "#empty", "#comment", "path"]);
    }

    #[test]
    fn interior_comments_belong_to_the_stanza() {
        let text = "path /a\n# who may save\nmethod save\n";
        let tree = parse(text).unwrap();
        let path = paths(&tree)[0];
        let labels: Vec<_> = tree
            .children(path)
            .iter()
            .filter_map(|id| tree.label(*id))
            .collect();
        assert_eq!(labels, ["#comment", "method"]);
    }

    #[test]
    fn missing_comma_is_reported_with_position() {
        let err = parse("path /a\nmethod find save\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 13);
        assert_eq!(err.offset, 8 + 12);
        assert!(err.message.contains("expected ','"));
    }

    #[test]
    fn unknown_directive_suggests_keyword() {
        let err = parse("path /a\nalow *\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("did you mean 'allow'"));
    }

    #[test]
    fn attribute_before_any_path_is_rejected() {
        let err = parse("# header\nallow *\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("must follow a 'path' line"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(parse("path /a\nmethod post\n").is_err());
        assert!(parse("path /a\nauth maybe\n").is_err());
        assert!(parse("path /a\nallow a,,b\n").is_err());
        assert!(parse("path\n").is_err());
        assert!(parse("path ~\n").is_err());
        assert!(parse("path /a /b\n").is_err());
        assert!(parse("path /a\nallow a,\n").is_err());
    }
}
