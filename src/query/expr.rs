//! Path expression syntax.
//!
//! ```text
//! expr      := '/'? step ('/' step)*
//! step      := name predicate*
//! name      := '*' | label
//! label     := one or more characters other than whitespace, '/', '[', ']',
//!              '=', '!', '<', '>', '(', ')', '.', ',', quotes
//! predicate := '[' pred ']'
//! pred      := INTEGER                          1-based position
//!            | 'last()' ('-' INTEGER)?          position from the end
//!            | 'count(' relpath ')' cmp INTEGER
//!            | operand (('=' | '!=') STRING)?   comparison, or existence
//! operand   := '.' | relpath
//! relpath   := step ('/' step)*
//! cmp       := '=' | '!=' | '<' | '<=' | '>' | '>='
//! STRING    := '\'' chars '\'' | '"' chars '"'   (double the quote to embed it)
//! ```
//!
//! Whitespace is allowed inside predicates around operators.

use crate::query::errors::QueryError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    source: String,
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: NameTest,
    pub predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    Any,
    Label(String),
}

impl NameTest {
    pub fn matches(&self, label: Option<&str>) -> bool {
        match self {
            NameTest::Any => label.is_some(),
            NameTest::Label(expected) => label == Some(expected.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `[n]`, 1-based.
    Index(usize),
    /// `[last()]` or `[last()-n]`.
    Last(usize),
    /// `[count(relpath) op n]`.
    Count {
        path: Vec<Step>,
        op: CmpOp,
        count: usize,
    },
    /// `[relpath]`.
    Exists(Vec<Step>),
    /// `[. = 'x']` or `[relpath != 'x']`.
    Compare {
        operand: Operand,
        op: CmpOp,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Current,
    Path(Vec<Step>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn holds<T: Ord + ?Sized>(self, left: &T, right: &T) -> bool {
        match self {
            CmpOp::Eq => left == right,
            CmpOp::Ne => left != right,
            CmpOp::Lt => left < right,
            CmpOp::Le => left <= right,
            CmpOp::Gt => left > right,
            CmpOp::Ge => left >= right,
        }
    }
}

impl PathExpr {
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        ExprParser::new(input).parse()
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for PathExpr {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn is_label_char(ch: char) -> bool {
    !ch.is_whitespace() && !"/[]=!<>().,'\"".contains(ch)
}

struct ExprParser<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> QueryError {
        QueryError::InvalidExpression {
            expr: self.input.to_string(),
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.input.len())
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, ch)| *ch)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|(_, ch)| *ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), QueryError> {
        if self.eat(expected) {
            Ok(())
        } else {
            match self.peek() {
                Some(found) => Err(self.error(format!("expected '{expected}', found '{found}'"))),
                None => Err(self.error(format!("expected '{expected}', found end of input"))),
            }
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let rest = &self.input[self.offset()..];
        if rest.starts_with(keyword) {
            self.pos += keyword.chars().count();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn parse(mut self) -> Result<PathExpr, QueryError> {
        self.skip_ws();
        let absolute = self.eat('/');
        let steps = self.steps()?;
        self.skip_ws();
        if let Some(found) = self.peek() {
            return Err(self.error(format!("unexpected '{found}'")));
        }
        Ok(PathExpr {
            source: self.input.trim().to_string(),
            absolute,
            steps,
        })
    }

    fn steps(&mut self) -> Result<Vec<Step>, QueryError> {
        let mut steps = vec![self.step()?];
        while self.eat('/') {
            steps.push(self.step()?);
        }
        Ok(steps)
    }

    fn step(&mut self) -> Result<Step, QueryError> {
        let name = if self.eat('*') {
            NameTest::Any
        } else {
            let start = self.pos;
            while self.peek().is_some_and(is_label_char) {
                self.pos += 1;
            }
            if self.pos == start {
                return Err(self.error("expected a label or '*'"));
            }
            let label: String = self.chars[start..self.pos].iter().map(|(_, ch)| *ch).collect();
            NameTest::Label(label)
        };

        let mut predicates = Vec::new();
        while self.peek() == Some('[') {
            predicates.push(self.predicate()?);
        }
        Ok(Step { name, predicates })
    }

    fn predicate(&mut self) -> Result<Predicate, QueryError> {
        self.expect('[')?;
        self.skip_ws();

        let predicate = if self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            let index = self.number()?;
            if index == 0 {
                return Err(self.error("positions start at 1"));
            }
            Predicate::Index(index)
        } else if self.eat_keyword("last()") {
            self.skip_ws();
            let back = if self.eat('-') {
                self.skip_ws();
                self.number()?
            } else {
                0
            };
            Predicate::Last(back)
        } else if self.eat_keyword("count(") {
            self.skip_ws();
            let path = self.steps()?;
            self.skip_ws();
            self.expect(')')?;
            self.skip_ws();
            let op = self.comparison()?;
            self.skip_ws();
            let count = self.number()?;
            Predicate::Count { path, op, count }
        } else {
            let operand = if self.peek() == Some('.') && !self.peek_at(1).is_some_and(is_label_char) {
                self.pos += 1;
                Operand::Current
            } else {
                Operand::Path(self.steps()?)
            };
            self.skip_ws();
            if matches!(self.peek(), Some('=') | Some('!')) {
                let op = self.comparison()?;
                if !matches!(op, CmpOp::Eq | CmpOp::Ne) {
                    return Err(self.error("only '=' and '!=' compare values"));
                }
                self.skip_ws();
                let value = self.string()?;
                Predicate::Compare { operand, op, value }
            } else {
                match operand {
                    Operand::Path(path) => Predicate::Exists(path),
                    Operand::Current => return Err(self.error("'.' must be compared to a string")),
                }
            }
        };

        self.skip_ws();
        self.expect(']')?;
        Ok(predicate)
    }

    fn comparison(&mut self) -> Result<CmpOp, QueryError> {
        let op = match (self.peek(), self.peek_at(1)) {
            (Some('!'), Some('=')) => (CmpOp::Ne, 2),
            (Some('<'), Some('=')) => (CmpOp::Le, 2),
            (Some('>'), Some('=')) => (CmpOp::Ge, 2),
            (Some('='), _) => (CmpOp::Eq, 1),
            (Some('<'), _) => (CmpOp::Lt, 1),
            (Some('>'), _) => (CmpOp::Gt, 1),
            _ => return Err(self.error("expected a comparison operator")),
        };
        self.pos += op.1;
        Ok(op.0)
    }

    fn number(&mut self) -> Result<usize, QueryError> {
        let start = self.pos;
        while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected a number"));
        }
        let digits: String = self.chars[start..self.pos].iter().map(|(_, ch)| *ch).collect();
        digits
            .parse()
            .map_err(|_| self.error(format!("number '{digits}' is too large")))
    }

    fn string(&mut self) -> Result<String, QueryError> {
        let quote = match self.peek() {
            Some(ch @ ('\'' | '"')) => ch,
            _ => return Err(self.error("expected a quoted string")),
        };
        self.pos += 1;
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some(ch) if ch == quote => {
                    self.pos += 1;
                    if self.peek() == Some(quote) {
                        value.push(quote);
                        self.pos += 1;
                    } else {
                        return Ok(value);
                    }
                }
                Some(ch) => {
                    value.push(ch);
                    self.pos += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(name: &str) -> NameTest {
        NameTest::Label(name.to_string())
    }

    #[test]
    fn parse_plain_steps() {
        let expr = PathExpr::parse("path/method/1").unwrap();
        assert!(!expr.is_absolute());
        let names: Vec<_> = expr.steps().iter().map(|step| step.name.clone()).collect();
        assert_eq!(names, [label("path"), label("method"), label("1")]);
    }

    #[test]
    fn parse_absolute_wildcard() {
        let expr = PathExpr::parse("/path[.='/facts']/method/*").unwrap();
        assert!(expr.is_absolute());
        assert_eq!(expr.steps()[2].name, NameTest::Any);
        assert_eq!(
            expr.steps()[0].predicates,
            [Predicate::Compare {
                operand: Operand::Current,
                op: CmpOp::Eq,
                value: "/facts".to_string(),
            }]
        );
    }

    #[test]
    fn parse_positional_predicates() {
        let expr = PathExpr::parse("path[last()-1]").unwrap();
        assert_eq!(expr.steps()[0].predicates, [Predicate::Last(1)]);
        let expr = PathExpr::parse("path[ last() ]").unwrap();
        assert_eq!(expr.steps()[0].predicates, [Predicate::Last(0)]);
        let expr = PathExpr::parse("path[3]").unwrap();
        assert_eq!(expr.steps()[0].predicates, [Predicate::Index(3)]);
    }

    #[test]
    fn parse_count_and_existence() {
        let expr = PathExpr::parse("path[count(allow)=0][1]").unwrap();
        assert_eq!(
            expr.steps()[0].predicates,
            [
                Predicate::Count {
                    path: vec![Step {
                        name: label("allow"),
                        predicates: vec![],
                    }],
                    op: CmpOp::Eq,
                    count: 0,
                },
                Predicate::Index(1),
            ]
        );
        let expr = PathExpr::parse("path[allow]").unwrap();
        assert!(matches!(expr.steps()[0].predicates[0], Predicate::Exists(_)));
    }

    #[test]
    fn parse_child_value_comparison() {
        let expr = PathExpr::parse("path[method/1 != \"find\"]").unwrap();
        match &expr.steps()[0].predicates[0] {
            Predicate::Compare { operand: Operand::Path(path), op, value } => {
                assert_eq!(path.len(), 2);
                assert_eq!(*op, CmpOp::Ne);
                assert_eq!(value, "find");
            }
            other => panic!("unexpected predicate {other:?}"),
        }
    }

    #[test]
    fn parse_doubled_quotes() {
        let expr = PathExpr::parse("path[.='it''s']").unwrap();
        match &expr.steps()[0].predicates[0] {
            Predicate::Compare { value, .. } => assert_eq!(value, "it's"),
            other => panic!("unexpected predicate {other:?}"),
        }
    }

    #[test]
    fn parse_comment_label() {
        let expr = PathExpr::parse("#comment").unwrap();
        assert_eq!(expr.steps()[0].name, label("#comment"));
    }

    #[test]
    fn reject_malformed_expressions() {
        for input in [
            "",
            "path[",
            "path[0]",
            "path[.]",
            "path[.='x'",
            "path[.<'x']",
            "path//method",
            "path[count(allow)]",
            "path]",
        ] {
            let err = PathExpr::parse(input).unwrap_err();
            assert!(
                matches!(err, QueryError::InvalidExpression { .. }),
                "{input}: {err:?}"
            );
        }
    }

    #[test]
    fn error_reports_offset() {
        match PathExpr::parse("path[.='x'").unwrap_err() {
            QueryError::InvalidExpression { offset, .. } => assert_eq!(offset, 10),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
