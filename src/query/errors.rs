use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid path expression '{expr}' at byte {offset}: {message}")]
    InvalidExpression {
        expr: String,
        offset: usize,
        message: String,
    },

    #[error("expected exactly one node for '{expr}', found {count}")]
    NoValue { expr: String, count: usize },
}
