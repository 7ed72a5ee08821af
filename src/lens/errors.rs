use thiserror::Error;

/// Input text does not match the auth.conf grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("syntax error at line {line}, column {column} (byte {offset}): {message}")]
pub struct SyntaxError {
    /// Byte offset into the input.
    pub offset: usize,
    /// 1-based line number.
    pub line: usize,
    /// 1-based byte column.
    pub column: usize,
    pub message: String,
}

/// The tree holds something the grammar cannot express.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot render {node}: {message}")]
pub struct RenderError {
    /// Path of the offending node.
    pub node: String,
    pub message: String,
}
