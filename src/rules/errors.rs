use crate::document::DocumentError;
use crate::query::QueryError;
use crate::rules::model::ValidationError;
use crate::tree::TreeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("invalid rule: {0}")]
    Validation(#[from] ValidationError),

    #[error("{count} rules match path '{path}'")]
    AmbiguousMatch { path: String, count: usize },

    #[error("no rule matches path '{path}'")]
    NotFound { path: String },

    #[error("insertion anchor '{anchor}' matches {count} rules, expected exactly one")]
    Anchor { anchor: String, count: usize },

    #[error("rule name '{name}' is used by more than one rule")]
    DuplicateName { name: String },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Document(#[from] DocumentError),
}

impl MapperError {
    /// Failures of the tree or query engine rather than of one rule.
    pub fn is_engine_error(&self) -> bool {
        matches!(
            self,
            MapperError::Query(_) | MapperError::Tree(_) | MapperError::Document(_)
        )
    }
}
