//! Typed auth.conf rules and their mapping onto the document tree.

pub mod errors;
pub mod mapper;
pub mod model;

pub use errors::MapperError;
pub use mapper::{RuleMapper, RuleOutcome};
pub use model::{
    anchor_expression, AuthRule, Authenticated, Ensure, Instance, ValidationError,
    ValidationIssue,
};
