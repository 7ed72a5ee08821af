//! Lens for Puppet `auth.conf`: text to tree and back.
//!
//! ```text
//! # allow nodes to retrieve their own catalog
//! path ~ ^/catalog/([^/]+)$
//! method find
//! allow $1
//! ```
//!
//! parses into
//!
//! ```text
//! /#comment = "allow nodes to retrieve their own catalog"
//! /path = "^/catalog/([^/]+)$"
//! /path/operator = "~"
//! /path/method/1 = "find"
//! /path/allow/1 = "$1"
//! ```
//!
//! The round-trip law holds for every text the parser accepts:
//! `serialize(parse(text)) == text`.

pub mod errors;
pub mod grammar;
mod parser;
mod printer;

pub use errors::{RenderError, SyntaxError};
pub use grammar::{Attribute, COMMENT, EMPTY, METHODS, OPERATOR, PATH, REGEX_OPERATOR};
pub use parser::parse;
pub use printer::serialize;

/// Check that `text` is a valid auth.conf document.
pub fn validate_text(text: &str) -> Result<(), SyntaxError> {
    parse(text).map(|_| ())
}
