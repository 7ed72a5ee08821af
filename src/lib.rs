//! Puppet Auth: structured editing of Puppet `auth.conf` files
//!
//! The file is parsed into an ordered, labeled tree, edited through path
//! expressions or typed rule records, and written back with every untouched
//! line kept byte for byte.
//!
//! # Architecture
//!
//! - [`lens`] turns text into a [`Tree`] and back (`serialize(parse(t)) == t`)
//! - [`tree`] is the node store, with a change journal
//! - [`query`] evaluates expressions such as `path[.='/facts']/method/*`
//! - [`rules`] maps [`AuthRule`] records onto `path` stanzas
//! - [`transaction`] loads, validates and atomically saves one file
//! - [`config`] applies TOML rule manifests across files
//!
//! # Safety
//!
//! - A file that does not parse is never written
//! - Rendered text is re-parsed before it replaces the target
//! - Atomic file writes (tempfile + fsync + rename)
//! - Outside edits between load and save are detected (xxh3)
//! - Idempotent operations
//!
//! # Example
//!
//! ```no_run
//! use puppet_auth::{AuthRule, Authenticated, RuleMapper, Transaction};
//!
//! let mut tx = Transaction::open("/etc/puppet/auth.conf", false)?;
//! let rule = AuthRule::new("/facts rule", "/facts")
//!     .methods(["find", "save"])
//!     .authenticated(Authenticated::Any)
//!     .insert_before("first deny");
//!
//! let outcome = RuleMapper::new().apply(tx.document_mut(), &rule)?;
//! println!("{outcome}");
//! tx.save()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod document;
pub mod lens;
pub mod query;
pub mod rules;
pub mod transaction;
pub mod tree;

// Re-exports
pub use config::{
    apply_manifest, apply_rules, load_from_path, load_from_str, ApplicationError, ApplyOptions,
    ConfigError, RuleManifest, TargetReport, DEFAULT_TARGET,
};
pub use document::{Document, DocumentError};
pub use lens::{parse, serialize, RenderError, SyntaxError};
pub use query::{MatchSet, PathExpr, QueryError};
pub use rules::{
    AuthRule, Authenticated, Ensure, Instance, MapperError, RuleMapper, RuleOutcome,
    ValidationError, ValidationIssue,
};
pub use transaction::{LoadError, SaveError, SaveOutcome, Transaction, TxState};
pub use tree::{Change, NodeId, Node, Position, Tree, TreeError};

/// Install the `tracing` subscriber used by the command-line tool.
///
/// `RUST_LOG` overrides the default `puppet_auth=info` filter. Output goes
/// to stderr.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("puppet_auth=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}
