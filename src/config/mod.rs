pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{
    apply_manifest, apply_rules, ApplicationError, ApplyOptions, TargetReport,
};
pub use loader::{load_from_path, load_from_str, ConfigError};
pub use schema::{RuleManifest, DEFAULT_TARGET};
