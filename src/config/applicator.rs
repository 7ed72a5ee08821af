//! Rule applicator: applies a batch of rules, one transaction per target.
//!
//! Rules are grouped by the file they target, in the order targets first
//! appear. For each file:
//! - a load failure fails every rule for that file
//! - a rule that is invalid, ambiguous or anchored nowhere fails alone
//! - a tree or query failure discards the file's changes and fails the rest
//! - a save failure fails the rules that changed something

use crate::config::schema::{RuleManifest, DEFAULT_TARGET};
use crate::rules::{AuthRule, MapperError, RuleMapper, RuleOutcome};
use crate::transaction::{SaveOutcome, Transaction};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Render the result without writing it.
    pub dry_run: bool,
    /// Treat a missing target as an empty file.
    pub create_missing: bool,
    /// Target for rules that do not name one.
    pub default_target: PathBuf,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            create_missing: true,
            default_target: PathBuf::from(DEFAULT_TARGET),
        }
    }
}

/// Errors during rule application
#[derive(Debug)]
pub enum ApplicationError {
    /// Target could not be loaded
    Load { path: PathBuf, reason: String },
    /// The rule itself could not be applied
    Rule(MapperError),
    /// Another rule broke the transaction for this target
    Aborted { path: PathBuf, reason: String },
    /// Target could not be written
    Save { path: PathBuf, reason: String },
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::Load { path, reason } => {
                write!(f, "could not load {}: {}", path.display(), reason)
            }
            ApplicationError::Rule(e) => write!(f, "{}", e),
            ApplicationError::Aborted { path, reason } => {
                write!(f, "changes to {} were discarded: {}", path.display(), reason)
            }
            ApplicationError::Save { path, reason } => {
                write!(f, "could not save {}: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Rule(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MapperError> for ApplicationError {
    fn from(e: MapperError) -> Self {
        ApplicationError::Rule(e)
    }
}

/// Outcome of applying a group of rules to one file.
#[derive(Debug)]
pub struct TargetReport {
    pub target: PathBuf,
    /// One entry per rule, keyed by rule name, in input order.
    pub results: Vec<(String, Result<RuleOutcome, ApplicationError>)>,
    /// Text before any rule ran. Empty when the file did not exist.
    pub before: String,
    /// Text after the rules ran, or the would-be text on a dry run.
    pub after: String,
    pub written: bool,
}

impl TargetReport {
    pub fn changed(&self) -> bool {
        self.before != self.after
    }

    pub fn failed(&self) -> bool {
        self.results.iter().any(|(_, result)| result.is_err())
    }
}

/// Apply every rule in `manifest`. Its `target` overrides
/// `options.default_target`.
pub fn apply_manifest(manifest: &RuleManifest, options: &ApplyOptions) -> Vec<TargetReport> {
    let mut options = options.clone();
    if let Some(target) = &manifest.target {
        options.default_target = target.clone();
    }
    apply_rules(&manifest.rules, &options)
}

/// Apply `rules`, one transaction per target file.
pub fn apply_rules(rules: &[AuthRule], options: &ApplyOptions) -> Vec<TargetReport> {
    let mut groups: Vec<(PathBuf, Vec<&AuthRule>)> = Vec::new();
    for rule in rules {
        let target = rule
            .target
            .clone()
            .unwrap_or_else(|| options.default_target.clone());
        match groups.iter_mut().find(|(path, _)| *path == target) {
            Some((_, group)) => group.push(rule),
            None => groups.push((target, vec![rule])),
        }
    }

    groups
        .into_iter()
        .map(|(target, rules)| apply_target(&target, &rules, options))
        .collect()
}

fn apply_target(target: &Path, rules: &[&AuthRule], options: &ApplyOptions) -> TargetReport {
    let mut tx = match Transaction::open(target, options.create_missing) {
        Ok(tx) => tx,
        Err(err) => {
            let reason = err.to_string();
            return TargetReport {
                target: target.to_path_buf(),
                results: rules
                    .iter()
                    .map(|rule| {
                        (
                            rule.name.clone(),
                            Err(ApplicationError::Load {
                                path: target.to_path_buf(),
                                reason: reason.clone(),
                            }),
                        )
                    })
                    .collect(),
                before: String::new(),
                after: String::new(),
                written: false,
            };
        }
    };

    let before = tx.original_text().to_string();
    let mut mapper = RuleMapper::new();
    let mut results = Vec::with_capacity(rules.len());
    let mut aborted: Option<String> = None;

    for rule in rules {
        if let Some(reason) = &aborted {
            results.push((
                rule.name.clone(),
                Err(ApplicationError::Aborted {
                    path: target.to_path_buf(),
                    reason: reason.clone(),
                }),
            ));
            continue;
        }
        match mapper.apply(tx.document_mut(), rule) {
            Ok(outcome) => {
                debug!("rule '{}' {}", rule.name, outcome);
                results.push((rule.name.clone(), Ok(outcome)));
            }
            Err(err) => {
                warn!("rule '{}' failed on {}: {}", rule.name, target.display(), err);
                if err.is_engine_error() {
                    aborted = Some(format!("rule '{}' failed: {}", rule.name, err));
                }
                results.push((rule.name.clone(), Err(ApplicationError::Rule(err))));
            }
        }
    }

    if let Some(reason) = aborted {
        tx.rollback();
        fail_where(&mut results, |_| true, || ApplicationError::Aborted {
            path: target.to_path_buf(),
            reason: reason.clone(),
        });
        return TargetReport {
            target: target.to_path_buf(),
            results,
            after: before.clone(),
            before,
            written: false,
        };
    }

    let (after, written) = if options.dry_run {
        match tx.render() {
            Ok(text) => (text, false),
            Err(err) => {
                error!("{err}");
                let reason = err.to_string();
                fail_where(&mut results, RuleOutcome::changed, || ApplicationError::Save {
                    path: target.to_path_buf(),
                    reason: reason.clone(),
                });
                (before.clone(), false)
            }
        }
    } else {
        match tx.save() {
            Ok(outcome) => (
                tx.original_text().to_string(),
                matches!(outcome, SaveOutcome::Written { .. }),
            ),
            Err(err) => {
                let reason = err.to_string();
                fail_where(&mut results, RuleOutcome::changed, || ApplicationError::Save {
                    path: target.to_path_buf(),
                    reason: reason.clone(),
                });
                (before.clone(), false)
            }
        }
    };

    TargetReport {
        target: target.to_path_buf(),
        results,
        before,
        after,
        written,
    }
}

/// Turn every successful result whose outcome satisfies `pred` into an error.
fn fail_where(
    results: &mut [(String, Result<RuleOutcome, ApplicationError>)],
    pred: impl Fn(RuleOutcome) -> bool,
    error: impl Fn() -> ApplicationError,
) {
    for (_, result) in results.iter_mut() {
        if matches!(result, Ok(outcome) if pred(*outcome)) {
            *result = Err(error());
        }
    }
}
