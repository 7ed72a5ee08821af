use crate::rules::{AuthRule, ValidationError, ValidationIssue};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default location of Puppet's `auth.conf`.
pub const DEFAULT_TARGET: &str = "/etc/puppet/auth.conf";

/// A TOML file of rules to apply.
///
/// ```toml
/// target = "/etc/puppet/auth.conf"
///
/// [[rules]]
/// name = "/facts rule"
/// path = "/facts"
/// methods = ["find", "save"]
/// authenticated = "any"
/// ins_before = "first deny"
/// ```
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct RuleManifest {
    /// Target for rules that do not name their own.
    #[serde(default)]
    pub target: Option<PathBuf>,
    #[serde(default)]
    pub rules: Vec<AuthRule>,
}

impl RuleManifest {
    /// Join relative targets, of the manifest and of each rule, onto `base`.
    pub fn resolve_targets(&mut self, base: &Path) {
        let resolve = |target: &mut Option<PathBuf>| {
            if let Some(path) = target {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        };
        resolve(&mut self.target);
        for rule in &mut self.rules {
            resolve(&mut rule.target);
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.rules.is_empty() {
            issues.push(ValidationIssue::EmptyRuleList);
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            issues.extend(rule.issues());
            if !rule.name.trim().is_empty() && !seen.insert(rule.name.as_str()) {
                issues.push(ValidationIssue::DuplicateRule {
                    name: rule.name.clone(),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}
