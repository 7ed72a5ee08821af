use crate::lens::grammar::{check_path_value, Attribute};
use crate::query::PathExpr;
use crate::tree::NodeId;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

/// Value of the `auth` attribute. `Absent` means the stanza has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Authenticated {
    Yes,
    No,
    On,
    Off,
    Any,
    Absent,
}

impl Authenticated {
    pub fn as_str(self) -> &'static str {
        match self {
            Authenticated::Yes => "yes",
            Authenticated::No => "no",
            Authenticated::On => "on",
            Authenticated::Off => "off",
            Authenticated::Any => "any",
            Authenticated::Absent => "absent",
        }
    }
}

impl fmt::Display for Authenticated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Authenticated {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yes" => Ok(Authenticated::Yes),
            "no" => Ok(Authenticated::No),
            "on" => Ok(Authenticated::On),
            "off" => Ok(Authenticated::Off),
            "any" => Ok(Authenticated::Any),
            "absent" => Ok(Authenticated::Absent),
            other => Err(format!("unknown authenticated value '{other}'")),
        }
    }
}

/// Desired state of one auth.conf rule.
///
/// List fields are `None` when the rule does not manage them; `Some(vec![])`
/// removes the attribute from the stanza. Manifests may give a single string
/// where a list is expected.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthRule {
    pub name: String,
    #[serde(default)]
    pub ensure: Ensure,
    /// Path or regex the rule matches. Defaults to `name`.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub path_regex: bool,
    #[serde(default, deserialize_with = "one_or_many")]
    pub methods: Option<Vec<String>>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub environments: Option<Vec<String>>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub allow: Option<Vec<String>>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub allow_ip: Option<Vec<String>>,
    #[serde(default)]
    pub authenticated: Option<Authenticated>,
    #[serde(default)]
    pub ins_before: Option<String>,
    #[serde(default)]
    pub ins_after: Option<String>,
    #[serde(default)]
    pub target: Option<PathBuf>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    }))
}

/// Expression for an insertion anchor, expanding the named aliases.
pub fn anchor_expression(anchor: &str) -> &str {
    match anchor.trim() {
        "first allow" => "path[allow][1]",
        "last allow" => "path[allow][last()]",
        "first deny" => "path[count(allow)=0][1]",
        "last deny" => "path[count(allow)=0][last()]",
        other => other,
    }
}

fn collect<I, S>(values: I) -> Option<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Some(values.into_iter().map(Into::into).collect())
}

impl AuthRule {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ensure: Ensure::Present,
            path: Some(path.into()),
            path_regex: false,
            methods: None,
            environments: None,
            allow: None,
            allow_ip: None,
            authenticated: None,
            ins_before: None,
            ins_after: None,
            target: None,
        }
    }

    pub fn regex(mut self) -> Self {
        self.path_regex = true;
        self
    }

    pub fn absent(mut self) -> Self {
        self.ensure = Ensure::Absent;
        self
    }

    pub fn methods<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = collect(values);
        self
    }

    pub fn environments<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.environments = collect(values);
        self
    }

    pub fn allow<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow = collect(values);
        self
    }

    pub fn allow_ip<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_ip = collect(values);
        self
    }

    pub fn authenticated(mut self, value: Authenticated) -> Self {
        self.authenticated = Some(value);
        self
    }

    pub fn insert_before(mut self, anchor: impl Into<String>) -> Self {
        self.ins_before = Some(anchor.into());
        self
    }

    pub fn insert_after(mut self, anchor: impl Into<String>) -> Self {
        self.ins_after = Some(anchor.into());
        self
    }

    pub fn target(mut self, target: impl Into<PathBuf>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn effective_path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.name)
    }

    /// Desired list for `attr`, if the rule manages it.
    pub fn list(&self, attr: Attribute) -> Option<&[String]> {
        let values = match attr {
            Attribute::Method => &self.methods,
            Attribute::Environment => &self.environments,
            Attribute::Allow => &self.allow,
            Attribute::AllowIp => &self.allow_ip,
            Attribute::Auth => return None,
        };
        values.as_deref()
    }

    pub fn issues(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let rule = if self.name.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                rule: None,
                field: "name",
            });
            None
        } else {
            Some(self.name.clone())
        };

        if let Err(message) = check_path_value(self.effective_path()) {
            issues.push(ValidationIssue::InvalidValue {
                rule: rule.clone(),
                field: "path",
                message,
            });
        }

        for attr in Attribute::ALL {
            for value in self.list(attr).unwrap_or_default() {
                if let Err(message) = attr.check_value(value) {
                    issues.push(ValidationIssue::InvalidValue {
                        rule: rule.clone(),
                        field: field_name(attr),
                        message,
                    });
                }
            }
        }

        for (field, anchor) in [("ins_before", &self.ins_before), ("ins_after", &self.ins_after)] {
            let Some(anchor) = anchor.as_deref() else {
                continue;
            };
            if anchor.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule: rule.clone(),
                    field,
                });
            } else if let Err(err) = PathExpr::parse(anchor_expression(anchor)) {
                issues.push(ValidationIssue::InvalidValue {
                    rule: rule.clone(),
                    field,
                    message: err.to_string(),
                });
            }
        }
        if self.ins_before.is_some() && self.ins_after.is_some() {
            issues.push(ValidationIssue::InvalidCombo {
                rule,
                message: "ins_before and ins_after cannot both be set".to_string(),
            });
        }
        issues
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let issues = self.issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

fn field_name(attr: Attribute) -> &'static str {
    match attr {
        Attribute::Auth => "authenticated",
        Attribute::Environment => "environments",
        Attribute::Method => "methods",
        Attribute::Allow => "allow",
        Attribute::AllowIp => "allow_ip",
    }
}

/// Current state of one rule as found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    pub name: String,
    pub ensure: Ensure,
    pub path: String,
    pub path_regex: bool,
    pub environments: Vec<String>,
    pub methods: Vec<String>,
    pub allow: Vec<String>,
    pub allow_ip: Vec<String>,
    pub authenticated: Authenticated,
    #[serde(skip)]
    pub node: NodeId,
}

impl Instance {
    /// Name given to a rule that was not created under an explicit one.
    pub fn synthesized_name(path: &str, regex: bool) -> String {
        if regex {
            format!("Auth rule matching {path}")
        } else {
            format!("Auth rule for {path}")
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyRuleList,
    MissingField {
        rule: Option<String>,
        field: &'static str,
    },
    InvalidValue {
        rule: Option<String>,
        field: &'static str,
        message: String,
    },
    InvalidCombo {
        rule: Option<String>,
        message: String,
    },
    DuplicateRule {
        name: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyRuleList => write!(f, "rule manifest contains no rules"),
            ValidationIssue::MissingField { rule, field } => match rule {
                Some(name) => write!(f, "rule '{name}' missing required field '{field}'"),
                None => write!(f, "rule missing required field '{field}'"),
            },
            ValidationIssue::InvalidValue {
                rule,
                field,
                message,
            } => match rule {
                Some(name) => write!(f, "rule '{name}' has invalid {field}: {message}"),
                None => write!(f, "rule has invalid {field}: {message}"),
            },
            ValidationIssue::InvalidCombo { rule, message } => match rule {
                Some(name) => write!(f, "rule '{name}' has invalid configuration: {message}"),
                None => write!(f, "invalid rule configuration: {message}"),
            },
            ValidationIssue::DuplicateRule { name } => {
                write!(f, "rule '{name}' is declared more than once")
            }
        }
    }
}
