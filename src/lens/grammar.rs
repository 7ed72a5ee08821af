//! Labels, keywords and value rules shared by the parser and the printer.

/// Label of a rule stanza.
pub const PATH: &str = "path";
/// Label of the match-operator child of a regex stanza.
pub const OPERATOR: &str = "operator";
/// The only operator the format knows.
pub const REGEX_OPERATOR: &str = "~";
/// Label of comment nodes; the value is the comment text.
pub const COMMENT: &str = "#comment";
/// Label of blank-line nodes.
pub const EMPTY: &str = "#empty";

/// HTTP-ish indirector methods accepted by `method`.
pub const METHODS: &[&str] = &["find", "search", "save", "destroy"];

/// Values accepted by `auth`/`authenticated`.
pub const AUTH_VALUES: &[&str] = &["yes", "no", "on", "off", "any"];

const KEYWORDS: &[&str] = &[
    "path",
    "auth",
    "authenticated",
    "environment",
    "method",
    "allow",
    "allow_ip",
];

/// Attribute lines that may follow a `path` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    Auth,
    Environment,
    Method,
    Allow,
    AllowIp,
}

impl Attribute {
    /// All attributes in the order new stanzas are written.
    pub const ALL: [Attribute; 5] = [
        Attribute::Auth,
        Attribute::Environment,
        Attribute::Method,
        Attribute::Allow,
        Attribute::AllowIp,
    ];

    /// Tree label, which is also the canonical keyword.
    pub fn label(self) -> &'static str {
        match self {
            Attribute::Auth => "auth",
            Attribute::Environment => "environment",
            Attribute::Method => "method",
            Attribute::Allow => "allow",
            Attribute::AllowIp => "allow_ip",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|attr| attr.label() == label)
    }

    /// Keyword as it may appear in a file. `authenticated` is an alias of `auth`.
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "authenticated" => Some(Attribute::Auth),
            other => Self::from_label(other),
        }
    }

    pub fn is_list(self) -> bool {
        !matches!(self, Attribute::Auth)
    }

    /// Position in [`Attribute::ALL`].
    pub fn rank(self) -> usize {
        Self::ALL
            .iter()
            .position(|attr| *attr == self)
            .unwrap_or(Self::ALL.len())
    }

    /// Check one value of this attribute, returning the reason it is rejected.
    pub fn check_value(self, value: &str) -> Result<(), String> {
        if value.is_empty() {
            return Err(format!("empty {} value", self.label()));
        }
        let ok = match self {
            Attribute::Auth => AUTH_VALUES.contains(&value),
            Attribute::Method => METHODS.contains(&value),
            Attribute::Environment => value
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_'),
            Attribute::Allow => value
                .chars()
                .all(|ch| !ch.is_whitespace() && ch != ',' && ch != '#'),
            Attribute::AllowIp => value
                .chars()
                .all(|ch| ch.is_ascii_hexdigit() || matches!(ch, '.' | ':' | '*' | '/')),
        };
        if ok {
            return Ok(());
        }
        let expected = match self {
            Attribute::Auth => format!("one of {}", AUTH_VALUES.join(", ")),
            Attribute::Method => format!("one of {}", METHODS.join(", ")),
            Attribute::Environment => "a word of letters, digits or '_'".to_string(),
            Attribute::Allow => "a single token without ',' or '#'".to_string(),
            Attribute::AllowIp => "an IP address, wildcard or CIDR".to_string(),
        };
        Err(format!(
            "invalid {} value '{}': expected {}",
            self.label(),
            value,
            expected
        ))
    }
}

/// Check the value of a `path` line.
pub fn check_path_value(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("empty path".to_string());
    }
    if value == REGEX_OPERATOR {
        return Err("path cannot be a bare '~'".to_string());
    }
    if value.chars().any(char::is_whitespace) {
        return Err(format!("path '{value}' contains whitespace"));
    }
    Ok(())
}

/// Closest known keyword to a misspelled directive.
pub fn suggest_keyword(word: &str) -> Option<&'static str> {
    KEYWORDS
        .iter()
        .map(|keyword| (*keyword, strsim::levenshtein(word, keyword)))
        .filter(|(_, distance)| *distance <= 2)
        .min_by_key(|(_, distance)| *distance)
        .map(|(keyword, _)| keyword)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticated_is_an_alias() {
        assert_eq!(Attribute::from_keyword("authenticated"), Some(Attribute::Auth));
        assert_eq!(Attribute::from_label("authenticated"), None);
    }

    #[test]
    fn value_rules() {
        assert!(Attribute::Method.check_value("save").is_ok());
        assert!(Attribute::Method.check_value("post").is_err());
        assert!(Attribute::AllowIp.check_value("192.168.0.0/24").is_ok());
        assert!(Attribute::AllowIp.check_value("fe80::1").is_ok());
        assert!(Attribute::AllowIp.check_value("example.com").is_err());
        assert!(Attribute::Allow.check_value("$1").is_ok());
        assert!(Attribute::Allow.check_value("a,b").is_err());
        assert!(Attribute::Environment.check_value("stable").is_ok());
        assert!(Attribute::Environment.check_value("pre-prod").is_err());
        assert!(Attribute::Auth.check_value("any").is_ok());
        assert!(Attribute::Auth.check_value("maybe").is_err());
    }

    #[test]
    fn path_rules() {
        assert!(check_path_value("^/catalog/([^/]+)$").is_ok());
        assert!(check_path_value("~").is_err());
        assert!(check_path_value("/a b").is_err());
    }

    #[test]
    fn keyword_suggestions() {
        assert_eq!(suggest_keyword("alow"), Some("allow"));
        assert_eq!(suggest_keyword("methods"), Some("method"));
        assert_eq!(suggest_keyword("frobnicate"), None);
    }
}
