//! Query classification patterns.
//!
//! A `PatternSet` is a named, ordered collection of regular expressions
//! used to classify reconstructed query text. Order matters: the first
//! pattern whose regex matches wins, so pattern documents are parsed
//! preserving definition order.

pub mod store;

pub use store::PatternStore;

use regex::Regex;

/// A single named classification pattern. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub name: String,
    pub query_regex: Regex,
    pub description: String,
}

/// Ordered set of patterns. Classification iterates in definition order.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

/// Error raised while parsing a pattern document. Never escapes
/// `PatternStore::load`, which degrades to cache or defaults instead.
#[derive(Debug)]
pub enum PatternError {
    Json(serde_json::Error),
    Schema(String),
    Regex { name: String, error: regex::Error },
    Io(std::io::Error),
    Http(reqwest::Error),
}

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternError::Json(e) => write!(f, "invalid pattern JSON: {}", e),
            PatternError::Schema(msg) => write!(f, "invalid pattern document: {}", msg),
            PatternError::Regex { name, error } => {
                write!(f, "invalid regex for pattern '{}': {}", name, error)
            }
            PatternError::Io(e) => write!(f, "pattern source I/O error: {}", e),
            PatternError::Http(e) => write!(f, "pattern source fetch failed: {}", e),
        }
    }
}

impl std::error::Error for PatternError {}

impl From<serde_json::Error> for PatternError {
    fn from(e: serde_json::Error) -> Self {
        PatternError::Json(e)
    }
}

impl From<std::io::Error> for PatternError {
    fn from(e: std::io::Error) -> Self {
        PatternError::Io(e)
    }
}

impl From<reqwest::Error> for PatternError {
    fn from(e: reqwest::Error) -> Self {
        PatternError::Http(e)
    }
}

impl PatternSet {
    /// Built-in defaults used when no external source is configured or
    /// every fallback failed. Order is part of the contract.
    pub fn defaults() -> Self {
        let mut set = PatternSet::default();
        set.push(
            "complex_window_function",
            r"WITH.*ROW_NUMBER\(\).*OVER.*ORDER BY",
            "Complex queries using window functions with ROW_NUMBER",
        );
        set.push(
            "select_statement",
            r"SELECT.*FROM",
            "Simple SELECT statements",
        );
        set
    }

    /// Parse a pattern document:
    /// `{"patterns": {name: {"query_pattern": ..., "description": ...}}}`.
    ///
    /// Definition order in the document becomes classification order
    /// (serde_json is built with `preserve_order`).
    pub fn from_json_str(text: &str) -> Result<Self, PatternError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let patterns = value
            .get("patterns")
            .and_then(|v| v.as_object())
            .ok_or_else(|| PatternError::Schema("missing 'patterns' object".to_string()))?;

        let mut set = PatternSet::default();
        for (name, entry) in patterns {
            let query_pattern = entry
                .get("query_pattern")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    PatternError::Schema(format!("pattern '{}' has no 'query_pattern'", name))
                })?;
            let description = entry
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or_default();

            let query_regex = Regex::new(query_pattern).map_err(|error| PatternError::Regex {
                name: name.clone(),
                error,
            })?;
            set.patterns.push(Pattern {
                name: name.clone(),
                query_regex,
                description: description.to_string(),
            });
        }
        Ok(set)
    }

    fn push(&mut self, name: &str, regex: &str, description: &str) {
        // Defaults are literals; a bad one is a programming error.
        let query_regex = Regex::new(regex).expect("built-in pattern regex");
        self.patterns.push(Pattern {
            name: name.to_string(),
            query_regex,
            description: description.to_string(),
        });
    }

    /// Classify query text: returns the name of the first pattern whose
    /// regex matches (regex search, case-sensitive). `None` when the text
    /// is absent or nothing matches.
    pub fn classify(&self, query_text: Option<&str>) -> Option<&str> {
        let text = query_text?;
        self.patterns
            .iter()
            .find(|p| p.query_regex.is_match(text))
            .map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Pattern names in classification order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_contain_both_patterns_in_order() {
        let set = PatternSet::defaults();
        let names: Vec<_> = set.names().collect();
        assert_eq!(names, vec!["complex_window_function", "select_statement"]);
    }

    #[test]
    fn classify_returns_first_match_in_definition_order() {
        let set = PatternSet::from_json_str(
            r#"{"patterns": {
                "broad": {"query_pattern": "SELECT", "description": "any select"},
                "narrow": {"query_pattern": "SELECT.*FROM users", "description": "user select"}
            }}"#,
        )
        .unwrap();

        // Both match; "broad" is defined first.
        assert_eq!(set.classify(Some("SELECT * FROM users")), Some("broad"));
    }

    #[test]
    fn classify_is_deterministic() {
        let set = PatternSet::defaults();
        let a = set.classify(Some("SELECT * FROM t")).map(str::to_string);
        let b = set.classify(Some("SELECT * FROM t")).map(str::to_string);
        assert_eq!(a, b);
        assert_eq!(a.as_deref(), Some("select_statement"));
    }

    #[test]
    fn classify_none_for_absent_text_or_no_match() {
        let set = PatternSet::defaults();
        assert_eq!(set.classify(None), None);
        assert_eq!(set.classify(Some("VACUUM ANALYZE")), None);
    }

    #[test]
    fn classify_is_case_sensitive_unless_pattern_opts_out() {
        let set = PatternSet::from_json_str(
            r#"{"patterns": {
                "ci_select": {"query_pattern": "(?i)select.*from", "description": ""}
            }}"#,
        )
        .unwrap();
        assert_eq!(set.classify(Some("select 1 from t")), Some("ci_select"));

        let strict = PatternSet::defaults();
        assert_eq!(strict.classify(Some("select 1 from t")), None);
    }

    #[test]
    fn window_function_pattern_matches_cte() {
        let set = PatternSet::defaults();
        let query = "WITH ranked AS (SELECT id, ROW_NUMBER() OVER (ORDER BY ts) FROM t) SELECT * FROM ranked";
        assert_eq!(set.classify(Some(query)), Some("complex_window_function"));
    }

    #[test]
    fn from_json_rejects_missing_patterns_object() {
        assert!(PatternSet::from_json_str(r#"{"rules": {}}"#).is_err());
    }

    #[test]
    fn from_json_rejects_bad_regex() {
        let err = PatternSet::from_json_str(
            r#"{"patterns": {"bad": {"query_pattern": "([", "description": ""}}}"#,
        );
        assert!(matches!(err, Err(PatternError::Regex { .. })));
    }
}
