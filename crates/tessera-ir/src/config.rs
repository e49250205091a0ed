//! Process-wide options.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

static OPTIONS: RwLock<Option<Options>> = RwLock::new(None);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Backend used for expressions with no database tables.
    pub default_backend: String,
    pub repr: ReprOptions,
    pub sql: SqlOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReprOptions {
    /// Columns shown per table before eliding the rest.
    pub max_columns: usize,
    pub show_types: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlOptions {
    /// Put each clause on its own line.
    pub pretty: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            default_backend: "duckdb".to_string(),
            repr: ReprOptions::default(),
            sql: SqlOptions::default(),
        }
    }
}

impl Default for ReprOptions {
    fn default() -> Self {
        Self {
            max_columns: 20,
            show_types: true,
        }
    }
}

impl Options {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Snapshot of the current options.
pub fn options() -> Options {
    OPTIONS.read().clone().unwrap_or_default()
}

/// Replace the current options, returning the previous ones.
pub fn set_options(options: Options) -> Options {
    let previous = OPTIONS.write().replace(options);
    previous.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = Options::default();
        assert_eq!(opts.default_backend, "duckdb");
        assert_eq!(opts.repr.max_columns, 20);
        assert!(!opts.sql.pretty);
    }

    #[test]
    fn test_partial_json() {
        let opts = Options::from_json(r#"{"repr": {"show_types": false}}"#).unwrap();
        assert_eq!(opts.default_backend, "duckdb");
        assert!(!opts.repr.show_types);
        assert_eq!(opts.repr.max_columns, 20);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut opts = Options::default();
        opts.sql.pretty = true;
        let back = Options::from_json(&opts.to_json().unwrap()).unwrap();
        assert_eq!(back, opts);
    }

    #[test]
    fn test_bad_json() {
        assert!(Options::from_json(r#"{"repr": {"max_columns": "many"}}"#).is_err());
    }

    #[test]
    fn test_set_options_returns_previous() {
        let current = options();
        let previous = set_options(current.clone());
        assert_eq!(previous, current);
        assert_eq!(options(), current);
    }
}
