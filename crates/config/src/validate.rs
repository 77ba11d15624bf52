//! Configuration validation engine.
//!
//! Validates TOML configuration files against the known schema, detects
//! unknown/misspelled fields, and reports security problems.

use std::{collections::HashMap, path::Path};

#[cfg(feature = "metrics")]
use hopbus_metrics::{config as config_metrics, counter, labels};

use crate::schema::HopbusConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "security",
    /// "logging", "router", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "router.rebind_polcy"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

/// Represents the expected shape of the configuration schema.
enum KnownKeys {
    /// A struct with fixed field names.
    Struct(HashMap<&'static str, KnownKeys>),
    /// A map with dynamic keys (metrics.labels) whose values have a known shape.
    Map(Box<KnownKeys>),
    /// Scalar value; stop recursion.
    Leaf,
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Build the full schema map mirroring every field in `schema.rs`.
fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Map, Struct};

    Struct(HashMap::from([
        (
            "router",
            Struct(HashMap::from([
                ("rebind_policy", Leaf),
                ("reap_dead_links", Leaf),
                ("local_guid", Leaf),
            ])),
        ),
        (
            "logging",
            Struct(HashMap::from([("level", Leaf), ("json", Leaf)])),
        ),
        (
            "metrics",
            Struct(HashMap::from([
                ("enabled", Leaf),
                ("labels", Map(Box::new(Leaf))),
            ])),
        ),
        (
            "security",
            Struct(HashMap::from([("enabled", Leaf), ("key", Leaf)])),
        ),
    ]))
}

// ── Suggestions ─────────────────────────────────────────────────────────────

/// Edit distance between two strings, one row at a time.
fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == *cb {
                diagonal
            } else {
                1 + diagonal.min(above).min(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

/// Closest candidate within `max_distance` edits. Exact matches are not
/// suggestions.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = if let Some(p) = path {
        Some(p.to_path_buf())
    } else {
        crate::loader::find_config_file()
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    let is_toml = actual_path
        .extension()
        .and_then(|e| e.to_str())
        .is_none_or(|e| e == "toml");
    if !is_toml {
        return validate_parsed(actual_path);
    }

    match std::fs::read_to_string(actual_path) {
        Ok(content) => {
            let content = crate::env_subst::substitute_env(&content);
            let mut result = validate_toml_str(&content);
            result.config_path = Some(actual_path.clone());
            result
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("failed to read config file: {e}"),
            }],
            config_path: Some(actual_path.clone()),
        },
    }
}

/// Validate a TOML string without file-system side effects.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    // 1. Syntax - parse raw TOML
    let toml_value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("TOML syntax error: {e}"),
            });
            return finish(diagnostics);
        },
    };

    // 2. Unknown fields - walk the TOML tree against KnownKeys
    let schema = build_schema_map();
    check_unknown_fields(&toml_value, &schema, "", &mut diagnostics);

    // 3. Type check, then semantic checks on the parsed config
    match toml::from_str::<HopbusConfig>(toml_str) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    finish(diagnostics)
}

/// YAML and JSON files: type and semantic checks only.
fn validate_parsed(path: &Path) -> ValidationResult {
    let mut diagnostics = vec![Diagnostic {
        severity: Severity::Info,
        category: "file-ref",
        path: String::new(),
        message: "unknown-field checks only run on TOML files".into(),
    }];
    match crate::loader::load_config(path) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("{e:#}"),
        }),
    }
    let mut result = finish(diagnostics);
    result.config_path = Some(path.to_path_buf());
    result
}

fn finish(diagnostics: Vec<Diagnostic>) -> ValidationResult {
    #[cfg(feature = "metrics")]
    for d in diagnostics.iter().filter(|d| d.severity == Severity::Error) {
        counter!(config_metrics::VALIDATION_ERRORS_TOTAL, labels::REASON => d.category)
            .increment(1);
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Walk the TOML value tree against the schema tree and flag unknown keys.
fn check_unknown_fields(
    value: &toml::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };

    match (value, schema) {
        (toml::Value::Table(table), KnownKeys::Struct(fields)) => {
            let known_keys: Vec<&str> = fields.keys().copied().collect();
            for (key, child_value) in table {
                let path = join(key);
                if let Some(child_schema) = fields.get(key.as_str()) {
                    check_unknown_fields(child_value, child_schema, &path, diagnostics);
                } else {
                    let level = if prefix.is_empty() {
                        "at top level "
                    } else {
                        ""
                    };
                    let msg = match suggest(key, &known_keys, 3) {
                        Some(s) => format!("unknown field {level}(did you mean \"{s}\"?)"),
                        None => format!("unknown field {level}"),
                    };
                    diagnostics.push(Diagnostic {
                        severity: Severity::Error,
                        category: "unknown-field",
                        path,
                        message: msg.trim().to_string(),
                    });
                }
            }
        },
        (toml::Value::Table(table), KnownKeys::Map(value_schema)) => {
            for (key, child_value) in table {
                check_unknown_fields(child_value, value_schema, &join(key), diagnostics);
            }
        },
        // Leaf or type mismatch - stop recursion (type errors caught later)
        _ => {},
    }
}

/// Run semantic checks on a successfully parsed config.
fn check_semantics(config: &HopbusConfig, diagnostics: &mut Vec<Diagnostic>) {
    let security = &config.security;
    if security.enabled && security.key.is_none() {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "security",
            path: "security.key".into(),
            message: "message sealing is enabled but no key is configured".into(),
        });
    }
    if let Err(e) = security.decode_key() {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "security",
            path: "security.key".into(),
            message: e,
        });
    } else if !security.enabled && security.key.is_some() {
        diagnostics.push(Diagnostic {
            severity: Severity::Info,
            category: "security",
            path: "security.key".into(),
            message: "a key is configured but message sealing is disabled".into(),
        });
    }

    let level = config.logging.level.trim();
    if !level.contains('=') && !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        let msg = match suggest(&level.to_ascii_lowercase(), LOG_LEVELS, 2) {
            Some(s) => format!("unknown log level \"{level}\" (did you mean \"{s}\"?)"),
            None => format!("unknown log level \"{level}\""),
        };
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "logging",
            path: "logging.level".into(),
            message: msg,
        });
    }

    if let Some(guid) = config.router.local_guid.as_deref()
        && (guid.is_empty() || guid.contains(['.', ':']))
    {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "router",
            path: "router.local_guid".into(),
            message: format!("\"{guid}\" is not a valid guid (empty or contains '.' or ':')"),
        });
    }

    for key in config.metrics.labels.keys().filter(|k| k.trim().is_empty()) {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "metrics",
            path: format!("metrics.labels.{key}"),
            message: "metric label names must not be empty".into(),
        });
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, base64::Engine};

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("hello", "hello"), 0);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("router", "ruter"), 1);
        assert_eq!(levenshtein("cat", "car"), 1);
    }

    #[test]
    fn unknown_top_level_key_with_suggestion() {
        let result = validate_toml_str("[ruoter]\nreap_dead_links = true\n");
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field" && d.path == "ruoter")
            .expect("unknown-field diagnostic");
        assert_eq!(d.severity, Severity::Error);
        assert!(d.message.contains("router"), "{}", d.message);
    }

    #[test]
    fn unknown_nested_key_with_suggestion() {
        let toml = r#"
[router]
rebind_polcy = "reject"
"#;
        let result = validate_toml_str(toml);
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.path == "router.rebind_polcy")
            .expect("unknown-field diagnostic");
        assert!(d.message.contains("rebind_policy"));
    }

    #[test]
    fn metrics_labels_accept_any_key() {
        let toml = r#"
[metrics.labels]
region = "eu"
"#;
        let result = validate_toml_str(toml);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn bad_policy_is_type_error() {
        let result = validate_toml_str("[router]\nrebind_policy = \"stack\"\n");
        assert!(result.diagnostics.iter().any(|d| d.category == "type-error"));
        assert!(result.has_errors());
    }

    #[test]
    fn syntax_error_reported() {
        let result = validate_toml_str("[router\n");
        assert_eq!(result.count(Severity::Error), 1);
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn security_enabled_without_key_is_error() {
        let result = validate_toml_str("[security]\nenabled = true\n");
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.category == "security" && d.severity == Severity::Error)
        );
    }

    #[test]
    fn short_key_is_error() {
        let key = base64::engine::general_purpose::STANDARD.encode([0u8; 8]);
        let result = validate_toml_str(&format!("[security]\nenabled = true\nkey = \"{key}\"\n"));
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.category == "security")
            .unwrap();
        assert!(d.message.contains("32 bytes"), "{}", d.message);
    }

    #[test]
    fn valid_key_is_clean() {
        let key = base64::engine::general_purpose::STANDARD.encode([9u8; 32]);
        let result = validate_toml_str(&format!("[security]\nenabled = true\nkey = \"{key}\"\n"));
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn unknown_log_level_warned() {
        let result = validate_toml_str("[logging]\nlevel = \"dbug\"\n");
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.category == "logging")
            .unwrap();
        assert_eq!(d.severity, Severity::Warning);
        assert!(d.message.contains("debug"));
    }

    #[test]
    fn env_filter_directive_not_warned() {
        let result = validate_toml_str("[logging]\nlevel = \"hopbus_routing=trace,info\"\n");
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn invalid_local_guid_is_error() {
        let result = validate_toml_str("[router]\nlocal_guid = \"abc.1\"\n");
        assert!(result.diagnostics.iter().any(|d| d.category == "router"));
    }

    #[test]
    fn validate_missing_file_reports_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = validate(Some(&dir.path().join("absent.toml")));
        assert!(result.has_errors());
        assert!(result.config_path.is_some());
    }

    #[test]
    fn yaml_file_gets_semantic_checks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hopbus.yaml");
        std::fs::write(&path, "security:\n  enabled: true\n").unwrap();
        let result = validate(Some(&path));
        assert!(result.has_errors());
        assert!(result.diagnostics.iter().any(|d| d.category == "security"));
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn empty_metric_label_name_is_error() {
        let result = validate_toml_str("[metrics.labels]\n\"\" = \"eu\"\n");
        assert!(result.has_errors());
    }

    #[test]
    fn schema_drift_guard() {
        let config = HopbusConfig::default();
        let toml_value = toml::Value::try_from(&config).expect("serialize default config");
        let schema = build_schema_map();
        let mut diagnostics = Vec::new();
        check_unknown_fields(&toml_value, &schema, "", &mut diagnostics);
        assert!(
            diagnostics.is_empty(),
            "schema map is missing keys present in HopbusConfig::default(): {diagnostics:?}"
        );
    }
}
