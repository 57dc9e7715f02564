//! Template reference extraction
//!
//! Finds the `${ ... }` references in a configuration value tree without
//! evaluating them. The dependency graph only needs to know *what* a config
//! refers to, so evaluation stays in the template layer.

use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

/// A dotted reference split into segments (`providers.kube.outputs` -> 3 segments)
pub type ReferencePath = Vec<String>;

/// Matches a dotted key inside an expression. Empty segments are allowed so
/// that `providers.` is reported rather than silently dropped.
static KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_\-]*(?:\.[A-Za-z0-9_\-]*)*")
        .expect("template key regex should compile")
});

/// String literals inside an expression are not references
static LITERAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""[^"]*"|'[^']*'"#).expect("template literal regex should compile")
});

const KEYWORDS: &[&str] = &["true", "false", "null"];

/// Collects template references from a configuration tree
pub trait ReferenceExtractor: Send + Sync {
    /// Returns the reference paths found in `value`, ordered by first
    /// appearance and deduplicated.
    fn collect(&self, value: &Value) -> Vec<ReferencePath>;
}

/// Default extractor for `${a.b.c}` style templates
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateReferenceCollector;

impl TemplateReferenceCollector {
    pub fn new() -> Self {
        Self
    }
}

impl ReferenceExtractor for TemplateReferenceCollector {
    fn collect(&self, value: &Value) -> Vec<ReferencePath> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        walk(value, &mut |path| {
            if seen.insert(path.clone()) {
                found.push(path);
            }
        });
        found
    }
}

/// Shorthand for `TemplateReferenceCollector.collect(value)`
pub fn collect_template_references(value: &Value) -> Vec<ReferencePath> {
    TemplateReferenceCollector.collect(value)
}

fn walk(value: &Value, emit: &mut impl FnMut(ReferencePath)) {
    match value {
        Value::String(s) => {
            for expression in find_expressions(s) {
                for path in expression_keys(expression) {
                    emit(path);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, emit);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                walk(item, emit);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Bodies of every `${ ... }` in `s`. `$${` is an escaped literal.
fn find_expressions(s: &str) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut expressions = Vec::new();
    let mut pos = 0;

    while let Some(offset) = s[pos..].find("${") {
        let start = pos + offset;

        if start > 0 && bytes[start - 1] == b'$' {
            pos = start + 2;
            continue;
        }

        match find_closing_brace(s, start + 1) {
            Some(end) => {
                expressions.push(&s[start + 2..end]);
                pos = end + 1;
            }
            // Unterminated expression: nothing more to find
            None => break,
        }
    }

    expressions
}

/// Position of the `}` closing the `{` at `open_pos`, skipping quoted strings
fn find_closing_brace(content: &str, open_pos: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut depth = 0;
    let mut quote: Option<u8> = None;

    for (pos, &c) in bytes.iter().enumerate().skip(open_pos) {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            b'"' | b'\'' => quote = Some(c),
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos);
                }
            }
            _ => {}
        }
    }

    None
}

fn expression_keys(expression: &str) -> Vec<ReferencePath> {
    let stripped = LITERAL_RE.replace_all(expression, " ");

    KEY_RE
        .find_iter(&stripped)
        .map(|m| m.as_str())
        .filter(|key| !KEYWORDS.contains(key))
        .map(|key| key.split('.').map(str::to_string).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> ReferencePath {
        s.split('.').map(str::to_string).collect()
    }

    #[test]
    fn test_collects_nested_references_in_order() {
        let config = json!({
            "a": "prefix-${providers.kube.outputs.context}-suffix",
            "b": ["${variables.region}", { "c": "${providers.dns.outputs.zone}" }],
            "d": 42,
        });

        let refs = collect_template_references(&config);
        assert_eq!(
            refs,
            vec![
                path("providers.kube.outputs.context"),
                path("variables.region"),
                path("providers.dns.outputs.zone"),
            ]
        );
    }

    #[test]
    fn test_deduplicates() {
        let config = json!(["${project.name}", "${project.name}-${project.name}"]);
        assert_eq!(collect_template_references(&config), vec![path("project.name")]);
    }

    #[test]
    fn test_multiple_keys_in_one_expression() {
        let config = json!("${providers.a.outputs.x || providers.b.outputs.y}");
        assert_eq!(
            collect_template_references(&config),
            vec![path("providers.a.outputs.x"), path("providers.b.outputs.y")]
        );
    }

    #[test]
    fn test_string_literals_and_keywords_are_not_references() {
        let config = json!("${local.env.HOME || \"providers.fake\" || true}");
        assert_eq!(
            collect_template_references(&config),
            vec![path("local.env.HOME")]
        );
    }

    #[test]
    fn test_escaped_expression_is_ignored() {
        let config = json!("$${providers.literal} ${providers.real.outputs.x}");
        assert_eq!(
            collect_template_references(&config),
            vec![path("providers.real.outputs.x")]
        );
    }

    #[test]
    fn test_missing_segment_is_reported() {
        let refs = collect_template_references(&json!("${providers.}"));
        assert_eq!(refs, vec![vec!["providers".to_string(), String::new()]]);

        let refs = collect_template_references(&json!("${providers}"));
        assert_eq!(refs, vec![vec!["providers".to_string()]]);
    }

    #[test]
    fn test_unterminated_expression() {
        assert!(collect_template_references(&json!("${providers.a")).is_empty());
    }

    #[test]
    fn test_find_closing_brace() {
        assert_eq!(find_closing_brace("${ a }", 1), Some(5));
        assert_eq!(find_closing_brace("${ \"}\" }", 1), Some(7));
        assert_eq!(find_closing_brace("${ a", 1), None);
    }
}
