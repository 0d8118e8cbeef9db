//! `{{ ... }}` reference templates inside node configuration.
//!
//! Two reference forms are understood:
//! - `{{ variables.a.b }}` (or a bare `{{ a.b }}`) reads a run variable.
//! - `{{ nodes.<id>.<path> }}` reads an upstream node's recorded output.

use serde_json::Value;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A parsed reference expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference<'a> {
    /// Dotted path into the run variables.
    Variable(&'a str),
    /// Output of an upstream node, optionally narrowed by a dotted path.
    NodeOutput {
        node_id: &'a str,
        path: Option<&'a str>,
    },
}

impl<'a> Reference<'a> {
    pub fn parse(expr: &'a str) -> Self {
        let expr = expr.trim();
        if let Some(rest) = expr.strip_prefix("nodes.") {
            let (node_id, path) = match rest.split_once('.') {
                Some((id, path)) => (id, Some(path)),
                None => (rest, None),
            };
            return Reference::NodeOutput { node_id, path };
        }
        Reference::Variable(expr.strip_prefix("variables.").unwrap_or(expr))
    }

    /// First segment of a variable path; `None` for node-output references.
    pub fn variable_root(&self) -> Option<&'a str> {
        match self {
            Reference::Variable(path) => path.split('.').next(),
            Reference::NodeOutput { .. } => None,
        }
    }
}

/// Every `{{ expr }}` occurrence in `text`, trimmed. Unterminated openers are ignored.
pub fn references(text: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find(CLOSE) else { break };
        let expr = after[..end].trim();
        if !expr.is_empty() {
            found.push(expr);
        }
        rest = &after[end + CLOSE.len()..];
    }
    found
}

/// Collect references from every string nested anywhere in `value`.
pub fn collect_references(value: &Value) -> Vec<String> {
    let mut found = Vec::new();
    walk_strings(value, &mut |s| {
        found.extend(references(s).into_iter().map(str::to_owned));
    });
    found
}

fn walk_strings(value: &Value, visit: &mut dyn FnMut(&str)) {
    match value {
        Value::String(s) => visit(s),
        Value::Array(items) => items.iter().for_each(|v| walk_strings(v, visit)),
        Value::Object(map) => map.values().for_each(|v| walk_strings(v, visit)),
        _ => {}
    }
}

/// If `text` is exactly one reference (`"{{ x }}"` modulo whitespace), return its expression.
pub fn whole_reference(text: &str) -> Option<&str> {
    let inner = text.trim().strip_prefix(OPEN)?.strip_suffix(CLOSE)?;
    if inner.contains(OPEN) || inner.contains(CLOSE) {
        return None;
    }
    Some(inner.trim())
}

/// Walk a dotted path (`a.b.0.c`) through objects and arrays.
///
/// An empty path returns `value` itself.
pub fn lookup_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Replace references in `value` using `resolve`.
///
/// A string that is a single reference is replaced by the resolved value
/// itself (keeping its JSON type); references embedded in longer strings
/// are interpolated as text. Unresolved references become `null` / empty.
pub fn render(value: &Value, resolve: &dyn Fn(&str) -> Option<Value>) -> Value {
    match value {
        Value::String(text) => {
            if let Some(expr) = whole_reference(text) {
                return resolve(expr).unwrap_or(Value::Null);
            }
            if !text.contains(OPEN) {
                return value.clone();
            }
            Value::String(interpolate(text, resolve))
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| render(v, resolve)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render(v, resolve)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn interpolate(text: &str, resolve: &dyn Fn(&str) -> Option<Value>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find(CLOSE) else { break };
        out.push_str(&rest[..start]);
        match resolve(after[..end].trim()) {
            Some(Value::String(s)) => out.push_str(&s),
            Some(Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &after[end + CLOSE.len()..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_every_reference_in_a_string() {
        let found = references("Hi {{ variables.user.name }}, see {{nodes.fetch.body}} {{ }}");
        assert_eq!(found, vec!["variables.user.name", "nodes.fetch.body"]);
    }

    #[test]
    fn parses_reference_forms() {
        assert_eq!(Reference::parse("variables.user.id"), Reference::Variable("user.id"));
        assert_eq!(Reference::parse("user"), Reference::Variable("user"));
        assert_eq!(
            Reference::parse("nodes.fetch.body.items"),
            Reference::NodeOutput {
                node_id: "fetch",
                path: Some("body.items")
            }
        );
        assert_eq!(Reference::parse("variables.user.id").variable_root(), Some("user"));
    }

    #[test]
    fn collects_nested_references() {
        let config = json!({ "a": ["{{ x }}", { "b": "{{ nodes.n.k }}" }], "c": 3 });
        let mut refs = collect_references(&config);
        refs.sort();
        assert_eq!(refs, vec!["nodes.n.k", "x"]);
    }

    #[test]
    fn lookup_walks_objects_and_arrays() {
        let value = json!({ "items": [{ "id": 7 }] });
        assert_eq!(lookup_path(&value, "items.0.id"), Some(&json!(7)));
        assert_eq!(lookup_path(&value, "items.3.id"), None);
        assert_eq!(lookup_path(&value, ""), Some(&value));
    }

    #[test]
    fn render_keeps_types_for_whole_references() {
        let vars = json!({ "count": 3, "name": "ada" });
        let resolve = |expr: &str| lookup_path(&vars, expr).cloned();
        let out = render(
            &json!({ "n": "{{ count }}", "greeting": "hi {{ name }} x{{count}}", "missing": "{{ nope }}" }),
            &resolve,
        );
        assert_eq!(out, json!({ "n": 3, "greeting": "hi ada x3", "missing": null }));
    }
}
