//! Step input template resolution.
//!
//! A step's declared input may reference earlier step outputs with
//! `{{ steps.<ordinal>.output }}` or `{{ steps.<ordinal>.output.<path> }}`,
//! where the path is dot-separated and numeric segments index arrays.
//! Whitespace inside the braces is optional.
//!
//! - A string that is exactly one placeholder is replaced by the referenced
//!   value itself, keeping its JSON type.
//! - A placeholder embedded in longer text is spliced in as text: strings
//!   unquoted, everything else as compact JSON.
//! - Missing results, missing path segments, and references to the current
//!   or a later step resolve to `null` (`"null"` when embedded).
//! - Malformed placeholders are left verbatim.
//!
//! Resolution is pure substitution over `serde_json::Value`; nothing is
//! evaluated.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use skillweave_types::workflow::Workflow;

/// Stateless template resolver.
pub struct TemplateResolver;

impl TemplateResolver {
    /// Resolve `input` for step `current` against the workflow's results.
    pub fn resolve(input: &Value, workflow: &Workflow, current: u32) -> Value {
        Self::resolve_with_results(input, &workflow.results, current)
    }

    /// Resolve `input` for step `current` against an explicit results map.
    pub fn resolve_with_results(
        input: &Value,
        results: &BTreeMap<u32, Value>,
        current: u32,
    ) -> Value {
        match input {
            Value::String(s) => resolve_string(s, results, current),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| Self::resolve_with_results(item, results, current))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::resolve_with_results(v, results, current)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Ordinals referenced by well-formed placeholders anywhere in `input`.
    pub fn referenced_steps(input: &Value) -> BTreeSet<u32> {
        let mut found = BTreeSet::new();
        collect_references(input, &mut found);
        found
    }
}

// ---------------------------------------------------------------------------
// Placeholder parsing
// ---------------------------------------------------------------------------

/// A parsed `steps.N.output[.path]` reference.
#[derive(Debug, Clone, PartialEq)]
struct StepReference {
    ordinal: u32,
    path: Vec<String>,
}

/// One `{{ ... }}` occurrence inside a string.
struct Placeholder {
    start: usize,
    end: usize,
    reference: Option<StepReference>,
}

/// Parse the text between the braces.
fn parse_reference(expr: &str) -> Option<StepReference> {
    let mut segments = expr.trim().split('.');
    if segments.next()? != "steps" {
        return None;
    }
    let ordinal: u32 = segments.next()?.parse().ok()?;
    if segments.next()? != "output" {
        return None;
    }

    let path: Vec<String> = segments.map(str::to_string).collect();
    if path.iter().any(|seg| seg.is_empty()) {
        return None;
    }
    Some(StepReference { ordinal, path })
}

/// Scan `text` for `{{ ... }}` occurrences in order.
fn scan_placeholders(text: &str) -> Vec<Placeholder> {
    let mut found = Vec::new();
    let mut cursor = 0;

    while let Some(open) = text[cursor..].find("{{") {
        let start = cursor + open;
        let Some(close) = text[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + close + 2;
        found.push(Placeholder {
            start,
            end,
            reference: parse_reference(&text[start + 2..end - 2]),
        });
        cursor = end;
    }

    found
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

fn resolve_string(text: &str, results: &BTreeMap<u32, Value>, current: u32) -> Value {
    let placeholders = scan_placeholders(text);
    if placeholders.is_empty() {
        return Value::String(text.to_string());
    }

    // Whole-field placeholder keeps the referenced value's type.
    let trimmed = text.trim();
    if let [only] = placeholders.as_slice() {
        if let Some(reference) = &only.reference {
            if text[only.start..only.end] == *trimmed {
                return lookup(reference, results, current);
            }
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for placeholder in &placeholders {
        out.push_str(&text[cursor..placeholder.start]);
        match &placeholder.reference {
            Some(reference) => out.push_str(&splice_text(&lookup(reference, results, current))),
            None => out.push_str(&text[placeholder.start..placeholder.end]),
        }
        cursor = placeholder.end;
    }
    out.push_str(&text[cursor..]);
    Value::String(out)
}

fn lookup(reference: &StepReference, results: &BTreeMap<u32, Value>, current: u32) -> Value {
    if reference.ordinal >= current {
        tracing::debug!(
            ordinal = reference.ordinal,
            current,
            "template references a step that has not run yet"
        );
        return Value::Null;
    }

    let Some(mut value) = results.get(&reference.ordinal) else {
        tracing::debug!(ordinal = reference.ordinal, "template references a missing step result");
        return Value::Null;
    };

    for segment in &reference.path {
        let next = match value {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
            _ => None,
        };
        match next {
            Some(v) => value = v,
            None => {
                tracing::debug!(
                    ordinal = reference.ordinal,
                    segment = %segment,
                    "template path segment not found"
                );
                return Value::Null;
            }
        }
    }

    value.clone()
}

/// Text form of a value spliced into a longer string.
fn splice_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn collect_references(input: &Value, found: &mut BTreeSet<u32>) {
    match input {
        Value::String(s) => found.extend(
            scan_placeholders(s)
                .into_iter()
                .filter_map(|p| p.reference.map(|r| r.ordinal)),
        ),
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, found)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, found)),
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn results() -> BTreeMap<u32, Value> {
        let mut r = BTreeMap::new();
        r.insert(1, json!({"title": "Fractions", "levels": [{"name": "intro"}, {"name": "boss"}], "count": 3}));
        r.insert(2, json!("plain text"));
        r
    }

    fn resolve(input: Value, current: u32) -> Value {
        TemplateResolver::resolve_with_results(&input, &results(), current)
    }

    #[test]
    fn test_whole_field_keeps_value_type() {
        assert_eq!(resolve(json!("{{ steps.1.output.count }}"), 3), json!(3));
        assert_eq!(
            resolve(json!("{{steps.1.output.levels}}"), 3),
            json!([{"name": "intro"}, {"name": "boss"}])
        );
        assert_eq!(resolve(json!("  {{ steps.2.output }} "), 3), json!("plain text"));
    }

    #[test]
    fn test_array_index_segments() {
        assert_eq!(resolve(json!("{{ steps.1.output.levels.1.name }}"), 2), json!("boss"));
        assert_eq!(resolve(json!("{{ steps.1.output.levels.9.name }}"), 2), Value::Null);
    }

    #[test]
    fn test_embedded_placeholders_are_stringified() {
        let out = resolve(
            json!("Game '{{ steps.1.output.title }}' has {{ steps.1.output.count }} levels: {{ steps.1.output.levels.0 }}"),
            3,
        );
        assert_eq!(out, json!("Game 'Fractions' has 3 levels: {\"name\":\"intro\"}"));
    }

    #[test]
    fn test_missing_data_resolves_to_null() {
        assert_eq!(resolve(json!("{{ steps.1.output.nope }}"), 3), Value::Null);
        assert_eq!(resolve(json!("{{ steps.2.output.field }}"), 3), Value::Null);
        assert_eq!(resolve(json!("x={{ steps.1.output.nope }}"), 3), json!("x=null"));
    }

    #[test]
    fn test_forward_and_self_references_resolve_to_null() {
        // step 1 has a result, but step 1 cannot see itself
        assert_eq!(resolve(json!("{{ steps.1.output }}"), 1), Value::Null);
        assert_eq!(resolve(json!("{{ steps.2.output }}"), 2), Value::Null);
        assert_eq!(resolve(json!("{{ steps.5.output }}"), 2), Value::Null);
        assert_eq!(resolve(json!("see {{ steps.3.output }}"), 2), json!("see null"));
    }

    #[test]
    fn test_malformed_placeholders_left_verbatim() {
        let inputs = [
            "{{ steps.one.output }}",
            "{{ step.1.output }}",
            "{{ steps.1.result }}",
            "{{ steps.1.output. }}",
            "{{ variables.x }}",
            "unterminated {{ steps.1.output",
        ];
        for input in inputs {
            assert_eq!(resolve(json!(input), 3), json!(input), "{input}");
        }
    }

    #[test]
    fn test_malformed_next_to_valid_placeholder() {
        let out = resolve(json!("{{ nope }} / {{ steps.1.output.title }}"), 2);
        assert_eq!(out, json!("{{ nope }} / Fractions"));
    }

    #[test]
    fn test_recurses_into_objects_and_arrays() {
        let input = json!({
            "title": "{{ steps.1.output.title }}",
            "nested": {"items": ["{{ steps.2.output }}", 7, true, null]},
            "count": 10
        });
        let out = resolve(input, 3);
        assert_eq!(
            out,
            json!({
                "title": "Fractions",
                "nested": {"items": ["plain text", 7, true, null]},
                "count": 10
            })
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let input = json!({"a": "{{ steps.1.output.title }}", "b": "{{ steps.9.output }}"});
        let once = resolve(input, 3);
        let twice = TemplateResolver::resolve_with_results(&once, &results(), 3);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_referenced_steps() {
        let input = json!({
            "a": "{{ steps.1.output }} and {{ steps.3.output.x }}",
            "b": ["{{steps.2.output}}", "{{ bad }}"],
        });
        let refs = TemplateResolver::referenced_steps(&input);
        assert_eq!(refs.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_resolve_against_workflow() {
        use skillweave_types::workflow::StepSpec;

        let mut wf = Workflow::new(
            "game",
            "Fractions game",
            vec![
                StepSpec::new("design", "design", json!({})),
                StepSpec::new("build", "build", json!({"spec": "{{ steps.1.output }}"})),
            ],
        );
        wf.results.insert(1, json!({"levels": 3}));

        let out = TemplateResolver::resolve(&wf.steps[1].input, &wf, 2);
        assert_eq!(out, json!({"spec": {"levels": 3}}));
    }
}
