/**
 * ============================================================================
 * TEMPLATE ENGINE MODULE
 * ============================================================================
 *
 * PURPOSE: Substitute live sample values into URL and body templates
 *
 * TOKEN FORMAT: %fieldName% for fieldName in
 * latitude, longitude, speed, accuracy, timestamp
 *
 * BODY RESOLUTION:
 * 1. No body template: raw field map when the URL has no placeholders,
 *    empty map otherwise (values already travel in the URL)
 * 2. Body template with at least one placeholder anywhere: dynamic mode,
 *    deep substitution, nothing merged
 * 3. Body template without placeholders: legacy mode, field map merged
 *    into the template, field map wins on collision
 *
 * Pure functions, no I/O.
 *
 * ============================================================================
 */

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"%([A-Za-z0-9_]+)%").unwrap());

/**
 * How the request body was produced
 * Logged with every transmission
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyMode {
    /// No template, URL carried no placeholders: raw field map
    LegacyFieldMap,
    /// No template, URL carried the values: empty body
    LegacyEmpty,
    /// Template without placeholders: field map merged into template
    LegacyMerge,
    /// Template with placeholders: substituted template only
    Dynamic,
}

/**
 * Replace every %key% token with its value
 * Tokens without a matching key are left verbatim
 */
pub fn substitute(template: &str, values: &HashMap<String, String>) -> String {
    TOKEN
        .replace_all(template, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/**
 * True if the string contains %key% for any of the given keys
 */
pub fn contains_placeholder<S: AsRef<str>>(text: &str, keys: &[S]) -> bool {
    TOKEN
        .captures_iter(text)
        .any(|caps| keys.iter().any(|key| key.as_ref() == &caps[1]))
}

/**
 * Recursively scan strings, arrays and objects for a recognized placeholder
 * Only string leaves are inspected, object keys are not
 */
pub fn has_any_placeholder<S: AsRef<str>>(node: &Value, keys: &[S]) -> bool {
    match node {
        Value::String(s) => contains_placeholder(s, keys),
        Value::Array(items) => items.iter().any(|item| has_any_placeholder(item, keys)),
        Value::Object(map) => map.values().any(|v| has_any_placeholder(v, keys)),
        _ => false,
    }
}

/**
 * Apply substitute to every string leaf, preserving structure
 */
pub fn substitute_deep(node: &Value, values: &HashMap<String, String>) -> Value {
    match node {
        Value::String(s) => Value::String(substitute(s, values)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| substitute_deep(item, values)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_deep(v, values)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/**
 * Resolve the request body for one sample
 *
 * `url_had_placeholders` must reflect whether substituting the endpoint
 * template changed it
 */
pub fn resolve_body(
    body_template: Option<&Map<String, Value>>,
    fields: &Map<String, Value>,
    values: &HashMap<String, String>,
    url_had_placeholders: bool,
) -> (Map<String, Value>, BodyMode) {
    let keys: Vec<&String> = values.keys().collect();

    match body_template {
        None if url_had_placeholders => (Map::new(), BodyMode::LegacyEmpty),
        None => (fields.clone(), BodyMode::LegacyFieldMap),
        Some(template) => {
            if template.values().any(|v| has_any_placeholder(v, &keys)) {
                let body = template
                    .iter()
                    .map(|(k, v)| (k.clone(), substitute_deep(v, values)))
                    .collect();
                (body, BodyMode::Dynamic)
            } else {
                let mut merged = template.clone();
                for (key, value) in fields {
                    merged.insert(key.clone(), value.clone());
                }
                (merged, BodyMode::LegacyMerge)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::types::{FIELD_NAMES, LocationSample};
    use serde_json::json;

    fn sample() -> LocationSample {
        LocationSample::new(1.5, 2.5, 0.0, 5.0, 1_700_000_000_000)
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_substitute_replaces_all_occurrences() {
        let values = sample().placeholder_map();
        let out = substitute("https://x/%latitude%/%longitude%?again=%latitude%", &values);
        assert_eq!(out, "https://x/1.5/2.5?again=1.5");
    }

    #[test]
    fn test_substitute_leaves_unknown_tokens() {
        let values = sample().placeholder_map();
        assert_eq!(substitute("%altitude% at %speed%", &values), "%altitude% at 0");
        assert_eq!(substitute("100% sure", &values), "100% sure");
        assert_eq!(substitute("%%latitude%%", &values), "%1.5%");
    }

    #[test]
    fn test_substitute_is_idempotent() {
        let values = sample().placeholder_map();
        for template in [
            "https://x/%latitude%",
            "%timestamp%-%accuracy%-%unknown%",
            "no tokens at all",
            "%%speed%%",
        ] {
            let once = substitute(template, &values);
            assert_eq!(substitute(&once, &values), once, "template {}", template);
        }
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let mut values = HashMap::new();
        values.insert("latitude".to_string(), "%longitude%".to_string());
        values.insert("longitude".to_string(), "2.5".to_string());
        assert_eq!(substitute("%latitude%", &values), "%longitude%");
    }

    #[test]
    fn test_has_any_placeholder_recursive() {
        let node = json!({
            "device": "abc",
            "points": [1, { "label": "lat=%latitude%" }],
            "%speed%": "key tokens are ignored"
        });
        assert!(has_any_placeholder(&node, &FIELD_NAMES));

        let node = json!({ "device": "abc", "%speed%": 1, "note": "%altitude%" });
        assert!(!has_any_placeholder(&node, &FIELD_NAMES));
        assert!(!has_any_placeholder(&json!(42), &FIELD_NAMES));
    }

    #[test]
    fn test_has_any_placeholder_matches_substitution_change() {
        let values = sample().placeholder_map();
        let leaves = [
            json!("at %latitude%"),
            json!("plain"),
            json!("%unknown%"),
            json!(12.5),
            json!(null),
            json!("%timestamp%"),
        ];
        for leaf in leaves {
            let changed = substitute_deep(&leaf, &values) != leaf;
            assert_eq!(has_any_placeholder(&leaf, &FIELD_NAMES), changed, "leaf {}", leaf);
        }
    }

    #[test]
    fn test_substitute_deep_preserves_structure() {
        let values = sample().placeholder_map();
        let node = json!({
            "pos": ["%latitude%", "%longitude%"],
            "meta": { "ts": "%timestamp%", "count": 3, "ok": true, "none": null }
        });
        let out = substitute_deep(&node, &values);
        assert_eq!(
            out,
            json!({
                "pos": ["1.5", "2.5"],
                "meta": { "ts": "1700000000000", "count": 3, "ok": true, "none": null }
            })
        );
    }

    #[test]
    fn test_resolve_body_dynamic_mode() {
        let s = sample();
        let template = object(json!({ "msg": "at %latitude%,%longitude%" }));
        let (body, mode) = resolve_body(
            Some(&template),
            &s.to_field_map(),
            &s.placeholder_map(),
            false,
        );
        assert_eq!(mode, BodyMode::Dynamic);
        assert_eq!(Value::Object(body), json!({ "msg": "at 1.5,2.5" }));
    }

    #[test]
    fn test_resolve_body_legacy_merge() {
        let s = sample();
        let template = object(json!({ "device": "abc" }));
        let (body, mode) = resolve_body(
            Some(&template),
            &s.to_field_map(),
            &s.placeholder_map(),
            true,
        );
        assert_eq!(mode, BodyMode::LegacyMerge);
        assert_eq!(
            Value::Object(body),
            json!({
                "device": "abc",
                "latitude": 1.5,
                "longitude": 2.5,
                "speed": 0.0,
                "accuracy": 5.0,
                "timestamp": 1_700_000_000_000_i64
            })
        );
    }

    #[test]
    fn test_resolve_body_legacy_merge_field_map_wins() {
        let s = sample();
        let template = object(json!({ "latitude": "user", "device": "abc" }));
        let (body, _) = resolve_body(
            Some(&template),
            &s.to_field_map(),
            &s.placeholder_map(),
            false,
        );
        assert_eq!(body["latitude"], json!(1.5));
        assert_eq!(body["device"], json!("abc"));
    }

    #[test]
    fn test_resolve_body_without_template() {
        let s = sample();
        let fields = s.to_field_map();
        let values = s.placeholder_map();

        let (body, mode) = resolve_body(None, &fields, &values, true);
        assert_eq!(mode, BodyMode::LegacyEmpty);
        assert!(body.is_empty());

        let (body, mode) = resolve_body(None, &fields, &values, false);
        assert_eq!(mode, BodyMode::LegacyFieldMap);
        assert_eq!(body, fields);
    }

    #[test]
    fn test_resolve_body_unknown_tokens_stay_legacy() {
        let s = sample();
        let template = object(json!({ "note": "%altitude%" }));
        let (body, mode) = resolve_body(
            Some(&template),
            &s.to_field_map(),
            &s.placeholder_map(),
            false,
        );
        assert_eq!(mode, BodyMode::LegacyMerge);
        assert_eq!(body["note"], json!("%altitude%"));
        assert_eq!(body.len(), 6);
    }
}
