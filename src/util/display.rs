use serde_json::{Map, Value};

use crate::model::issue::FieldValue;

/// Keys probed, in order, when turning an option or reference into text.
const DISPLAY_KEYS: [&str; 5] = ["displayName", "name", "value", "emailAddress", "text"];

/// Render any raw field value as a single display string. Never fails.
pub fn normalize(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => String::new(),
        FieldValue::Text(s) => s.clone(),
        FieldValue::Number(n) => n.to_string(),
        FieldValue::StructuredOption(map) | FieldValue::Reference(map) => pick_display(map),
        FieldValue::List(items) => items.iter().map(normalize).collect::<Vec<_>>().join(", "),
    }
}

/// Same as [`normalize`] for values still in JSON form.
pub fn normalize_json(value: &Value) -> String {
    normalize(&FieldValue::from(value.clone()))
}

pub fn normalize_opt(value: Option<&FieldValue>) -> String {
    value.map(normalize).unwrap_or_default()
}

fn pick_display(map: &Map<String, Value>) -> String {
    DISPLAY_KEYS
        .iter()
        .filter_map(|key| map.get(*key))
        .map(normalize_json)
        .find(|text| !text.is_empty())
        .unwrap_or_else(|| Value::Object(map.clone()).to_string())
}

/// Shortens `text` to at most `limit` characters, marking the cut with `…`.
pub fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn norm(value: Value) -> String {
        normalize(&FieldValue::from(value))
    }

    #[test]
    fn null_is_empty() {
        assert_eq!(norm(Value::Null), "");
        assert_eq!(normalize_opt(None), "");
    }

    #[test]
    fn scalars_are_stringified() {
        assert_eq!(norm(json!("Rua A, 10")), "Rua A, 10");
        assert_eq!(norm(json!(42)), "42");
        assert_eq!(norm(json!(1.5)), "1.5");
        assert_eq!(norm(json!(false)), "false");
    }

    #[test]
    fn display_name_wins_over_other_keys() {
        let value = json!({
            "name": "ana.s",
            "value": "v",
            "emailAddress": "ana@example.com",
            "displayName": "Ana Souza"
        });
        assert_eq!(norm(value), "Ana Souza");
    }

    #[test]
    fn option_uses_value_when_no_names() {
        assert_eq!(norm(json!({"id": "1", "value": "SP"})), "SP");
    }

    #[test]
    fn empty_preferred_keys_are_skipped() {
        assert_eq!(
            norm(json!({"displayName": "", "emailAddress": "x@example.com"})),
            "x@example.com"
        );
    }

    #[test]
    fn unknown_object_is_stringified() {
        assert_eq!(norm(json!({"id": "7"})), r#"{"id":"7"}"#);
    }

    #[test]
    fn lists_join_with_comma_space() {
        let value = json!([{"value": "A"}, "B", 3, [{"name": "C"}]]);
        assert_eq!(norm(value), "A, B, 3, C");
        assert_eq!(norm(json!([])), "");
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("abcdef", 10), "abcdef");
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(truncate("çãõéíú", 3), "çã…");
    }
}
