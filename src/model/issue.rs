use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Number, Value};

/// A raw field value as returned by the tracker, closed over the shapes the
/// briefing code knows how to display.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum FieldValue {
    Null,
    Text(String),
    Number(Number),
    /// Select-list style option (`{"value": "..", "id": ".."}` and friends).
    StructuredOption(Map<String, Value>),
    /// Pointer to another entity: users, projects, linked issues.
    Reference(Map<String, Value>),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

fn looks_like_reference(map: &Map<String, Value>) -> bool {
    if map.contains_key("value") {
        return false;
    }
    map.contains_key("accountId") || map.contains_key("key") || map.contains_key("self")
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(flag) => FieldValue::Text(flag.to_string()),
            Value::Number(n) => FieldValue::Number(n),
            Value::String(s) => FieldValue::Text(s),
            Value::Array(items) => {
                FieldValue::List(items.into_iter().map(FieldValue::from).collect())
            }
            Value::Object(map) if looks_like_reference(&map) => FieldValue::Reference(map),
            Value::Object(map) => FieldValue::StructuredOption(map),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// One ticket as fetched from the tracker: its key plus the raw field map.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Issue {
    pub key: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Issue {
    #[cfg(test)]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
        }
    }

    #[cfg(test)]
    pub fn with_field(mut self, id: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(id.into(), value.into());
        self
    }

    /// Missing fields and explicit nulls are both reported as `None`.
    pub fn field(&self, id: &str) -> Option<&FieldValue> {
        self.fields.get(id).filter(|v| !v.is_null())
    }

    pub fn created(&self) -> Option<&str> {
        match self.field("created") {
            Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn summary(&self) -> Option<&str> {
        match self.field("summary") {
            Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn project_name(&self) -> Option<&str> {
        match self.field("project") {
            Some(FieldValue::Reference(map)) | Some(FieldValue::StructuredOption(map)) => {
                map.get("name").and_then(|v| v.as_str())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn option_objects_are_structured_options() {
        let value = FieldValue::from(json!({"id": "10021", "value": "Store 12"}));
        assert!(matches!(value, FieldValue::StructuredOption(_)));
    }

    #[test]
    fn user_objects_are_references() {
        let value = FieldValue::from(json!({"accountId": "abc", "displayName": "Ana"}));
        assert!(matches!(value, FieldValue::Reference(_)));
    }

    #[test]
    fn booleans_become_text() {
        assert_eq!(FieldValue::from(json!(true)), FieldValue::Text("true".into()));
    }

    #[test]
    fn deserializes_issue_payload() {
        let issue: Issue = serde_json::from_value(json!({
            "id": "10001",
            "key": "FS-8877",
            "fields": {
                "summary": "Replace router",
                "created": "2024-01-01T00:00:00.000-0300",
                "customfield_14954": {"value": "Loja 7"},
                "labels": ["a", "b"],
                "customfield_1": null,
                "project": {"key": "FS", "name": "Field Service"}
            }
        }))
        .unwrap();

        assert_eq!(issue.key, "FS-8877");
        assert_eq!(issue.summary(), Some("Replace router"));
        assert_eq!(issue.created(), Some("2024-01-01T00:00:00.000-0300"));
        assert_eq!(issue.project_name(), Some("Field Service"));
        assert!(issue.field("customfield_1").is_none());
        assert!(matches!(
            issue.field("labels"),
            Some(FieldValue::List(items)) if items.len() == 2
        ));
    }

    #[test]
    fn issue_without_fields_deserializes() {
        let issue: Issue = serde_json::from_value(json!({"key": "FS-1"})).unwrap();
        assert!(issue.fields.is_empty());
    }
}
