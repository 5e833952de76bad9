use crate::models::ItemKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Version 1 item frontmatter: the bucket is split over `date`/`parent`/`section`
/// and the order lives in `sort_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordV1 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub kind: ItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub section: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Version 2 item frontmatter: one `placement` string and a `rank`, with
/// `project`/`contexts` still holding alias strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordV2 {
    pub schema: String,
    pub id: String,
    pub kind: ItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub placement: String,
    pub rank: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RecordV2 {
    /// Reference tokens in field order: `project` first, then `contexts`.
    pub fn references(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.project
            .iter()
            .map(|token| ("project", token.as_str()))
            .chain(self.contexts.iter().map(|token| ("contexts", token.as_str())))
    }
}

pub fn from_frontmatter<T: for<'de> Deserialize<'de>>(frontmatter: &Map<String, Value>) -> Result<T, String> {
    serde_json::from_value(Value::Object(frontmatter.clone())).map_err(|error| error.to_string())
}

pub fn to_frontmatter<T: Serialize>(record: &T) -> Result<Map<String, Value>, String> {
    match serde_json::to_value(record).map_err(|error| error.to_string())? {
        Value::Object(map) => Ok(map),
        _ => Err("record did not serialize to a mapping".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn v1_keeps_unknown_fields() {
        let map = json!({
            "kind": "task",
            "date": "2025-01-15",
            "section": [1, 2],
            "sort_key": "0|hzzzzz:",
            "status": "open"
        });
        let record: RecordV1 = from_frontmatter(map.as_object().expect("object")).expect("v1");
        assert_eq!(record.kind, ItemKind::Task);
        assert_eq!(record.section, vec![json!(1), json!(2)]);
        assert_eq!(record.extra.get("status"), Some(&json!("open")));
        let back = to_frontmatter(&record).expect("encode");
        assert_eq!(back.get("status"), Some(&json!("open")));
        assert!(!back.contains_key("parent"));
    }

    #[test]
    fn v2_references_list_project_then_contexts() {
        let map = json!({
            "schema": "daybook.item.frontmatter/2",
            "id": "0194a0b4-6c00-7000-8000-000000000000",
            "kind": "note",
            "placement": "permanent",
            "rank": "0|hzzzzz:",
            "project": "home",
            "contexts": ["errands", "phone"],
            "created_at": "2025-01-15T08:00:00Z",
            "updated_at": "2025-01-15T08:00:00Z"
        });
        let record: RecordV2 = from_frontmatter(map.as_object().expect("object")).expect("v2");
        let references: Vec<(&str, &str)> = record.references().collect();
        assert_eq!(
            references,
            vec![("project", "home"), ("contexts", "errands"), ("contexts", "phone")]
        );
    }
}
