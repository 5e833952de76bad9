use crate::models::{parse_item_schema, ItemFrontmatter, ItemRecord};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordFormatError {
    #[error("missing opening frontmatter delimiter")]
    MissingOpeningDelimiter,
    #[error("missing closing frontmatter delimiter")]
    MissingClosingDelimiter,
    #[error("invalid frontmatter: {0}")]
    InvalidFrontmatter(String),
    #[error("frontmatter must be a mapping")]
    NotAMapping,
    #[error("frontmatter does not match the item schema: {0}")]
    Schema(String),
}

/// Raw item file: untyped frontmatter plus markdown body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordDocument {
    pub frontmatter: Map<String, Value>,
    pub body: String,
}

impl RecordDocument {
    /// Schema version declared by the frontmatter; untagged records are version 1.
    pub fn schema_version(&self) -> Option<u32> {
        match self.frontmatter.get("schema") {
            None => Some(1),
            Some(Value::String(tag)) => parse_item_schema(tag),
            Some(_) => None,
        }
    }

    pub fn string_field(&self, field: &str) -> Option<&str> {
        self.frontmatter.get(field).and_then(Value::as_str)
    }
}

pub fn parse_document(content: &str) -> Result<RecordDocument, RecordFormatError> {
    let normalized = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    let Some(rest) = normalized.strip_prefix("---\n") else {
        return Err(RecordFormatError::MissingOpeningDelimiter);
    };
    let (frontmatter, body) = if let Some(body) = rest.strip_prefix("---\n") {
        ("", body)
    } else if let Some(split_at) = rest.find("\n---\n") {
        (&rest[..split_at], &rest[(split_at + 5)..])
    } else if let Some(frontmatter) = rest.strip_suffix("\n---") {
        (frontmatter, "")
    } else {
        return Err(RecordFormatError::MissingClosingDelimiter);
    };

    let metadata = if frontmatter.trim().is_empty() {
        Value::Object(Map::new())
    } else {
        match serde_json::from_str::<Value>(frontmatter) {
            Ok(value) => value,
            Err(_) => {
                let yaml_value: serde_yaml::Value = serde_yaml::from_str(frontmatter)
                    .map_err(|error| RecordFormatError::InvalidFrontmatter(error.to_string()))?;
                serde_json::to_value(yaml_value)
                    .map_err(|error| RecordFormatError::InvalidFrontmatter(error.to_string()))?
            }
        }
    };
    let Value::Object(frontmatter) = metadata else {
        return Err(RecordFormatError::NotAMapping);
    };

    Ok(RecordDocument {
        frontmatter,
        body: body.strip_prefix('\n').unwrap_or(body).to_string(),
    })
}

pub fn render_document(document: &RecordDocument) -> Result<String, RecordFormatError> {
    let yaml = serde_yaml::to_string(&Value::Object(document.frontmatter.clone()))
        .map_err(|error| RecordFormatError::InvalidFrontmatter(error.to_string()))?;
    if document.body.is_empty() {
        Ok(format!("---\n{}---\n", yaml))
    } else {
        Ok(format!("---\n{}---\n\n{}", yaml, document.body))
    }
}

pub fn decode_item(document: &RecordDocument) -> Result<ItemRecord, RecordFormatError> {
    let frontmatter: ItemFrontmatter = serde_json::from_value(Value::Object(document.frontmatter.clone()))
        .map_err(|error| RecordFormatError::Schema(error.to_string()))?;
    Ok(ItemRecord {
        frontmatter,
        body: document.body.clone(),
    })
}

pub fn encode_item(record: &ItemRecord) -> Result<RecordDocument, RecordFormatError> {
    let Value::Object(frontmatter) = serde_json::to_value(&record.frontmatter)
        .map_err(|error| RecordFormatError::Schema(error.to_string()))?
    else {
        return Err(RecordFormatError::NotAMapping);
    };
    Ok(RecordDocument {
        frontmatter,
        body: record.body.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemId, ItemKind};
    use crate::placement::Placement;
    use crate::rank::Rank;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn parses_yaml_frontmatter_and_body() {
        let document = parse_document("---\nkind: note\nplacement: 2025-01-15\n---\n\n# Title\nBody\n")
            .expect("parse");
        assert_eq!(document.string_field("kind"), Some("note"));
        assert_eq!(document.string_field("placement"), Some("2025-01-15"));
        assert_eq!(document.body, "# Title\nBody\n");
        assert_eq!(document.schema_version(), Some(1));
    }

    #[test]
    fn accepts_json_frontmatter_bom_and_crlf() {
        let document = parse_document("\u{feff}---\r\n{\"schema\": \"daybook.item.frontmatter/2\"}\r\n---\r\nbody")
            .expect("parse");
        assert_eq!(document.schema_version(), Some(2));
        assert_eq!(document.body, "body");
    }

    #[test]
    fn rejects_missing_delimiters_and_non_mappings() {
        assert_eq!(parse_document("kind: note\n"), Err(RecordFormatError::MissingOpeningDelimiter));
        assert_eq!(parse_document("---\nkind: note\n"), Err(RecordFormatError::MissingClosingDelimiter));
        assert_eq!(parse_document("---\n- a\n- b\n---\n"), Err(RecordFormatError::NotAMapping));
        assert!(matches!(
            parse_document("---\nkind: [unclosed\n---\n"),
            Err(RecordFormatError::InvalidFrontmatter(_))
        ));
    }

    #[test]
    fn foreign_schema_tags_have_no_version() {
        let document = RecordDocument {
            frontmatter: json!({"schema": "other.item.frontmatter/9"})
                .as_object()
                .cloned()
                .expect("object"),
            body: String::new(),
        };
        assert_eq!(document.schema_version(), None);
    }

    #[test]
    fn item_records_round_trip_through_text() {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).single().expect("instant");
        let mut record = ItemRecord::new(
            ItemId::generate(now),
            ItemKind::Task,
            Some("Buy milk".to_string()),
            Placement::parse("2025-01-15/1").expect("placement"),
            Rank::parse("0|hzzzzz:").expect("rank"),
            now,
        );
        record.body = "- whole milk\n".to_string();
        record.frontmatter.alias = Some("milk".to_string());
        record
            .frontmatter
            .extra
            .insert("status".to_string(), json!("open"));

        let text = render_document(&encode_item(&record).expect("encode")).expect("render");
        assert!(text.starts_with("---\n"));
        let decoded = decode_item(&parse_document(&text).expect("parse")).expect("decode");
        assert_eq!(decoded, record);
    }
}
