//! Document model shared by the pipeline, the event bus and every backend.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::ServiceError;

/// Free-form options passed to `create_index` and `search`.
pub type Options = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Numeric,
    Date,
    Boolean,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::Text => "text",
            FieldType::Numeric => "numeric",
            FieldType::Date => "date",
            FieldType::Boolean => "boolean",
        };
        f.write_str(s)
    }
}

/// A scalar or a sequence of scalars.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Numeric(f64),
    Date(DateTime<Utc>),
    Boolean(bool),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Whether the value (every element, for lists) fits the declared type.
    pub fn conforms_to(&self, field_type: FieldType) -> bool {
        match (self, field_type) {
            (FieldValue::Text(_), FieldType::Text)
            | (FieldValue::Numeric(_), FieldType::Numeric)
            | (FieldValue::Date(_), FieldType::Date)
            | (FieldValue::Boolean(_), FieldType::Boolean) => true,
            (FieldValue::List(items), ty) => items.iter().all(|v| !matches!(v, FieldValue::List(_)) && v.conforms_to(ty)),
            _ => false,
        }
    }

    /// Converts a raw JSON value into a typed value.
    ///
    /// Strings are parsed for non-text types (`"42"`, `"true"`, RFC 3339 or
    /// `YYYY-MM-DD` dates); integers are accepted as unix seconds for dates.
    pub fn from_json(value: &Value, field_type: FieldType) -> Result<Self, String> {
        if let Value::Array(items) = value {
            let converted = items
                .iter()
                .map(|v| match v {
                    Value::Array(_) => Err("nested sequences are not supported".to_string()),
                    other => Self::from_json(other, field_type),
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(FieldValue::List(converted));
        }
        match field_type {
            FieldType::Text => match value {
                Value::String(s) => Ok(FieldValue::Text(s.clone())),
                Value::Number(n) => Ok(FieldValue::Text(n.to_string())),
                Value::Bool(b) => Ok(FieldValue::Text(b.to_string())),
                other => Err(format!("expected text, got {other}")),
            },
            FieldType::Numeric => match value {
                Value::Number(n) => n.as_f64().map(FieldValue::Numeric).ok_or_else(|| format!("number {n} out of range")),
                Value::String(s) => s.trim().parse::<f64>().map(FieldValue::Numeric).map_err(|_| format!("'{s}' is not numeric")),
                other => Err(format!("expected numeric, got {other}")),
            },
            FieldType::Boolean => match value {
                Value::Bool(b) => Ok(FieldValue::Boolean(*b)),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => Ok(FieldValue::Boolean(true)),
                    "false" | "0" | "no" => Ok(FieldValue::Boolean(false)),
                    _ => Err(format!("'{s}' is not a boolean")),
                },
                other => Err(format!("expected boolean, got {other}")),
            },
            FieldType::Date => match value {
                Value::String(s) => parse_date(s).ok_or_else(|| format!("'{s}' is not a date")).map(FieldValue::Date),
                Value::Number(n) => n
                    .as_i64()
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                    .map(FieldValue::Date)
                    .ok_or_else(|| format!("{n} is not a unix timestamp")),
                other => Err(format!("expected date, got {other}")),
            },
        }
    }

    /// Plain-text rendering used by text backends and log lines.
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Numeric(n) => n.to_string(),
            FieldValue::Date(d) => d.to_rfc3339(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::List(items) => items.iter().map(FieldValue::to_text).collect::<Vec<_>>().join(" "),
        }
    }
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Numeric(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(d: DateTime<Utc>) -> Self {
        FieldValue::Date(d)
    }
}

/// One named, typed value within an [`IndexDocument`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub value: FieldValue,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType, value: impl Into<FieldValue>) -> Self {
        Self { name: name.into(), field_type, value: value.into() }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text, FieldValue::Text(value.into()))
    }

    pub fn is_valid(&self) -> bool {
        self.value.conforms_to(self.field_type)
    }
}

/// Declared name and type of a collection field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self { name: name.into(), field_type }
    }
}

/// A raw item as yielded by a collection before it is turned into a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceItem {
    pub id: String,
    pub data: serde_json::Map<String, Value>,
}

impl SourceItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), data: serde_json::Map::new() }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// The structured record submitted to a search backend.
///
/// Fields keep insertion order and names are unique. `boost` defaults to 1.0.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IndexDocument {
    id: String,
    fields: Vec<Field>,
    boost: f32,
}

impl IndexDocument {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), fields: Vec::new(), boost: 1.0 }
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn boost(&self) -> f32 {
        self.boost
    }

    pub fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    /// Appends a field; rejects duplicates and values that do not match the type.
    pub fn add_field(&mut self, field: Field) -> Result<(), ServiceError> {
        if self.field(&field.name).is_some() {
            return Err(ServiceError::invalid_document(&self.id, format!("duplicate field '{}'", field.name)));
        }
        if !field.is_valid() {
            return Err(ServiceError::invalid_document(
                &self.id,
                format!("field '{}' does not hold a {} value", field.name, field.field_type),
            ));
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn with_field(mut self, field: Field) -> Result<Self, ServiceError> {
        self.add_field(field)?;
        Ok(self)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Replaces the value of an existing field, keeping its position and type.
    pub fn set_value(&mut self, name: &str, value: FieldValue) -> Result<(), ServiceError> {
        let id = &self.id;
        let field = self
            .fields
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| ServiceError::invalid_document(id, format!("unknown field '{name}'")))?;
        if !value.conforms_to(field.field_type) {
            return Err(ServiceError::invalid_document(
                id,
                format!("field '{name}' does not hold a {} value", field.field_type),
            ));
        }
        field.value = value;
        Ok(())
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One hit returned by a backend. Higher `score` is better.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub collection: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_parses_strings_for_typed_fields() {
        assert_eq!(FieldValue::from_json(&json!("42.5"), FieldType::Numeric), Ok(FieldValue::Numeric(42.5)));
        assert_eq!(FieldValue::from_json(&json!("yes"), FieldType::Boolean), Ok(FieldValue::Boolean(true)));
        let d = FieldValue::from_json(&json!("2024-03-01"), FieldType::Date).expect("date");
        assert_eq!(d.to_text(), "2024-03-01T00:00:00+00:00");
        assert!(FieldValue::from_json(&json!({"a": 1}), FieldType::Text).is_err());
        assert!(FieldValue::from_json(&json!([[1]]), FieldType::Numeric).is_err());
    }

    #[test]
    fn list_values_conform_elementwise() {
        let v = FieldValue::from_json(&json!(["a", "b"]), FieldType::Text).expect("list");
        assert!(v.conforms_to(FieldType::Text));
        let mixed = FieldValue::List(vec![FieldValue::Text("a".into()), FieldValue::Numeric(1.0)]);
        assert!(!mixed.conforms_to(FieldType::Text));
    }

    #[test]
    fn document_rejects_duplicate_and_mistyped_fields() {
        let mut doc = IndexDocument::new("d1");
        doc.add_field(Field::text("name", "apple")).expect("first");
        assert!(matches!(doc.add_field(Field::text("name", "pear")), Err(ServiceError::InvalidDocument { .. })));
        assert!(doc.add_field(Field::new("price", FieldType::Numeric, "cheap")).is_err());
        assert!(doc.set_value("name", FieldValue::Numeric(1.0)).is_err());
        doc.set_value("name", "APPLE".into()).expect("same type");
        assert_eq!(doc.field("name").map(|f| f.value.clone()), Some(FieldValue::Text("APPLE".into())));
        assert_eq!(doc.boost(), 1.0);
    }
}
