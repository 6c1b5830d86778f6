//! Firestore REST API types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Firestore document value types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(String), // Firestore sends integers as strings
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
}

/// Firestore document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub fields: Option<HashMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl Document {
    /// Create a new document with the given fields.
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self {
            name: None,
            fields: Some(fields),
            create_time: None,
            update_time: None,
        }
    }

    /// Typed field lookup; missing and mistyped fields both yield `None`.
    pub fn get<T: FromFirestoreValue>(&self, key: &str) -> Option<T> {
        self.fields
            .as_ref()
            .and_then(|f| f.get(key))
            .and_then(T::from_firestore_value)
    }
}

/// Convert a Rust value to Firestore Value.
pub trait ToFirestoreValue {
    fn to_firestore_value(&self) -> Value;
}

impl ToFirestoreValue for String {
    fn to_firestore_value(&self) -> Value {
        Value::StringValue(self.clone())
    }
}

impl ToFirestoreValue for &str {
    fn to_firestore_value(&self) -> Value {
        Value::StringValue(self.to_string())
    }
}

impl ToFirestoreValue for DateTime<Utc> {
    fn to_firestore_value(&self) -> Value {
        Value::TimestampValue(self.to_rfc3339())
    }
}

impl<T: ToFirestoreValue> ToFirestoreValue for Option<T> {
    fn to_firestore_value(&self) -> Value {
        match self {
            Some(v) => v.to_firestore_value(),
            None => Value::NullValue(()),
        }
    }
}

/// Convert Firestore Value to Rust type.
pub trait FromFirestoreValue: Sized {
    fn from_firestore_value(value: &Value) -> Option<Self>;
}

impl FromFirestoreValue for String {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::StringValue(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromFirestoreValue for DateTime<Utc> {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::TimestampValue(s) => DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.into()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_wire_format() {
        let v = "queued".to_firestore_value();
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            serde_json::json!({"stringValue": "queued"})
        );

        let none: Option<String> = None;
        assert_eq!(
            serde_json::to_value(none.to_firestore_value()).unwrap(),
            serde_json::json!({"nullValue": null})
        );
    }

    #[test]
    fn test_document_typed_get() {
        let doc: Document = serde_json::from_value(serde_json::json!({
            "name": "projects/p/databases/d/documents/tasks/1",
            "fields": {
                "status": {"stringValue": "completed"},
                "created_at": {"timestampValue": "2024-05-01T10:00:00Z"},
                "error_message": {"nullValue": null}
            }
        }))
        .unwrap();

        assert_eq!(doc.get::<String>("status").as_deref(), Some("completed"));
        assert!(doc.get::<DateTime<Utc>>("created_at").is_some());
        assert_eq!(doc.get::<String>("error_message"), None);
        assert_eq!(doc.get::<String>("missing"), None);
    }
}
