use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Name of the logical identifier field as seen by callers.
pub const ID_FIELD: &str = "id";

/// The persisted unit handed between the host and a storage backend.
///
/// `etag` is an opaque version tag: it changes on every successful mutation
/// and equality with the stored tag is the only optimistic-lock check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub etag: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// Type discriminator, for record kinds sharing one physical collection.
    pub kind: String,
    pub payload: Map<String, Value>,
}

impl Record {
    /// Create a record with a generated identifier and version tag.
    pub fn new(kind: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self::with_id(Uuid::new_v4().simple().to_string(), kind, payload)
    }

    /// Create a record with a caller-assigned identifier.
    pub fn with_id(id: impl Into<String>, kind: impl Into<String>, mut payload: Map<String, Value>) -> Self {
        let id = id.into();
        let now = Utc::now();
        payload.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        Self {
            id,
            etag: new_etag(),
            created: now,
            updated: now,
            kind: kind.into(),
            payload,
        }
    }

    /// Build the version of `self` to store in place of `original`.
    ///
    /// Identifier and creation time are immutable and come from `original`;
    /// the version tag and update time are renewed.
    pub fn revise(&self, original: &Record) -> Record {
        let mut payload = self.payload.clone();
        payload.insert(ID_FIELD.to_string(), Value::String(original.id.clone()));
        Record {
            id: original.id.clone(),
            etag: new_etag(),
            created: original.created,
            updated: Utc::now(),
            kind: self.kind.clone(),
            payload,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }
}

/// Generate a fresh opaque version tag.
pub fn new_etag() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn new_record_mirrors_id_into_payload() {
        let record = Record::new("book", payload(json!({"name": "X"})));
        assert_eq!(record.get("id"), Some(&Value::String(record.id.clone())));
        assert_eq!(record.created, record.updated);
        assert!(!record.etag.is_empty());
    }

    #[test]
    fn revise_keeps_identity_and_renews_tag() {
        let original = Record::with_id("abc", "book", payload(json!({"name": "X"})));
        let mut edited = original.clone();
        edited.id = "other".into();
        edited.payload.insert("name".into(), json!("Y"));

        let stored = edited.revise(&original);
        assert_eq!(stored.id, "abc");
        assert_eq!(stored.get("id"), Some(&json!("abc")));
        assert_eq!(stored.created, original.created);
        assert_ne!(stored.etag, original.etag);
        assert_eq!(stored.get("name"), Some(&json!("Y")));
    }
}
