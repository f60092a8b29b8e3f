//! Mapping between [`Record`]s and stored documents.
//!
//! The identifier is stored once, as `_id`. It is stripped from the payload
//! on the way in and re-injected on the way out. Stored `_id`s that are not
//! strings surface as their string form; [`id_filter`] matches them again.

use chrono::{DateTime, Utc};
use docrest_data::{DataError, Record, ID_FIELD};
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use serde_json::{Map, Value};

use crate::query::{CREATED_FIELD, ETAG_FIELD, PRIMARY_KEY, TYPE_FIELD, UPDATED_FIELD};

/// Full storage document of a record.
pub(crate) fn to_document(record: &Record) -> Result<Document, DataError> {
    let mut doc = payload_document(record)?;
    doc.insert(PRIMARY_KEY, record.id.as_str());
    doc.insert(CREATED_FIELD, bson_time(record.created));
    stamp(&mut doc, record);
    Ok(doc)
}

/// Document for a full replace. `_id` is left out so the stored one, whatever
/// its BSON type, is kept.
pub(crate) fn to_replacement_document(record: &Record) -> Result<Document, DataError> {
    let mut doc = to_document(record)?;
    doc.remove(PRIMARY_KEY);
    Ok(doc)
}

/// Fields written by a partial update: payload and mutable metadata.
pub(crate) fn to_set_document(record: &Record) -> Result<Document, DataError> {
    let mut doc = payload_document(record)?;
    stamp(&mut doc, record);
    Ok(doc)
}

fn payload_document(record: &Record) -> Result<Document, DataError> {
    let mut doc = bson::to_document(&record.payload).map_err(DataError::database)?;
    for reserved in [ID_FIELD, PRIMARY_KEY, ETAG_FIELD, CREATED_FIELD, UPDATED_FIELD, TYPE_FIELD] {
        doc.remove(reserved);
    }
    Ok(doc)
}

/// `_id` condition matching a record identifier in any form it may be
/// stored as: the string itself, an ObjectId or an integer.
pub(crate) fn id_filter(id: &str) -> Bson {
    let mut candidates = vec![Bson::String(id.to_string())];
    if let Ok(oid) = ObjectId::parse_str(id) {
        candidates.push(Bson::ObjectId(oid));
    }
    if let Ok(n) = id.parse::<i64>() {
        candidates.push(Bson::Int64(n));
    }
    if candidates.len() == 1 {
        return candidates.remove(0);
    }
    Bson::Document(doc! { "$in": candidates })
}

fn stamp(doc: &mut Document, record: &Record) {
    doc.insert(ETAG_FIELD, record.etag.as_str());
    doc.insert(UPDATED_FIELD, bson_time(record.updated));
    doc.insert(TYPE_FIELD, record.kind.as_str());
}

/// Decode a stored document back into a record.
pub(crate) fn from_document(mut doc: Document) -> Result<Record, DataError> {
    let id = match doc.remove(PRIMARY_KEY) {
        Some(Bson::String(id)) => id,
        Some(Bson::ObjectId(oid)) => oid.to_hex(),
        Some(other) => other.into_relaxed_extjson().to_string(),
        None => return Err(decode_error("document has no _id")),
    };
    let etag = take_string(&mut doc, ETAG_FIELD);
    let kind = take_string(&mut doc, TYPE_FIELD);
    let created = take_time(&mut doc, CREATED_FIELD);
    let updated = take_time(&mut doc, UPDATED_FIELD);

    let mut payload = match Bson::Document(doc).into_relaxed_extjson() {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    payload.insert(ID_FIELD.to_string(), Value::String(id.clone()));

    Ok(Record {
        id,
        etag,
        created,
        updated,
        kind,
        payload,
    })
}

fn take_string(doc: &mut Document, key: &str) -> String {
    match doc.remove(key) {
        Some(Bson::String(s)) => s,
        _ => String::new(),
    }
}

fn take_time(doc: &mut Document, key: &str) -> DateTime<Utc> {
    match doc.remove(key) {
        Some(Bson::DateTime(dt)) => DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or_default(),
        _ => DateTime::default(),
    }
}

fn bson_time(time: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(time.timestamp_millis())
}

fn decode_error(message: &str) -> DataError {
    DataError::Database(message.into())
}
