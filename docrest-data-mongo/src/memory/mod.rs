//! In-process [`Connector`] that evaluates translated MongoDB documents
//! against collections held in a [`DashMap`].
//!
//! Meant for tests and local development: it enforces a unique `_id`,
//! stops an ordered bulk insert at the first duplicate and honours sort,
//! skip, limit and projection. Every connection operation is counted so
//! callers can assert whether a request reached the store.

pub mod filter;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use mongodb::bson::{Bson, Document};

use crate::backend::{Connection, Connector, DocumentCursor, FindSpec, Namespace, NativeError, SessionOptions};

#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    collections: Arc<DashMap<String, Vec<Document>>>,
    operations: Arc<AtomicUsize>,
    latency: Option<Duration>,
    document_latency: Option<Duration>,
    served: Arc<AtomicUsize>,
    failure: Arc<Mutex<Option<(usize, String)>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every connection operation by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Delay every document a cursor yields by `latency`.
    pub fn with_document_latency(mut self, latency: Duration) -> Self {
        self.document_latency = Some(latency);
        self
    }

    /// Number of operations that reached the store.
    pub fn operations(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    /// Number of documents cursors have handed out.
    pub fn documents_served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }

    /// Make the next operation fail with a driver error.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.fail_at(self.operations() + 1, message);
    }

    /// Make the `n`th operation since creation fail with a driver error.
    pub fn fail_at(&self, n: usize, message: impl Into<String>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some((n, message.into()));
        }
    }

    /// Raw stored documents of a namespace, in insertion order.
    pub fn documents(&self, namespace: &Namespace) -> Vec<Document> {
        self.collections
            .get(&namespace.to_string())
            .map(|docs| docs.clone())
            .unwrap_or_default()
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    fn open(&self, namespace: &Namespace, _options: &SessionOptions) -> Result<MemoryConnection, NativeError> {
        Ok(MemoryConnection {
            store: self.clone(),
            key: namespace.to_string(),
        })
    }
}

pub struct MemoryConnection {
    store: MemoryConnector,
    key: String,
}

impl MemoryConnection {
    async fn enter(&self) -> Result<(), NativeError> {
        let n = self.store.operations.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(latency) = self.store.latency {
            tokio::time::sleep(latency).await;
        }
        let injected = self.store.failure.lock().ok().and_then(|mut failure| match failure.take() {
            Some((at, message)) if at == n => Some(message),
            pending => {
                *failure = pending;
                None
            }
        });
        match injected {
            Some(message) => Err(NativeError::Driver(message.into())),
            None => Ok(()),
        }
    }

    /// Index of the first document matching `filter`.
    fn position(docs: &[Document], filter: &Document) -> Result<Option<usize>, NativeError> {
        for (i, doc) in docs.iter().enumerate() {
            if filter::matches(doc, filter)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }
}

impl Connection for MemoryConnection {
    type Cursor = MemoryCursor;

    async fn insert_many(&self, docs: Vec<Document>) -> Result<(), NativeError> {
        self.enter().await?;
        let mut stored = self.store.collections.entry(self.key.clone()).or_default();
        for doc in docs {
            let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
            if stored.iter().any(|existing| existing.get("_id") == Some(&id)) {
                return Err(NativeError::DuplicateKey(format!(
                    "E11000 duplicate key error collection: {} index: _id_ dup key: {{ _id: {id} }}",
                    self.key
                )));
            }
            stored.push(doc);
        }
        Ok(())
    }

    async fn replace_one(&self, filter: Document, mut replacement: Document) -> Result<u64, NativeError> {
        self.enter().await?;
        let Some(mut stored) = self.store.collections.get_mut(&self.key) else {
            return Ok(0);
        };
        let Some(i) = Self::position(&stored, &filter)? else {
            return Ok(0);
        };
        if let Some(id) = stored[i].get("_id").cloned() {
            replacement.insert("_id", id);
        }
        stored[i] = replacement;
        Ok(1)
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<u64, NativeError> {
        self.enter().await?;
        let mut fields = Document::new();
        for (op, value) in update {
            match (op.as_str(), value) {
                ("$set", Bson::Document(set)) => {
                    for (key, value) in set {
                        fields.insert(key, value);
                    }
                }
                (other, _) => {
                    return Err(NativeError::Driver(format!("unsupported update operator: {other}").into()));
                }
            }
        }
        let Some(mut stored) = self.store.collections.get_mut(&self.key) else {
            return Ok(0);
        };
        let Some(i) = Self::position(&stored, &filter)? else {
            return Ok(0);
        };
        for (key, value) in fields {
            stored[i].insert(key, value);
        }
        Ok(1)
    }

    async fn delete_one(&self, filter: Document) -> Result<u64, NativeError> {
        self.enter().await?;
        let Some(mut stored) = self.store.collections.get_mut(&self.key) else {
            return Ok(0);
        };
        match Self::position(&stored, &filter)? {
            Some(i) => {
                stored.remove(i);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(&self, filter: Document) -> Result<u64, NativeError> {
        self.enter().await?;
        let Some(mut stored) = self.store.collections.get_mut(&self.key) else {
            return Ok(0);
        };
        let mut doomed = Vec::new();
        for doc in stored.iter() {
            doomed.push(filter::matches(doc, &filter)?);
        }
        let mut flags = doomed.iter();
        stored.retain(|_| !flags.next().copied().unwrap_or(false));
        Ok(doomed.iter().filter(|d| **d).count() as u64)
    }

    async fn find(&self, filter: Document, spec: FindSpec) -> Result<MemoryCursor, NativeError> {
        self.enter().await?;
        let mut docs = Vec::new();
        if let Some(stored) = self.store.collections.get(&self.key) {
            for doc in stored.iter() {
                if filter::matches(doc, &filter)? {
                    docs.push(doc.clone());
                }
            }
        }
        filter::sort(&mut docs, &spec.sort);
        let skip = usize::try_from(spec.skip).unwrap_or(usize::MAX);
        let limit = spec
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
        let docs = docs
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| match &spec.projection {
                Some(projection) => filter::project(&doc, projection),
                None => doc,
            })
            .collect();
        Ok(MemoryCursor {
            docs,
            latency: self.store.document_latency,
            served: Arc::clone(&self.store.served),
        })
    }

    async fn count(&self, filter: Document, _max_time: Option<Duration>) -> Result<u64, NativeError> {
        self.enter().await?;
        let Some(stored) = self.store.collections.get(&self.key) else {
            return Ok(0);
        };
        let mut n = 0;
        for doc in stored.iter() {
            if filter::matches(doc, &filter)? {
                n += 1;
            }
        }
        Ok(n)
    }
}

pub struct MemoryCursor {
    docs: VecDeque<Document>,
    latency: Option<Duration>,
    served: Arc<AtomicUsize>,
}

impl DocumentCursor for MemoryCursor {
    async fn next_document(&mut self) -> Result<Option<Document>, NativeError> {
        if self.docs.is_empty() {
            return Ok(None);
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let next = self.docs.pop_front();
        if next.is_some() {
            self.served.fetch_add(1, Ordering::SeqCst);
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn connection(connector: &MemoryConnector) -> MemoryConnection {
        connector
            .open(&Namespace::new("db", "items"), &SessionOptions::default())
            .unwrap()
    }

    #[tokio::test]
    async fn ordered_insert_stops_at_first_duplicate() {
        let connector = MemoryConnector::new();
        let conn = connection(&connector);
        conn.insert_many(vec![doc! { "_id": "a" }]).await.unwrap();

        let err = conn
            .insert_many(vec![doc! { "_id": "b" }, doc! { "_id": "a" }, doc! { "_id": "c" }])
            .await
            .unwrap_err();
        assert!(matches!(err, NativeError::DuplicateKey(_)));

        let ids: Vec<_> = connector
            .documents(&Namespace::new("db", "items"))
            .iter()
            .map(|d| d.get_str("_id").unwrap().to_string())
            .collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(connector.operations(), 2);
    }

    #[tokio::test]
    async fn set_merges_fields() {
        let connector = MemoryConnector::new();
        let conn = connection(&connector);
        conn.insert_many(vec![doc! { "_id": "a", "x": 1, "y": 1 }]).await.unwrap();
        let matched = conn
            .update_one(doc! { "_id": "a" }, doc! { "$set": { "y": 2 } })
            .await
            .unwrap();
        assert_eq!(matched, 1);
        let stored = &connector.documents(&Namespace::new("db", "items"))[0];
        assert_eq!(stored, &doc! { "_id": "a", "x": 1, "y": 2 });
    }

    #[tokio::test]
    async fn find_applies_window_after_sort() {
        let connector = MemoryConnector::new();
        let conn = connection(&connector);
        conn.insert_many((1..=5).map(|n| doc! { "_id": format!("{n}"), "n": 6 - n }).collect())
            .await
            .unwrap();
        let spec = FindSpec {
            sort: doc! { "n": 1 },
            skip: 1,
            limit: Some(2),
            ..FindSpec::default()
        };
        let mut cursor = conn.find(doc! {}, spec).await.unwrap();
        let mut ns = Vec::new();
        while let Some(doc) = cursor.next_document().await.unwrap() {
            ns.push(doc.get_i32("n").unwrap());
        }
        assert_eq!(ns, [2, 3]);
    }

    #[tokio::test]
    async fn injected_failure_hits_once() {
        let connector = MemoryConnector::new();
        let conn = connection(&connector);
        connector.fail_next("boom");
        assert!(matches!(conn.count(doc! {}, None).await, Err(NativeError::Driver(_))));
        assert_eq!(conn.count(doc! {}, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn scheduled_failure_waits_for_its_turn() {
        let connector = MemoryConnector::new();
        let conn = connection(&connector);
        connector.fail_at(3, "boom");
        assert!(conn.count(doc! {}, None).await.is_ok());
        assert!(conn.count(doc! {}, None).await.is_ok());
        assert!(matches!(conn.count(doc! {}, None).await, Err(NativeError::Driver(_))));
        assert!(conn.count(doc! {}, None).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cursor_paces_documents() {
        let connector = MemoryConnector::new().with_document_latency(Duration::from_millis(10));
        let conn = connection(&connector);
        conn.insert_many(vec![doc! { "_id": "a" }, doc! { "_id": "b" }]).await.unwrap();

        let start = tokio::time::Instant::now();
        let mut cursor = conn.find(doc! {}, FindSpec::default()).await.unwrap();
        while cursor.next_document().await.unwrap().is_some() {}
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(connector.documents_served(), 2);
    }
}
