//! The seam between the [`Handler`](crate::Handler) and a document store.
//!
//! A [`Connector`] opens a [`Connection`] scoped to one namespace for the
//! duration of one operation. [`MongoConnector`](crate::MongoConnector)
//! talks to a real server; [`MemoryConnector`](crate::MemoryConnector)
//! evaluates the same documents in process.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use docrest_data::DataError;
use mongodb::bson::Document;

/// Database + collection a handler is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Settings applied to a connection for one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Time budget of the operation, from the caller's deadline.
    pub timeout: Option<Duration>,
    /// Wait for the server to acknowledge writes.
    pub acknowledged: bool,
}

/// Everything a find needs besides the filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    pub sort: Document,
    pub projection: Option<Document>,
    pub skip: u64,
    pub limit: Option<u64>,
    /// Server-side execution budget.
    pub max_time: Option<Duration>,
}

/// Errors reported by a store.
#[derive(Debug, thiserror::Error)]
pub enum NativeError {
    /// A write violated the unique primary key.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error(transparent)]
    Driver(Box<dyn std::error::Error + Send + Sync>),
}

/// Native errors pass through unmapped; callers that own a mapping (insert
/// duplicate keys) apply it before converting.
impl From<NativeError> for DataError {
    fn from(err: NativeError) -> Self {
        DataError::database(err)
    }
}

pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    fn open(&self, namespace: &Namespace, options: &SessionOptions) -> Result<Self::Connection, NativeError>;
}

/// Operations of one leased connection. Write methods return the number of
/// documents the filter matched (or removed).
pub trait Connection: Send + Sync {
    type Cursor: DocumentCursor;

    fn insert_many(&self, docs: Vec<Document>) -> impl Future<Output = Result<(), NativeError>> + Send;

    fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
    ) -> impl Future<Output = Result<u64, NativeError>> + Send;

    fn update_one(&self, filter: Document, update: Document) -> impl Future<Output = Result<u64, NativeError>> + Send;

    fn delete_one(&self, filter: Document) -> impl Future<Output = Result<u64, NativeError>> + Send;

    fn delete_many(&self, filter: Document) -> impl Future<Output = Result<u64, NativeError>> + Send;

    fn find(&self, filter: Document, spec: FindSpec) -> impl Future<Output = Result<Self::Cursor, NativeError>> + Send;

    fn count(
        &self,
        filter: Document,
        max_time: Option<Duration>,
    ) -> impl Future<Output = Result<u64, NativeError>> + Send;
}

/// Stream of documents; dropping it closes the server-side cursor.
pub trait DocumentCursor: Send {
    fn next_document(&mut self) -> impl Future<Output = Result<Option<Document>, NativeError>> + Send;
}
