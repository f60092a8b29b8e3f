//! [`Connector`] backed by the official MongoDB driver.

use std::time::Duration;

use docrest_data::DataError;
use futures_util::TryStreamExt;
use mongodb::bson::Document;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{Acknowledgment, ClientOptions, CollectionOptions, CountOptions, FindOptions, WriteConcern};
use mongodb::{Client, Collection, Cursor};

use crate::backend::{Connection, Connector, DocumentCursor, FindSpec, Namespace, NativeError, SessionOptions};
use crate::config::MongoConfig;
use crate::handler::Handler;

const DUPLICATE_KEY: i32 = 11000;

/// Shares one driver client (and its connection pool) between leases.
#[derive(Debug, Clone)]
pub struct MongoConnector {
    client: Client,
}

impl MongoConnector {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the configuration. No round trip is made; the
    /// driver connects lazily on first use.
    pub async fn connect(config: &MongoConfig) -> Result<Self, DataError> {
        let mut options = ClientOptions::parse(&config.uri).await.map_err(DataError::database)?;
        options.max_pool_size = Some(config.pool_size);
        if let Some(timeout) = config.connect_timeout() {
            options.connect_timeout = Some(timeout);
        }
        if let Some(name) = &config.app_name {
            options.app_name = Some(name.clone());
        }
        let client = Client::with_options(options).map_err(DataError::database)?;
        tracing::info!(database = %config.database, collection = %config.collection, pool_size = config.pool_size, "MongoDB client ready");
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Connector for MongoConnector {
    type Connection = MongoConnection;

    fn open(&self, namespace: &Namespace, options: &SessionOptions) -> Result<MongoConnection, NativeError> {
        let mut write_concern = WriteConcern::default();
        if options.acknowledged {
            write_concern.w = Some(Acknowledgment::Nodes(1));
        }
        write_concern.w_timeout = options.timeout;

        let mut collection_options = CollectionOptions::default();
        collection_options.write_concern = Some(write_concern);

        let collection = self
            .client
            .database(&namespace.database)
            .collection_with_options::<Document>(&namespace.collection, collection_options);
        Ok(MongoConnection {
            collection,
            timeout: options.timeout,
        })
    }
}

pub struct MongoConnection {
    collection: Collection<Document>,
    timeout: Option<Duration>,
}

impl Connection for MongoConnection {
    type Cursor = MongoCursor;

    async fn insert_many(&self, docs: Vec<Document>) -> Result<(), NativeError> {
        self.collection.insert_many(docs).await?;
        Ok(())
    }

    async fn replace_one(&self, filter: Document, replacement: Document) -> Result<u64, NativeError> {
        let res = self.collection.replace_one(filter, replacement).await?;
        Ok(res.matched_count)
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<u64, NativeError> {
        let res = self.collection.update_one(filter, update).await?;
        Ok(res.matched_count)
    }

    async fn delete_one(&self, filter: Document) -> Result<u64, NativeError> {
        let res = self.collection.delete_one(filter).await?;
        Ok(res.deleted_count)
    }

    async fn delete_many(&self, filter: Document) -> Result<u64, NativeError> {
        let res = self.collection.delete_many(filter).await?;
        Ok(res.deleted_count)
    }

    async fn find(&self, filter: Document, spec: FindSpec) -> Result<MongoCursor, NativeError> {
        let mut options = FindOptions::default();
        options.sort = Some(spec.sort);
        options.projection = spec.projection;
        options.skip = (spec.skip > 0).then_some(spec.skip);
        options.limit = spec.limit.map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));
        options.max_time = spec.max_time.or(self.timeout);
        let cursor = self.collection.find(filter).with_options(options).await?;
        Ok(MongoCursor(cursor))
    }

    async fn count(&self, filter: Document, max_time: Option<Duration>) -> Result<u64, NativeError> {
        let mut options = CountOptions::default();
        options.max_time = max_time.or(self.timeout);
        Ok(self.collection.count_documents(filter).with_options(options).await?)
    }
}

pub struct MongoCursor(Cursor<Document>);

impl DocumentCursor for MongoCursor {
    async fn next_document(&mut self) -> Result<Option<Document>, NativeError> {
        Ok(self.0.try_next().await?)
    }
}

impl From<mongodb::error::Error> for NativeError {
    fn from(err: mongodb::error::Error) -> Self {
        if is_duplicate_key(&err) {
            NativeError::DuplicateKey(err.to_string())
        } else {
            NativeError::Driver(Box::new(err))
        }
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    let by_code = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == DUPLICATE_KEY,
        ErrorKind::InsertMany(failure) => failure
            .write_errors
            .as_ref()
            .is_some_and(|errors| errors.iter().any(|e| e.code == DUPLICATE_KEY)),
        _ => false,
    };
    by_code || err.to_string().contains("E11000")
}

impl Handler<MongoConnector> {
    /// Connect using `config` and bind to its database and collection.
    pub async fn connect(config: &MongoConfig) -> Result<Self, DataError> {
        let connector = MongoConnector::connect(config).await?;
        let namespace = Namespace::new(&config.database, &config.collection);
        Ok(Handler::with_pool_size(connector, namespace, config.pool_size as usize))
    }
}
