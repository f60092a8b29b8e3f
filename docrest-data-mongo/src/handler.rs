use std::sync::Arc;
use std::time::Duration;

use docrest_data::{Context, DataError, Lookup, Record, RecordList, Storer, Window};
use mongodb::bson::{doc, Document};

use crate::backend::{Connection, Connector, DocumentCursor, FindSpec, Namespace, NativeError, SessionOptions};
use crate::item;
use crate::lease::{Lease, LeasePool};
use crate::query::{self, ETAG_FIELD, PRIMARY_KEY, TYPE_FIELD};

/// Default number of concurrent connection leases per handler.
pub const DEFAULT_POOL_SIZE: usize = 16;

/// MongoDB caps wait/execution budgets at millisecond precision and reads 0
/// as "no limit", so a nearly spent budget is rounded up.
const MIN_BUDGET: Duration = Duration::from_millis(1);

/// Stores records of one resource in one MongoDB collection.
///
/// Each operation leases a connection, turns the caller's deadline into a
/// server-side budget and guards every mutation of an existing record with
/// its version tag.
///
/// # Example
///
/// ```ignore
/// let handler = Handler::connect(&MongoConfig::load("application.yaml")?).await?;
/// let ctx = Context::with_timeout(Duration::from_secs(2));
/// handler.insert(&ctx, &[Record::new("book", payload)]).await?;
/// ```
pub struct Handler<C: Connector> {
    connector: Arc<C>,
    namespace: Arc<Namespace>,
    leases: LeasePool,
}

impl<C: Connector> Clone for Handler<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            namespace: Arc::clone(&self.namespace),
            leases: self.leases.clone(),
        }
    }
}

impl<C: Connector> Handler<C> {
    pub fn new(connector: C, namespace: Namespace) -> Self {
        Self::with_pool_size(connector, namespace, DEFAULT_POOL_SIZE)
    }

    pub fn with_pool_size(connector: C, namespace: Namespace, pool_size: usize) -> Self {
        Self {
            connector: Arc::new(connector),
            namespace: Arc::new(namespace),
            leases: LeasePool::new(pool_size),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Connection leases not currently held by an operation.
    pub fn available_leases(&self) -> usize {
        self.leases.available()
    }

    async fn lease(&self, ctx: &Context) -> Result<Lease<C::Connection>, DataError> {
        ctx.check()?;
        let permit = self.leases.acquire(ctx).await?;
        let options = SessionOptions {
            timeout: budget(ctx),
            acknowledged: true,
        };
        let conn = self.connector.open(&self.namespace, &options)?;
        tracing::trace!(namespace = %self.namespace, timeout = ?options.timeout, "connection leased");
        Ok(Lease::new(conn, permit))
    }

    /// Tell NotFound from Conflict after a conditional write matched nothing.
    ///
    /// A concurrent delete between the write and this read can turn a
    /// conflict into NotFound; the window is accepted.
    async fn disambiguate(&self, ctx: &Context, conn: &C::Connection, id: &str) -> DataError {
        let found = ctx
            .run(async {
                conn.count(doc! { PRIMARY_KEY: item::id_filter(id) }, budget(ctx))
                    .await
                    .map_err(DataError::from)
            })
            .await;
        match found {
            Err(err) => err,
            Ok(0) => DataError::NotFound,
            Ok(_) => ctx.err().unwrap_or(DataError::Conflict),
        }
    }
}

/// Filter matching exactly the stored version `original` was read from.
fn condition(original: &Record) -> Document {
    doc! {
        PRIMARY_KEY: item::id_filter(&original.id),
        ETAG_FIELD: original.etag.as_str(),
        TYPE_FIELD: original.kind.as_str(),
    }
}

fn budget(ctx: &Context) -> Option<Duration> {
    ctx.remaining().map(|left| left.max(MIN_BUDGET))
}

impl<C: Connector> Storer for Handler<C> {
    async fn insert(&self, ctx: &Context, records: &[Record]) -> Result<(), DataError> {
        let docs = records.iter().map(item::to_document).collect::<Result<Vec<_>, _>>()?;
        if docs.is_empty() {
            return ctx.check();
        }
        let lease = self.lease(ctx).await?;
        tracing::debug!(namespace = %self.namespace, count = docs.len(), "inserting records");
        let res = ctx
            .run(async {
                lease.insert_many(docs).await.map_err(|err| match err {
                    NativeError::DuplicateKey(_) => DataError::Conflict,
                    other => other.into(),
                })
            })
            .await;
        ctx.check()?;
        res
    }

    async fn update(&self, ctx: &Context, record: &Record, original: &Record) -> Result<Record, DataError> {
        let stored = record.revise(original);
        let replacement = item::to_replacement_document(&stored)?;
        let lease = self.lease(ctx).await?;
        tracing::debug!(namespace = %self.namespace, id = %original.id, "replacing record");
        let matched = ctx
            .run(async { lease.replace_one(condition(original), replacement).await.map_err(DataError::from) })
            .await?;
        if matched == 0 {
            return Err(self.disambiguate(ctx, &lease, &original.id).await);
        }
        Ok(stored)
    }

    async fn set(&self, ctx: &Context, record: &Record, original: &Record) -> Result<Record, DataError> {
        let stored = record.revise(original);
        let fields = item::to_set_document(&stored)?;
        let lease = self.lease(ctx).await?;
        tracing::debug!(namespace = %self.namespace, id = %original.id, "updating record fields");
        let update = doc! { "$set": fields };
        let matched = ctx
            .run(async { lease.update_one(condition(original), update).await.map_err(DataError::from) })
            .await?;
        if matched == 0 {
            return Err(self.disambiguate(ctx, &lease, &original.id).await);
        }
        Ok(stored)
    }

    async fn delete(&self, ctx: &Context, record: &Record) -> Result<(), DataError> {
        let lease = self.lease(ctx).await?;
        tracing::debug!(namespace = %self.namespace, id = %record.id, "deleting record");
        let deleted = ctx
            .run(async { lease.delete_one(condition(record)).await.map_err(DataError::from) })
            .await?;
        if deleted == 0 {
            return Err(self.disambiguate(ctx, &lease, &record.id).await);
        }
        Ok(())
    }

    async fn clear(&self, ctx: &Context, lookup: &Lookup) -> Result<u64, DataError> {
        let filter = query::translate_lookup(lookup)?;
        let lease = self.lease(ctx).await?;
        tracing::debug!(namespace = %self.namespace, filter = %filter, "clearing records");
        let removed = ctx.run(async { lease.delete_many(filter).await.map_err(DataError::from) }).await?;
        ctx.check()?;
        Ok(removed)
    }

    async fn find(&self, ctx: &Context, lookup: &Lookup, window: Window) -> Result<RecordList, DataError> {
        let filter = query::translate_lookup(lookup)?;
        if window.limit == Some(0) {
            // the server reads a zero limit as "no limit"
            ctx.check()?;
            return Ok(RecordList::default());
        }
        let sort = query::translate_sort(lookup.sort());
        let projection = lookup.fields().map(query::translate_projection);
        let lease = self.lease(ctx).await?;
        let spec = FindSpec {
            sort,
            projection,
            skip: window.offset,
            limit: window.limit,
            max_time: budget(ctx),
        };
        tracing::debug!(namespace = %self.namespace, filter = %filter, offset = window.offset, limit = ?window.limit, "finding records");

        let mut cursor = ctx.run(async { lease.find(filter, spec).await.map_err(DataError::from) }).await?;
        let mut records = Vec::new();
        loop {
            let next = ctx.run(async { cursor.next_document().await.map_err(DataError::from) }).await?;
            let Some(doc) = next else { break };
            // returning here drops the cursor, which closes it
            ctx.check()?;
            records.push(item::from_document(doc)?);
        }

        Ok(RecordList {
            total: window.total(records.len()),
            records,
        })
    }

    async fn count(&self, ctx: &Context, lookup: &Lookup) -> Result<u64, DataError> {
        let filter = query::translate_lookup(lookup)?;
        let lease = self.lease(ctx).await?;
        ctx.run(async { lease.count(filter, budget(ctx)).await.map_err(DataError::from) }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Store whose writes never match and whose existence read is scripted.
    struct Scripted {
        found: u64,
        cancel_on_count: Option<Context>,
        counted: Arc<Mutex<Vec<Document>>>,
    }

    struct ScriptedConnection {
        found: u64,
        cancel_on_count: Option<Context>,
        counted: Arc<Mutex<Vec<Document>>>,
    }

    struct NoDocuments;

    impl DocumentCursor for NoDocuments {
        async fn next_document(&mut self) -> Result<Option<Document>, NativeError> {
            Ok(None)
        }
    }

    impl Connector for Scripted {
        type Connection = ScriptedConnection;

        fn open(&self, _namespace: &Namespace, _options: &SessionOptions) -> Result<ScriptedConnection, NativeError> {
            Ok(ScriptedConnection {
                found: self.found,
                cancel_on_count: self.cancel_on_count.clone(),
                counted: Arc::clone(&self.counted),
            })
        }
    }

    impl Connection for ScriptedConnection {
        type Cursor = NoDocuments;

        async fn insert_many(&self, _docs: Vec<Document>) -> Result<(), NativeError> {
            Ok(())
        }

        async fn replace_one(&self, _filter: Document, _replacement: Document) -> Result<u64, NativeError> {
            Ok(0)
        }

        async fn update_one(&self, _filter: Document, _update: Document) -> Result<u64, NativeError> {
            Ok(0)
        }

        async fn delete_one(&self, _filter: Document) -> Result<u64, NativeError> {
            Ok(0)
        }

        async fn delete_many(&self, _filter: Document) -> Result<u64, NativeError> {
            Ok(0)
        }

        async fn find(&self, _filter: Document, _spec: FindSpec) -> Result<NoDocuments, NativeError> {
            Ok(NoDocuments)
        }

        async fn count(&self, filter: Document, _max_time: Option<Duration>) -> Result<u64, NativeError> {
            if let Ok(mut counted) = self.counted.lock() {
                counted.push(filter);
            }
            // the caller gives up while the read is in flight
            if let Some(ctx) = &self.cancel_on_count {
                ctx.cancel();
            }
            Ok(self.found)
        }
    }

    fn handler(found: u64, cancel_on_count: Option<Context>) -> (Handler<Scripted>, Arc<Mutex<Vec<Document>>>) {
        let counted = Arc::new(Mutex::new(Vec::new()));
        let connector = Scripted {
            found,
            cancel_on_count,
            counted: Arc::clone(&counted),
        };
        (Handler::with_pool_size(connector, Namespace::new("db", "books"), 2), counted)
    }

    fn original() -> Record {
        Record::with_id("b1", "book", serde_json::Map::new())
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let (handler, counted) = handler(0, None);
        let err = handler.delete(&Context::background(), &original()).await.unwrap_err();
        assert!(matches!(err, DataError::NotFound));
        assert_eq!(counted.lock().unwrap().as_slice(), [doc! { "_id": "b1" }]);
    }

    #[tokio::test]
    async fn existing_record_is_a_conflict() {
        let (handler, _) = handler(1, None);
        let err = handler
            .update(&Context::background(), &original(), &original())
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Conflict));
        assert_eq!(handler.available_leases(), 2);
    }

    #[tokio::test]
    async fn context_done_during_existence_read_reports_context_error() {
        let ctx = Context::background();
        let (handler, counted) = handler(1, Some(ctx.clone()));
        let err = handler.set(&ctx, &original(), &original()).await.unwrap_err();
        assert!(matches!(err, DataError::Cancelled));
        assert_eq!(counted.lock().unwrap().len(), 1);
        assert_eq!(handler.available_leases(), 2);
    }

    #[tokio::test]
    async fn existence_read_matches_native_id_forms() {
        let (handler, counted) = handler(1, None);
        let hex = "65f0c0ffee00000000000001";
        let record = Record::with_id(hex, "book", serde_json::Map::new());
        let err = handler.delete(&Context::background(), &record).await.unwrap_err();
        assert!(matches!(err, DataError::Conflict));
        let filter = counted.lock().unwrap()[0].clone();
        assert_eq!(filter.get_document("_id").unwrap().get_array("$in").unwrap().len(), 2);
    }

    #[test]
    fn condition_pins_id_etag_and_kind() {
        let record = original();
        assert_eq!(
            condition(&record),
            doc! { "_id": "b1", "_etag": record.etag.as_str(), "_type": "book" }
        );
    }
}
