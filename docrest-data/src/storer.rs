use std::future::Future;

use crate::context::Context;
use crate::error::DataError;
use crate::lookup::Lookup;
use crate::page::{RecordList, Window};
use crate::record::Record;

/// Storage backend for one resource collection.
///
/// Every method takes the caller's [`Context`] first and must not perform
/// any I/O once the context is done. Mutations of an existing record are
/// conditioned on the version tag of `original` and report
/// [`DataError::NotFound`] or [`DataError::Conflict`] when the condition
/// does not hold.
///
/// Methods return `impl Future + Send`, so handlers can be driven from any
/// multi-threaded runtime.
pub trait Storer: Send + Sync {
    /// Store new records. An identifier collision is a `Conflict`.
    fn insert(&self, ctx: &Context, records: &[Record]) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Replace `original` with `record`, returning the stored version.
    fn update(
        &self,
        ctx: &Context,
        record: &Record,
        original: &Record,
    ) -> impl Future<Output = Result<Record, DataError>> + Send;

    /// Merge the fields of `record` into `original`, returning what was written.
    fn set(
        &self,
        ctx: &Context,
        record: &Record,
        original: &Record,
    ) -> impl Future<Output = Result<Record, DataError>> + Send;

    fn delete(&self, ctx: &Context, record: &Record) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Remove every record matching the lookup filter, returning how many went.
    fn clear(&self, ctx: &Context, lookup: &Lookup) -> impl Future<Output = Result<u64, DataError>> + Send;

    fn find(
        &self,
        ctx: &Context,
        lookup: &Lookup,
        window: Window,
    ) -> impl Future<Output = Result<RecordList, DataError>> + Send;

    /// Exact number of records matching the lookup filter.
    fn count(&self, ctx: &Context, lookup: &Lookup) -> impl Future<Output = Result<u64, DataError>> + Send;
}
