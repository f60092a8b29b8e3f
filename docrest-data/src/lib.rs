//! # docrest-data — data layer vocabulary
//!
//! Backend-independent types shared between a resource API and its storage
//! backends:
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Record`] | Persisted unit: identifier, version tag, timestamps, kind, payload |
//! | [`Query`] / [`Expression`] | Filter expression tree, implicitly AND-ed |
//! | [`Lookup`] | Filter + sort + projection of one request |
//! | [`Window`] / [`RecordList`] | Offset/limit and the page a find returns |
//! | [`Context`] | Deadline and cancellation of one call |
//! | [`Storer`] | The operations a storage backend implements |
//! | [`DataError`] | Error taxonomy every backend maps onto |

pub mod context;
pub mod error;
pub mod filter;
pub mod lookup;
pub mod page;
mod parse;
pub mod record;
pub mod storer;

pub use context::Context;
pub use error::DataError;
pub use filter::{CustomExpression, Expression, Query, TextSearch};
pub use lookup::Lookup;
pub use page::{RecordList, Window};
pub use record::{new_etag, Record, ID_FIELD};
pub use storer::Storer;

pub mod prelude {
    //! Re-exports of the most commonly used data types.
    pub use crate::{Context, DataError, Expression, Lookup, Query, Record, RecordList, Storer, Window};
}
