//! # docrest-data-mongo — MongoDB storage for docrest
//!
//! Implements [`Storer`](docrest_data::Storer) on top of MongoDB:
//!
//! | Item | Description |
//! |------|-------------|
//! | [`Handler`] | CRUD with optimistic locking, deadlines and leased connections |
//! | [`query`] | Filter, sort and projection translation to query documents |
//! | [`MongoConnector`] | Connections through the official driver |
//! | [`MemoryConnector`] | In-process store evaluating the same documents |
//! | [`MongoConfig`] | `mongo:` configuration section with env overrides |
//!
//! ```ignore
//! use docrest_data::prelude::*;
//! use docrest_data_mongo::{Handler, MongoConfig};
//!
//! let handler = Handler::connect(&MongoConfig::load("application.yaml")?).await?;
//! let ctx = Context::with_timeout(Duration::from_secs(1));
//! let page = handler.find(&ctx, &Lookup::new(), Window::page(0, 20)).await?;
//! ```

pub mod backend;
pub mod config;
pub mod handler;
mod item;
pub mod lease;
pub mod memory;
pub mod mongo;
pub mod query;

pub use backend::{Connection, Connector, DocumentCursor, FindSpec, Namespace, NativeError, SessionOptions};
pub use config::{ConfigError, MongoConfig};
pub use handler::{Handler, DEFAULT_POOL_SIZE};
pub use lease::{Lease, LeasePool};
pub use memory::MemoryConnector;
pub use mongo::MongoConnector;

/// The underlying `bson` crate, for building raw documents.
pub use mongodb::bson;

pub mod prelude {
    //! Re-exports of the most commonly used types.
    pub use crate::{Handler, MemoryConnector, MongoConfig, MongoConnector, Namespace};
    pub use docrest_data::prelude::*;
}
