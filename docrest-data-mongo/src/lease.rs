//! Connection leases.
//!
//! A handler hands out at most `size` connections at once. Each operation
//! holds a [`Lease`] for its whole duration; the slot is returned when the
//! lease is dropped, whichever way the operation ends.

use std::ops::Deref;
use std::sync::Arc;

use docrest_data::{Context, DataError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone)]
pub struct LeasePool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl LeasePool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently leased.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free slot, giving up when the context is done.
    pub(crate) async fn acquire(&self, ctx: &Context) -> Result<OwnedSemaphorePermit, DataError> {
        let permits = Arc::clone(&self.permits);
        ctx.run(async move { permits.acquire_owned().await.map_err(DataError::database) })
            .await
    }
}

/// Exclusive use of one connection for one operation.
pub struct Lease<C> {
    conn: C,
    _permit: OwnedSemaphorePermit,
}

impl<C> Lease<C> {
    pub(crate) fn new(conn: C, permit: OwnedSemaphorePermit) -> Self {
        Self { conn, _permit: permit }
    }
}

impl<C> Deref for Lease<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl<C> Drop for Lease<C> {
    fn drop(&mut self) {
        tracing::trace!("connection lease released");
    }
}
