// Request de-duplicator
// Concurrent calls for the same key share one underlying request

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::ApiError;

type SharedRequest<T> = Shared<BoxFuture<'static, Result<T, ApiError>>>;

struct InFlightRequest<T: Clone> {
    id: u64,
    future: SharedRequest<T>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DedupStats {
    pub started: usize,
    pub joined: usize,
    pub in_flight: usize,
}

pub struct RequestDeduplicator<T: Clone> {
    // Arc so a settling request can remove its own registration
    in_flight: Arc<DashMap<String, InFlightRequest<T>>>,
    next_id: AtomicU64,
    started: AtomicUsize,
    joined: AtomicUsize,
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            started: AtomicUsize::new(0),
            joined: AtomicUsize::new(0),
        }
    }

    // Joins the request already in flight for `key`, or starts `operation` on
    // its own task and registers it. The registration is removed when the
    // operation settles, before any waiter sees the result, so a failure is
    // never replayed. Must be called from within a tokio runtime.
    pub async fn deduplicate<F, Fut>(&self, key: &str, operation: F) -> Result<T, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        // The map guard must be gone before awaiting
        let future = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(existing) => {
                self.joined.fetch_add(1, Ordering::SeqCst);
                debug!(key, "joining in-flight request");
                existing.get().future.clone()
            }
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let registry = Arc::clone(&self.in_flight);
                let owned_key = key.to_string();
                let pending = operation();

                // Spawned so the request settles and unregisters even when every
                // waiter is dropped. remove_if blocks on the shard lock held by
                // `slot` until the insert below is done.
                let task = tokio::spawn(async move {
                    let result = pending.await;
                    // Only drop our own registration; forget_all may have let a newer one in
                    registry.remove_if(&owned_key, |_, request| request.id == id);
                    result
                });
                let future = task
                    .map(|joined| {
                        joined.unwrap_or_else(|e| Err(ApiError::NetworkError(e.to_string())))
                    })
                    .boxed()
                    .shared();

                slot.insert(InFlightRequest {
                    id,
                    future: future.clone(),
                });
                self.started.fetch_add(1, Ordering::SeqCst);
                future
            }
        };

        future.await
    }

    // Detaches every registration without cancelling it. Callers already
    // waiting still get their result; later callers start a new request.
    pub fn forget_all(&self) -> usize {
        let count = self.in_flight.len();
        self.in_flight.clear();
        count
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> DedupStats {
        DedupStats {
            started: self.started.load(Ordering::SeqCst),
            joined: self.joined.load(Ordering::SeqCst),
            in_flight: self.in_flight.len(),
        }
    }
}

impl<T> Default for RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
