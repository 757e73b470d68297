//! Keyed "one computation in flight" registry.
//!
//! The first caller for a key starts the computation; everyone arriving while
//! it runs awaits the same shared future. The computation is owned by the
//! registry, not by the caller that started it, so it keeps going for the
//! remaining joiners if that caller is dropped.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

type InFlight<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

pub struct SingleFlight<K, V, E> {
    calls: Arc<DashMap<K, InFlight<V, E>>>,
}

impl<K, V, E> Default for SingleFlight<K, V, E>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            calls: Arc::new(DashMap::new()),
        }
    }
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `compute` unless a computation for `key` is already in flight, in
    /// which case join it. The second value is `true` when this call joined.
    pub async fn run<F>(&self, key: K, compute: F) -> (Result<V, E>, bool)
    where
        F: Future<Output = Result<V, E>> + Send + 'static,
    {
        // Registry lock is held only for the membership check.
        let (call, joined) = match self.calls.entry(key.clone()) {
            Entry::Occupied(slot) => (slot.get().clone(), true),
            Entry::Vacant(slot) => {
                let calls = Arc::clone(&self.calls);
                let call = async move {
                    let out = compute.await;
                    calls.remove(&key);
                    out
                }
                .boxed()
                .shared();
                slot.insert(call.clone());
                (call, false)
            }
        };

        (call.await, joined)
    }

    /// Keys with a computation currently running.
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }
}
