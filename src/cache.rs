//! Single-entry volume cache with at-most-one load in flight per identity.
//!
//! Only one volume is "current" at a time. A miss starts a load whose future
//! is shared by every caller asking for the same identity until it settles.
//! Failed loads are not remembered, so the next request retries.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};

use crate::identity::VolumeIdentity;
use crate::volume::{Volume, VolumeHandle};
use crate::volume_loader::VolumeLoaderError;

pub type LoadResult = Result<VolumeHandle, Arc<VolumeLoaderError>>;

type SharedLoad = Shared<LocalBoxFuture<'static, LoadResult>>;

/// Counters describing how the cache has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests answered from the current entry.
    pub hits: u64,
    /// Requests that started a new load.
    pub misses: u64,
    /// Requests that joined a load already in flight.
    pub joined: u64,
    /// Loads that settled with an error.
    pub failures: u64,
    /// Loads whose result was not installed because a newer entry existed.
    pub stale: u64,
}

struct InFlight {
    generation: u64,
    load: SharedLoad,
    /// Callers still awaiting `load`.
    waiters: usize,
}

struct Entry {
    generation: u64,
    handle: VolumeHandle,
}

#[derive(Default)]
struct CacheState {
    current: Option<Entry>,
    in_flight: HashMap<VolumeIdentity, InFlight>,
    next_generation: u64,
    stats: CacheStats,
}

/// Releases a caller's claim on an in-flight load, whether it finished or
/// was dropped mid-await.
struct Waiter<'a> {
    cache: &'a VolumeCache,
    identity: VolumeIdentity,
    generation: u64,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        self.cache.abandon(self.identity, self.generation);
    }
}

#[derive(Default)]
pub struct VolumeCache {
    state: RefCell<CacheState>,
}

impl VolumeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the handle for `identity`, loading it with `loader` on a miss.
    ///
    /// Concurrent callers for the same identity share one load. A load that
    /// settles after a newer one has been installed is still returned to its
    /// callers but does not replace the current entry.
    pub async fn get_or_load<F, Fut>(&self, identity: VolumeIdentity, loader: F) -> LoadResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Volume, VolumeLoaderError>> + 'static,
    {
        let joined = {
            let mut state = self.state.borrow_mut();
            let cached = state
                .current
                .as_ref()
                .filter(|entry| entry.handle.identity() == identity)
                .map(|entry| entry.handle.clone());
            if let Some(handle) = cached {
                state.stats.hits += 1;
                return Ok(handle);
            }
            let in_flight = state.in_flight.get_mut(&identity).map(|in_flight| {
                in_flight.waiters += 1;
                (in_flight.generation, in_flight.load.clone())
            });
            if in_flight.is_some() {
                state.stats.joined += 1;
            }
            in_flight
        };

        let (generation, load) = match joined {
            Some(joined) => joined,
            None => {
                let pending = loader();
                let load = async move {
                    pending
                        .await
                        .map(|volume| VolumeHandle::new(identity, volume))
                        .map_err(Arc::new)
                }
                .boxed_local()
                .shared();

                let mut state = self.state.borrow_mut();
                let generation = state.next_generation;
                state.next_generation += 1;
                state.stats.misses += 1;
                state.in_flight.insert(
                    identity,
                    InFlight {
                        generation,
                        load: load.clone(),
                        waiters: 1,
                    },
                );
                tracing::debug!(%identity, generation, "volume load started");
                (generation, load)
            }
        };

        let _waiter = Waiter {
            cache: self,
            identity,
            generation,
        };
        let result = load.await;
        self.settle(identity, generation, &result);
        result
    }

    /// Forget a load nobody is waiting for any more; dropping the last
    /// shared handle cancels it.
    fn abandon(&self, identity: VolumeIdentity, generation: u64) {
        let mut state = self.state.borrow_mut();
        let Some(in_flight) = state
            .in_flight
            .get_mut(&identity)
            .filter(|in_flight| in_flight.generation == generation)
        else {
            return;
        };
        in_flight.waiters -= 1;
        if in_flight.waiters == 0 {
            state.in_flight.remove(&identity);
            tracing::debug!(%identity, generation, "volume load abandoned");
        }
    }

    /// First settler of a load records the outcome; later waiters find the
    /// in-flight entry gone and leave the state alone.
    fn settle(&self, identity: VolumeIdentity, generation: u64, result: &LoadResult) {
        let mut state = self.state.borrow_mut();
        let owns_entry = state
            .in_flight
            .get(&identity)
            .is_some_and(|in_flight| in_flight.generation == generation);
        if !owns_entry {
            return;
        }
        state.in_flight.remove(&identity);

        match result {
            Ok(handle) => {
                let newer_installed = state
                    .current
                    .as_ref()
                    .is_some_and(|entry| entry.generation > generation);
                if newer_installed {
                    state.stats.stale += 1;
                    tracing::debug!(%identity, "late volume load not installed");
                } else {
                    state.current = Some(Entry {
                        generation,
                        handle: handle.clone(),
                    });
                    tracing::debug!(%identity, "volume cached");
                }
            }
            Err(err) => {
                state.stats.failures += 1;
                tracing::warn!(%identity, error = %err, "volume load failed");
            }
        }
    }

    /// Handle of the current entry, if any.
    pub fn current(&self) -> Option<VolumeHandle> {
        self.state
            .borrow()
            .current
            .as_ref()
            .map(|entry| entry.handle.clone())
    }

    pub fn is_loading(&self, identity: VolumeIdentity) -> bool {
        self.state.borrow().in_flight.contains_key(&identity)
    }

    pub fn stats(&self) -> CacheStats {
        self.state.borrow().stats
    }

    /// Drop the current entry. Loads in flight keep running for their callers
    /// but are no longer joinable.
    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.current = None;
        state.in_flight.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameReference;
    use futures::channel::oneshot;
    use ndarray::Array3;
    use std::cell::Cell;

    fn identity(name: &str, count: usize) -> VolumeIdentity {
        let frames: Vec<_> = (0..count)
            .map(|i| FrameReference::new(format!("dicomfile:/{name}/{i}.dcm")))
            .collect();
        VolumeIdentity::of(&frames)
    }

    fn tiny_volume() -> Volume {
        Volume::new(Array3::zeros((2, 2, 2)), (1.0, 1.0, 1.0))
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_load() {
        let cache = VolumeCache::new();
        let id = identity("a", 40);
        let calls = Cell::new(0);
        let (tx, rx) = oneshot::channel::<()>();
        let rx = rx.shared();

        let loader = || {
            calls.set(calls.get() + 1);
            let rx = rx.clone();
            async move {
                let _ = rx.await;
                Ok::<_, VolumeLoaderError>(tiny_volume())
            }
        };

        let first = cache.get_or_load(id, loader);
        let second = cache.get_or_load(id, loader);
        let third = cache.get_or_load(id, loader);
        let release = async {
            tokio::task::yield_now().await;
            let _ = tx.send(());
        };

        let (a, b, c, ()) = futures::join!(first, second, third, release);
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(calls.get(), 1);
        assert!(a.ptr_eq(&b) && b.ptr_eq(&c));
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().joined, 2);
    }

    #[tokio::test]
    async fn hit_returns_cached_handle_without_loading() {
        let cache = VolumeCache::new();
        let id = identity("a", 10);
        let first = cache
            .get_or_load(id, || async { Ok(tiny_volume()) })
            .await
            .unwrap();

        let loads = Cell::new(0);
        let second = cache
            .get_or_load(id, || {
                loads.set(loads.get() + 1);
                async { Ok(tiny_volume()) }
            })
            .await
            .unwrap();

        assert_eq!(loads.get(), 0);
        assert!(first.ptr_eq(&second));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(second.identity(), id);
    }

    #[tokio::test]
    async fn failure_is_not_cached_and_retry_loads_again() {
        let cache = VolumeCache::new();
        let id = identity("broken", 5);

        let err = cache
            .get_or_load(id, || async { Err(VolumeLoaderError::NoValidImages) })
            .await
            .unwrap_err();
        assert!(matches!(*err, VolumeLoaderError::NoValidImages));
        assert!(cache.current().is_none());
        assert!(!cache.is_loading(id));

        let handle = cache
            .get_or_load(id, || async { Ok(tiny_volume()) })
            .await
            .unwrap();
        assert_eq!(handle.identity(), id);
        assert_eq!(cache.stats().failures, 1);
        assert_eq!(cache.stats().misses, 2);
    }

    #[tokio::test]
    async fn new_identity_replaces_current_entry() {
        let cache = VolumeCache::new();
        let a = identity("a", 3);
        let b = identity("b", 3);

        cache.get_or_load(a, || async { Ok(tiny_volume()) }).await.unwrap();
        cache.get_or_load(b, || async { Ok(tiny_volume()) }).await.unwrap();

        assert_eq!(cache.current().map(|h| h.identity()), Some(b));
    }

    #[tokio::test]
    async fn dropped_waiters_release_the_in_flight_entry() {
        let cache = VolumeCache::new();
        let id = identity("abandoned", 12);
        let (_tx, rx) = oneshot::channel::<()>();
        let rx = rx.shared();
        let loader = || {
            let rx = rx.clone();
            async move {
                let _ = rx.await;
                Ok::<_, VolumeLoaderError>(tiny_volume())
            }
        };

        let mut leader = Box::pin(cache.get_or_load(id, loader));
        let mut follower = Box::pin(cache.get_or_load(id, loader));
        assert!(futures::poll!(leader.as_mut()).is_pending());
        assert!(futures::poll!(follower.as_mut()).is_pending());
        assert!(cache.is_loading(id));

        drop(leader);
        assert!(cache.is_loading(id));
        drop(follower);
        assert!(!cache.is_loading(id));
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().joined, 1);
    }

    #[tokio::test]
    async fn late_load_does_not_evict_newer_entry() {
        let cache = VolumeCache::new();
        let a = identity("a", 3);
        let b = identity("b", 3);
        let (tx, rx) = oneshot::channel::<()>();

        let slow_a = cache.get_or_load(a, || async move {
            let _ = rx.await;
            Ok(tiny_volume())
        });
        let fast_b = async {
            tokio::task::yield_now().await;
            let handle = cache.get_or_load(b, || async { Ok(tiny_volume()) }).await;
            let _ = tx.send(());
            handle
        };

        let (late, newer) = futures::join!(slow_a, fast_b);
        assert_eq!(late.unwrap().identity(), a);
        assert_eq!(newer.unwrap().identity(), b);
        assert_eq!(cache.current().map(|h| h.identity()), Some(b));
        assert_eq!(cache.stats().stale, 1);
    }
}
