//! Keyed handle store with single-flight creation
//!
//! One mutex guards the whole slot map. It is never held across an await:
//! each operation locks, decides, unlocks, and only then awaits a creation
//! or invokes eviction hooks. In-flight creations occupy their slot as a
//! shared future, so every concurrent caller for a key awaits the same
//! attempt and receives the same handle (or the same error).

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tracing::debug;

use super::EvictionReason;

/// Teardown callback invoked once per evicted handle, after the handle has
/// been removed from the map and outside the map lock.
pub type EvictionHook<K, V> = Arc<dyn Fn(&K, &V, EvictionReason) + Send + Sync>;

type CreationFuture<V, E> = Shared<BoxFuture<'static, Creation<V, E>>>;

/// Completed outcome of one creation attempt, shared with every waiter.
/// A factory panic is caught and carried as `Panicked`, so the shared
/// future itself always completes cleanly and the key stays recoverable.
enum Creation<V, E> {
    Created(V),
    Failed(Arc<E>),
    Panicked(Arc<str>),
}

impl<V: Clone, E> Clone for Creation<V, E> {
    fn clone(&self) -> Self {
        match self {
            Creation::Created(handle) => Creation::Created(handle.clone()),
            Creation::Failed(error) => Creation::Failed(Arc::clone(error)),
            Creation::Panicked(message) => Creation::Panicked(Arc::clone(message)),
        }
    }
}

fn panic_text(payload: Box<dyn Any + Send>) -> Arc<str> {
    if let Some(text) = payload.downcast_ref::<&str>() {
        Arc::from(*text)
    } else if let Some(text) = payload.downcast_ref::<String>() {
        Arc::from(text.as_str())
    } else {
        Arc::from("opaque panic payload")
    }
}

enum Slot<V, E> {
    /// Live handle plus the access stamp driving idle expiry
    Ready { handle: V, last_access: Instant },
    /// Creation in flight; waiters clone and await the shared future.
    /// The generation guards finalization against a slot that was
    /// replaced by a later attempt for the same key.
    Pending {
        generation: u64,
        creation: CreationFuture<V, E>,
    },
}

struct Slots<K, V, E> {
    map: HashMap<K, Slot<V, E>>,
    next_generation: u64,
}

enum Action<V, E> {
    Hit(V),
    Wait {
        creation: CreationFuture<V, E>,
        generation: u64,
    },
}

/// Bounded cache of live handles with idle expiry and single-flight creation.
///
/// Capacity counts ready handles only; a creation in flight neither counts
/// against the limit nor can be evicted. When an install pushes the cache
/// over capacity, the least recently accessed handle is removed. Expired
/// and displaced handles are passed to the eviction hook exactly once.
///
/// Expiry is lazy: there is no background task, so an idle handle is only
/// discarded when some later cache operation sweeps it.
pub struct HandleCache<K, V, E> {
    slots: Mutex<Slots<K, V, E>>,
    capacity: usize,
    idle_timeout: Duration,
    on_evict: EvictionHook<K, V>,
}

impl<K, V, E> HandleCache<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new(
        capacity: usize,
        idle_timeout: Duration,
        on_evict: impl Fn(&K, &V, EvictionReason) + Send + Sync + 'static,
    ) -> Self {
        Self {
            slots: Mutex::new(Slots {
                map: HashMap::new(),
                next_generation: 0,
            }),
            capacity,
            idle_timeout,
            on_evict: Arc::new(on_evict),
        }
    }

    /// Return the handle for `key`, building it with `factory` on a miss.
    ///
    /// A hit refreshes the idle timer. On a miss the factory is invoked
    /// once; callers arriving while that creation is still running await
    /// the same attempt, and a failure is delivered to every waiter.
    /// Failures are not cached: the key is vacated and the next caller
    /// starts a fresh attempt. A panicking factory is handled the same
    /// way, except the panic is re-raised in every waiter instead of
    /// being returned. If every waiter is cancelled mid-creation, the
    /// pending entry stays and the next caller resumes it.
    ///
    /// The factory closure runs under the cache lock and must only build
    /// the future; the creation work itself happens while the lock is free.
    pub async fn get_or_create<F, Fut>(&self, key: K, factory: F) -> Result<V, Arc<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let mut evicted = Vec::new();
        let action = {
            let mut slots = self.slots.lock().await;
            slots.sweep_idle(self.idle_timeout, &mut evicted);

            match slots.map.get_mut(&key) {
                Some(Slot::Ready {
                    handle,
                    last_access,
                }) => {
                    *last_access = Instant::now();
                    Action::Hit(handle.clone())
                }
                Some(Slot::Pending {
                    generation,
                    creation,
                }) => {
                    debug!("joining in-flight creation");
                    Action::Wait {
                        creation: creation.clone(),
                        generation: *generation,
                    }
                }
                None => {
                    debug!("starting handle creation");
                    let generation = slots.next_generation;
                    slots.next_generation += 1;
                    let creation = AssertUnwindSafe(factory())
                        .catch_unwind()
                        .map(|outcome| match outcome {
                            Ok(Ok(handle)) => Creation::Created(handle),
                            Ok(Err(error)) => Creation::Failed(Arc::new(error)),
                            Err(payload) => Creation::Panicked(panic_text(payload)),
                        })
                        .boxed()
                        .shared();
                    slots.map.insert(
                        key.clone(),
                        Slot::Pending {
                            generation,
                            creation: creation.clone(),
                        },
                    );
                    Action::Wait {
                        creation,
                        generation,
                    }
                }
            }
        };
        self.run_evictions(evicted);

        match action {
            Action::Hit(handle) => Ok(handle),
            Action::Wait {
                creation,
                generation,
            } => {
                let outcome = creation.await;
                self.finalize(key, generation, outcome).await
            }
        }
    }

    /// Number of live handles currently held (in-flight creations excluded)
    pub async fn ready_handles(&self) -> usize {
        let slots = self.slots.lock().await;
        slots
            .map
            .values()
            .filter(|slot| matches!(slot, Slot::Ready { .. }))
            .count()
    }

    /// Settle a completed creation. Every waiter calls this; only the one
    /// that still finds its own pending generation in the slot acts, so a
    /// creation is installed (or its key vacated) exactly once. A panicked
    /// creation is re-raised here, after its key has been vacated.
    async fn finalize(
        &self,
        key: K,
        generation: u64,
        outcome: Creation<V, E>,
    ) -> Result<V, Arc<E>> {
        let mut evicted = Vec::new();
        {
            let mut slots = self.slots.lock().await;
            let still_current = matches!(
                slots.map.get(&key),
                Some(Slot::Pending { generation: held, .. }) if *held == generation
            );
            if still_current {
                match &outcome {
                    Creation::Created(handle) => {
                        slots.map.insert(
                            key,
                            Slot::Ready {
                                handle: handle.clone(),
                                last_access: Instant::now(),
                            },
                        );
                        slots.evict_over_capacity(self.capacity, &mut evicted);
                    }
                    Creation::Failed(_) | Creation::Panicked(_) => {
                        slots.map.remove(&key);
                    }
                }
            }
        }
        self.run_evictions(evicted);

        match outcome {
            Creation::Created(handle) => Ok(handle),
            Creation::Failed(error) => Err(error),
            Creation::Panicked(message) => panic!("handle creation panicked: {message}"),
        }
    }

    fn run_evictions(&self, evicted: Vec<(K, V, EvictionReason)>) {
        for (key, handle, reason) in evicted {
            debug!(?reason, "evicting handle");
            (self.on_evict)(&key, &handle, reason);
        }
    }
}

impl<K, V, E> Slots<K, V, E>
where
    K: Eq + Hash + Clone,
{
    /// Remove ready slots that have sat unused past the idle timeout.
    /// Pending slots are never swept.
    fn sweep_idle(&mut self, idle_timeout: Duration, evicted: &mut Vec<(K, V, EvictionReason)>) {
        let now = Instant::now();
        let expired: Vec<K> = self
            .map
            .iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Ready { last_access, .. }
                    if now.duration_since(*last_access) > idle_timeout =>
                {
                    Some(key.clone())
                }
                _ => None,
            })
            .collect();
        for key in expired {
            if let Some(Slot::Ready { handle, .. }) = self.map.remove(&key) {
                evicted.push((key, handle, EvictionReason::Idle));
            }
        }
    }

    /// Drop the least recently accessed ready handles until the ready
    /// count is back within capacity.
    fn evict_over_capacity(
        &mut self,
        capacity: usize,
        evicted: &mut Vec<(K, V, EvictionReason)>,
    ) {
        loop {
            let ready = self
                .map
                .values()
                .filter(|slot| matches!(slot, Slot::Ready { .. }))
                .count();
            if ready <= capacity {
                break;
            }
            let oldest = self
                .map
                .iter()
                .filter_map(|(key, slot)| match slot {
                    Slot::Ready { last_access, .. } => Some((key.clone(), *last_access)),
                    Slot::Pending { .. } => None,
                })
                .min_by_key(|(_, accessed)| *accessed)
                .map(|(key, _)| key);
            let Some(key) = oldest else { break };
            if let Some(Slot::Ready { handle, .. }) = self.map.remove(&key) {
                evicted.push((key, handle, EvictionReason::Capacity));
            }
        }
    }
}

impl<K, V, E> Drop for HandleCache<K, V, E> {
    fn drop(&mut self) {
        let slots = self.slots.get_mut();
        for (key, slot) in slots.map.drain() {
            match slot {
                Slot::Ready { handle, .. } => {
                    (self.on_evict)(&key, &handle, EvictionReason::Shutdown);
                }
                // A creation that finished after every waiter went away
                // still holds a live handle inside the shared future.
                // A creation still running has nothing to close yet.
                Slot::Pending { creation, .. } => {
                    if let Some(Creation::Created(handle)) = creation.peek() {
                        (self.on_evict)(&key, handle, EvictionReason::Shutdown);
                    }
                }
            }
        }
    }
}
