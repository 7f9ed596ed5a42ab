//! A generic pooled-resource primitive with keep-alive hooks (spec's
//! external "pool" collaborator, §1 non-goals — only the eviction/LIFO
//! policy is out of scope; the crate still needs something to hold
//! connections in, so this is the minimal, FIFO-checkin form of it).

mod config;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::error::{VkError, VkResult};

pub use config::PoolConfig;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type Factory<T> = dyn Fn() -> BoxFuture<VkResult<T>> + Send + Sync;
type KeepAlive<T> = dyn Fn(&T) -> BoxFuture<bool> + Send + Sync;

struct Idle<T> {
    item: T,
    idle_since: Instant,
}

struct Shared<T> {
    idle: Mutex<VecDeque<Idle<T>>>,
    total: AtomicUsize,
    config: PoolConfig,
    factory: Arc<Factory<T>>,
    keep_alive: Option<Arc<KeepAlive<T>>>,
    semaphore: Arc<Semaphore>,
}

/// A bounded pool of `T`, checked out via [`Pool::checkout`].
///
/// `min`/`soft_limit` are informational sizing hints honored by the sweep
/// task (it never evicts below `min`, and treats `soft_limit` as the point
/// past which idle connections age out eagerly); `hard_limit` is enforced
/// as an actual cap via a semaphore, and
/// `max_concurrent_connection_requests` additionally bounds how many
/// checkout requests may be in flight waiting for a permit at once.
pub struct Pool<T> {
    shared: Arc<Shared<T>>,
    request_gate: Arc<Semaphore>,
}

impl<T: Send + 'static> Pool<T> {
    pub fn new(
        config: PoolConfig,
        factory: impl Fn() -> BoxFuture<VkResult<T>> + Send + Sync + 'static,
    ) -> Self {
        Self::with_keep_alive(config, factory, None)
    }

    pub fn with_keep_alive(
        config: PoolConfig,
        factory: impl Fn() -> BoxFuture<VkResult<T>> + Send + Sync + 'static,
        keep_alive: Option<Arc<KeepAlive<T>>>,
    ) -> Self {
        let hard_limit = config.hard_limit;
        let max_requests = config.max_concurrent_connection_requests;
        let shared = Arc::new(Shared {
            idle: Mutex::new(VecDeque::new()),
            total: AtomicUsize::new(0),
            config,
            factory: Arc::new(factory),
            keep_alive,
            semaphore: Arc::new(Semaphore::new(hard_limit)),
        });
        spawn_sweeper(shared.clone());
        Self {
            shared,
            request_gate: Arc::new(Semaphore::new(max_requests)),
        }
    }

    /// Checks out an item, creating one if the idle queue is empty and the
    /// pool is under `hard_limit`.
    pub async fn checkout(&self) -> VkResult<Checkout<T>> {
        let _request_permit = self
            .request_gate
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| VkError::Usage("connection pool is shutting down"))?;

        let permit = self
            .shared
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| VkError::Usage("connection pool is shutting down"))?;

        let existing = {
            let mut idle = self.shared.idle.lock().await;
            idle.pop_front()
        };

        let item = match existing {
            Some(entry) => entry.item,
            None => {
                self.shared.total.fetch_add(1, Ordering::SeqCst);
                match (self.shared.factory)().await {
                    Ok(item) => item,
                    Err(e) => {
                        self.shared.total.fetch_sub(1, Ordering::SeqCst);
                        return Err(e);
                    }
                }
            }
        };

        Ok(Checkout {
            item: Some(item),
            shared: self.shared.clone(),
            _permit: permit,
        })
    }

    pub fn idle_len_blocking(&self) -> usize {
        self.shared.idle.blocking_lock().len()
    }

    pub fn total(&self) -> usize {
        self.shared.total.load(Ordering::SeqCst)
    }
}

/// A checked-out item; returning it to the pool happens on drop, placed at
/// the back of the idle queue (FIFO checkin, not a tuned LIFO policy).
pub struct Checkout<T: Send + 'static> {
    item: Option<T>,
    shared: Arc<Shared<T>>,
    _permit: OwnedSemaphorePermit,
}

impl<T: Send + 'static> std::ops::Deref for Checkout<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.item.as_ref().expect("checkout item taken twice")
    }
}

impl<T: Send + 'static> std::ops::DerefMut for Checkout<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("checkout item taken twice")
    }
}

impl<T: Send + 'static> Checkout<T> {
    /// Removes the item from the pool entirely instead of returning it
    /// (e.g. the caller knows the underlying connection is broken).
    pub fn discard(mut self) {
        self.item.take();
        self.shared.total.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T: Send + 'static> Drop for Checkout<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            let shared = self.shared.clone();
            tokio::spawn(async move {
                let mut idle = shared.idle.lock().await;
                idle.push_back(Idle {
                    item,
                    idle_since: Instant::now(),
                });
            });
        }
    }
}

fn spawn_sweeper<T: Send + 'static>(shared: Arc<Shared<T>>) {
    let idle_timeout = shared.config.idle_timeout;
    let keep_alive_frequency = shared.config.keep_alive_frequency;
    let min = shared.config.min;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(keep_alive_frequency);
        loop {
            ticker.tick().await;
            let mut idle = shared.idle.lock().await;
            let now = Instant::now();
            // Entries are pushed to the back on checkin, so the front holds
            // the oldest (longest-idle) item; stop at the first one that's
            // either fresh or would take the pool below `min`.
            let mut removable = idle.len().saturating_sub(min);
            while removable > 0 {
                let expired = idle
                    .front()
                    .map(|entry| now.duration_since(entry.idle_since) >= idle_timeout)
                    .unwrap_or(false);
                if !expired {
                    break;
                }
                idle.pop_front();
                shared.total.fetch_sub(1, Ordering::SeqCst);
                removable -= 1;
            }

            if let Some(keep_alive) = &shared.keep_alive {
                let mut survivors = VecDeque::with_capacity(idle.len());
                while let Some(entry) = idle.pop_front() {
                    if keep_alive(&entry.item).await {
                        survivors.push_back(entry);
                    } else {
                        shared.total.fetch_sub(1, Ordering::SeqCst);
                    }
                }
                *idle = survivors;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory_counter() -> (Arc<Factory<u32>>, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let factory: Arc<Factory<u32>> = Arc::new(move || {
            let counter = counter_clone.clone();
            Box::pin(async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) as u32;
                Ok(n)
            })
        });
        (factory, counter)
    }

    #[tokio::test]
    async fn checkout_creates_then_reuses() {
        let (factory, counter) = factory_counter();
        let pool: Pool<u32> = Pool::new(PoolConfig::default(), move || (factory)());
        {
            let item = pool.checkout().await.unwrap();
            assert_eq!(*item, 0);
        }
        tokio::task::yield_now().await;
        let item2 = pool.checkout().await.unwrap();
        assert_eq!(*item2, 0, "second checkout should reuse the returned item");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn discard_does_not_return_item_to_pool() {
        let (factory, _counter) = factory_counter();
        let pool: Pool<u32> = Pool::new(PoolConfig::default(), move || (factory)());
        let item = pool.checkout().await.unwrap();
        item.discard();
        assert_eq!(pool.total(), 0);
    }

    #[tokio::test]
    async fn hard_limit_bounds_concurrent_checkouts() {
        let (factory, _counter) = factory_counter();
        let mut config = PoolConfig::default();
        config.hard_limit = 1;
        let pool: Pool<u32> = Pool::new(config, move || (factory)());
        let _first = pool.checkout().await.unwrap();
        let second = tokio::time::timeout(std::time::Duration::from_millis(50), pool.checkout()).await;
        assert!(second.is_err(), "second checkout should block while the only slot is held");
    }
}
