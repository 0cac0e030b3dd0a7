use crate::error::PoolError;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Fixed set of reusable objects cycling between a `free` and a `filled` queue.
///
/// Producers take from `free`, fill, and append to `filled`; consumers remove
/// from `filled` and drop the entry when done, which returns it to `free`.
/// Every object is in `free`, in `filled`, or held by exactly one thread.
pub struct Pool<T> {
    name: String,
    capacity: usize,
    free: FreeQueue<T>,
    filled: FilledQueue<T>,
}

impl<T> Pool<T> {
    pub fn new(name: impl Into<String>, capacity: usize, mut factory: impl FnMut() -> T) -> Self {
        let name = name.into();
        let (free_tx, free_rx) = bounded(capacity);
        // One extra slot for the end-of-stream marker.
        let (filled_tx, filled_rx) = bounded(capacity + 1);

        for _ in 0..capacity {
            // cannot fail: the channel was sized for exactly this many
            let _ = free_tx.try_send(factory());
        }

        log::debug!("pool {} created with {} entries", name, capacity);

        Self {
            free: FreeQueue {
                tx: free_tx,
                rx: free_rx,
                name: name.clone(),
            },
            filled: FilledQueue {
                tx: filled_tx,
                rx: filled_rx,
                ended: AtomicBool::new(false),
                name: name.clone(),
            },
            name,
            capacity,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total number of objects owned by the pool.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free(&self) -> &FreeQueue<T> {
        &self.free
    }

    pub fn filled(&self) -> &FilledQueue<T> {
        &self.filled
    }

    /// Objects currently held by some thread (neither free nor filled).
    pub fn nr_held(&self) -> usize {
        self.capacity
            .saturating_sub(self.free.len())
            .saturating_sub(self.filled.len())
    }
}

pub struct FreeQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    name: String,
}

impl<T> FreeQueue<T> {
    /// Take an object, waiting until one is returned.
    pub fn remove(&self) -> Result<PoolEntry<T>, PoolError> {
        self.rx
            .recv()
            .map(|value| self.wrap(value))
            .map_err(|_| PoolError::Closed(self.name.clone()))
    }

    /// Take an object, giving up after `timeout`.
    pub fn remove_timeout(&self, timeout: Duration) -> Option<PoolEntry<T>> {
        self.rx.recv_timeout(timeout).ok().map(|value| self.wrap(value))
    }

    pub fn try_remove(&self) -> Option<PoolEntry<T>> {
        self.rx.try_recv().ok().map(|value| self.wrap(value))
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    fn wrap(&self, value: T) -> PoolEntry<T> {
        PoolEntry {
            value: Some(value),
            home: self.tx.clone(),
        }
    }
}

pub struct FilledQueue<T> {
    tx: Sender<Option<PoolEntry<T>>>,
    rx: Receiver<Option<PoolEntry<T>>>,
    ended: AtomicBool,
    name: String,
}

impl<T> FilledQueue<T> {
    /// Hand a filled object to the consumer. Never waits: the queue can hold
    /// every object of the pool.
    pub fn append(&self, entry: PoolEntry<T>) -> Result<(), PoolError> {
        self.tx
            .send(Some(entry))
            .map_err(|_| PoolError::Closed(self.name.clone()))
    }

    /// Signal end-of-stream to the consumer.
    pub fn no_more(&self) {
        let _ = self.tx.send(None);
    }

    /// Next filled object, or `None` once the end-of-stream marker is reached.
    pub fn remove(&self) -> Option<PoolEntry<T>> {
        if self.ended.load(Ordering::Acquire) {
            return None;
        }
        match self.rx.recv() {
            Ok(Some(entry)) => Some(entry),
            Ok(None) | Err(_) => {
                self.ended.store(true, Ordering::Release);
                None
            }
        }
    }

    /// Number of queued objects, the end-of-stream marker included.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// An object taken out of a pool. Dropping it returns the object to `free`.
pub struct PoolEntry<T> {
    value: Option<T>,
    home: Sender<T>,
}

impl<T> PoolEntry<T> {
    /// Return the object to its pool now.
    pub fn recycle(self) {
        drop(self);
    }
}

impl<T> Drop for PoolEntry<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            // The free queue has room for every object, so this only fails
            // once the pool itself is gone.
            let _ = self.home.try_send(value);
        }
    }
}

impl<T> std::ops::Deref for PoolEntry<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self.value.as_ref() {
            Some(value) => value,
            None => unreachable!("PoolEntry accessed after recycle"),
        }
    }
}

impl<T> std::ops::DerefMut for PoolEntry<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.value.as_mut() {
            Some(value) => value,
            None => unreachable!("PoolEntry accessed after recycle"),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for PoolEntry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PoolEntry").field(&self.value).finish()
    }
}
