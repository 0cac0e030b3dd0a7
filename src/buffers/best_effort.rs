use crate::resilience::OverflowPolicy;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

struct QueueState<T> {
    items: VecDeque<T>,
    no_more: bool,
}

/// Bounded queue between post-processing and a subband writer.
///
/// With `OverflowPolicy::Drop` a full queue rejects the item immediately and
/// hands it back, so the caller can recycle it and count the drop.
pub struct BestEffortQueue<T> {
    name: String,
    capacity: usize,
    policy: OverflowPolicy,
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BestEffortQueue<T> {
    pub fn new(name: impl Into<String>, capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            name: name.into(),
            capacity,
            policy,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                no_more: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Enqueue `item`, or give it back if the queue is full (drop policy) or closed.
    pub fn append(&self, item: T) -> Result<(), T> {
        let mut state = self.state.lock();

        while state.items.len() >= self.capacity && !state.no_more {
            match self.policy {
                OverflowPolicy::Drop => return Err(item),
                OverflowPolicy::Block => self.not_full.wait(&mut state),
            }
        }
        if state.no_more {
            return Err(item);
        }

        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Next item, waiting for one; `None` after `no_more` once drained.
    pub fn remove(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if state.no_more {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Mark end-of-stream: producers are done.
    pub fn no_more(&self) {
        let mut state = self.state.lock();
        state.no_more = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_queue_hands_item_back() {
        let queue = BestEffortQueue::new("sb0", 2, OverflowPolicy::Drop);
        assert!(queue.append(1).is_ok());
        assert!(queue.append(2).is_ok());
        assert_eq!(queue.append(3), Err(3));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.remove(), Some(1));
        assert!(queue.append(4).is_ok());
    }

    #[test]
    fn test_drains_before_reporting_end() {
        let queue = BestEffortQueue::new("sb0", 4, OverflowPolicy::Drop);
        queue.append("a").unwrap();
        queue.no_more();
        assert_eq!(queue.append("b"), Err("b"));
        assert_eq!(queue.remove(), Some("a"));
        assert_eq!(queue.remove(), None);
    }
}
