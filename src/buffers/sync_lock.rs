use crate::core::TimeStamp;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReaderId(usize);

#[derive(Default)]
struct Readers {
    next_id: usize,
    positions: HashMap<ReaderId, TimeStamp>,
}

/// Couples a ring writer to its readers for deterministic, non-real-time runs.
///
/// Each reader publishes the oldest timestamp it may still read. The writer
/// waits before overwriting anything a registered reader still needs.
#[derive(Default)]
pub struct SyncLock {
    readers: Mutex<Readers>,
    changed: Condvar,
}

impl SyncLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, position: TimeStamp) -> ReaderId {
        let mut readers = self.readers.lock();
        let id = ReaderId(readers.next_id);
        readers.next_id += 1;
        readers.positions.insert(id, position);
        id
    }

    /// Declare that `reader` no longer needs samples before `position`.
    pub fn advance(&self, reader: ReaderId, position: TimeStamp) {
        let mut readers = self.readers.lock();
        if let Some(current) = readers.positions.get_mut(&reader) {
            if position > *current {
                *current = position;
                self.changed.notify_all();
            }
        }
    }

    pub fn unregister(&self, reader: ReaderId) {
        let mut readers = self.readers.lock();
        if readers.positions.remove(&reader).is_some() {
            self.changed.notify_all();
        }
    }

    /// Oldest position still needed, `None` without readers.
    pub fn min_position(&self) -> Option<TimeStamp> {
        self.readers.lock().positions.values().min().copied()
    }

    pub fn nr_readers(&self) -> usize {
        self.readers.lock().positions.len()
    }

    /// Block until every reader has moved to `position` or beyond.
    pub fn wait_for_readers(&self, position: TimeStamp) {
        let mut readers = self.readers.lock();
        while readers.positions.values().any(|&p| p < position) {
            self.changed.wait(&mut readers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_writer_waits_for_slowest_reader() {
        let lock = Arc::new(SyncLock::new());
        let fast = lock.register(TimeStamp(100));
        let slow = lock.register(TimeStamp(10));
        assert_eq!(lock.min_position(), Some(TimeStamp(10)));

        let writer_lock = lock.clone();
        let writer = thread::spawn(move || writer_lock.wait_for_readers(TimeStamp(50)));

        thread::sleep(Duration::from_millis(20));
        assert!(!writer.is_finished());

        lock.advance(fast, TimeStamp(200));
        lock.advance(slow, TimeStamp(60));
        writer.join().unwrap();
    }

    #[test]
    fn test_unregister_releases_writer() {
        let lock = SyncLock::new();
        let reader = lock.register(TimeStamp(0));
        lock.unregister(reader);
        assert_eq!(lock.nr_readers(), 0);
        lock.wait_for_readers(TimeStamp(1_000));
    }
}
