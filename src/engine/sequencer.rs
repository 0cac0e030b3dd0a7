use parking_lot::{Condvar, Mutex};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

struct BarrierState {
    /// Next block allowed through.
    next: u64,
    /// Blocks ahead of `next` that will never arrive.
    skipped: BTreeSet<u64>,
}

/// Puts one subband's blocks back into order after out-of-order completion.
///
/// A post-processor holding block `k` calls `wait_for(k)`, forwards the block,
/// then `advance_to(k + 1)`. Blocks dropped before reaching a post-processor
/// are announced with `skip` so nobody waits for them.
pub struct OrderBarrier {
    state: Mutex<BarrierState>,
    changed: Condvar,
}

impl OrderBarrier {
    pub fn new(first_block: u64) -> Self {
        Self {
            state: Mutex::new(BarrierState {
                next: first_block,
                skipped: BTreeSet::new(),
            }),
            changed: Condvar::new(),
        }
    }

    pub fn current(&self) -> u64 {
        self.state.lock().next
    }

    /// Wait until `block` is next in line.
    ///
    /// Returns `false` if the barrier already moved past `block`.
    pub fn wait_for(&self, block: u64) -> bool {
        let mut state = self.state.lock();
        while state.next < block {
            self.changed.wait(&mut state);
        }
        state.next == block
    }

    /// Like `wait_for`, giving up after `timeout`.
    pub fn wait_for_timeout(&self, block: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.next < block {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.next == block
    }

    /// Let `block` through, along with any skipped blocks directly after it.
    pub fn advance_to(&self, block: u64) {
        let mut state = self.state.lock();
        if block > state.next {
            state.next = block;
        }
        Self::pass_skipped(&mut state);
        self.changed.notify_all();
    }

    /// Mark `block` as never arriving.
    pub fn skip(&self, block: u64) {
        let mut state = self.state.lock();
        if block < state.next {
            return;
        }
        state.skipped.insert(block);
        Self::pass_skipped(&mut state);
        self.changed.notify_all();
    }

    fn pass_skipped(state: &mut BarrierState) {
        let next = state.next;
        state.skipped.retain(|&b| b >= next);
        while state.skipped.remove(&state.next) {
            state.next += 1;
        }
    }
}

/// One order barrier per subband.
pub struct Sequencer {
    barriers: Vec<OrderBarrier>,
}

impl Sequencer {
    pub fn new(nr_subbands: usize, first_block: u64) -> Self {
        Self {
            barriers: (0..nr_subbands).map(|_| OrderBarrier::new(first_block)).collect(),
        }
    }

    pub fn nr_subbands(&self) -> usize {
        self.barriers.len()
    }

    /// Barrier of a local subband index.
    pub fn barrier(&self, subband: usize) -> &OrderBarrier {
        &self.barriers[subband]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_ahead_is_passed_on_advance() {
        let barrier = OrderBarrier::new(0);
        barrier.skip(1);
        barrier.skip(2);
        assert_eq!(barrier.current(), 0);

        barrier.advance_to(1);
        assert_eq!(barrier.current(), 3);
    }

    #[test]
    fn test_skip_current_moves_on() {
        let barrier = OrderBarrier::new(5);
        barrier.skip(5);
        assert_eq!(barrier.current(), 6);
        // old news
        barrier.skip(2);
        assert_eq!(barrier.current(), 6);
        assert!(!barrier.wait_for(5));
        assert!(barrier.wait_for(6));
    }

    #[test]
    fn test_wait_times_out() {
        let barrier = OrderBarrier::new(0);
        assert!(!barrier.wait_for_timeout(1, Duration::from_millis(10)));
        assert!(barrier.wait_for_timeout(0, Duration::from_millis(10)));
    }
}
