//! # Lamport Logical Clock
//!
//! A process-wide monotonic counter used to impose a causal partial order on
//! distributed events. Every component that sends a message ticks the clock
//! and stamps the outgoing envelope; every receiver merges the incoming
//! timestamp before acting on the message.

use std::sync::Mutex;

/// Process-wide Lamport clock.
///
/// All three operations are short critical sections on one mutex, so
/// concurrent callers observe a total order: a value returned by `tick` or
/// `merge` is strictly greater than any value previously observed by the
/// same caller. The lock is never held across I/O.
#[derive(Debug, Default)]
pub struct LamportClock {
    time: Mutex<u64>,
}

impl LamportClock {
    pub fn new() -> Self {
        Self {
            time: Mutex::new(0),
        }
    }

    /// Advance the clock for a local event and return the new value.
    pub fn tick(&self) -> u64 {
        let mut time = self.lock();
        *time += 1;
        *time
    }

    /// Merge a timestamp received from another process: the clock jumps to
    /// `max(local, received) + 1`, which preserves the happened-before
    /// relation across nodes. Returns the new value.
    pub fn merge(&self, received: u64) -> u64 {
        let mut time = self.lock();
        *time = (*time).max(received).saturating_add(1);
        *time
    }

    /// Read the current value without advancing it.
    pub fn read(&self) -> u64 {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, u64> {
        // A poisoned lock still holds a valid count; recover it.
        self.time.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_strictly_increasing() {
        let clock = LamportClock::new();
        let mut previous = clock.read();
        for _ in 0..100 {
            let next = clock.tick();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn merge_jumps_past_remote_timestamp() {
        let clock = LamportClock::new();
        clock.tick();
        clock.tick();

        // A message from a process that is far ahead pulls us forward.
        let merged = clock.merge(50);
        assert_eq!(merged, 51);
        assert_eq!(clock.read(), 51);

        // A message from a process that is behind still counts as an event.
        let merged = clock.merge(10);
        assert_eq!(merged, 52);
    }

    #[test]
    fn merge_with_zero_behaves_like_tick() {
        let clock = LamportClock::new();
        assert_eq!(clock.merge(0), 1);
        assert_eq!(clock.merge(0), 2);
    }

    #[test]
    fn merge_near_max_saturates() {
        let clock = LamportClock::new();
        assert_eq!(clock.merge(u64::MAX - 1), u64::MAX);
        // Saturates rather than wrapping back to zero.
        assert_eq!(clock.merge(u64::MAX), u64::MAX);
        assert_eq!(clock.read(), u64::MAX);
    }

    #[test]
    fn causal_chain_orders_messages() {
        // A send at node one, received and reacted to at node two, must
        // produce a second message with a strictly larger timestamp.
        let node_one = LamportClock::new();
        let node_two = LamportClock::new();

        let sent = node_one.tick();
        node_two.merge(sent);
        let reply = node_two.tick();

        assert!(reply > sent);
    }
}
