//! Cancellable timer queue on a virtual clock.
//!
//! The controller never sleeps itself. It schedules [`TimerQueue`] entries and
//! the async driver sleeps until [`TimerQueue::next_deadline`], then calls
//! [`TimerQueue::advance_to`] with the elapsed time. Tests drive the clock by
//! hand, which keeps every reveal and settle step deterministic.

use std::collections::BTreeMap;
use std::time::Duration;

/// Handle to a scheduled task, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    due: Duration,
    seq: u64,
}

/// Ordered queue of delayed tasks.
///
/// Tasks fire in deadline order; tasks sharing a deadline fire in the order
/// they were scheduled. A cancelled task is never returned.
#[derive(Debug)]
pub struct TimerQueue<T> {
    now: Duration,
    next_seq: u64,
    entries: BTreeMap<(Duration, u64), T>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_seq: 0,
            entries: BTreeMap::new(),
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedule `task` to fire `delay` after the current virtual time.
    pub fn schedule(&mut self, delay: Duration, task: T) -> TimerHandle {
        let handle = TimerHandle {
            due: self.now + delay,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.entries.insert((handle.due, handle.seq), task);
        handle
    }

    /// Cancel a pending task. Returns `false` if it already fired or was
    /// cancelled before.
    pub fn cancel(&mut self, handle: &TimerHandle) -> bool {
        self.entries.remove(&(handle.due, handle.seq)).is_some()
    }

    /// Deadline of the earliest pending task.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.entries.keys().next().map(|(due, _)| *due)
    }

    /// Move the clock forward and remove every task that is now due.
    ///
    /// The clock never moves backwards; an earlier `now` only collects tasks
    /// that were already due.
    pub fn advance_to(&mut self, now: Duration) -> Vec<T> {
        if now > self.now {
            self.now = now;
        }
        let mut due = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > self.now {
                break;
            }
            due.push(entry.remove());
        }
        due
    }

    /// Pop the single earliest due task, if any, without moving the clock.
    pub fn pop_due(&mut self) -> Option<T> {
        let entry = self.entries.first_entry()?;
        if entry.key().0 > self.now {
            return None;
        }
        Some(entry.remove())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_fires_in_deadline_order() {
        let mut q = TimerQueue::new();
        q.schedule(ms(30), "c");
        q.schedule(ms(10), "a");
        q.schedule(ms(20), "b");
        assert_eq!(q.advance_to(ms(30)), vec!["a", "b", "c"]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_same_deadline_keeps_schedule_order() {
        let mut q = TimerQueue::new();
        q.schedule(ms(5), 1);
        q.schedule(ms(5), 2);
        q.schedule(ms(5), 3);
        assert_eq!(q.advance_to(ms(5)), vec![1, 2, 3]);
    }

    #[test]
    fn test_not_due_yet() {
        let mut q = TimerQueue::new();
        q.schedule(ms(10), ());
        assert!(q.advance_to(ms(9)).is_empty());
        assert_eq!(q.next_deadline(), Some(ms(10)));
        assert_eq!(q.advance_to(ms(10)).len(), 1);
    }

    #[test]
    fn test_cancelled_task_never_fires() {
        let mut q = TimerQueue::new();
        let h = q.schedule(ms(1), "gone");
        q.schedule(ms(2), "kept");
        assert!(q.cancel(&h));
        assert!(!q.cancel(&h));
        assert_eq!(q.advance_to(ms(100)), vec!["kept"]);
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let mut q = TimerQueue::new();
        let h = q.schedule(ms(1), 7);
        assert_eq!(q.advance_to(ms(1)), vec![7]);
        assert!(!q.cancel(&h));
    }

    #[test]
    fn test_schedule_is_relative_to_now() {
        let mut q = TimerQueue::new();
        q.advance_to(ms(100));
        q.schedule(ms(5), ());
        assert_eq!(q.next_deadline(), Some(ms(105)));
    }

    #[test]
    fn test_clock_never_goes_backwards() {
        let mut q: TimerQueue<()> = TimerQueue::new();
        q.advance_to(ms(50));
        q.advance_to(ms(10));
        assert_eq!(q.now(), ms(50));
    }

    #[test]
    fn test_pop_due_one_at_a_time() {
        let mut q = TimerQueue::new();
        q.schedule(ms(0), 'x');
        q.schedule(ms(0), 'y');
        q.schedule(ms(9), 'z');
        assert_eq!(q.pop_due(), Some('x'));
        assert_eq!(q.pop_due(), Some('y'));
        assert_eq!(q.pop_due(), None);
        assert_eq!(q.len(), 1);
    }
}
