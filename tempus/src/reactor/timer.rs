use super::channel::ChannelId;

use std::cmp::Ordering;
use std::time::Instant;

/// A connect deadline in the event loop's timer heap.
///
/// When the deadline passes and the channel is still connecting, the loop
/// fails it with `TimedOut`. Deadlines for channels that connected or
/// closed in the meantime are discarded when popped.
pub(crate) struct TimerEntry {
    /// The time at which the timer should fire.
    pub(crate) deadline: Instant,

    /// Channel the deadline belongs to.
    pub(crate) id: ChannelId,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline.eq(&other.deadline)
    }
}

impl Ord for TimerEntry {
    /// Reversed so that `BinaryHeap<TimerEntry>` pops the earliest deadline.
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline)
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::TimerEntry;
    use crate::reactor::channel::ChannelId;

    use std::collections::BinaryHeap;
    use std::time::{Duration, Instant};

    #[test]
    fn test_heap_pops_earliest_deadline() {
        let now = Instant::now();
        let mut heap = BinaryHeap::new();

        for secs in [30, 10, 20] {
            heap.push(TimerEntry {
                deadline: now + Duration::from_secs(secs),
                id: ChannelId::next(),
            });
        }

        let order: Vec<_> = std::iter::from_fn(|| heap.pop())
            .map(|t| t.deadline.duration_since(now).as_secs())
            .collect();
        assert_eq!(order, vec![10, 20, 30]);
    }
}
