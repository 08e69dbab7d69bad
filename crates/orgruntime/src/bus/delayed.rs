//! The delayed-delivery min-heap, keyed on `(deliverAt, sendSeq)` so that
//! two envelopes sharing a `deliverAt` are delivered in send order
//! (spec.md §4.1 "Delayed queue", Property 5).

use orgkernel::Envelope;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct DelayedEntry {
    deliver_at: u64,
    seq: usize,
    envelope: Envelope,
}

// `BinaryHeap` is a max-heap; reversing the comparison turns it into a
// min-heap ordered by `(deliver_at, seq)` ascending.
impl Ord for DelayedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deliver_at
            .cmp(&self.deliver_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for DelayedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DelayedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deliver_at == other.deliver_at && self.seq == other.seq
    }
}

impl Eq for DelayedEntry {}

#[derive(Default)]
pub(super) struct DelayedQueue {
    heap: BinaryHeap<DelayedEntry>,
}

impl DelayedQueue {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn push(&mut self, deliver_at: u64, seq: usize, envelope: Envelope) {
        self.heap.push(DelayedEntry { deliver_at, seq, envelope });
    }

    /// Pop every entry with `deliver_at <= now`, in delivery order.
    pub(super) fn pop_due(&mut self, now: u64) -> Vec<Envelope> {
        let mut due = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.deliver_at > now {
                break;
            }
            due.push(self.heap.pop().unwrap().envelope);
        }
        due
    }

    pub(super) fn drain_all(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.heap).into_sorted_vec().into_iter().map(|e| e.envelope).collect()
    }

    pub(super) fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(n: u32) -> Envelope {
        Envelope::new("a", "b", serde_json::json!({ "n": n }))
    }

    #[test]
    fn pop_due_respects_deliver_at_then_seq() {
        let mut q = DelayedQueue::new();
        q.push(100, 0, env(1));
        q.push(100, 1, env(2));
        q.push(50, 2, env(3));
        let due = q.pop_due(100);
        let ns: Vec<u32> = due.iter().map(|e| e.payload["n"].as_u64().unwrap() as u32).collect();
        assert_eq!(ns, vec![3, 1, 2]);
    }

    #[test]
    fn pop_due_leaves_future_entries() {
        let mut q = DelayedQueue::new();
        q.push(10, 0, env(1));
        q.push(20, 1, env(2));
        assert_eq!(q.pop_due(15).len(), 1);
        assert_eq!(q.len(), 1);
    }
}
