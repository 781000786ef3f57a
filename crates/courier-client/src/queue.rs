// Priority queue feeding the inbound command workers.
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

/// Unbounded max-heap on priority, FIFO on ties via a sequence number. Safe
/// for many producers and many consumers.
pub(crate) struct PriorityQueue<T> {
    state: Mutex<State<T>>,
    available: Notify,
}

struct State<T> {
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

struct Entry<T> {
    priority: i64,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Highest priority first; earliest insertion wins a tie.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PriorityQueue<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                heap: BinaryHeap::with_capacity(capacity),
                next_seq: 0,
            }),
            available: Notify::new(),
        }
    }

    pub(crate) fn push(&self, priority: i64, item: T) {
        let mut state = self.state.lock().expect("queue lock");
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Entry {
            priority,
            seq,
            item,
        });
        drop(state);
        self.available.notify_one();
    }

    fn try_pop(&self) -> Option<T> {
        let mut state = self.state.lock().expect("queue lock");
        let entry = state.heap.pop()?;
        if !state.heap.is_empty() {
            // Pass the wakeup along so sibling consumers keep draining.
            self.available.notify_one();
        }
        Some(entry.item)
    }

    /// Next item by priority, or `None` once `timeout` elapses.
    pub(crate) async fn poll(&self, timeout: Duration) -> Option<T> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            let notified = self.available.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().expect("queue lock").heap.len()
    }
}
