//! Priority admission queue shared between producer threads and the render
//! thread.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use parking_lot::Mutex;

/// Priority-ordered, FIFO-within-tier queue.
///
/// Any thread may enqueue; only the render thread dequeues. One coarse lock
/// guards the whole structure, which is cheap next to the GPU work each item
/// represents.
pub struct PriorityAdmissionQueue<T> {
    tiers: Mutex<BTreeMap<i32, VecDeque<T>>>,
}

impl<T> PriorityAdmissionQueue<T> {
    pub fn new() -> Self {
        Self {
            tiers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Append `item` to the tail of its priority tier.
    pub fn enqueue(&self, priority: i32, item: T) {
        self.tiers
            .lock()
            .entry(priority)
            .or_default()
            .push_back(item);
    }

    /// Put `item` back at the head of its tier, ahead of anything that
    /// arrived while it was out.
    pub fn requeue_front(&self, priority: i32, item: T) {
        self.tiers
            .lock()
            .entry(priority)
            .or_default()
            .push_front(item);
    }

    /// Oldest item of the numerically highest tier.
    pub fn dequeue(&self) -> Option<(i32, T)> {
        let mut tiers = self.tiers.lock();
        let mut entry = tiers.last_entry()?;
        let priority = *entry.key();
        let item = entry.get_mut().pop_front();
        if entry.get().is_empty() {
            entry.remove();
        }
        item.map(|item| (priority, item))
    }

    pub fn len(&self) -> usize {
        self.tiers.lock().values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.lock().is_empty()
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.lock().len()
    }

    /// Drop every pending item, returning how many were removed.
    pub fn clear(&self) -> usize {
        let mut tiers = self.tiers.lock();
        let removed = tiers.values().map(VecDeque::len).sum();
        tiers.clear();
        removed
    }
}

impl<T> Default for PriorityAdmissionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for PriorityAdmissionQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("PriorityAdmissionQueue");
        match self.tiers.try_lock() {
            Some(tiers) => {
                debug
                    .field("tier_count", &tiers.len())
                    .field(
                        "pending",
                        &tiers.values().map(VecDeque::len).sum::<usize>(),
                    );
            }
            None => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}
