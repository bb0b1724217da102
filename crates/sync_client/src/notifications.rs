use std::collections::VecDeque;

use shared::domain::NotificationEvent;

/// Bounded FIFO of dashboard notifications. When full, the oldest entry is
/// evicted silently; eviction never produces a notification of its own.
/// Capacity 0 is honored: every push is discarded.
pub struct NotificationQueue {
    entries: VecDeque<NotificationEvent>,
    capacity: usize,
}

impl NotificationQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: NotificationEvent) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }

    /// Newest-first view for presentation. `None` returns everything.
    pub fn list(&self, limit: Option<usize>) -> Vec<NotificationEvent> {
        let limit = limit.unwrap_or(self.entries.len());
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
