//! FIFO queue of connections waiting for a partner

use crate::types::ConnectionId;
use std::collections::VecDeque;

/// Ordered queue of waiting connections
///
/// Duplicate admission is prevented by the engine, not by the queue.
#[derive(Debug, Default, Clone)]
pub struct WaitingQueue {
    entries: VecDeque<ConnectionId>,
}

impl WaitingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a connection to the tail
    pub fn enqueue(&mut self, id: ConnectionId) {
        debug_assert!(!self.contains(&id), "connection {} queued twice", id);
        self.entries.push_back(id);
    }

    /// Remove and return the oldest entry
    pub fn dequeue_head(&mut self) -> Option<ConnectionId> {
        self.entries.pop_front()
    }

    /// Remove a connection if present
    pub fn remove(&mut self, id: &ConnectionId) -> bool {
        match self.position(id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.entries.contains(id)
    }

    /// Zero-based distance from the head
    pub fn position(&self, id: &ConnectionId) -> Option<usize> {
        self.entries.iter().position(|entry| entry == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the queue, head first
    pub fn snapshot(&self) -> Vec<ConnectionId> {
        self.entries.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = WaitingQueue::new();
        let ids: Vec<ConnectionId> = (0..3).map(|_| ConnectionId::new()).collect();
        for id in &ids {
            queue.enqueue(*id);
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue_head(), Some(ids[0]));
        assert_eq!(queue.dequeue_head(), Some(ids[1]));
        assert_eq!(queue.dequeue_head(), Some(ids[2]));
        assert_eq!(queue.dequeue_head(), None);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut queue = WaitingQueue::new();
        let first = ConnectionId::new();
        let second = ConnectionId::new();
        queue.enqueue(first);
        queue.enqueue(second);

        assert!(queue.remove(&first));
        assert!(!queue.remove(&first));
        assert_eq!(queue.snapshot(), vec![second]);
        assert_eq!(queue.position(&second), Some(0));
    }
}
