//! Bounded, priority-ordered run queue.

use std::collections::VecDeque;

use crate::domain::{InstanceId, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    id: InstanceId,
    priority: Priority,
}

/// Front of the queue runs next.
///
/// Insertion is stable: a new entry goes in front of the first entry with a
/// strictly lower priority, so equal priorities stay FIFO.
#[derive(Debug)]
pub struct PriorityQueue {
    entries: VecDeque<Entry>,
    capacity: usize,
}

/// Returned when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull {
    pub capacity: usize,
}

impl PriorityQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    pub fn push(&mut self, id: InstanceId, priority: Priority) -> Result<(), QueueFull> {
        if self.entries.len() >= self.capacity {
            return Err(QueueFull {
                capacity: self.capacity,
            });
        }
        let at = self
            .entries
            .iter()
            .position(|entry| priority.outranks(entry.priority))
            .unwrap_or(self.entries.len());
        self.entries.insert(at, Entry { id, priority });
        Ok(())
    }

    pub fn pop(&mut self) -> Option<InstanceId> {
        self.entries.pop_front().map(|entry| entry.id)
    }

    pub fn remove(&mut self, id: InstanceId) -> bool {
        match self.entries.iter().position(|entry| entry.id == id) {
            Some(at) => {
                self.entries.remove(at);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
