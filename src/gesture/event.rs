use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// One debounced proximity transition.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub is_near: bool,
    pub timestamp: Duration,
}

impl Event {
    pub fn new(is_near: bool, timestamp: Duration) -> Self {
        Self { is_near, timestamp }
    }
}

/// Bounded FIFO of the most recent transitions, oldest first.
///
/// Every recorded event gets an ordinal that keeps counting across evictions
/// and clears, so callers can refer to a specific transition after the buffer
/// has shifted.
#[derive(Debug, Clone)]
pub struct EventHistory {
    events: VecDeque<Event>,
    capacity: usize,
    recorded: u64,
}

impl EventHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            recorded: 0,
        }
    }

    /// Records a transition unless it repeats the latest polarity.
    ///
    /// Returns `true` when the event was recorded.
    pub fn append(&mut self, is_near: bool, timestamp: Duration) -> bool {
        if self.last().is_some_and(|last| last.is_near == is_near) {
            return false;
        }

        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }

        self.events.push_back(Event::new(is_near, timestamp));
        self.recorded += 1;
        true
    }

    /// Raises the capacity; a smaller value is ignored so no history is lost.
    pub fn grow_capacity(&mut self, capacity: usize) {
        if capacity > self.capacity {
            self.events.reserve(capacity - self.capacity);
            self.capacity = capacity;
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&Event> {
        self.events.back()
    }

    pub fn get(&self, position: usize) -> Option<&Event> {
        self.events.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.iter().copied().collect()
    }

    /// Ordinal of the event currently stored at `position` (0 = oldest).
    /// The first event ever recorded has ordinal 0.
    pub fn ordinal_of(&self, position: usize) -> Option<u64> {
        if position >= self.events.len() {
            return None;
        }
        let oldest = self.recorded - self.events.len() as u64;
        Some(oldest + position as u64)
    }

    /// Ordinal of the most recently recorded event.
    pub fn last_ordinal(&self) -> Option<u64> {
        self.events.len().checked_sub(1).and_then(|pos| self.ordinal_of(pos))
    }
}
