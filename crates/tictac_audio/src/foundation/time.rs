//! Time management utilities
//!
//! The audio core never sleeps or blocks. Anything that has to happen "later"
//! (fade completion, paced queue replay, polling for a slow asset) becomes an
//! entry on a [`Timeline`], which the owner drains from its per-tick update.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

/// High-precision timer for frame timing
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new timer
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Update the timer (should be called once per frame)
    pub fn update(&mut self) {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.total_time += self.delta_time;
        self.last_frame = now;
        self.frame_count += 1;
    }

    /// Get the time since the last frame in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Get the total elapsed time since timer creation
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Get the current frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

/// One scheduled entry; ordered by due time, then by insertion order
struct Scheduled<T> {
    due: f64,
    seq: u64,
    task: T,
}

impl<T> PartialEq for Scheduled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Scheduled<T> {}

impl<T> PartialOrd for Scheduled<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Scheduled<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the earliest entry first
        other
            .due
            .total_cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Deferred task queue keyed by due time (seconds on the owner's clock)
///
/// Tasks due at the same instant fire in the order they were scheduled.
pub struct Timeline<T> {
    heap: BinaryHeap<Scheduled<T>>,
    next_seq: u64,
}

impl<T> Timeline<T> {
    /// Create an empty timeline
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedule `task` to fire once the clock reaches `due`
    pub fn schedule(&mut self, due: f64, task: T) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.heap.push(Scheduled { due, seq, task });
    }

    /// Remove and return every task due at or before `now`, earliest first
    pub fn drain_due(&mut self, now: f64) -> Vec<T> {
        let mut due = Vec::new();
        while self.heap.peek().is_some_and(|entry| entry.due <= now) {
            if let Some(entry) = self.heap.pop() {
                due.push(entry.task);
            }
        }
        due
    }

    /// Drop every task that matches `predicate`
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&T) -> bool) {
        self.heap.retain(|entry| !predicate(&entry.task));
    }

    /// Number of tasks still waiting
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether nothing is scheduled
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl<T> Default for Timeline<T> {
    fn default() -> Self {
        Self::new()
    }
}
