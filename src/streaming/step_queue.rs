//! Single-threaded cooperative step queue
//!
//! Holds resumable main-thread steps ordered by priority. The owner pops one
//! step per tick, runs it, and pushes it back with [`StepQueue::requeue`] if
//! it reported more work. Requeued steps keep their sequence number so equal
//! priority steps stay FIFO.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Sequence number assigned on first push
pub type StepId = u64;

/// A step popped from the queue
#[derive(Debug)]
pub struct QueuedStep<T> {
    pub id: StepId,
    pub priority: i32,
    pub name: String,
    pub item: T,
}

impl<T> Eq for QueuedStep<T> {}

impl<T> PartialEq for QueuedStep<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Ord for QueuedStep<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then lower sequence first
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl<T> PartialOrd for QueuedStep<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Outcome of running one step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepStatus {
    /// Not finished, run again on a later tick
    Continue,
    /// Finished, drop the step
    Done,
}

/// Priority queue of cooperative steps
#[derive(Debug)]
pub struct StepQueue<T> {
    heap: BinaryHeap<QueuedStep<T>>,
    next_id: StepId,
}

impl<T> Default for StepQueue<T> {
    fn default() -> Self {
        Self { heap: BinaryHeap::new(), next_id: 0 }
    }
}

impl<T> StepQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step
    pub fn push(&mut self, item: T, priority: i32, name: impl Into<String>) -> StepId {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(QueuedStep { id, priority, name: name.into(), item });
        id
    }

    /// Put a popped step back without losing its place among equal priorities
    pub fn requeue(&mut self, step: QueuedStep<T>) {
        self.heap.push(step);
    }

    /// Take the highest priority step
    pub fn pop(&mut self) -> Option<QueuedStep<T>> {
        self.heap.pop()
    }

    pub fn peek(&self) -> Option<&QueuedStep<T>> {
        self.heap.peek()
    }

    /// Drop every step for which `keep` returns false
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.heap.retain(|step| keep(&step.item));
    }

    pub fn any(&self, mut pred: impl FnMut(&T) -> bool) -> bool {
        self.heap.iter().any(|step| pred(&step.item))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
