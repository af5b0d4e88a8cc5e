//! Bounded staged pipeline (§4.1).
//!
//! A [`Pipeline`] owns `N` FIFO stages, each guarded by its own mutex and
//! condition variable (§5: "Pipelines use a mutex + condition variable per
//! stage"). `queue` never blocks and the pipeline itself never drops items
//! — back-pressure and the drop policy belong to the caller (§4.3), which
//! uses [`Pipeline::try_pop`] to evict items from the back of the pipeline.
//!
//! Per the Design Note "shared pipeline base class", there is one concrete
//! `Pipeline` type instead of a builder/sender class hierarchy: routing
//! between stages is a plain closure supplied at construction.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// A stage's queue and its stopped flag share one mutex, so a waiter's
/// stopped-check and its `wait()` call are atomic with respect to `stop()`'s
/// flag flip and `notify_all` — otherwise a `stop()` landing between the
/// check and the wait would be lost and the waiter would block forever.
struct StageState<T> {
    queue: VecDeque<T>,
    stopped: bool,
}

struct Stage<T> {
    state: Mutex<StageState<T>>,
    not_empty: Condvar,
}

impl<T> Stage<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(StageState {
                queue: VecDeque::new(),
                stopped: false,
            }),
            not_empty: Condvar::new(),
        }
    }
}

/// A bounded-stage-count, unbounded-per-stage FIFO pipeline.
///
/// `T` is the item type moved through the pipeline by ownership transfer —
/// nothing here ever clones an item.
pub struct Pipeline<T> {
    stages: Vec<Stage<T>>,
}

impl<T> Pipeline<T> {
    /// Creates a pipeline with `n_stages` independently-locked FIFOs.
    pub fn new(n_stages: usize) -> Self {
        assert!(n_stages > 0, "a pipeline needs at least one stage");
        Self {
            stages: (0..n_stages).map(|_| Stage::new()).collect(),
        }
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    /// Transfers ownership of `item` into `stage_id`'s FIFO. Never blocks
    /// and never drops — callers that need a bound must evict with
    /// [`Self::try_pop`] themselves before calling `queue`.
    pub fn queue(&self, stage_id: usize, item: T) {
        let stage = &self.stages[stage_id];
        stage.state.lock().unwrap().queue.push_back(item);
        stage.not_empty.notify_one();
    }

    /// Blocks until an item is available at `stage_id` or the pipeline is
    /// stopped, in which case `None` is returned.
    pub fn dequeue(&self, stage_id: usize) -> Option<T> {
        let stage = &self.stages[stage_id];
        let mut state = stage.state.lock().unwrap();
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Some(item);
            }
            if state.stopped {
                return None;
            }
            state = stage.not_empty.wait(state).unwrap();
        }
    }

    /// Non-blocking pop: returns `None` immediately if `stage_id`'s FIFO is
    /// currently empty.
    pub fn try_pop(&self, stage_id: usize) -> Option<T> {
        self.stages[stage_id].state.lock().unwrap().queue.pop_front()
    }

    pub fn size(&self, stage_id: usize) -> usize {
        self.stages[stage_id].state.lock().unwrap().queue.len()
    }

    pub fn total_size(&self) -> usize {
        self.stages.iter().map(|s| s.state.lock().unwrap().queue.len()).sum()
    }

    /// Unblocks every waiter on every stage. After this call, already-queued
    /// items remain retrievable via `dequeue`/`try_pop`, but once a stage's
    /// FIFO drains, `dequeue` returns `None` instead of blocking.
    pub fn stop(&self) {
        for stage in &self.stages {
            stage.state.lock().unwrap().stopped = true;
            stage.not_empty.notify_all();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stages.iter().all(|s| s.state.lock().unwrap().stopped)
    }
}

/// A routing function deciding which stage an item moves to next, given the
/// stage it just finished at. Returning `None` means "drop" (used by
/// [`crate::Router::Null`] below, matching the original `eStfNullIn`/drop
/// stage).
pub trait NextStage<T> {
    fn next_stage(&self, from_stage: usize, item: &T) -> Option<usize>;
}

impl<T, F> NextStage<T> for F
where
    F: Fn(usize, &T) -> Option<usize>,
{
    fn next_stage(&self, from_stage: usize, item: &T) -> Option<usize> {
        self(from_stage, item)
    }
}

/// Moves `item` from `from_stage` to wherever `router` decides, or drops it
/// if the router returns `None`.
pub fn route<T>(pipeline: &Pipeline<T>, from_stage: usize, item: T, router: &impl NextStage<T>) {
    match router.next_stage(from_stage, &item) {
        Some(to_stage) => pipeline.queue(to_stage, item),
        None => drop(item),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_order_within_a_stage() {
        let p: Pipeline<i32> = Pipeline::new(1);
        p.queue(0, 1);
        p.queue(0, 2);
        p.queue(0, 3);
        assert_eq!(p.dequeue(0), Some(1));
        assert_eq!(p.dequeue(0), Some(2));
        assert_eq!(p.dequeue(0), Some(3));
    }

    #[test]
    fn try_pop_is_non_blocking_when_empty() {
        let p: Pipeline<i32> = Pipeline::new(1);
        assert_eq!(p.try_pop(0), None);
        p.queue(0, 42);
        assert_eq!(p.try_pop(0), Some(42));
        assert_eq!(p.try_pop(0), None);
    }

    #[test]
    fn stop_unblocks_waiting_dequeue() {
        let p = Arc::new(Pipeline::<i32>::new(1));
        let p2 = p.clone();
        let handle = thread::spawn(move || p2.dequeue(0));
        thread::sleep(Duration::from_millis(50));
        p.stop();
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn queued_items_survive_stop_until_drained() {
        let p: Pipeline<i32> = Pipeline::new(1);
        p.queue(0, 1);
        p.stop();
        assert_eq!(p.dequeue(0), Some(1));
        assert_eq!(p.dequeue(0), None);
    }

    #[test]
    fn total_size_sums_every_stage() {
        let p: Pipeline<i32> = Pipeline::new(3);
        p.queue(0, 1);
        p.queue(1, 2);
        p.queue(1, 3);
        assert_eq!(p.size(0), 1);
        assert_eq!(p.size(1), 2);
        assert_eq!(p.total_size(), 3);
    }
}
