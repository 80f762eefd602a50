//! An ordered collection of tasks with stable priority + insertion
//! ordering.
//!

use crate::request::Request;
use crate::response::Response;
use crate::server::Server;
use crate::status::Status;
use crate::task::{TaskHandle, TaskOutcome};
use crate::Error;

struct Entry {
    task: TaskHandle,
    priority: i64,
    seq: u64,
}

/// A per-invocation priority-ordered sequence of tasks to execute for a
/// single emit.
///
/// Ordering is **stable**: two tasks added at the same priority run in
/// the order they were added, regardless of how many times the queue is
/// re-sorted.
///
pub struct PriorityQueue {
    entries: Vec<Entry>,
    next_seq: u64,
    min_priority: i64,
    max_priority: i64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
            min_priority: 0,
            max_priority: 0,
        }
    }

    /// Add `task` at `priority` (higher runs first).
    ///
    pub fn add(&mut self, task: TaskHandle, priority: i64) {
        if self.entries.is_empty() {
            self.min_priority = priority;
            self.max_priority = priority;
        } else {
            self.min_priority = self.min_priority.min(priority);
            self.max_priority = self.max_priority.max(priority);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry { task, priority, seq });
    }

    /// Add `task` at a priority lower than every priority seen so far.
    ///
    pub fn push(&mut self, task: TaskHandle) {
        let priority = if self.entries.is_empty() {
            -1
        } else {
            self.min_priority - 1
        };
        self.add(task, priority);
    }

    /// Add `task` at a priority higher than every priority seen so far.
    ///
    pub fn shift(&mut self, task: TaskHandle) {
        let priority = if self.entries.is_empty() {
            1
        } else {
            self.max_priority + 1
        };
        self.add(task, priority);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Append another queue's tasks, keeping their relative priorities
    /// but placing them after everything already in `self` at the same
    /// priority (registration order is preserved across the merge).
    ///
    pub fn extend(&mut self, other: PriorityQueue) {
        for entry in other.entries {
            self.add(entry.task, entry.priority);
        }
    }

    fn sorted_indices(&self) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..self.entries.len()).collect();
        idx.sort_by(|&a, &b| {
            let pa = &self.entries[a];
            let pb = &self.entries[b];
            pb.priority
                .cmp(&pa.priority)
                .then(pa.seq.cmp(&pb.seq))
        });
        idx
    }

    /// Run every task in priority order (stable tie-break by insertion
    /// order), sequentially, awaiting each before advancing.
    ///
    /// Returns `Ok(Status::NotFound)` if the queue was empty on entry,
    /// `Ok(Status::Abort)` as soon as a task returns `TaskOutcome::Abort`,
    /// `Ok(Status::Ok)` once every task has run, or `Err` if a task
    /// raised an error (the caller -- ordinarily a
    /// [`RouteLifecycle`](crate::lifecycle::RouteLifecycle) phase --
    /// intercepts it).
    ///
    pub async fn run(
        &self,
        req: &mut Request,
        res: &mut Response,
        ctx: &Server,
    ) -> Result<Status, Error> {
        if self.entries.is_empty() {
            return Ok(Status::NotFound);
        }
        for idx in self.sorted_indices() {
            let outcome = self.entries[idx].task.call(req, res, ctx).await?;
            if outcome == TaskOutcome::Abort {
                return Ok(Status::Abort);
            }
        }
        Ok(Status::Ok)
    }
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}
