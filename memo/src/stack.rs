// Task stack engine - the ordered task model and its mutating operations
// Pure in-memory logic; locking and persistence are the daemon's concern

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique task identifier, allocated from the stack's monotonic counter.
///
/// Descriptions may repeat, so the id is what the daemon compares when
/// deciding whether the occupant of the active slot actually changed.
pub type TaskId = u64;

/// A single tracked task. Immutable once created: reordering and switching
/// never touch `started_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub started_at: DateTime<Utc>,
}

/// The ordered task stack.
///
/// Invariant: the task at index 0 is the active ("working") task; every
/// task at index >= 1 is paused, in order. "Active" is only a position,
/// never a separate flag. Empty is a valid state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStack {
    /// Next task id to assign
    #[serde(default)]
    pub next_id: TaskId,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReorderError {
    #[error("order length {got} does not match stack length {expected}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("index {0} out of range")]
    OutOfRange(usize),
    #[error("duplicate index {0}")]
    Duplicate(usize),
}

impl TaskStack {
    fn allocate_id(&mut self) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn new_task(&mut self, description: &str) -> Task {
        Task {
            id: self.allocate_id(),
            description: description.to_string(),
            started_at: Utc::now(),
        }
    }

    /// Insert a new task at the front, pausing the previously active task.
    pub fn push(&mut self, description: &str) -> Task {
        let task = self.new_task(description);
        self.tasks.insert(0, task.clone());
        task
    }

    /// Remove and return the active task, or `None` when the stack is empty.
    /// Whatever was at index 1 becomes the active task.
    pub fn pop(&mut self) -> Option<Task> {
        if self.tasks.is_empty() {
            return None;
        }
        Some(self.tasks.remove(0))
    }

    /// The active task, without mutation.
    pub fn peek(&self) -> Option<&Task> {
        self.tasks.first()
    }

    /// Swap the tasks at index 0 and 1. Returns (newly active, newly
    /// paused), or `None` when fewer than two tasks exist.
    pub fn switch(&mut self) -> Option<(Task, Task)> {
        if self.tasks.len() < 2 {
            return None;
        }
        self.tasks.swap(0, 1);
        Some((self.tasks[0].clone(), self.tasks[1].clone()))
    }

    /// Append a new task at the back without disturbing the active task.
    pub fn queue(&mut self, description: &str) -> Task {
        let task = self.new_task(description);
        self.tasks.push(task.clone());
        task
    }

    /// Rewrite the stack order so that `new[i] = old[order[i]]`.
    ///
    /// `order` must be a permutation of `0..len`. On any violation the
    /// stack is left exactly as it was.
    pub fn reorder(&mut self, order: &[usize]) -> Result<(), ReorderError> {
        if order.len() != self.tasks.len() {
            return Err(ReorderError::LengthMismatch {
                expected: self.tasks.len(),
                got: order.len(),
            });
        }
        let mut seen = vec![false; self.tasks.len()];
        for &idx in order {
            if idx >= self.tasks.len() {
                return Err(ReorderError::OutOfRange(idx));
            }
            if seen[idx] {
                return Err(ReorderError::Duplicate(idx));
            }
            seen[idx] = true;
        }
        let reordered = order.iter().map(|&idx| self.tasks[idx].clone()).collect();
        self.tasks = reordered;
        Ok(())
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptions(stack: &TaskStack) -> Vec<&str> {
        stack.tasks().iter().map(|t| t.description.as_str()).collect()
    }

    #[test]
    fn test_push_puts_most_recent_task_on_top() {
        let mut stack = TaskStack::default();
        stack.push("a");
        stack.push("b");
        stack.push("c");
        assert_eq!(descriptions(&stack), vec!["c", "b", "a"]);
        assert_eq!(stack.peek().unwrap().description, "c");
    }

    #[test]
    fn test_push_assigns_unique_ids() {
        let mut stack = TaskStack::default();
        let a = stack.push("task");
        let b = stack.push("task");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_pop_returns_active_and_promotes_next() {
        let mut stack = TaskStack::default();
        stack.push("a");
        stack.push("b");

        let popped = stack.pop().unwrap();
        assert_eq!(popped.description, "b");
        assert_eq!(stack.peek().unwrap().description, "a");
    }

    #[test]
    fn test_pop_on_empty_stack_returns_none() {
        let mut stack = TaskStack::default();
        assert!(stack.pop().is_none());
    }

    #[test]
    fn test_repush_after_pop_is_a_new_task() {
        let mut stack = TaskStack::default();
        stack.push("write spec");
        let popped = stack.pop().unwrap();

        let repushed = stack.push("write spec");
        assert_ne!(popped.id, repushed.id);
        assert!(repushed.started_at >= popped.started_at);
    }

    #[test]
    fn test_switch_swaps_top_two() {
        let mut stack = TaskStack::default();
        stack.push("a");
        stack.push("b");
        stack.push("c");

        let (started, paused) = stack.switch().unwrap();
        assert_eq!(started.description, "b");
        assert_eq!(paused.description, "c");
        assert_eq!(descriptions(&stack), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_switch_is_its_own_inverse() {
        let mut stack = TaskStack::default();
        stack.push("a");
        stack.push("b");
        stack.push("c");
        let before = stack.clone();

        stack.switch().unwrap();
        stack.switch().unwrap();
        assert_eq!(stack, before);
    }

    #[test]
    fn test_switch_requires_two_tasks() {
        let mut stack = TaskStack::default();
        assert!(stack.switch().is_none());

        stack.push("only");
        let before = stack.clone();
        assert!(stack.switch().is_none());
        assert_eq!(stack, before);
    }

    #[test]
    fn test_queue_appends_without_disturbing_active() {
        let mut stack = TaskStack::default();
        stack.push("active");
        stack.queue("later");
        assert_eq!(descriptions(&stack), vec!["active", "later"]);
    }

    #[test]
    fn test_queue_on_empty_stack_becomes_active() {
        let mut stack = TaskStack::default();
        let queued = stack.queue("first");
        assert_eq!(stack.peek().unwrap().id, queued.id);
    }

    #[test]
    fn test_reorder_applies_permutation() {
        let mut stack = TaskStack::default();
        stack.push("c");
        stack.push("b");
        stack.push("a");
        // [a, b, c]

        stack.reorder(&[2, 0, 1]).unwrap();
        assert_eq!(descriptions(&stack), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_reorder_inverse_restores_original_order() {
        let mut stack = TaskStack::default();
        for desc in ["d", "c", "b", "a"] {
            stack.push(desc);
        }
        let before = stack.clone();

        let order = [2, 0, 3, 1];
        // inverse[order[i]] = i
        let mut inverse = [0usize; 4];
        for (i, &idx) in order.iter().enumerate() {
            inverse[idx] = i;
        }

        stack.reorder(&order).unwrap();
        stack.reorder(&inverse).unwrap();
        assert_eq!(stack, before);
    }

    #[test]
    fn test_reorder_rejects_length_mismatch() {
        let mut stack = TaskStack::default();
        stack.push("b");
        stack.push("a");
        let before = stack.clone();

        let err = stack.reorder(&[0]).unwrap_err();
        assert_eq!(
            err,
            ReorderError::LengthMismatch {
                expected: 2,
                got: 1
            }
        );
        assert_eq!(stack, before);
    }

    #[test]
    fn test_reorder_rejects_out_of_range_index() {
        let mut stack = TaskStack::default();
        stack.push("b");
        stack.push("a");
        let before = stack.clone();

        let err = stack.reorder(&[0, 2]).unwrap_err();
        assert_eq!(err, ReorderError::OutOfRange(2));
        assert_eq!(stack, before);
    }

    #[test]
    fn test_reorder_rejects_duplicate_index() {
        let mut stack = TaskStack::default();
        stack.push("b");
        stack.push("a");
        let before = stack.clone();

        let err = stack.reorder(&[1, 1]).unwrap_err();
        assert_eq!(err, ReorderError::Duplicate(1));
        assert_eq!(stack, before);
    }

    #[test]
    fn test_reorder_empty_stack_with_empty_order() {
        let mut stack = TaskStack::default();
        stack.reorder(&[]).unwrap();
        assert!(stack.is_empty());
    }
}
