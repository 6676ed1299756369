use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ClaimError, Result};

/// Observable state of a tracked asynchronous operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum TaskState<T> {
    Idle,
    Running,
    Succeeded(T),
    Failed(String),
}

impl<T> TaskState<T> {
    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }

    pub fn succeeded(&self) -> Option<&T> {
        match self {
            TaskState::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            TaskState::Failed(msg) => Some(msg),
            _ => None,
        }
    }
}

impl<T> Default for TaskState<T> {
    fn default() -> Self {
        TaskState::Idle
    }
}

/// Proof that a run was started, carrying the generation it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTicket {
    generation: u64,
}

impl RunTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Single-flight holder of one task's state.
///
/// Every `begin` or `reset` advances the generation; `complete` only lands when the
/// ticket's generation is still current, so late results of superseded runs are dropped.
pub struct TaskCell<T> {
    name: &'static str,
    generation: Mutex<u64>,
    state: watch::Sender<TaskState<T>>,
}

impl<T: Clone + Send + Sync + 'static> TaskCell<T> {
    pub fn new(name: &'static str) -> Self {
        let (state, _) = watch::channel(TaskState::Idle);
        Self {
            name,
            generation: Mutex::new(0),
            state,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> TaskState<T> {
        self.state.borrow().clone()
    }

    pub fn generation(&self) -> u64 {
        *self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receiver notified on every transition.
    pub fn subscribe(&self) -> watch::Receiver<TaskState<T>> {
        self.state.subscribe()
    }

    /// Enter `Running`, discarding whatever the previous run produced.
    pub fn begin(&self) -> Result<RunTicket> {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        if self.state.borrow().is_running() {
            warn!(task = self.name, generation = *generation, "Rejected overlapping run");
            return Err(ClaimError::Conflict(format!(
                "{} is already in progress",
                self.name
            )));
        }
        *generation += 1;
        self.state.send_replace(TaskState::Running);
        info!(task = self.name, generation = *generation, "Task running");
        Ok(RunTicket {
            generation: *generation,
        })
    }

    /// Apply the outcome of a run. Returns `false` when the ticket was superseded.
    pub fn complete(&self, ticket: RunTicket, outcome: std::result::Result<T, String>) -> bool {
        self.complete_with(ticket, || outcome)
    }

    /// Like [`complete`](Self::complete), but the outcome is produced while the generation is
    /// held, so side effects in `apply` happen only for the current run.
    pub fn complete_with<F>(&self, ticket: RunTicket, apply: F) -> bool
    where
        F: FnOnce() -> std::result::Result<T, String>,
    {
        let generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        if *generation != ticket.generation {
            warn!(
                task = self.name,
                ticket = ticket.generation,
                current = *generation,
                "Discarding stale result"
            );
            return false;
        }
        let next = match apply() {
            Ok(value) => {
                info!(task = self.name, generation = *generation, "Task succeeded");
                TaskState::Succeeded(value)
            }
            Err(msg) => {
                warn!(task = self.name, generation = *generation, error = %msg, "Task failed");
                TaskState::Failed(msg)
            }
        };
        self.state.send_replace(next);
        true
    }

    /// Return an unfinished run to `Idle`. Only the current ticket can do this; a
    /// superseded one leaves the newer state untouched.
    pub fn abandon(&self, ticket: RunTicket) -> bool {
        let generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        if *generation != ticket.generation || !self.state.borrow().is_running() {
            return false;
        }
        self.state.send_replace(TaskState::Idle);
        warn!(task = self.name, generation = *generation, "Run abandoned before completion");
        true
    }

    /// Tie `ticket` to a guard that abandons the run if it is dropped unfinished.
    pub fn guard(&self, ticket: RunTicket) -> RunGuard<'_, T> {
        RunGuard {
            cell: self,
            ticket,
            finished: false,
        }
    }

    /// Back to `Idle`; any in-flight run becomes stale.
    pub fn reset(&self) {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        self.state.send_replace(TaskState::Idle);
        debug!(task = self.name, generation = *generation, "Task reset");
    }
}

/// Owns a running ticket for the lifetime of the future driving it.
///
/// Dropping the guard without completing, e.g. because the caller cancelled the future,
/// returns the cell to `Idle` so later runs are not locked out.
pub struct RunGuard<'a, T: Clone + Send + Sync + 'static> {
    cell: &'a TaskCell<T>,
    ticket: RunTicket,
    finished: bool,
}

impl<T: Clone + Send + Sync + 'static> RunGuard<'_, T> {
    pub fn ticket(&self) -> RunTicket {
        self.ticket
    }

    pub fn complete(self, outcome: std::result::Result<T, String>) -> bool {
        self.complete_with(|| outcome)
    }

    pub fn complete_with<F>(mut self, apply: F) -> bool
    where
        F: FnOnce() -> std::result::Result<T, String>,
    {
        self.finished = true;
        self.cell.complete_with(self.ticket, apply)
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for RunGuard<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            self.cell.abandon(self.ticket);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_rejects_overlap_and_complete_lands() {
        let cell: TaskCell<String> = TaskCell::new("analysis");
        let ticket = cell.begin().unwrap();
        assert!(cell.state().is_running());
        assert!(matches!(cell.begin(), Err(ClaimError::Conflict(_))));

        assert!(cell.complete(ticket, Ok("done".to_string())));
        assert_eq!(cell.state(), TaskState::Succeeded("done".to_string()));
    }

    #[test]
    fn stale_ticket_is_discarded_after_reset() {
        let cell: TaskCell<u32> = TaskCell::new("description");
        let old = cell.begin().unwrap();
        cell.reset();
        let mut applied = false;
        assert!(!cell.complete_with(old, || {
            applied = true;
            Ok(7)
        }));
        assert!(!applied);
        assert_eq!(cell.state(), TaskState::Idle);
    }

    #[test]
    fn new_run_clears_previous_result_immediately() {
        let cell: TaskCell<u32> = TaskCell::new("analysis");
        let first = cell.begin().unwrap();
        cell.complete(first, Ok(1));
        let second = cell.begin().unwrap();
        assert_eq!(cell.state(), TaskState::Running);
        assert!(!cell.complete(first, Ok(99)));
        assert!(cell.complete(second, Err("boom".into())));
        assert_eq!(cell.state().failure(), Some("boom"));
        assert_eq!(second.generation(), 2);
    }

    #[test]
    fn dropped_guard_returns_cell_to_idle() {
        let cell: TaskCell<u32> = TaskCell::new("analysis");
        let guard = cell.guard(cell.begin().unwrap());
        assert!(cell.state().is_running());
        drop(guard);
        assert_eq!(cell.state(), TaskState::Idle);

        let again = cell.guard(cell.begin().unwrap());
        assert!(again.complete(Ok(3)));
        assert_eq!(cell.state().succeeded(), Some(&3));
    }

    #[test]
    fn abandon_ignores_superseded_tickets() {
        let cell: TaskCell<u32> = TaskCell::new("analysis");
        let old = cell.begin().unwrap();
        cell.reset();
        let current = cell.begin().unwrap();
        assert!(!cell.abandon(old));
        assert!(cell.state().is_running());

        cell.complete(current, Ok(1));
        assert!(!cell.abandon(current));
        assert_eq!(cell.state().succeeded(), Some(&1));
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let cell: TaskCell<u32> = TaskCell::new("analysis");
        let mut rx = cell.subscribe();
        let ticket = cell.begin().unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_running());
        cell.complete(ticket, Ok(5));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().succeeded(), Some(&5));
    }

    #[test]
    fn state_serializes_with_tag() {
        let json = serde_json::to_value(TaskState::<u32>::Failed("nope".into())).unwrap();
        assert_eq!(json, serde_json::json!({"state": "failed", "value": "nope"}));
    }
}
