/*
[INPUT]:  "N of M elements done" updates from a task's work loop
[OUTPUT]: PercentChangedEvent on every accepted increase
[POS]:    Core layer - monotonic progress tracking per task
[UPDATE]: When changing the percentage formula or publication semantics
*/

use crate::broker::EventBroker;
use crate::error::TaskError;
use crate::event::PercentChangedEvent;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub total_element_size: Option<usize>,
    pub current_element_count: usize,
    pub current_percentage: Option<f64>,
}

#[derive(Debug, Default)]
struct ProgressState {
    total_element_size: Option<usize>,
    current_element_count: usize,
}

impl ProgressState {
    fn percentage(&self) -> Option<f64> {
        self.total_element_size
            .map(|total| self.current_element_count as f64 * 100.0 / total as f64)
    }
}

/// Progress tracker owned by one task.
///
/// Only the task's own worker advances it; any thread may read a snapshot.
#[derive(Debug)]
pub struct Percentage {
    task_name: String,
    broker: Arc<EventBroker>,
    state: Mutex<ProgressState>,
}

impl Percentage {
    pub fn new(task_name: impl Into<String>, broker: Arc<EventBroker>) -> Self {
        Self {
            task_name: task_name.into(),
            broker,
            state: Mutex::new(ProgressState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare the denominator for the current run and restart the count from zero.
    pub fn set_total(&self, total: usize) -> Result<(), TaskError> {
        if total == 0 {
            return Err(TaskError::InvalidTotal);
        }
        let mut state = self.state();
        state.total_element_size = Some(total);
        state.current_element_count = 0;
        Ok(())
    }

    /// Move the counter to `new_count`.
    ///
    /// Counts that do not increase the current value are ignored and publish nothing;
    /// returns whether the update was accepted.
    pub fn advance_to(&self, new_count: usize) -> Result<bool, TaskError> {
        let current_percent = {
            let mut state = self.state();
            if state.total_element_size.is_none() {
                return Err(TaskError::ProgressTotalUnset);
            }
            if new_count <= state.current_element_count {
                return Ok(false);
            }
            state.current_element_count = new_count;
            state.percentage().unwrap_or_default()
        };

        self.broker.publish(
            PercentChangedEvent::TOPIC,
            PercentChangedEvent {
                task_name: self.task_name.clone(),
                current_percent,
            }
            .into(),
        );
        Ok(true)
    }

    /// Advance by one element.
    pub fn advance(&self) -> Result<bool, TaskError> {
        let next = self.current_count() + 1;
        self.advance_to(next)
    }

    pub fn current_count(&self) -> usize {
        self.state().current_element_count
    }

    pub fn total(&self) -> Option<usize> {
        self.state().total_element_size
    }

    pub fn current_percentage(&self) -> Option<f64> {
        self.state().percentage()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state();
        ProgressSnapshot {
            total_element_size: state.total_element_size,
            current_element_count: state.current_element_count,
            current_percentage: state.percentage(),
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }
}
