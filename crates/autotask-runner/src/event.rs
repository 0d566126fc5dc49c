/*
[INPUT]:  Progress and lifecycle changes produced by running tasks
[OUTPUT]: Immutable event values + the observer trait front-ends implement
[POS]:    Observer layer - payloads carried by the event broker
[UPDATE]: When front-ends need a new kind of notification
*/

use std::fmt;
use uuid::Uuid;

/// Completion percentage of a task changed.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentChangedEvent {
    /// Type name of the task that produced the event
    pub task_name: String,
    pub current_percent: f64,
}

impl PercentChangedEvent {
    pub const TOPIC: &'static str = "Percent_Changed";
}

/// Lifecycle states reported while a task runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Validating,
    DriverReady,
    Automating,
    Paused,
    Resumed,
    Finished,
    Failed(String), // automation error message
    Terminated,
    ConfigError(String),
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Validating => write!(f, "validating"),
            TaskStatus::DriverReady => write!(f, "driver ready"),
            TaskStatus::Automating => write!(f, "automating"),
            TaskStatus::Paused => write!(f, "paused"),
            TaskStatus::Resumed => write!(f, "resumed"),
            TaskStatus::Finished => write!(f, "finished"),
            TaskStatus::Failed(message) => write!(f, "failed: {message}"),
            TaskStatus::Terminated => write!(f, "terminated"),
            TaskStatus::ConfigError(message) => write!(f, "configuration error: {message}"),
        }
    }
}

/// Task lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusEvent {
    pub task_name: String,
    pub run_id: Uuid,
    pub status: TaskStatus,
}

impl TaskStatusEvent {
    pub const TOPIC: &'static str = "Task_Status";
}

/// All events that travel through the broker
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PercentChanged(PercentChangedEvent),
    TaskStatus(TaskStatusEvent),
}

impl Event {
    /// Topic the event is normally published on
    pub fn topic(&self) -> &'static str {
        match self {
            Event::PercentChanged(_) => PercentChangedEvent::TOPIC,
            Event::TaskStatus(_) => TaskStatusEvent::TOPIC,
        }
    }
}

impl From<PercentChangedEvent> for Event {
    fn from(event: PercentChangedEvent) -> Self {
        Event::PercentChanged(event)
    }
}

impl From<TaskStatusEvent> for Event {
    fn from(event: TaskStatusEvent) -> Self {
        Event::TaskStatus(event)
    }
}

/// Trait for observers subscribed to broker topics
///
/// Each delivery runs on its own thread; an `Err` only affects this observer.
pub trait EventHandler: Send + Sync {
    fn handle_incoming_event(&self, event: &Event) -> anyhow::Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    fn handle_incoming_event(&self, event: &Event) -> anyhow::Result<()> {
        self(event)
    }
}
