/*
[INPUT]:  Public API exports for autotask-runner crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod broker;
pub mod config;
pub mod error;
pub mod event;
pub mod progress;
pub mod resumable;
pub mod task;
pub mod tasks;

// Re-export main types for convenience
pub use broker::EventBroker;
pub use config::{RunnerConfig, Settings, TaskEntry};
pub use error::{SettingsError, TaskError};
pub use event::{Event, EventHandler, PercentChangedEvent, TaskStatus, TaskStatusEvent};
pub use progress::{Percentage, ProgressSnapshot};
pub use resumable::{Checkpoint, ExecutionControl, ResumableThread, ThreadState};
pub use task::{
    AutomatedTask, LoopExit, TaskContext, TaskHandle, TaskOutcome, TaskRegistry, TaskRunner,
};
