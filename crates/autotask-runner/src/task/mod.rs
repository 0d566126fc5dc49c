/*
[INPUT]:  A concrete AutomatedTask, its Settings, the shared EventBroker, a DriverFactory
[OUTPUT]: perform() template method (validate -> driver -> pre-run -> automate -> cleanup)
          and TaskHandle for running it on a controllable worker thread
[POS]:    Task layer - lifecycle owner for one task run
[UPDATE]: When changing the perform() sequence or the controller surface
*/

pub mod context;
pub mod registry;

pub use context::{LoopExit, TaskContext};
pub use registry::{TaskConstructor, TaskRegistry};

use crate::broker::EventBroker;
use crate::config::{INVOKED_CLASS, Settings};
use crate::error::{SettingsError, TaskError};
use crate::event::{TaskStatus, TaskStatusEvent};
use crate::progress::{Percentage, ProgressSnapshot};
use crate::resumable::{ExecutionControl, ResumableThread, ThreadState};
use autotask_driver::{DriverConfig, DriverFactory};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

/// A unit of UI automation.
///
/// Implementors only describe their settings and the work itself; driver setup, validation,
/// error containment and cleanup are done by [`TaskRunner::perform`].
pub trait AutomatedTask: Send {
    /// Type name carried by progress and status events.
    fn task_name(&self) -> &'static str;

    /// Settings keys that must be present and non-empty. `invoked_class` is implied.
    fn mandatory_settings(&self) -> Vec<&'static str>;

    fn automate(&mut self, ctx: &mut TaskContext) -> anyhow::Result<()>;
}

/// How a run that got past pre-flight checks ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Terminated,
    /// `automate()` returned an error or panicked; the message is the full error chain.
    Failed(String),
}

pub type PreRunCallback = Box<dyn FnMut() -> anyhow::Result<()> + Send>;

/// Runs one task instance exactly once.
///
/// Settings are owned by the runner; callers must not change them while `perform()` is active.
pub struct TaskRunner {
    task: Box<dyn AutomatedTask>,
    settings: Settings,
    broker: Arc<EventBroker>,
    factory: Arc<dyn DriverFactory>,
    control: Arc<ExecutionControl>,
    progress: Arc<Percentage>,
    pre_run: Option<PreRunCallback>,
    run_id: Uuid,
    performed: bool,
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("task", &self.task.task_name())
            .field("run_id", &self.run_id)
            .field("performed", &self.performed)
            .finish_non_exhaustive()
    }
}

impl TaskRunner {
    pub fn new(
        task: Box<dyn AutomatedTask>,
        settings: Settings,
        broker: Arc<EventBroker>,
        factory: Arc<dyn DriverFactory>,
    ) -> Self {
        let progress = Arc::new(Percentage::new(task.task_name(), broker.clone()));
        Self {
            task,
            settings,
            broker,
            factory,
            control: Arc::new(ExecutionControl::new()),
            progress,
            pre_run: None,
            run_id: Uuid::new_v4(),
            performed: false,
        }
    }

    /// Hook invoked after the driver is ready and before `automate()`.
    pub fn with_pre_run<F>(mut self, callback: F) -> Self
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.pre_run = Some(Box::new(callback));
        self
    }

    pub fn task_name(&self) -> &'static str {
        self.task.task_name()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn control(&self) -> Arc<ExecutionControl> {
        self.control.clone()
    }

    pub fn progress(&self) -> Arc<Percentage> {
        self.progress.clone()
    }

    fn publish_status(&self, status: TaskStatus) {
        publish_status(&self.broker, self.task.task_name(), self.run_id, status);
    }

    /// Every missing mandatory key is logged before the error is returned.
    fn validate_settings(&self) -> Result<(), SettingsError> {
        let mandatory = self.task.mandatory_settings();
        let keys = mandatory.iter().copied().chain([INVOKED_CLASS]);
        let missing = self.settings.missing_keys(keys);
        for key in &missing {
            error!(key = %key, "mandatory setting is missing or empty");
        }
        if !missing.is_empty() {
            return Err(SettingsError::MissingKeys(missing));
        }
        self.settings.timing_factor()?;
        Ok(())
    }

    fn preflight(&self) -> Result<DriverConfig, TaskError> {
        self.validate_settings()?;
        let download_dir = match self.settings.download_folder() {
            Some(path) => Some(prepare_download_folder(&path)?),
            None => None,
        };
        Ok(DriverConfig {
            headless: !self.settings.use_gui(),
            download_dir,
            ..DriverConfig::default()
        })
    }

    /// Validate, set up the driver, run the task, clean up.
    ///
    /// Only failures before `automate()` starts are returned as `Err`. Errors and panics from
    /// `automate()` are logged and reported as [`TaskOutcome::Failed`].
    pub fn perform(&mut self) -> Result<TaskOutcome, TaskError> {
        if self.performed {
            return Err(TaskError::AlreadyStarted);
        }
        self.performed = true;

        let class = self.task.task_name();
        let span = info_span!("task", class, run_id = %self.run_id);
        let _entered = span.enter();

        self.publish_status(TaskStatus::Validating);
        let driver_config = match self.preflight() {
            Ok(config) => config,
            Err(err) => {
                error!(error = %err, "task not started");
                self.publish_status(TaskStatus::ConfigError(err.to_string()));
                return Err(err);
            }
        };

        let driver = match self.factory.create_session(&driver_config) {
            Ok(driver) => driver,
            Err(err) => {
                error!(error = %err, "failed to create driver session");
                self.publish_status(TaskStatus::Failed(err.to_string()));
                return Err(err.into());
            }
        };
        info!(headless = driver_config.headless, "driver session ready");
        self.publish_status(TaskStatus::DriverReady);

        let mut ctx = TaskContext::new(
            class,
            self.settings.clone(),
            driver,
            self.control.clone(),
            self.progress.clone(),
        )?;

        if let Some(pre_run) = self.pre_run.as_mut() {
            if let Err(err) = pre_run() {
                let message = format!("{err:#}");
                error!(error = %message, "pre-run callback failed");
                ctx.close_driver();
                self.publish_status(TaskStatus::Failed(message));
                return Err(TaskError::PreRun(err));
            }
        }

        self.publish_status(TaskStatus::Automating);
        let task = &mut self.task;
        let result = panic::catch_unwind(AssertUnwindSafe(|| task.automate(&mut ctx)));
        let outcome = match result {
            Ok(Ok(())) if ctx.loop_terminated() => TaskOutcome::Terminated,
            Ok(Ok(())) => TaskOutcome::Completed,
            Ok(Err(err)) => {
                let message = format!("{err:#}");
                error!(error = %message, "automation failed");
                TaskOutcome::Failed(message)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(error = %message, "automation panicked");
                TaskOutcome::Failed(message)
            }
        };

        ctx.close_driver();
        info!(
            "Done task. It ends at {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );

        self.publish_status(match &outcome {
            TaskOutcome::Completed => TaskStatus::Finished,
            TaskOutcome::Terminated => TaskStatus::Terminated,
            TaskOutcome::Failed(message) => TaskStatus::Failed(message.clone()),
        });
        Ok(outcome)
    }
}

fn publish_status(broker: &EventBroker, task_name: &str, run_id: Uuid, status: TaskStatus) {
    broker.publish(
        TaskStatusEvent::TOPIC,
        TaskStatusEvent {
            task_name: task_name.to_string(),
            run_id,
            status,
        }
        .into(),
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {message}")
    } else {
        "panic with non-string payload".to_string()
    }
}

/// The folder must be a directory; it is created when missing.
fn prepare_download_folder(path: &Path) -> Result<PathBuf, TaskError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(TaskError::DownloadFolder {
                path: path.to_path_buf(),
                reason: "path exists and is not a directory".to_string(),
            });
        }
    } else {
        std::fs::create_dir_all(path).map_err(|err| TaskError::DownloadFolder {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        info!(path = %path.display(), "created download folder");
    }
    Ok(path.to_path_buf())
}

/// Controller surface for one task running on its own worker thread.
///
/// Pause and terminate requests take effect at the next main loop checkpoint. A handle runs
/// its task once; build a new handle for every run.
pub struct TaskHandle {
    task_name: &'static str,
    run_id: Uuid,
    broker: Arc<EventBroker>,
    progress: Arc<Percentage>,
    runner: Option<TaskRunner>,
    thread: ResumableThread<Result<TaskOutcome, TaskError>>,
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("task_name", &self.task_name)
            .field("run_id", &self.run_id)
            .field("state", &self.thread.state())
            .finish_non_exhaustive()
    }
}

impl TaskHandle {
    pub fn new(
        task: Box<dyn AutomatedTask>,
        settings: Settings,
        broker: Arc<EventBroker>,
        factory: Arc<dyn DriverFactory>,
    ) -> Self {
        Self::from_runner(TaskRunner::new(task, settings, broker, factory))
    }

    pub fn from_runner(runner: TaskRunner) -> Self {
        let thread = ResumableThread::with_control(
            format!("task-{}", runner.task_name()),
            runner.control(),
        );
        Self {
            task_name: runner.task_name(),
            run_id: runner.run_id(),
            broker: runner.broker.clone(),
            progress: runner.progress(),
            runner: Some(runner),
            thread,
        }
    }

    pub fn with_pre_run<F>(mut self, callback: F) -> Self
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.runner = self.runner.take().map(|runner| runner.with_pre_run(callback));
        self
    }

    pub fn task_name(&self) -> &'static str {
        self.task_name
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Run `perform()` on the worker thread.
    pub fn start(&mut self) -> Result<(), TaskError> {
        let mut runner = self.runner.take().ok_or(TaskError::AlreadyStarted)?;
        self.thread.start(move |_control| runner.perform())
    }

    pub fn pause(&self) {
        if self.thread.is_alive() && !self.thread.control().is_terminated() {
            self.thread.pause();
            info!(task = self.task_name, "pause requested");
            publish_status(&self.broker, self.task_name, self.run_id, TaskStatus::Paused);
        }
    }

    pub fn resume(&self) {
        if self.thread.control().is_paused() {
            self.thread.resume();
            info!(task = self.task_name, "resumed");
            publish_status(&self.broker, self.task_name, self.run_id, TaskStatus::Resumed);
        }
    }

    /// Permanent; wakes a paused worker.
    pub fn terminate(&self) {
        if !self.thread.control().is_terminated() {
            warn!(task = self.task_name, "terminate requested");
        }
        self.thread.terminate();
    }

    /// Shared pause/terminate flags, for supervisors that outlive the handle borrow.
    pub fn control(&self) -> Arc<ExecutionControl> {
        self.thread.control()
    }

    pub fn state(&self) -> ThreadState {
        self.thread.state()
    }

    pub fn is_alive(&self) -> bool {
        self.thread.is_alive()
    }

    pub fn is_paused(&self) -> bool {
        self.thread.control().is_paused()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Block until the worker ends. `None` if never started or already joined.
    pub fn join(&mut self) -> Option<Result<TaskOutcome, TaskError>> {
        self.thread.join()
    }
}
