/*
[INPUT]:  pause / resume / terminate requests from a controller thread
[OUTPUT]: Cooperative suspension and cancellation observed at worker checkpoints
[POS]:    Core layer - generic resumable, cancellable unit of work
[UPDATE]: When changing checkpoint semantics or worker thread lifecycle
*/

use crate::error::TaskError;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct ControlFlags {
    paused: bool,
    terminated: bool,
}

/// Result of reaching a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Continue,
    Terminated,
}

/// Pause/terminate flags guarded by one mutex, plus the condition variable the worker
/// blocks on while paused.
///
/// The worker only observes the flags inside [`ExecutionControl::checkpoint`]; nothing is
/// ever preempted.
#[derive(Debug, Default)]
pub struct ExecutionControl {
    flags: Mutex<ControlFlags>,
    pause_condition: Condvar,
}

impl ExecutionControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn flags(&self) -> MutexGuard<'_, ControlFlags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Request suspension at the next checkpoint. Never blocks on the worker.
    pub fn pause(&self) {
        let mut flags = self.flags();
        if !flags.terminated {
            flags.paused = true;
        }
    }

    pub fn resume(&self) {
        let mut flags = self.flags();
        flags.paused = false;
        self.pause_condition.notify_all();
    }

    /// Permanently request cancellation and wake a paused worker so it can exit.
    pub fn terminate(&self) {
        let mut flags = self.flags();
        flags.terminated = true;
        flags.paused = false;
        self.pause_condition.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.flags().paused
    }

    pub fn is_terminated(&self) -> bool {
        self.flags().terminated
    }

    /// Block while paused; report termination.
    pub fn checkpoint(&self) -> Checkpoint {
        let mut flags = self.flags();
        if flags.terminated {
            return Checkpoint::Terminated;
        }
        while flags.paused {
            debug!("currently paused");
            flags = self
                .pause_condition
                .wait(flags)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if flags.terminated {
            return Checkpoint::Terminated;
        }
        Checkpoint::Continue
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Idle,
    Running,
    Finished,
}

/// Runs one unit of work on its own thread with cooperative pause/resume/terminate.
///
/// Control calls before `start` or after the work returned are harmless no-ops.
#[derive(Debug)]
pub struct ResumableThread<T> {
    name: String,
    control: Arc<ExecutionControl>,
    handle: Option<JoinHandle<T>>,
    started: bool,
}

impl<T: Send + 'static> ResumableThread<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_control(name, Arc::new(ExecutionControl::new()))
    }

    pub fn with_control(name: impl Into<String>, control: Arc<ExecutionControl>) -> Self {
        Self {
            name: name.into(),
            control,
            handle: None,
            started: false,
        }
    }

    pub fn control(&self) -> Arc<ExecutionControl> {
        self.control.clone()
    }

    /// Spawn the worker. A thread can only be started once.
    pub fn start<F>(&mut self, work: F) -> Result<(), TaskError>
    where
        F: FnOnce(Arc<ExecutionControl>) -> T + Send + 'static,
    {
        if self.started {
            return Err(TaskError::AlreadyStarted);
        }
        let control = self.control.clone();
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || work(control))
            .map_err(TaskError::Spawn)?;
        self.started = true;
        self.handle = Some(handle);
        info!(thread = %self.name, "worker started");
        Ok(())
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn terminate(&self) {
        self.control.terminate();
    }

    pub fn state(&self) -> ThreadState {
        match &self.handle {
            None if !self.started => ThreadState::Idle,
            Some(handle) if !handle.is_finished() => ThreadState::Running,
            _ => ThreadState::Finished,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state() == ThreadState::Running
    }

    /// Wait for the worker. `None` if it never started, was already joined, or panicked.
    pub fn join(&mut self) -> Option<T> {
        let handle = self.handle.take()?;
        handle.join().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Counts iterations until terminated, checking in once per iteration.
    fn counting_worker(
        counter: Arc<AtomicUsize>,
    ) -> impl FnOnce(Arc<ExecutionControl>) -> usize + Send + 'static {
        move |control| {
            loop {
                if control.checkpoint() == Checkpoint::Terminated {
                    return counter.load(Ordering::SeqCst);
                }
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(2));
            }
        }
    }

    #[test]
    fn resumable_checkpoint_reports_termination() {
        let control = ExecutionControl::new();
        assert_eq!(control.checkpoint(), Checkpoint::Continue);
        control.terminate();
        assert_eq!(control.checkpoint(), Checkpoint::Terminated);
        assert!(control.is_terminated());
    }

    #[test]
    fn resumable_pause_after_terminate_is_ignored() {
        let control = ExecutionControl::new();
        control.terminate();
        control.pause();
        assert!(!control.is_paused());
        assert_eq!(control.checkpoint(), Checkpoint::Terminated);
    }

    #[test]
    fn resumable_pause_blocks_and_resume_unblocks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut worker = ResumableThread::new("pause-test");
        worker.start(counting_worker(counter.clone())).unwrap();

        wait_until(|| counter.load(Ordering::SeqCst) > 3);
        worker.pause();
        // Give the worker time to reach its next checkpoint.
        thread::sleep(Duration::from_millis(50));
        let frozen = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(counter.load(Ordering::SeqCst), frozen);
        assert!(worker.is_alive());

        worker.resume();
        wait_until(|| counter.load(Ordering::SeqCst) > frozen);

        worker.terminate();
        let iterations = worker.join().expect("worker finished");
        assert!(iterations > frozen);
        assert_eq!(worker.state(), ThreadState::Finished);
    }

    #[test]
    fn resumable_terminate_wakes_paused_worker() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut worker = ResumableThread::new("terminate-test");
        worker.pause();
        worker.start(counting_worker(counter.clone())).unwrap();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        worker.terminate();
        assert_eq!(worker.join(), Some(0));
        assert!(!worker.is_alive());
    }

    #[test]
    fn resumable_controls_before_start_are_noops() {
        let mut worker: ResumableThread<()> = ResumableThread::new("idle");
        worker.pause();
        worker.resume();
        assert_eq!(worker.state(), ThreadState::Idle);
        assert!(worker.join().is_none());
    }

    #[test]
    fn resumable_start_twice_is_rejected() {
        let mut worker = ResumableThread::new("once");
        worker.start(|_| ()).unwrap();
        assert!(matches!(
            worker.start(|_| ()),
            Err(TaskError::AlreadyStarted)
        ));
        worker.join();
    }
}
