/*
[INPUT]:  Live UI driver session, execution control flags, progress tracker, task settings
[OUTPUT]: Checkpointed main loop + bounded polling primitives for flaky UI state
[POS]:    Task layer - everything an automate() body is allowed to touch
[UPDATE]: When adding polling primitives or changing wait limits
*/

use crate::config::Settings;
use crate::error::TaskError;
use crate::progress::Percentage;
use crate::resumable::{Checkpoint, ExecutionControl};
use autotask_driver::{Selector, UiDriver, UiElement};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Seconds in one timing unit before scaling.
const TIME_UNIT_SECS: f64 = 1.0;
const PRESENCE_POLL_SECS: f64 = 0.5;
/// Default presence wait, in seconds before scaling.
pub const DEFAULT_PRESENCE_WAIT_SECS: f64 = 30.0;
pub const NAVIGATION_ATTEMPTS: u32 = 1200;
pub const DOWNLOAD_ATTEMPTS: u32 = 180;
pub const NEW_TAB_ATTEMPTS: u32 = 180;

/// How a main loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Completed,
    Terminated,
}

/// Per-run state handed to [`AutomatedTask::automate`](super::AutomatedTask::automate).
///
/// Every sleep and poll interval is multiplied by the task's `time.unit.factor`. Pause and
/// terminate are only observed at main loop checkpoints; the waits below are plain sleeps.
pub struct TaskContext {
    task_name: String,
    settings: Settings,
    driver: Box<dyn UiDriver>,
    control: Arc<ExecutionControl>,
    progress: Arc<Percentage>,
    timing_factor: f64,
    use_gui: bool,
    loop_terminated: bool,
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_name", &self.task_name)
            .field("timing_factor", &self.timing_factor)
            .field("use_gui", &self.use_gui)
            .field("progress", &self.progress.snapshot())
            .finish_non_exhaustive()
    }
}

impl TaskContext {
    pub fn new(
        task_name: impl Into<String>,
        settings: Settings,
        driver: Box<dyn UiDriver>,
        control: Arc<ExecutionControl>,
        progress: Arc<Percentage>,
    ) -> Result<Self, TaskError> {
        let timing_factor = settings.timing_factor()?;
        let use_gui = settings.use_gui();
        Ok(Self {
            task_name: task_name.into(),
            settings,
            driver,
            control,
            progress,
            timing_factor,
            use_gui,
            loop_terminated: false,
        })
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Setting value, or an error naming the key.
    pub fn setting(&self, key: &str) -> anyhow::Result<&str> {
        self.settings
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("setting `{key}` is not set"))
    }

    pub fn driver(&self) -> &dyn UiDriver {
        self.driver.as_ref()
    }

    pub fn driver_mut(&mut self) -> &mut dyn UiDriver {
        self.driver.as_mut()
    }

    pub fn control(&self) -> &ExecutionControl {
        &self.control
    }

    pub fn progress(&self) -> &Percentage {
        &self.progress
    }

    pub fn timing_factor(&self) -> f64 {
        self.timing_factor
    }

    pub fn use_gui(&self) -> bool {
        self.use_gui
    }

    fn scaled(&self, secs: f64) -> Duration {
        Duration::from_secs_f64((secs * self.timing_factor).max(0.0))
    }

    /// Sleep one timing unit.
    pub fn sleep(&self) {
        self.sleep_units(1.0);
    }

    pub fn sleep_units(&self, units: f64) {
        thread::sleep(self.scaled(units * TIME_UNIT_SECS));
    }

    /// Run `operation` on each element with a pause/terminate checkpoint before each one.
    ///
    /// The progress total is the collection length and the count advances by one after
    /// every element that completed. An empty collection does nothing. The first error from
    /// `operation` stops the loop and is returned.
    pub fn perform_mainloop_on_collection<I, F>(
        &mut self,
        items: I,
        mut operation: F,
    ) -> anyhow::Result<LoopExit>
    where
        I: IntoIterator,
        F: FnMut(&mut TaskContext, I::Item) -> anyhow::Result<()>,
    {
        let items: Vec<I::Item> = items.into_iter().collect();
        if items.is_empty() {
            debug!("nothing to process");
            return Ok(LoopExit::Completed);
        }

        let total = items.len();
        self.progress.set_total(total)?;
        for (index, item) in items.into_iter().enumerate() {
            if self.control.checkpoint() == Checkpoint::Terminated {
                info!(processed = index, total, "terminated; leaving main loop");
                self.loop_terminated = true;
                return Ok(LoopExit::Terminated);
            }
            operation(self, item)?;
            self.progress.advance_to(index + 1)?;
        }
        Ok(LoopExit::Completed)
    }

    /// Check up to `attempts` times, sleeping `interval_secs` (scaled) between checks.
    fn poll<T>(
        &self,
        attempts: u32,
        interval_secs: f64,
        mut check: impl FnMut(&Self) -> Result<Option<T>, TaskError>,
    ) -> Result<Option<T>, TaskError> {
        let interval = self.scaled(interval_secs);
        for attempt in 1..=attempts {
            if let Some(found) = check(self)? {
                return Ok(Some(found));
            }
            if attempt < attempts {
                thread::sleep(interval);
            }
        }
        Ok(None)
    }

    /// Float to int casts saturate: NaN and negatives give one attempt, infinity `u32::MAX`.
    fn presence_attempts(waiting_secs: f64) -> u32 {
        ((waiting_secs / PRESENCE_POLL_SECS).ceil() as u32).saturating_add(1)
    }

    fn wait_for_element(
        &self,
        selector: &Selector,
        first_sleep_secs: f64,
        waiting_secs: f64,
    ) -> Result<(Option<Box<dyn UiElement>>, u32), TaskError> {
        thread::sleep(self.scaled(first_sleep_secs));
        let attempts = Self::presence_attempts(waiting_secs);
        let found = self.poll(attempts, PRESENCE_POLL_SECS, |ctx| {
            match ctx.driver.find_element(selector) {
                Ok(found) => Ok(found),
                Err(err) if err.is_retryable() => {
                    debug!(%selector, error = %err, "transient lookup failure");
                    Ok(None)
                }
                Err(err) => Err(err.into()),
            }
        })?;
        Ok((found, attempts))
    }

    /// Settle for `first_sleep_secs`, then wait up to 30 s for `selector` to be present.
    pub fn get_when_element_present(
        &self,
        selector: &Selector,
        first_sleep_secs: f64,
    ) -> Result<Box<dyn UiElement>, TaskError> {
        let (found, attempts) =
            self.wait_for_element(selector, first_sleep_secs, DEFAULT_PRESENCE_WAIT_SECS)?;
        found.ok_or_else(|| TaskError::timeout(format!("element {selector}"), attempts))
    }

    /// Like [`get_when_element_present`](Self::get_when_element_present) but a presence
    /// timeout yields `Ok(None)`.
    pub fn try_get_if_element_present(
        &self,
        selector: &Selector,
        first_sleep_secs: f64,
        waiting_secs: f64,
    ) -> Result<Option<Box<dyn UiElement>>, TaskError> {
        let (found, _) = self.wait_for_element(selector, first_sleep_secs, waiting_secs)?;
        if found.is_none() {
            debug!(%selector, "element not present");
        }
        Ok(found)
    }

    pub fn click_when_element_present(
        &self,
        selector: &Selector,
        first_sleep_secs: f64,
    ) -> Result<(), TaskError> {
        self.get_when_element_present(selector, first_sleep_secs)?
            .click()?;
        Ok(())
    }

    pub fn type_when_element_present(
        &self,
        selector: &Selector,
        text: &str,
        first_sleep_secs: f64,
    ) -> Result<(), TaskError> {
        self.get_when_element_present(selector, first_sleep_secs)?
            .type_text(text)?;
        Ok(())
    }

    /// Click `selector` and wait until the location changes; returns the new location.
    pub fn click_and_wait_navigate_to_other_page(
        &self,
        selector: &Selector,
        first_sleep_secs: f64,
        expected_suffix: Option<&str>,
    ) -> Result<String, TaskError> {
        let previous = self.driver.current_location()?;
        self.click_when_element_present(selector, first_sleep_secs)?;
        self.wait_navigating_to_other_page_complete(&previous, expected_suffix)
    }

    /// Wait until the location differs from `previous` and, when given, ends with
    /// `expected_suffix`.
    pub fn wait_navigating_to_other_page_complete(
        &self,
        previous: &str,
        expected_suffix: Option<&str>,
    ) -> Result<String, TaskError> {
        let arrived = self.poll(NAVIGATION_ATTEMPTS, TIME_UNIT_SECS, |ctx| {
            let location = ctx.driver.current_location()?;
            let moved = location != previous;
            let matches = expected_suffix.is_none_or(|suffix| location.ends_with(suffix));
            Ok((moved && matches).then_some(location))
        })?;
        match arrived {
            Some(location) => {
                debug!(from = previous, to = %location, "navigation complete");
                Ok(location)
            }
            None => Err(TaskError::timeout(
                format!("navigation away from {previous}"),
                NAVIGATION_ATTEMPTS,
            )),
        }
    }

    pub fn wait_download_file_complete(&self, path: impl AsRef<Path>) -> Result<(), TaskError> {
        let path = path.as_ref();
        let present = self.poll(DOWNLOAD_ATTEMPTS, TIME_UNIT_SECS, |_| {
            Ok(path.exists().then_some(()))
        })?;
        match present {
            Some(()) => {
                info!(path = %path.display(), "download complete");
                Ok(())
            }
            None => Err(TaskError::timeout(
                format!("file {}", path.display()),
                DOWNLOAD_ATTEMPTS,
            )),
        }
    }

    /// Wait for a new tab to open, then close every tab except the first and switch back.
    pub fn wait_to_close_all_new_tabs_except_the_current(&mut self) -> Result<(), TaskError> {
        let handles = self
            .poll(NEW_TAB_ATTEMPTS, TIME_UNIT_SECS, |ctx| {
                let handles = ctx.driver.window_handles()?;
                Ok((handles.len() > 1).then_some(handles))
            })?
            .ok_or_else(|| TaskError::timeout("a new tab to open", NEW_TAB_ATTEMPTS))?;

        for handle in handles[1..].iter().rev() {
            self.driver.switch_to_window(handle)?;
            self.driver.close_window()?;
        }
        self.driver.switch_to_window(&handles[0])?;
        debug!(closed = handles.len() - 1, "extra tabs closed");
        Ok(())
    }

    /// First element under `selector` whose visible text equals `keyword`.
    pub fn find_matched_option(
        &self,
        selector: &Selector,
        keyword: &str,
    ) -> Result<Box<dyn UiElement>, TaskError> {
        for option in self.driver.find_elements(selector)? {
            if option.text()? == keyword {
                return Ok(option);
            }
        }
        Err(TaskError::OptionNotFound {
            keyword: keyword.to_string(),
        })
    }

    /// Whether a main loop ended at a terminate checkpoint.
    pub(crate) fn loop_terminated(&self) -> bool {
        self.loop_terminated
    }

    /// Close the session; failures are logged, not returned.
    pub(crate) fn close_driver(&mut self) {
        if let Err(err) = self.driver.close_session() {
            warn!(error = %err, "failed to close driver session");
        }
    }
}
