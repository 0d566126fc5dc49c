/*
[INPUT]:  Test cases needing scripted tasks and event capture
[OUTPUT]: Shared helpers for autotask-runner integration tests
[POS]:    Test support
[UPDATE]: When integration tests need new fixtures
*/

#![allow(dead_code)]

use autotask_runner::{
    AutomatedTask, Event, EventBroker, EventHandler, PercentChangedEvent, Settings, TaskContext,
    TaskStatus, TaskStatusEvent,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Collects every delivered event in delivery order.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl EventHandler for RecordingObserver {
    fn handle_incoming_event(&self, event: &Event) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

impl RecordingObserver {
    pub fn subscribe_all(broker: &EventBroker) -> Arc<Self> {
        let observer = Arc::new(Self::default());
        broker.subscribe(PercentChangedEvent::TOPIC, observer.clone());
        broker.subscribe(TaskStatusEvent::TOPIC, observer.clone());
        observer
    }

    pub fn percentages(&self) -> Vec<f64> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::PercentChanged(changed) => Some(changed.current_percent),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<TaskStatus> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::TaskStatus(status) => Some(status.status.clone()),
                _ => None,
            })
            .collect()
    }
}

pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Settings with `invoked_class` and a fast timing factor.
pub fn settings(class: &str, pairs: &[(&str, &str)]) -> Settings {
    let mut settings: Settings = pairs.iter().copied().collect();
    settings.insert("invoked_class", class);
    settings.insert("time.unit.factor", "0.001");
    settings
}

/// Walks `items`, recording each one, with a short pause per element.
pub struct CountingTask {
    pub items: Vec<u32>,
    pub mandatory: Vec<&'static str>,
    pub processed: Arc<Mutex<Vec<u32>>>,
    pub step: Duration,
}

impl CountingTask {
    pub fn new(items: impl IntoIterator<Item = u32>) -> Self {
        Self {
            items: items.into_iter().collect(),
            mandatory: Vec::new(),
            processed: Arc::new(Mutex::new(Vec::new())),
            step: Duration::from_millis(5),
        }
    }
}

impl AutomatedTask for CountingTask {
    fn task_name(&self) -> &'static str {
        "CountingTask"
    }

    fn mandatory_settings(&self) -> Vec<&'static str> {
        self.mandatory.clone()
    }

    fn automate(&mut self, ctx: &mut TaskContext) -> anyhow::Result<()> {
        let processed = self.processed.clone();
        let step = self.step;
        ctx.perform_mainloop_on_collection(self.items.clone(), |_, item| {
            processed.lock().unwrap().push(item);
            thread::sleep(step);
            Ok(())
        })?;
        Ok(())
    }
}

/// Fails (or panics) on its first element.
pub struct BrokenTask {
    pub panics: bool,
}

impl AutomatedTask for BrokenTask {
    fn task_name(&self) -> &'static str {
        "BrokenTask"
    }

    fn mandatory_settings(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn automate(&mut self, ctx: &mut TaskContext) -> anyhow::Result<()> {
        let panics = self.panics;
        ctx.perform_mainloop_on_collection([1, 2, 3], |_, item| {
            if panics {
                panic!("unexpected dialog on row {item}");
            }
            anyhow::bail!("row {item} could not be read")
        })?;
        Ok(())
    }
}
