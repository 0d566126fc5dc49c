mod common;

use autotask_driver::{MemoryDriver, MemoryDriverFactory};
use autotask_runner::{
    Event, EventBroker, EventHandler, ExecutionControl, PercentChangedEvent, Percentage,
    SettingsError, TaskContext, TaskError, TaskHandle, TaskOutcome, TaskRunner, TaskStatus,
    ThreadState,
};
use common::{BrokenTask, CountingTask, RecordingObserver, settings, wait_until};
use rstest::rstest;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio_test::assert_ok;

fn memory_factory() -> MemoryDriverFactory {
    MemoryDriverFactory::new(MemoryDriver::new())
}

#[test]
fn terminate_stops_before_the_next_element() {
    let broker = Arc::new(EventBroker::new());
    let factory = memory_factory();
    let task = CountingTask::new(1..=200);
    let processed = task.processed.clone();
    let mut handle = TaskHandle::new(
        Box::new(task),
        settings("CountingTask", &[]),
        broker,
        Arc::new(factory.clone()),
    );

    assert_ok!(handle.start());
    wait_until(|| processed.lock().unwrap().len() >= 3);
    handle.terminate();

    let outcome = handle.join().expect("worker joined");
    assert_eq!(assert_ok!(outcome), TaskOutcome::Terminated);

    let processed = processed.lock().unwrap().clone();
    let progress = handle.progress();
    assert!(processed.len() < 200);
    assert_eq!(progress.current_element_count, processed.len());
    assert_eq!(processed, (1..=processed.len() as u32).collect::<Vec<_>>());
    assert!(factory.last_session().expect("session created").is_closed());
}

#[test]
fn pause_blocks_until_resume() {
    let broker = Arc::new(EventBroker::new());
    let observer = RecordingObserver::subscribe_all(&broker);
    let task = CountingTask::new(1..=400);
    let processed = task.processed.clone();
    let mut handle = TaskHandle::new(
        Box::new(task),
        settings("CountingTask", &[]),
        broker,
        Arc::new(memory_factory()),
    );

    assert_ok!(handle.start());
    wait_until(|| processed.lock().unwrap().len() >= 3);

    handle.pause();
    assert!(handle.is_paused());
    // Let the element in flight finish and the worker park at its checkpoint.
    thread::sleep(Duration::from_millis(100));
    let frozen = processed.lock().unwrap().len();
    thread::sleep(Duration::from_millis(200));
    assert_eq!(processed.lock().unwrap().len(), frozen);
    assert_eq!(handle.progress().current_element_count, frozen);
    assert!(handle.is_alive());

    handle.resume();
    wait_until(|| processed.lock().unwrap().len() > frozen);

    handle.terminate();
    let outcome = handle.join().expect("worker joined");
    assert_eq!(assert_ok!(outcome), TaskOutcome::Terminated);
    assert_eq!(handle.state(), ThreadState::Finished);

    wait_until(|| observer.statuses().contains(&TaskStatus::Terminated));
    let statuses = observer.statuses();
    assert!(statuses.contains(&TaskStatus::Paused));
    assert!(statuses.contains(&TaskStatus::Resumed));
}

#[rstest]
#[case::absent(&[("a", "1")])]
#[case::empty(&[("a", "1"), ("b", "")])]
fn missing_mandatory_setting_fails_before_driver(#[case] pairs: &[(&str, &str)]) {
    let broker = Arc::new(EventBroker::new());
    let observer = RecordingObserver::subscribe_all(&broker);
    let factory = memory_factory();
    let mut task = CountingTask::new(1..=3);
    task.mandatory = vec!["a", "b"];
    let mut runner = TaskRunner::new(
        Box::new(task),
        settings("CountingTask", pairs),
        broker,
        Arc::new(factory.clone()),
    );

    let err = runner.perform().unwrap_err();
    assert!(matches!(
        &err,
        TaskError::Settings(SettingsError::MissingKeys(keys)) if keys == &["b"]
    ));
    assert_eq!(factory.sessions_created(), 0);
    assert!(factory.sessions().is_empty());

    wait_until(|| observer.statuses().len() == 2);
    assert!(matches!(
        observer.statuses().as_slice(),
        [TaskStatus::Validating, TaskStatus::ConfigError(_)]
    ));
}

#[rstest]
#[case::error(false)]
#[case::panic(true)]
fn automate_failure_is_contained(#[case] panics: bool) {
    let factory = memory_factory();
    let mut handle = TaskHandle::new(
        Box::new(BrokenTask { panics }),
        settings("BrokenTask", &[]),
        Arc::new(EventBroker::new()),
        Arc::new(factory.clone()),
    );

    assert_ok!(handle.start());
    let outcome = assert_ok!(handle.join().expect("worker joined"));

    match outcome {
        TaskOutcome::Failed(message) => assert!(message.contains("row 1")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!handle.is_alive());
    assert!(factory.last_session().expect("session created").is_closed());
    assert_eq!(handle.progress().current_element_count, 0);
}

#[test]
fn failing_observer_does_not_disturb_the_run() {
    let broker = Arc::new(EventBroker::new());
    let failing: Arc<dyn EventHandler> =
        Arc::new(|_: &Event| -> anyhow::Result<()> { anyhow::bail!("dashboard offline") });
    broker.subscribe(PercentChangedEvent::TOPIC, failing);
    let observer = RecordingObserver::subscribe_all(&broker);

    let mut handle = TaskHandle::new(
        Box::new(CountingTask::new(1..=4)),
        settings("CountingTask", &[]),
        broker,
        Arc::new(memory_factory()),
    );
    assert_ok!(handle.start());
    let outcome = assert_ok!(handle.join().expect("worker joined"));
    assert_eq!(outcome, TaskOutcome::Completed);

    wait_until(|| observer.percentages().len() == 4);
    assert_eq!(observer.percentages(), vec![25.0, 50.0, 75.0, 100.0]);
}

#[test]
fn status_events_follow_the_run() {
    let broker = Arc::new(EventBroker::new());
    let observer = RecordingObserver::subscribe_all(&broker);
    let mut handle = TaskHandle::new(
        Box::new(CountingTask::new(1..=2)),
        settings("CountingTask", &[]),
        broker,
        Arc::new(memory_factory()),
    );

    assert_ok!(handle.start());
    assert!(matches!(handle.start(), Err(TaskError::AlreadyStarted)));
    handle.join();

    wait_until(|| observer.statuses().contains(&TaskStatus::Finished));
    assert_eq!(
        observer.statuses(),
        vec![
            TaskStatus::Validating,
            TaskStatus::DriverReady,
            TaskStatus::Automating,
            TaskStatus::Finished,
        ]
    );
}

#[test]
fn mainloop_reports_thirds() {
    let broker = Arc::new(EventBroker::new());
    let observer = RecordingObserver::subscribe_all(&broker);
    let progress = Arc::new(Percentage::new("T", broker));
    let mut ctx = TaskContext::new(
        "T",
        settings("T", &[("x", "1")]),
        Box::new(MemoryDriver::new()),
        Arc::new(ExecutionControl::new()),
        progress.clone(),
    )
    .unwrap();

    ctx.perform_mainloop_on_collection(vec![10, 20, 30], |_, _| Ok(()))
        .unwrap();

    assert_eq!(progress.total(), Some(3));
    assert_eq!(progress.current_count(), 3);

    wait_until(|| observer.percentages().len() == 3);
    let expected = [100.0 / 3.0, 200.0 / 3.0, 100.0];
    for (got, want) in observer.percentages().iter().zip(expected) {
        assert!((got - want).abs() < 1e-9, "got {got}, want {want}");
    }
}
