/*
[INPUT]:  CLI arguments, YAML runner file, OS shutdown signals
[OUTPUT]: Configured tasks run sequentially or concurrently with graceful termination
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow, bail};
use autotask_driver::{
    DriverFactory, MemoryDriver, MemoryDriverFactory, WebDriverConfig, WebDriverFactory,
};
use autotask_runner::{
    Event, EventBroker, EventHandler, ExecutionControl, PercentChangedEvent, RunnerConfig,
    TaskHandle, TaskOutcome, TaskRegistry, TaskStatusEvent,
};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const JOIN_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DriverKind {
    /// W3C WebDriver server such as chromedriver
    Webdriver,
    /// Scripted in-process driver, no browser
    Memory,
}

#[derive(Parser, Debug)]
#[command(name = "autotask-runner", version, about = "UI automation task runner")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    /// Also write a daily rolling log file into this directory
    #[arg(long = "log-dir", value_name = "DIR")]
    log_dir: Option<PathBuf>,
    #[arg(long = "driver", value_enum, default_value_t = DriverKind::Webdriver)]
    driver: DriverKind,
    #[arg(long = "webdriver-url", value_name = "URL", default_value = "http://localhost:9515")]
    webdriver_url: String,
    #[arg(long = "dry-run")]
    dry_run: bool,
}

type Controls = Arc<Mutex<Vec<Arc<ExecutionControl>>>>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let _log_guard = init_tracing(&args.log_level, args.log_dir.as_deref())?;

    info!(
        config_path = %args.config_path.display(),
        dry_run = args.dry_run,
        "starting autotask-runner"
    );

    let config = load_config(&args.config_path)?;
    let registry = TaskRegistry::with_builtin_tasks();
    info!(
        task_count = config.tasks.len(),
        run_sequentially = config.run_sequentially,
        "configuration loaded"
    );

    if args.dry_run {
        validate_tasks(&config, &registry)?;
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let broker = Arc::new(EventBroker::new());
    let observer: Arc<dyn EventHandler> = Arc::new(log_event);
    broker.subscribe(PercentChangedEvent::TOPIC, observer.clone());
    broker.subscribe(TaskStatusEvent::TOPIC, observer);

    let factory = build_factory(args.driver, &args.webdriver_url);

    let shutdown = CancellationToken::new();
    let controls: Controls = Arc::new(Mutex::new(Vec::new()));
    setup_signal_handlers(shutdown.clone());
    spawn_terminator(shutdown.clone(), controls.clone());

    let mut handles = Vec::new();
    let mut failures = 0usize;
    for entry in &config.tasks {
        if shutdown.is_cancelled() {
            warn!(task = %entry.name, "shutdown requested; task not started");
            continue;
        }
        let task = registry
            .create(&entry.name)
            .with_context(|| format!("create task {}", entry.name))?;
        let mut handle = TaskHandle::new(
            task,
            entry.settings_for_run(),
            broker.clone(),
            factory.clone(),
        );
        controls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle.control());
        handle
            .start()
            .with_context(|| format!("start task {}", entry.name))?;

        if config.run_sequentially {
            if !join_with_deadline(handle).await {
                failures += 1;
            }
        } else {
            handles.push(handle);
        }
    }

    let joins: Vec<_> = handles.into_iter().map(join_with_deadline).collect();
    for succeeded in join_all_concurrently(joins).await {
        if !succeeded {
            failures += 1;
        }
    }

    shutdown.cancel();
    if failures > 0 {
        bail!("{failures} task(s) did not complete");
    }
    info!("all tasks complete");
    Ok(())
}

/// Await every future; joins run concurrently because each one is its own tokio task.
async fn join_all_concurrently<F>(futures: Vec<F>) -> Vec<bool>
where
    F: std::future::Future<Output = bool> + Send + 'static,
{
    let spawned: Vec<_> = futures.into_iter().map(tokio::spawn).collect();
    let mut results = Vec::with_capacity(spawned.len());
    for joiner in spawned {
        results.push(joiner.await.unwrap_or(false));
    }
    results
}

fn init_tracing(log_level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "autotask-runner.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(guard)
}

fn load_config(path: &Path) -> Result<RunnerConfig> {
    RunnerConfig::from_file(path)
        .with_context(|| format!("load config {}", path.display()))
}

/// Every task must be registered and have its mandatory settings.
fn validate_tasks(config: &RunnerConfig, registry: &TaskRegistry) -> Result<()> {
    for entry in &config.tasks {
        let task = registry
            .create(&entry.name)
            .with_context(|| format!("known tasks: {}", registry.names().join(", ")))?;
        let settings = entry.settings_for_run();
        let mandatory = task.mandatory_settings();
        settings
            .validate_keys(mandatory.iter().copied())
            .with_context(|| format!("settings of task {}", entry.name))?;
        settings
            .timing_factor()
            .with_context(|| format!("settings of task {}", entry.name))?;
        info!(task = %entry.name, "settings valid");
    }
    Ok(())
}

fn build_factory(kind: DriverKind, webdriver_url: &str) -> Arc<dyn DriverFactory> {
    match kind {
        DriverKind::Webdriver => {
            info!(endpoint = webdriver_url, "using webdriver backend");
            Arc::new(WebDriverFactory::new(WebDriverConfig::with_endpoint(
                webdriver_url,
            )))
        }
        DriverKind::Memory => {
            info!("using in-memory driver backend");
            Arc::new(MemoryDriverFactory::new(MemoryDriver::new()))
        }
    }
}

fn log_event(event: &Event) -> Result<()> {
    match event {
        Event::PercentChanged(changed) => {
            info!(
                task = %changed.task_name,
                percent = %format!("{:.2}", changed.current_percent),
                "progress"
            );
        }
        Event::TaskStatus(status) => {
            info!(
                task = %status.task_name,
                run_id = %status.run_id,
                status = %status.status,
                "task status"
            );
        }
    }
    Ok(())
}

/// Returns whether the task completed.
async fn join_with_deadline(mut handle: TaskHandle) -> bool {
    let task = handle.task_name();
    let joiner = tokio::task::spawn_blocking(move || handle.join());
    match tokio::time::timeout(JOIN_TIMEOUT, joiner).await {
        Ok(Ok(Some(Ok(TaskOutcome::Completed)))) => {
            info!(task, "task completed");
            true
        }
        Ok(Ok(Some(Ok(TaskOutcome::Terminated)))) => {
            warn!(task, "task terminated before completion");
            false
        }
        Ok(Ok(Some(Ok(TaskOutcome::Failed(message))))) => {
            error!(task, error = %message, "task failed");
            false
        }
        Ok(Ok(Some(Err(err)))) => {
            error!(task, error = %err, "task did not start");
            false
        }
        Ok(Ok(None)) => {
            error!(task, "task worker panicked");
            false
        }
        Ok(Err(err)) => {
            error!(task, error = %err, "join failed");
            false
        }
        Err(_) => {
            warn!(
                task,
                timeout_secs = JOIN_TIMEOUT.as_secs(),
                "task still running after join timeout"
            );
            false
        }
    }
}

/// Terminates every started task once shutdown is requested.
fn spawn_terminator(shutdown: CancellationToken, controls: Controls) {
    tokio::spawn(async move {
        shutdown.cancelled().await;
        let controls = controls.lock().unwrap_or_else(PoisonError::into_inner);
        for control in controls.iter() {
            control.terminate();
        }
    });
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
