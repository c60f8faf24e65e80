use std::collections::{HashSet, VecDeque};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use specflow_core::{BackendError, BackendPlatform, ExecutionRequest};
use tracing::{debug, info, warn};

use crate::backend::factory::create_backend;
use crate::backend::{AgentBackend, BackendSettings};
use crate::rate_limit::{self, RetryPolicy};
use crate::run_tracker::{RunTracker, TaskOutcome, TaskStatus};

/// One independent unit of work for the coordinator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParallelTask {
    #[serde(default)]
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub subagent: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ParallelTask {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            subagent: None,
            model: None,
        }
    }

    pub fn with_subagent(mut self, name: impl Into<String>) -> Self {
        self.subagent = Some(name.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// A fresh request for this task; requests are never shared.
    fn request(&self, options: &ParallelOptions) -> ExecutionRequest {
        ExecutionRequest {
            prompt: self.prompt.clone(),
            subagent: self.subagent.clone(),
            model: self.model.clone(),
            isolate_session: options.isolate_session,
            timeout: options.timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParallelOptions {
    /// Upper bound on concurrently running tasks.
    pub max_workers: usize,
    /// Stop starting new tasks after the first failure.
    pub fail_fast: bool,
    pub timeout: Option<Duration>,
    pub isolate_session: bool,
    pub retry: RetryPolicy,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        Self {
            max_workers: 4,
            fail_fast: false,
            timeout: None,
            isolate_session: true,
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of a whole batch, in task input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub platform: BackendPlatform,
    pub outcomes: Vec<TaskOutcome>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(TaskOutcome::succeeded)
    }

    pub fn get(&self, id: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.id == id)
    }

    pub fn first_failure(&self) -> Option<&TaskOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.status == TaskStatus::Failed)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// The report itself, or the first failed task as an error.
    pub fn into_result(self) -> Result<Self, BackendError> {
        match self.first_failure() {
            Some(failed) => Err(BackendError::TaskFailed {
                id: failed.id.clone(),
                message: failed
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            }),
            None => Ok(self),
        }
    }
}

/// Builds one backend per task from a platform identifier.
pub type BackendMaker =
    dyn Fn(BackendPlatform) -> Result<Box<dyn AgentBackend>, BackendError> + Send + Sync;

/// Closes the backend when its task ends, on every path.
pub struct BackendLease(Box<dyn AgentBackend>);

impl BackendLease {
    pub fn new(backend: Box<dyn AgentBackend>) -> Self {
        Self(backend)
    }
}

impl Deref for BackendLease {
    type Target = dyn AgentBackend;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl Drop for BackendLease {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// State shared by the workers of one batch.
struct Batch {
    platform: BackendPlatform,
    options: ParallelOptions,
    factory: Arc<BackendMaker>,
    tracker: Mutex<RunTracker>,
    cancelled: AtomicBool,
    /// The instance created to read `supports_parallel`, handed to the first
    /// task that starts.
    spare: Mutex<Option<Box<dyn AgentBackend>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Batch {
    fn backend_for_task(&self) -> Result<BackendLease, BackendError> {
        let spare = lock(&self.spare).take();
        let backend = match spare {
            Some(b) => b,
            None => (self.factory)(self.platform)?,
        };
        Ok(BackendLease(backend))
    }

    /// True when fail-fast tripped; the task is then recorded as cancelled.
    fn skip_if_cancelled(&self, task: &ParallelTask) -> bool {
        if self.options.fail_fast && self.cancelled.load(Ordering::SeqCst) {
            info!("task {} cancelled before start", task.id);
            lock(&self.tracker).mark_cancelled(&task.id);
            return true;
        }
        false
    }

    fn trip(&self, task: &ParallelTask) {
        if self.options.fail_fast && !self.cancelled.swap(true, Ordering::SeqCst) {
            warn!(
                "task {} failed, not starting remaining tasks (fail-fast)",
                task.id
            );
        }
    }

    fn record_failure(&self, task: &ParallelTask, error: String) {
        self.trip(task);
        lock(&self.tracker).finish(&task.id, false, String::new(), Vec::new(), Some(error));
    }

    /// Execute one task on `backend`, buffering its lines privately.
    fn run_task(&self, backend: &dyn AgentBackend, task: &ParallelTask) {
        let active = {
            let mut tracker = lock(&self.tracker);
            tracker.mark_running(&task.id);
            tracker.active_count()
        };
        debug!("task {} started on {} ({active} running)", task.id, backend.name());

        let request = task.request(&self.options);
        let mut lines = Vec::new();
        let result = rate_limit::execute_with_retry(
            backend,
            &request,
            &self.options.retry,
            &mut |line: &str| lines.push(line.to_string()),
        );

        let (succeeded, output, error) = match result {
            Ok(r) if r.succeeded => (true, r.output, None),
            Ok(r) => {
                let msg = format!("{} exited with code {}", backend.name(), r.exit_code);
                (false, r.output, Some(msg))
            }
            Err(BackendError::RateLimited {
                backend: name,
                attempts,
                output,
            }) => {
                let msg = format!("{name} is rate limited (gave up after {attempts} attempts)");
                (false, output, Some(msg))
            }
            Err(e) => (false, String::new(), Some(e.to_string())),
        };

        if succeeded {
            info!("task {} succeeded", task.id);
        } else {
            warn!(
                "task {} failed: {}",
                task.id,
                error.as_deref().unwrap_or("unknown error")
            );
            self.trip(task);
        }
        lock(&self.tracker).finish(&task.id, succeeded, output, lines, error);
    }

    /// Pull tasks from the shared queue until it is empty.
    fn work(&self, queue: &Mutex<VecDeque<ParallelTask>>) {
        loop {
            let Some(task) = lock(queue).pop_front() else {
                break;
            };
            if self.skip_if_cancelled(&task) {
                continue;
            }
            match self.backend_for_task() {
                Ok(backend) => self.run_task(&*backend, &task),
                Err(e) => {
                    warn!("task {}: could not create backend: {e}", task.id);
                    self.record_failure(&task, e.to_string());
                }
            }
        }
    }

    /// Run every task in order on a single backend instance.
    fn work_sequentially(&self, backend: BackendLease, tasks: Vec<ParallelTask>) {
        for task in tasks {
            if self.skip_if_cancelled(&task) {
                continue;
            }
            self.run_task(&*backend, &task);
        }
    }
}

/// Fans tasks out across a bounded pool of blocking workers, one fresh
/// backend per task.
pub struct ParallelExecutor {
    platform: BackendPlatform,
    options: ParallelOptions,
    factory: Arc<BackendMaker>,
}

impl ParallelExecutor {
    /// Backends come from [`create_backend`] with `settings`.
    pub fn new(platform: BackendPlatform, settings: BackendSettings, options: ParallelOptions) -> Self {
        let factory = move |p: BackendPlatform| {
            create_backend(p, &settings, false).map(|b| Box::new(b) as Box<dyn AgentBackend>)
        };
        Self {
            platform,
            options,
            factory: Arc::new(factory),
        }
    }

    /// Replace the backend factory.
    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(BackendPlatform) -> Result<Box<dyn AgentBackend>, BackendError>
            + Send
            + Sync
            + 'static,
    {
        let factory: Arc<BackendMaker> = Arc::new(factory);
        self.factory = factory;
        self
    }

    pub fn options(&self) -> &ParallelOptions {
        &self.options
    }

    /// Run all tasks and wait for every one of them to settle.
    ///
    /// Task failures are recorded in the report, not returned as errors.
    /// Errors are reserved for an invalid batch or a backend that cannot be
    /// created at all.
    pub async fn run(&self, tasks: Vec<ParallelTask>) -> Result<BatchReport, BackendError> {
        let order: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        validate_ids(&order)?;
        if tasks.is_empty() {
            return Ok(BatchReport {
                platform: self.platform,
                outcomes: Vec::new(),
            });
        }

        let first = (self.factory)(self.platform)?;
        let parallel = first.supports_parallel();

        let batch = Arc::new(Batch {
            platform: self.platform,
            options: self.options.clone(),
            factory: Arc::clone(&self.factory),
            tracker: Mutex::new(RunTracker::new(order.iter().map(String::as_str))),
            cancelled: AtomicBool::new(false),
            spare: Mutex::new(None),
        });

        if !parallel {
            info!(
                "{} does not support parallel execution, running {} tasks sequentially",
                first.name(),
                tasks.len()
            );
            let worker = Arc::clone(&batch);
            let lease = BackendLease(first);
            if let Err(e) =
                tokio::task::spawn_blocking(move || worker.work_sequentially(lease, tasks)).await
            {
                warn!("sequential worker panicked: {e}");
            }
        } else {
            let workers = self.options.max_workers.clamp(1, tasks.len());
            info!(
                "running {} tasks on {} with {workers} workers",
                tasks.len(),
                self.platform
            );
            *lock(&batch.spare) = Some(first);

            let queue = Arc::new(Mutex::new(VecDeque::from(tasks)));
            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                let worker = Arc::clone(&batch);
                let queue = Arc::clone(&queue);
                handles.push(tokio::task::spawn_blocking(move || worker.work(&queue)));
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!("worker panicked: {e}");
                }
            }

            if let Some(unused) = lock(&batch.spare).take() {
                drop(BackendLease(unused));
            }
        }

        let mut tracker = lock(&batch.tracker);
        let outcomes = order
            .iter()
            .filter_map(|id| tracker.take(id))
            .map(|mut outcome| {
                if !outcome.status.is_terminal() {
                    outcome.status = TaskStatus::Failed;
                    outcome.error = Some("worker exited before the task finished".into());
                }
                outcome
            })
            .collect();

        Ok(BatchReport {
            platform: self.platform,
            outcomes,
        })
    }
}

fn validate_ids(ids: &[String]) -> Result<(), BackendError> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(BackendError::InvalidBatch("task id must not be empty".into()));
        }
        if !seen.insert(id.as_str()) {
            return Err(BackendError::InvalidBatch(format!("duplicate task id '{id}'")));
        }
    }
    Ok(())
}
