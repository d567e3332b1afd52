//! One independent keep-alive task per registered target.

pub mod engine;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::fetch::Fetcher;
use crate::history::HistoryLog;
use crate::registry::{SiteRegistry, Target};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("a keep-alive task for {0} is already running")]
    AlreadyScheduled(String),
    #[error("no async runtime available to run the keep-alive task")]
    NoRuntime,
    #[error("scheduler is shutting down")]
    ShuttingDown,
}

struct TaskHandle {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Launches and tracks the per-target loops.
///
/// Tasks run until [`Scheduler::shutdown`] or process exit. Adding a task
/// never touches the ones already running.
#[derive(Clone)]
pub struct Scheduler {
    fetcher: Arc<dyn Fetcher>,
    history: HistoryLog,
    tasks: Arc<Mutex<HashMap<String, TaskHandle>>>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(fetcher: Arc<dyn Fetcher>, history: HistoryLog) -> Self {
        Self {
            fetcher,
            history,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawn a task for every target currently in `registry`.
    ///
    /// Targets that already have a live task are left alone, so calling this
    /// twice does not double-schedule. Returns how many tasks were started.
    pub fn start(&self, registry: &SiteRegistry) -> Result<usize, ScheduleError> {
        let mut started = 0;
        for target in registry.list() {
            match self.spawn_for(&target) {
                Ok(()) => started += 1,
                Err(ScheduleError::AlreadyScheduled(url)) => {
                    debug!(%url, "Task already running, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        info!(started, "Scheduler started");
        Ok(started)
    }

    /// Spawn exactly one task for `target`; its first fetch is immediate.
    pub fn spawn_for(&self, target: &Target) -> Result<(), ScheduleError> {
        let runtime = Handle::try_current().map_err(|_| ScheduleError::NoRuntime)?;
        if self.shutdown.is_cancelled() {
            return Err(ScheduleError::ShuttingDown);
        }

        let mut tasks = self.lock();
        if let Some(existing) = tasks.get(&target.url) {
            if !existing.handle.is_finished() {
                return Err(ScheduleError::AlreadyScheduled(target.url.clone()));
            }
        }

        let cancel = self.shutdown.child_token();
        let handle = runtime.spawn(engine::run_target_loop(
            target.clone(),
            self.fetcher.clone(),
            self.history.clone(),
            cancel.clone(),
        ));
        tasks.insert(target.url.clone(), TaskHandle { handle, cancel });
        Ok(())
    }

    /// Whether a live task exists for `url`.
    pub fn is_scheduled(&self, url: &str) -> bool {
        self.lock()
            .get(url)
            .is_some_and(|t| !t.handle.is_finished())
    }

    pub fn active_tasks(&self) -> usize {
        self.lock()
            .values()
            .filter(|t| !t.handle.is_finished())
            .count()
    }

    /// Cancel every task and wait for them to wind down.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<_> = self
            .lock()
            .drain()
            .map(|(_, task)| {
                task.cancel.cancel();
                task.handle
            })
            .collect();

        let count = handles.len();
        futures::future::join_all(handles).await;
        info!(stopped = count, "Scheduler shut down");
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TaskHandle>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchOutcome, OutcomeKind};
    use std::time::Duration;

    /// Counts calls per url and answers with a fixed outcome kind.
    struct StubFetcher {
        kind: OutcomeKind,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl StubFetcher {
        fn new(kind: OutcomeKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                calls: Mutex::new(HashMap::new()),
            })
        }

        fn calls(&self, url: &str) -> usize {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait::async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> FetchOutcome {
            *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
            match self.kind {
                OutcomeKind::Success => FetchOutcome::success(url, "200 OK"),
                OutcomeKind::Failure => FetchOutcome::failure(url, "503 Service Unavailable"),
                OutcomeKind::Error => FetchOutcome::error(url, "connection refused"),
            }
        }
    }

    fn target(url: &str, interval_seconds: u64) -> Target {
        Target {
            url: url.to_string(),
            interval_seconds,
        }
    }

    fn scheduler_with(stub: &Arc<StubFetcher>) -> (Scheduler, HistoryLog) {
        let history = HistoryLog::new(100);
        let fetcher: Arc<dyn Fetcher> = stub.clone();
        (Scheduler::new(fetcher, history.clone()), history)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_fetches_every_target_immediately() {
        let stub = StubFetcher::new(OutcomeKind::Success);
        let (scheduler, history) = scheduler_with(&stub);
        let registry =
            SiteRegistry::with_targets([target("https://a.test", 60), target("https://b.test", 90)]);

        assert_eq!(scheduler.start(&registry).unwrap(), 2);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(stub.calls("https://a.test"), 1);
        assert_eq!(stub.calls("https://b.test"), 1);
        assert_eq!(history.len(), 2);
        assert_eq!(scheduler.active_tasks(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_target_keeps_its_own_interval() {
        let stub = StubFetcher::new(OutcomeKind::Success);
        let (scheduler, history) = scheduler_with(&stub);
        let registry =
            SiteRegistry::with_targets([target("https://a.test", 60), target("https://b.test", 90)]);

        scheduler.start(&registry).unwrap();
        tokio::time::sleep(Duration::from_secs(125)).await;

        // a: 0, 60, 120 -- b: 0, 90
        assert_eq!(stub.calls("https://a.test"), 3);
        assert_eq!(stub.calls("https://b.test"), 2);
        assert_eq!(history.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_do_not_stop_the_loop() {
        let stub = StubFetcher::new(OutcomeKind::Error);
        let (scheduler, history) = scheduler_with(&stub);

        scheduler.spawn_for(&target("https://down.test", 30)).unwrap();
        tokio::time::sleep(Duration::from_secs(95)).await;

        assert_eq!(stub.calls("https://down.test"), 4);
        assert!(history.snapshot().iter().all(|o| o.kind == OutcomeKind::Error));
        assert!(scheduler.is_scheduled("https://down.test"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_spawn_leaves_existing_tasks_alone() {
        let stub = StubFetcher::new(OutcomeKind::Success);
        let (scheduler, _history) = scheduler_with(&stub);
        let registry = SiteRegistry::with_targets([target("https://a.test", 60)]);
        scheduler.start(&registry).unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        let added = registry.add("https://b.test", 60).unwrap();
        scheduler.spawn_for(&added).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        // b fetched right away, a still on its first schedule
        assert_eq!(stub.calls("https://b.test"), 1);
        assert_eq!(stub.calls("https://a.test"), 1);

        tokio::time::sleep(Duration::from_secs(34)).await;
        assert_eq!(stub.calls("https://a.test"), 2);
        assert_eq!(stub.calls("https://b.test"), 1);
        assert_eq!(scheduler.active_tasks(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_for_rejects_second_task() {
        let stub = StubFetcher::new(OutcomeKind::Success);
        let (scheduler, _history) = scheduler_with(&stub);
        let t = target("https://a.test", 60);

        scheduler.spawn_for(&t).unwrap();
        assert_eq!(
            scheduler.spawn_for(&t),
            Err(ScheduleError::AlreadyScheduled("https://a.test".to_string()))
        );

        let registry = SiteRegistry::with_targets([t]);
        assert_eq!(scheduler.start(&registry).unwrap(), 0);
        assert_eq!(scheduler.active_tasks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_all_tasks() {
        let stub = StubFetcher::new(OutcomeKind::Failure);
        let (scheduler, _history) = scheduler_with(&stub);
        let registry =
            SiteRegistry::with_targets([target("https://a.test", 60), target("https://b.test", 60)]);
        scheduler.start(&registry).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        scheduler.shutdown().await;
        assert_eq!(scheduler.active_tasks(), 0);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(stub.calls("https://a.test"), 1);
        assert_eq!(
            scheduler.spawn_for(&target("https://c.test", 60)),
            Err(ScheduleError::ShuttingDown)
        );
    }

    #[test]
    fn test_spawn_without_runtime_fails_cleanly() {
        let stub = StubFetcher::new(OutcomeKind::Success);
        let (scheduler, _history) = scheduler_with(&stub);
        assert_eq!(
            scheduler.spawn_for(&target("https://a.test", 60)),
            Err(ScheduleError::NoRuntime)
        );
        assert_eq!(scheduler.active_tasks(), 0);
    }
}
