use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};

use crate::browser::BrowserDriver;
use crate::config::WorkerConfig;
use crate::queue::JobQueue;
use crate::runner::JobExecutor;
use crate::types::{Job, JobStatus};

/// Worker state behind accessors. Readers (the health surface) never touch
/// worker internals directly.
pub struct WorkerStatus {
    accepting: AtomicBool,
    processing: AtomicBool,
    last_active_ms: AtomicI64,
}

impl WorkerStatus {
    pub fn new() -> Self {
        Self {
            accepting: AtomicBool::new(true),
            processing: AtomicBool::new(false),
            last_active_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        let ms = self.last_active_ms.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            accepting: self.is_accepting(),
            processing: self.is_processing(),
            last_active: self.last_active(),
        }
    }

    fn set_processing(&self, processing: bool) {
        self.processing.store(processing, Ordering::SeqCst);
        self.last_active_ms
            .store(Utc::now().timestamp_millis(), Ordering::SeqCst);
    }

    fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub accepting: bool,
    pub processing: bool,
    pub last_active: DateTime<Utc>,
}

/// Pulls jobs one at a time per slot and reports each result back to the
/// queue. Single attempt: a failed job is reported, never retried here.
pub struct Worker<Q: JobQueue, D: BrowserDriver> {
    queue: Arc<Q>,
    executor: Arc<JobExecutor<D>>,
    status: Arc<WorkerStatus>,
    config: WorkerConfig,
}

impl<Q: JobQueue, D: BrowserDriver> Worker<Q, D> {
    pub fn new(
        queue: Arc<Q>,
        executor: Arc<JobExecutor<D>>,
        status: Arc<WorkerStatus>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            executor,
            status,
            config,
        }
    }

    /// Consume jobs until shutdown is signalled. New jobs stop being
    /// accepted immediately; the job already in flight runs to completion
    /// so its session reaches close.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let concurrency = self.config.concurrency.max(1);
        let mut handles = Vec::with_capacity(concurrency);
        for slot in 0..concurrency {
            let worker = self.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                worker.consume(slot, shutdown).await;
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker slot panicked");
            }
        }
        info!("worker stopped");
    }

    async fn consume(&self, slot: usize, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow_and_update() {
                self.status.stop_accepting();
                info!(slot, "shutdown signalled; no further jobs accepted");
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown.
                    if changed.is_err() {
                        self.status.stop_accepting();
                        break;
                    }
                }
                job = self.queue.dequeue() => match job {
                    Some(job) => self.process(job).await,
                    None => {
                        info!(slot, "queue closed");
                        break;
                    }
                },
            }
        }
    }

    async fn process(&self, job: Job) {
        self.status.set_processing(true);
        let job_id = job.id.clone();
        let result = self.executor.run(&job).await;

        let report = match result.status {
            JobStatus::Success => self.queue.ack(&job_id, result).await,
            JobStatus::Failure => {
                let error = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "job failed".to_string());
                self.queue.fail(&job_id, &error).await
            }
        };
        if let Err(e) = report {
            error!(job_id = %job_id, error = %e, "failed to report job result to the queue");
        }

        self.status.set_processing(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, QueueConfig};
    use crate::queue::{InMemoryQueue, JobRecord};
    use crate::testing::{ScriptedDriver, StepScript};
    use crate::types::{BrowserKind, JobRequest, Step};
    use std::sync::atomic::Ordering as AtomicOrdering;
    use std::time::Duration;

    fn request() -> JobRequest {
        JobRequest {
            browser: BrowserKind::Chromium,
            steps: vec![Step::Goto {
                url: "https://example.com".to_string(),
                timeout: None,
            }],
            timeout: None,
        }
    }

    fn build(
        driver: ScriptedDriver,
    ) -> (
        Arc<InMemoryQueue>,
        Arc<Worker<InMemoryQueue, ScriptedDriver>>,
        Arc<WorkerStatus>,
    ) {
        let queue = Arc::new(InMemoryQueue::new(&QueueConfig {
            name: "test-jobs".to_string(),
            capacity: 8,
        }));
        let status = Arc::new(WorkerStatus::new());
        let executor = Arc::new(JobExecutor::new(driver, Config::default()));
        let worker = Arc::new(Worker::new(
            queue.clone(),
            executor,
            status.clone(),
            WorkerConfig {
                concurrency: 1,
                shutdown_grace_ms: 1_000,
            },
        ));
        (queue, worker, status)
    }

    async fn wait_until<F: Fn() -> bool>(condition: F, what: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {what}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn successes_are_acked_and_failures_reported() {
        let driver = ScriptedDriver::with_steps(vec![
            StepScript::Succeed,
            StepScript::Fail("element vanished".to_string()),
        ]);
        let log = driver.log();
        let (queue, worker, _status) = build(driver);

        let ok_id = queue.enqueue(request()).unwrap();
        let bad_id = queue.enqueue(request()).unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(rx));

        let queue_for_wait = queue.clone();
        let ok = ok_id.clone();
        let bad = bad_id.clone();
        wait_until(
            move || {
                matches!(
                    queue_for_wait.record(&ok),
                    Some(JobRecord::Completed { .. })
                ) && matches!(queue_for_wait.record(&bad), Some(JobRecord::Failed { .. }))
            },
            "both jobs to finish",
        )
        .await;

        match queue.record(&bad_id) {
            Some(JobRecord::Failed { error }) => assert!(error.contains("element vanished")),
            other => panic!("expected Failed, got {other:?}"),
        }
        // One session per job, each closed exactly once.
        assert_eq!(log.opens.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(log.closes.load(AtomicOrdering::SeqCst), 2);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop_and_flips_accepting() {
        let (queue, worker, status) = build(ScriptedDriver::new());
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(rx));

        assert!(status.is_accepting());
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(!status.is_accepting());
        assert!(!status.is_processing());
        // The queue outlives the worker; a job enqueued now just sits there.
        let id = queue.enqueue(request()).unwrap();
        assert!(matches!(queue.record(&id), Some(JobRecord::Queued)));
    }
}
