use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::errors::{Result, RunnerError};
use crate::runner::validate_job;
use crate::types::{Job, JobRequest, JobResult};

/// The narrow transport contract the worker consumes. External queue
/// backends live behind this; the crate ships an in-process implementation.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Next job, pending until one is available. `None` once the queue has
    /// shut down for good.
    async fn dequeue(&self) -> Option<Job>;

    async fn ack(&self, job_id: &str, result: JobResult) -> Result<()>;

    async fn fail(&self, job_id: &str, error: &str) -> Result<()>;
}

/// Lifecycle of a submitted job as seen by callers polling for results.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobRecord {
    Queued,
    Active,
    Completed { result: JobResult },
    Failed { error: String },
}

/// Channel-backed queue plus a result store keyed by job id.
pub struct InMemoryQueue {
    name: String,
    tx: tokio::sync::mpsc::Sender<Job>,
    rx: tokio::sync::Mutex<tokio::sync::mpsc::Receiver<Job>>,
    records: RwLock<HashMap<String, JobRecord>>,
}

impl InMemoryQueue {
    pub fn new(config: &QueueConfig) -> Self {
        let (tx, rx) = tokio::sync::mpsc::channel(config.capacity);
        Self {
            name: config.name.clone(),
            tx,
            rx: tokio::sync::Mutex::new(rx),
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validate and enqueue a request, assigning the job its id. Invalid
    /// requests never reach the queue.
    pub fn enqueue(&self, request: JobRequest) -> Result<String> {
        let job = Job::new(Uuid::new_v4().to_string(), request);
        if let Err(errors) = validate_job(&job) {
            return Err(RunnerError::Validation(errors.join(", ")));
        }

        let id = job.id.clone();
        write_lock(&self.records).insert(id.clone(), JobRecord::Queued);
        if self.tx.try_send(job).is_err() {
            write_lock(&self.records).remove(&id);
            return Err(RunnerError::Queue(format!(
                "queue \"{}\" is full",
                self.name
            )));
        }

        info!(job_id = %id, queue = %self.name, "job enqueued");
        Ok(id)
    }

    pub fn record(&self, job_id: &str) -> Option<JobRecord> {
        read_lock(&self.records).get(job_id).cloned()
    }

    /// Jobs accepted but not yet dequeued.
    pub fn queued_len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn dequeue(&self) -> Option<Job> {
        // recv() is the only await past which a job exists, so a caller
        // racing this future against shutdown cannot lose one.
        let job = {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        };
        if let Some(job) = &job {
            write_lock(&self.records).insert(job.id.clone(), JobRecord::Active);
            debug!(job_id = %job.id, "job dequeued");
        }
        job
    }

    async fn ack(&self, job_id: &str, result: JobResult) -> Result<()> {
        info!(job_id, "job acknowledged");
        write_lock(&self.records).insert(job_id.to_string(), JobRecord::Completed { result });
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: &str) -> Result<()> {
        info!(job_id, error, "job failure reported");
        write_lock(&self.records).insert(
            job_id.to_string(),
            JobRecord::Failed {
                error: error.to_string(),
            },
        );
        Ok(())
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BrowserKind, JobStatus, Step};
    use chrono::Utc;

    fn queue(capacity: usize) -> InMemoryQueue {
        InMemoryQueue::new(&QueueConfig {
            name: "test-jobs".to_string(),
            capacity,
        })
    }

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

    fn result_for(job_id: &str) -> JobResult {
        JobResult {
            status: JobStatus::Success,
            job_id: job_id.to_string(),
            steps_executed: 1,
            total_steps: 1,
            steps: vec![],
            error: None,
            start_time: Utc::now(),
            end_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_round_trips() {
        let queue = queue(4);
        let id = queue.enqueue(request()).unwrap();
        assert!(matches!(queue.record(&id), Some(JobRecord::Queued)));

        let job = queue.dequeue().await.unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.steps.len(), 1);
        assert!(matches!(queue.record(&id), Some(JobRecord::Active)));
    }

    #[tokio::test]
    async fn invalid_requests_never_reach_the_queue() {
        let queue = queue(4);
        let err = queue
            .enqueue(JobRequest {
                browser: BrowserKind::Chromium,
                steps: vec![],
                timeout: None,
            })
            .unwrap_err();

        assert!(matches!(err, RunnerError::Validation(_)));
        assert_eq!(queue.queued_len(), 0);
    }

    #[tokio::test]
    async fn a_full_queue_rejects_new_jobs() {
        let queue = queue(1);
        queue.enqueue(request()).unwrap();
        let err = queue.enqueue(request()).unwrap_err();

        match err {
            RunnerError::Queue(message) => assert!(message.contains("full")),
            other => panic!("expected Queue, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ack_and_fail_update_the_record() {
        let queue = queue(4);
        let id = queue.enqueue(request()).unwrap();
        queue.dequeue().await.unwrap();

        queue.ack(&id, result_for(&id)).await.unwrap();
        assert!(matches!(queue.record(&id), Some(JobRecord::Completed { .. })));

        queue.fail(&id, "step failed").await.unwrap();
        match queue.record(&id) {
            Some(JobRecord::Failed { error }) => assert_eq!(error, "step failed"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}
