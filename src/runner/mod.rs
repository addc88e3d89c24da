use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserDriver, BrowserSession};
use crate::config::Config;
use crate::types::{Job, JobResult, JobStatus, StepOutcome};

pub mod steps;
pub mod validate;

use steps::{execute_step, step_bound};
pub use validate::validate_job;

/// Drives one job at a time through
/// validate -> open session -> run steps -> close, producing exactly one
/// `JobResult` per job. The session is closed on every exit path.
pub struct JobExecutor<D: BrowserDriver> {
    driver: D,
    config: Config,
}

impl<D: BrowserDriver> JobExecutor<D> {
    pub fn new(driver: D, config: Config) -> Self {
        Self { driver, config }
    }

    pub async fn run(&self, job: &Job) -> JobResult {
        let start_time = Utc::now();
        info!(
            job_id = %job.id,
            browser = %job.browser,
            total_steps = job.steps.len(),
            "starting job"
        );

        if let Err(errors) = validate_job(job) {
            let message = format!("job validation failed: {}", errors.join(", "));
            error!(job_id = %job.id, "{message}");
            return self.finish(job, start_time, Utc::now(), Vec::new(), Some(message));
        }

        let mut session = match self.driver.open(job.browser, &self.config.browser).await {
            Ok(session) => session,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "browser session failed to open");
                return self.finish(job, start_time, Utc::now(), Vec::new(), Some(e.to_string()));
            }
        };

        let (outcomes, job_error) = self.drive(&mut session, job).await;

        // The result brackets validation through completion; cleanup latency
        // stays out of it.
        let end_time = Utc::now();

        // Close exactly once, on success and failure alike. A close failure
        // is logged and swallowed so it cannot mask the job's outcome.
        if let Err(e) = session.close().await {
            warn!(job_id = %job.id, error = %e, "session close failed");
        }

        self.finish(job, start_time, end_time, outcomes, job_error)
    }

    async fn drive(
        &self,
        session: &mut D::Session,
        job: &Job,
    ) -> (Vec<StepOutcome>, Option<String>) {
        let page = match session.new_page().await {
            Ok(page) => page,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "page creation failed");
                return (Vec::new(), Some(e.to_string()));
            }
        };

        let default_timeout = Duration::from_millis(self.config.browser.step_timeout_ms);
        let deadline = job
            .timeout
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let mut outcomes = Vec::with_capacity(job.steps.len());

        for (index, step) in job.steps.iter().enumerate() {
            let mut bound = step_bound(step, default_timeout);
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    let message = "job timeout exceeded".to_string();
                    warn!(job_id = %job.id, step = index + 1, "{message}");
                    outcomes.push(StepOutcome {
                        step: step.clone(),
                        success: false,
                        error: Some(message.clone()),
                        duration_ms: 0,
                    });
                    return (outcomes, Some(message));
                }
                bound = bound.min(remaining);
            }

            let started = Instant::now();
            match execute_step(&page, step, bound, &self.config.artifacts).await {
                Ok(()) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    debug!(
                        job_id = %job.id,
                        step = index + 1,
                        action = step.action(),
                        duration_ms,
                        "step completed"
                    );
                    outcomes.push(StepOutcome {
                        step: step.clone(),
                        success: true,
                        error: None,
                        duration_ms,
                    });
                }
                Err(e) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    let message = e.to_string();
                    error!(
                        job_id = %job.id,
                        step = index + 1,
                        action = step.action(),
                        error = %message,
                        "step failed"
                    );
                    outcomes.push(StepOutcome {
                        step: step.clone(),
                        success: false,
                        error: Some(message),
                        duration_ms,
                    });
                    // First failure short-circuits; later steps are never
                    // attempted.
                    return (outcomes, None);
                }
            }
        }

        (outcomes, None)
    }

    fn finish(
        &self,
        job: &Job,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        outcomes: Vec<StepOutcome>,
        job_error: Option<String>,
    ) -> JobResult {
        // Steps strictly before the failing one; the failing outcome itself
        // is still recorded in `steps`.
        let steps_executed = outcomes.iter().filter(|o| o.success).count();
        let failed = job_error.is_some() || outcomes.iter().any(|o| !o.success);
        let status = if failed || steps_executed != job.steps.len() {
            JobStatus::Failure
        } else {
            JobStatus::Success
        };
        let error = job_error.or_else(|| {
            outcomes
                .iter()
                .find(|o| !o.success)
                .and_then(|o| o.error.clone())
        });

        match status {
            JobStatus::Success => info!(
                job_id = %job.id,
                steps_executed,
                "job completed"
            ),
            JobStatus::Failure => warn!(
                job_id = %job.id,
                steps_executed,
                total_steps = job.steps.len(),
                "job failed"
            ),
        }

        JobResult {
            status,
            job_id: job.id.clone(),
            steps_executed,
            total_steps: job.steps.len(),
            steps: outcomes,
            error,
            start_time,
            end_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedDriver, StepScript};
    use crate::types::{BrowserKind, SelectorState, Step};
    use std::sync::atomic::Ordering;

    fn goto() -> Step {
        Step::Goto {
            url: "https://example.com".to_string(),
            timeout: None,
        }
    }

    fn wait_for_h1() -> Step {
        Step::WaitForSelector {
            selector: "h1".to_string(),
            state: SelectorState::Visible,
            timeout: None,
        }
    }

    fn screenshot() -> Step {
        Step::Screenshot {
            path: None,
            full_page: false,
        }
    }

    fn job(steps: Vec<Step>) -> Job {
        Job {
            id: "j-test".to_string(),
            browser: BrowserKind::Chromium,
            steps,
            timeout: None,
        }
    }

    fn executor(driver: ScriptedDriver) -> JobExecutor<ScriptedDriver> {
        JobExecutor::new(driver, Config::default())
    }

    #[tokio::test]
    async fn a_clean_run_reports_success() {
        let driver = ScriptedDriver::new();
        let log = driver.log();
        let executor = executor(driver);

        let result = executor
            .run(&job(vec![goto(), wait_for_h1(), screenshot()]))
            .await;

        assert_eq!(result.status, JobStatus::Success);
        assert_eq!(result.steps_executed, 3);
        assert_eq!(result.total_steps, 3);
        assert_eq!(result.steps.len(), 3);
        assert!(result.steps.iter().all(|o| o.success));
        assert!(result.error.is_none());
        assert_eq!(log.opens.load(Ordering::SeqCst), 1);
        assert_eq!(log.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn the_first_failure_short_circuits() {
        let driver = ScriptedDriver::with_steps(vec![
            StepScript::Succeed,
            StepScript::Fail("selector #missing not found".to_string()),
        ]);
        let log = driver.log();
        let executor = executor(driver);

        let result = executor
            .run(&job(vec![goto(), wait_for_h1(), screenshot()]))
            .await;

        assert_eq!(result.status, JobStatus::Failure);
        assert_eq!(result.steps_executed, 1);
        assert_eq!(result.steps.len(), 2);
        assert!(result.steps[0].success);
        assert!(!result.steps[1].success);
        assert!(result.steps[1]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("#missing")));
        // The third step is never attempted.
        assert_eq!(log.step_calls.load(Ordering::SeqCst), 2);
        assert_eq!(log.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_failing_first_step_reports_zero_executed() {
        let driver =
            ScriptedDriver::with_steps(vec![StepScript::Fail("host unreachable".to_string())]);
        let executor = executor(driver);

        let result = executor
            .run(&job(vec![Step::Goto {
                url: "https://bad.invalid".to_string(),
                timeout: None,
            }]))
            .await;

        assert_eq!(result.status, JobStatus::Failure);
        assert_eq!(result.steps_executed, 0);
        assert_eq!(result.steps.len(), 1);
        assert!(result.steps[0]
            .error
            .as_deref()
            .is_some_and(|e| !e.is_empty()));
    }

    #[tokio::test]
    async fn validation_failure_never_opens_a_session() {
        let driver = ScriptedDriver::new();
        let log = driver.log();
        let executor = executor(driver);

        let result = executor.run(&job(vec![])).await;

        assert_eq!(result.status, JobStatus::Failure);
        assert_eq!(result.steps_executed, 0);
        assert!(result.steps.is_empty());
        assert!(result
            .error
            .as_deref()
            .is_some_and(|e| e.contains("at least one step")));
        assert_eq!(log.opens.load(Ordering::SeqCst), 0);
        assert_eq!(log.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn launch_failure_completes_with_zero_steps() {
        let driver = ScriptedDriver::failing_open("no usable chromium binary");
        let log = driver.log();
        let executor = executor(driver);

        let result = executor.run(&job(vec![goto()])).await;

        assert_eq!(result.status, JobStatus::Failure);
        assert_eq!(result.steps_executed, 0);
        assert!(result
            .error
            .as_deref()
            .is_some_and(|e| e.contains("no usable chromium binary")));
        assert_eq!(log.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn page_failure_still_closes_the_session() {
        let driver = ScriptedDriver::failing_new_page("tab creation refused");
        let log = driver.log();
        let executor = executor(driver);

        let result = executor.run(&job(vec![goto()])).await;

        assert_eq!(result.status, JobStatus::Failure);
        assert_eq!(result.steps_executed, 0);
        assert_eq!(log.opens.load(Ordering::SeqCst), 1);
        assert_eq!(log.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_close_failure_does_not_mask_the_outcome() {
        let driver = ScriptedDriver::failing_close("process already gone");
        let log = driver.log();
        let executor = executor(driver);

        let result = executor.run(&job(vec![goto()])).await;

        assert_eq!(result.status, JobStatus::Success);
        assert_eq!(result.steps_executed, 1);
        assert_eq!(log.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closing_twice_is_a_no_op() {
        let driver = ScriptedDriver::new();
        let log = driver.log();
        let mut session = driver
            .open(BrowserKind::Chromium, &Config::default().browser)
            .await
            .unwrap();

        session.close().await.unwrap();
        session.close().await.unwrap();

        assert_eq!(log.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn the_job_budget_caps_a_slow_step() {
        let driver = ScriptedDriver::with_steps(vec![StepScript::Hang(60_000)]);
        let log = driver.log();
        let executor = executor(driver);
        let mut slow_job = job(vec![goto(), wait_for_h1()]);
        slow_job.timeout = Some(5_000);

        let result = executor.run(&slow_job).await;

        assert_eq!(result.status, JobStatus::Failure);
        assert_eq!(result.steps_executed, 0);
        assert_eq!(result.steps.len(), 1);
        assert!(result.steps[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("5000ms")));
        // The second step is never attempted and the session still closes.
        assert_eq!(log.step_calls.load(Ordering::SeqCst), 1);
        assert_eq!(log.closes.load(Ordering::SeqCst), 1);
    }
}
