use std::time::Duration;

use crate::browser::PageDriver;
use crate::config::ArtifactConfig;
use crate::errors::{Result, RunnerError};
use crate::types::Step;
use crate::utils::filename::resolve_screenshot_path;

/// Bound for one step: its own timeout, else the configured default.
pub fn step_bound(step: &Step, default_timeout: Duration) -> Duration {
    step.timeout_ms()
        .map(Duration::from_millis)
        .unwrap_or(default_timeout)
}

/// Execute a single step against the page. The whole attempt is capped at
/// `bound`, even if the engine's own waits misbehave.
pub async fn execute_step<P: PageDriver>(
    page: &P,
    step: &Step,
    bound: Duration,
    artifacts: &ArtifactConfig,
) -> Result<()> {
    match tokio::time::timeout(bound, dispatch(page, step, bound, artifacts)).await {
        Ok(result) => result,
        Err(_) => Err(RunnerError::Timeout(format!(
            "step \"{}\" exceeded its {}ms bound",
            step.action(),
            bound.as_millis()
        ))),
    }
}

async fn dispatch<P: PageDriver>(
    page: &P,
    step: &Step,
    bound: Duration,
    artifacts: &ArtifactConfig,
) -> Result<()> {
    match step {
        Step::Goto { url, .. } => page.goto(url, bound).await,
        Step::Click { selector, .. } => page.click(selector, bound).await,
        Step::Fill {
            selector, value, ..
        } => page.fill(selector, value, bound).await,
        Step::WaitForSelector {
            selector, state, ..
        } => page.wait_for_selector(selector, *state, bound).await,
        Step::Screenshot { path, full_page } => {
            let target = resolve_screenshot_path(&artifacts.screenshots_dir, path.as_deref());
            page.screenshot(&target, *full_page).await
        }
    }
}
