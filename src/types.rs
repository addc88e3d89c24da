use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, RunnerError};

/// Step actions understood by the interpreter. Payload decoding checks
/// against this list so an unrecognized action is rejected instead of
/// silently skipped.
pub const KNOWN_ACTIONS: [&str; 5] = ["goto", "click", "fill", "waitForSelector", "screenshot"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl std::fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrowserKind::Chromium => write!(f, "chromium"),
            BrowserKind::Firefox => write!(f, "firefox"),
            BrowserKind::Webkit => write!(f, "webkit"),
        }
    }
}

/// Target state for `waitForSelector`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SelectorState {
    Attached,
    Detached,
    #[default]
    Visible,
    Hidden,
}

impl SelectorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectorState::Attached => "attached",
            SelectorState::Detached => "detached",
            SelectorState::Visible => "visible",
            SelectorState::Hidden => "hidden",
        }
    }
}

/// One browser operation. Each variant carries exactly the fields its kind
/// requires; a missing field fails at decode, not at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Step {
    #[serde(rename = "goto")]
    Goto {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    #[serde(rename = "click")]
    Click {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    #[serde(rename = "fill")]
    Fill {
        selector: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    #[serde(rename = "waitForSelector")]
    WaitForSelector {
        selector: String,
        #[serde(default)]
        state: SelectorState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    #[serde(rename = "screenshot")]
    Screenshot {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default, rename = "fullPage")]
        full_page: bool,
    },
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Step::Goto { .. } => "goto",
            Step::Click { .. } => "click",
            Step::Fill { .. } => "fill",
            Step::WaitForSelector { .. } => "waitForSelector",
            Step::Screenshot { .. } => "screenshot",
        }
    }

    /// Step-level timeout override, if the kind carries one.
    pub fn timeout_ms(&self) -> Option<u64> {
        match self {
            Step::Goto { timeout, .. }
            | Step::Click { timeout, .. }
            | Step::Fill { timeout, .. }
            | Step::WaitForSelector { timeout, .. } => *timeout,
            Step::Screenshot { .. } => None,
        }
    }
}

/// Wire payload accepted at the submission boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub browser: BrowserKind,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl JobRequest {
    /// Decode a raw payload, failing closed: an unrecognized step action is
    /// an error, never a skip.
    pub fn from_value(payload: serde_json::Value) -> Result<Self> {
        if let Some(steps) = payload.get("steps").and_then(|s| s.as_array()) {
            for (index, step) in steps.iter().enumerate() {
                match step.get("action").and_then(|a| a.as_str()) {
                    Some(action) if KNOWN_ACTIONS.contains(&action) => {}
                    Some(action) => {
                        return Err(RunnerError::UnknownStep(format!(
                            "step {}: unrecognized action \"{}\"",
                            index + 1,
                            action
                        )))
                    }
                    None => {
                        return Err(RunnerError::Validation(format!(
                            "step {}: \"action\" is required",
                            index + 1
                        )))
                    }
                }
            }
        }
        serde_json::from_value(payload).map_err(|e| RunnerError::Validation(e.to_string()))
    }
}

/// A dequeued unit of work. Immutable once assigned an id by the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub browser: BrowserKind,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Job {
    pub fn new(id: impl Into<String>, request: JobRequest) -> Self {
        Self {
            id: id.into(),
            browser: request.browser,
            steps: request.steps,
            timeout: request.timeout,
        }
    }
}

/// Recorded result of attempting one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub step: Step,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Failure,
}

/// Final, caller-visible summary of a job's execution. Outcomes appear in
/// step order and stop at the first failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub status: JobStatus,
    pub job_id: String,
    pub steps_executed: usize,
    pub total_steps: usize,
    pub steps: Vec<StepOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_all_step_kinds() {
        let payload = json!({
            "browser": "firefox",
            "timeout": 60000,
            "steps": [
                { "action": "goto", "url": "https://example.com" },
                { "action": "click", "selector": "#submit", "timeout": 5000 },
                { "action": "fill", "selector": "input[name=q]", "value": "rust" },
                { "action": "waitForSelector", "selector": "h1", "state": "hidden" },
                { "action": "screenshot", "path": "out.png", "fullPage": true }
            ]
        });

        let request = JobRequest::from_value(payload).unwrap();
        assert_eq!(request.browser, BrowserKind::Firefox);
        assert_eq!(request.timeout, Some(60000));
        assert_eq!(request.steps.len(), 5);
        assert_eq!(
            request.steps[0],
            Step::Goto {
                url: "https://example.com".to_string(),
                timeout: None
            }
        );
        assert_eq!(
            request.steps[4],
            Step::Screenshot {
                path: Some("out.png".to_string()),
                full_page: true
            }
        );
    }

    #[test]
    fn browser_and_wait_state_default() {
        let payload = json!({
            "steps": [{ "action": "waitForSelector", "selector": "h1" }]
        });

        let request = JobRequest::from_value(payload).unwrap();
        assert_eq!(request.browser, BrowserKind::Chromium);
        assert_eq!(
            request.steps[0],
            Step::WaitForSelector {
                selector: "h1".to_string(),
                state: SelectorState::Visible,
                timeout: None
            }
        );
    }

    #[test]
    fn unknown_action_fails_closed() {
        let payload = json!({
            "steps": [
                { "action": "goto", "url": "https://example.com" },
                { "action": "hover", "selector": "#menu" }
            ]
        });

        let err = JobRequest::from_value(payload).unwrap_err();
        match err {
            RunnerError::UnknownStep(message) => {
                assert!(message.contains("hover"));
                assert!(message.contains("step 2"));
            }
            other => panic!("expected UnknownStep, got {other:?}"),
        }
    }

    #[test]
    fn missing_required_field_is_a_validation_error() {
        let payload = json!({
            "steps": [{ "action": "goto" }]
        });

        let err = JobRequest::from_value(payload).unwrap_err();
        assert!(matches!(err, RunnerError::Validation(_)));
    }

    #[test]
    fn missing_action_is_a_validation_error() {
        let payload = json!({
            "steps": [{ "url": "https://example.com" }]
        });

        let err = JobRequest::from_value(payload).unwrap_err();
        match err {
            RunnerError::Validation(message) => assert!(message.contains("action")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn job_result_serializes_camel_case() {
        let result = JobResult {
            status: JobStatus::Success,
            job_id: "j-1".to_string(),
            steps_executed: 1,
            total_steps: 1,
            steps: vec![StepOutcome {
                step: Step::Goto {
                    url: "https://example.com".to_string(),
                    timeout: None,
                },
                success: true,
                error: None,
                duration_ms: 12,
            }],
            error: None,
            start_time: Utc::now(),
            end_time: Utc::now(),
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["jobId"], "j-1");
        assert_eq!(value["stepsExecuted"], 1);
        assert_eq!(value["totalSteps"], 1);
        assert_eq!(value["steps"][0]["durationMs"], 12);
        assert!(value.get("error").is_none());
    }
}
