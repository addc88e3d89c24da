use url::Url;

use crate::types::{Job, Step};

/// Static job validation. Pure: runs before any browser resource is
/// acquired, and a failure here means none ever will be.
pub fn validate_job(job: &Job) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if job.steps.is_empty() {
        errors.push("job must contain at least one step".to_string());
    }

    if let Some(timeout) = job.timeout {
        if timeout == 0 {
            errors.push("\"timeout\" must be a positive number".to_string());
        }
    }

    for (index, step) in job.steps.iter().enumerate() {
        let position = index + 1;
        match step {
            Step::Goto { url, .. } => {
                if url.trim().is_empty() {
                    errors.push(format!("step {position}: \"url\" is required for \"goto\""));
                } else {
                    match Url::parse(url) {
                        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
                        _ => errors.push(format!(
                            "step {position}: \"url\" must be an absolute http(s) URL"
                        )),
                    }
                }
            }
            Step::Click { selector, .. } | Step::WaitForSelector { selector, .. } => {
                if selector.trim().is_empty() {
                    errors.push(format!(
                        "step {position}: \"selector\" is required for \"{}\"",
                        step.action()
                    ));
                }
            }
            Step::Fill { selector, .. } => {
                if selector.trim().is_empty() {
                    errors.push(format!(
                        "step {position}: \"selector\" is required for \"fill\""
                    ));
                }
            }
            Step::Screenshot { .. } => {}
        }

        if let Some(timeout) = step.timeout_ms() {
            if timeout == 0 {
                errors.push(format!(
                    "step {position}: \"timeout\" must be a positive number"
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
