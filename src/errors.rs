use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("job validation failed: {0}")]
    Validation(String),

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("element interaction failed: {0}")]
    Element(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("unknown step action: {0}")]
    UnknownStep(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RunnerError>;

// headless_chrome surfaces its failures as anyhow errors
impl From<anyhow::Error> for RunnerError {
    fn from(err: anyhow::Error) -> Self {
        RunnerError::Browser(err.to_string())
    }
}
