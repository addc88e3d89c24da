use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub browser: BrowserConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub http: HttpConfig,
    pub artifacts: ArtifactConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    /// Extra launch arguments appended to the defaults.
    pub args: Vec<String>,
    /// Bound for a step that carries no timeout of its own.
    pub step_timeout_ms: u64,
    pub launch_timeout_ms: u64,
    /// How long the engine may sit without CDP traffic before it is torn
    /// down from underneath us.
    pub idle_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub concurrency: usize,
    /// How long shutdown waits for the in-flight job before abandoning it.
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub screenshots_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            queue: QueueConfig::default(),
            worker: WorkerConfig::default(),
            http: HttpConfig::default(),
            artifacts: ArtifactConfig::default(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport {
                width: 1280,
                height: 720,
            },
            args: vec![],
            step_timeout_ms: 30_000,
            launch_timeout_ms: 30_000,
            idle_timeout_ms: 300_000,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "automation-jobs".to_string(),
            capacity: 64,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            screenshots_dir: PathBuf::from("screenshots"),
        }
    }
}

impl Config {
    /// Build a config from environment variables, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            browser: BrowserConfig {
                headless: env::var("BROWSER_HEADLESS")
                    .map(|raw| parse_headless(&raw))
                    .unwrap_or(defaults.browser.headless),
                viewport: defaults.browser.viewport,
                args: env::var("BROWSER_ARGS")
                    .map(|raw| parse_args(&raw))
                    .unwrap_or(defaults.browser.args),
                step_timeout_ms: env_u64("BROWSER_TIMEOUT", defaults.browser.step_timeout_ms),
                launch_timeout_ms: env_u64(
                    "BROWSER_LAUNCH_TIMEOUT",
                    defaults.browser.launch_timeout_ms,
                ),
                idle_timeout_ms: env_u64("BROWSER_IDLE_TIMEOUT", defaults.browser.idle_timeout_ms),
            },
            queue: QueueConfig {
                name: env::var("QUEUE_NAME").unwrap_or(defaults.queue.name),
                capacity: env_usize("QUEUE_CAPACITY", defaults.queue.capacity),
            },
            worker: WorkerConfig {
                concurrency: env_usize("WORKER_CONCURRENCY", defaults.worker.concurrency).max(1),
                shutdown_grace_ms: env_u64("SHUTDOWN_TIMEOUT", defaults.worker.shutdown_grace_ms),
            },
            http: HttpConfig {
                bind: format!("0.0.0.0:{}", env_u64("PORT", 3000)),
            },
            artifacts: ArtifactConfig {
                screenshots_dir: env::var("SCREENSHOTS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.artifacts.screenshots_dir),
            },
        }
    }
}

// Headless unless explicitly disabled, matching the usual deployment shape.
fn parse_headless(raw: &str) -> bool {
    raw.trim() != "false"
}

fn parse_args(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|arg| arg.trim().to_string())
        .filter(|arg| !arg.is_empty())
        .collect()
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}
