//! Test support: a scripted engine that records how it was driven. Lets
//! executor and worker behavior be asserted without a real browser.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::browser::{BrowserDriver, BrowserSession, PageDriver};
use crate::config::BrowserConfig;
use crate::errors::{Result, RunnerError};
use crate::types::{BrowserKind, SelectorState};

/// What the scripted page does for one step call. Calls beyond the script
/// succeed.
#[derive(Debug, Clone)]
pub enum StepScript {
    Succeed,
    Fail(String),
    /// Sleep on the tokio clock before succeeding; pair with a paused-clock
    /// test to exercise timeout handling.
    Hang(u64),
}

/// Spy counters shared by driver, session and page.
#[derive(Default)]
pub struct DriverLog {
    pub opens: AtomicUsize,
    pub pages: AtomicUsize,
    pub closes: AtomicUsize,
    pub step_calls: AtomicUsize,
    screenshot_paths: Mutex<Vec<PathBuf>>,
}

impl DriverLog {
    pub fn screenshots(&self) -> Vec<PathBuf> {
        lock(&self.screenshot_paths).clone()
    }
}

pub struct ScriptedDriver {
    log: Arc<DriverLog>,
    script: Arc<Mutex<VecDeque<StepScript>>>,
    fail_open: Option<String>,
    fail_new_page: Option<String>,
    fail_close: Option<String>,
}

impl ScriptedDriver {
    /// Every call succeeds.
    pub fn new() -> Self {
        Self::with_steps(Vec::new())
    }

    /// Step calls consume the script in order.
    pub fn with_steps(steps: Vec<StepScript>) -> Self {
        Self {
            log: Arc::new(DriverLog::default()),
            script: Arc::new(Mutex::new(steps.into())),
            fail_open: None,
            fail_new_page: None,
            fail_close: None,
        }
    }

    pub fn failing_open(message: &str) -> Self {
        Self {
            fail_open: Some(message.to_string()),
            ..Self::new()
        }
    }

    pub fn failing_new_page(message: &str) -> Self {
        Self {
            fail_new_page: Some(message.to_string()),
            ..Self::new()
        }
    }

    pub fn failing_close(message: &str) -> Self {
        Self {
            fail_close: Some(message.to_string()),
            ..Self::new()
        }
    }

    pub fn log(&self) -> Arc<DriverLog> {
        self.log.clone()
    }
}

impl Default for ScriptedDriver {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ScriptedSession {
    log: Arc<DriverLog>,
    script: Arc<Mutex<VecDeque<StepScript>>>,
    fail_new_page: Option<String>,
    fail_close: Option<String>,
    closed: bool,
}

pub struct ScriptedPage {
    log: Arc<DriverLog>,
    script: Arc<Mutex<VecDeque<StepScript>>>,
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    type Session = ScriptedSession;
    type Page = ScriptedPage;

    async fn open(&self, _kind: BrowserKind, _config: &BrowserConfig) -> Result<ScriptedSession> {
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_open {
            return Err(RunnerError::Launch(message.clone()));
        }
        Ok(ScriptedSession {
            log: self.log.clone(),
            script: self.script.clone(),
            fail_new_page: self.fail_new_page.clone(),
            fail_close: self.fail_close.clone(),
            closed: false,
        })
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    type Page = ScriptedPage;

    async fn new_page(&mut self) -> Result<ScriptedPage> {
        self.log.pages.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_new_page {
            return Err(RunnerError::Browser(message.clone()));
        }
        Ok(ScriptedPage {
            log: self.log.clone(),
            script: self.script.clone(),
        })
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_close {
            return Err(RunnerError::Browser(message.clone()));
        }
        Ok(())
    }
}

impl ScriptedPage {
    async fn next(&self) -> Result<()> {
        self.log.step_calls.fetch_add(1, Ordering::SeqCst);
        let action = lock(&self.script).pop_front().unwrap_or(StepScript::Succeed);
        match action {
            StepScript::Succeed => Ok(()),
            StepScript::Fail(message) => Err(RunnerError::Element(message)),
            StepScript::Hang(ms) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl PageDriver for ScriptedPage {
    async fn goto(&self, _url: &str, _timeout: Duration) -> Result<()> {
        self.next().await
    }

    async fn click(&self, _selector: &str, _timeout: Duration) -> Result<()> {
        self.next().await
    }

    async fn fill(&self, _selector: &str, _value: &str, _timeout: Duration) -> Result<()> {
        self.next().await
    }

    async fn wait_for_selector(
        &self,
        _selector: &str,
        _state: SelectorState,
        _timeout: Duration,
    ) -> Result<()> {
        self.next().await
    }

    async fn screenshot(&self, path: &Path, _full_page: bool) -> Result<()> {
        lock(&self.log.screenshot_paths).push(path.to_path_buf());
        self.next().await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
