use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::{CaptureScreenshotFormatOption, Viewport};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use tokio::task;
use tracing::debug;

use super::driver::{BrowserDriver, BrowserSession, PageDriver};
use crate::config::BrowserConfig;
use crate::errors::{Result, RunnerError};
use crate::types::{BrowserKind, SelectorState};

/// The resource-entry count must hold still this long before a navigation
/// counts as settled.
const NETWORK_IDLE_WINDOW_MS: u64 = 250;
const POLL_INTERVAL_MS: u64 = 100;

const FILL_FN: &str = r#"function(value) {
    this.focus();
    this.value = value;
    this.dispatchEvent(new Event('input', { bubbles: true }));
    this.dispatchEvent(new Event('change', { bubbles: true }));
}"#;

const CONTENT_SIZE_JS: &str = r#"JSON.stringify({
    width: Math.max(document.documentElement.scrollWidth, document.body ? document.body.scrollWidth : 0),
    height: Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0)
})"#;

/// Chromium engine backed by headless_chrome.
pub struct ChromeDriver;

pub struct ChromeSession {
    browser: Option<Browser>,
    page_opened: bool,
}

impl std::fmt::Debug for ChromeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromeSession")
            .field("browser", &self.browser.is_some())
            .field("page_opened", &self.page_opened)
            .finish()
    }
}

pub struct ChromePage {
    tab: Arc<Tab>,
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    type Session = ChromeSession;
    type Page = ChromePage;

    async fn open(&self, kind: BrowserKind, config: &BrowserConfig) -> Result<ChromeSession> {
        if kind != BrowserKind::Chromium {
            return Err(RunnerError::Launch(format!(
                "browser kind \"{kind}\" is not supported by this engine"
            )));
        }

        let window_size_arg = format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        );
        let mut args: Vec<String> = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            window_size_arg,
        ];
        args.extend(config.args.iter().cloned());

        let headless = config.headless;
        let idle_timeout = Duration::from_millis(config.idle_timeout_ms);
        let launch = task::spawn_blocking(move || -> anyhow::Result<Browser> {
            let os_args: Vec<&OsStr> = args.iter().map(OsStr::new).collect();
            let options = LaunchOptions::default_builder()
                .headless(headless)
                .idle_browser_timeout(idle_timeout)
                .args(os_args)
                .build()
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            Browser::new(options)
        });

        let browser =
            match tokio::time::timeout(Duration::from_millis(config.launch_timeout_ms), launch)
                .await
            {
                Err(_) => {
                    return Err(RunnerError::Launch(format!(
                        "browser did not start within {}ms",
                        config.launch_timeout_ms
                    )))
                }
                Ok(Err(join)) => return Err(RunnerError::Launch(join.to_string())),
                Ok(Ok(Err(e))) => return Err(RunnerError::Launch(e.to_string())),
                Ok(Ok(Ok(browser))) => browser,
            };

        debug!("browser process launched");
        Ok(ChromeSession {
            browser: Some(browser),
            page_opened: false,
        })
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    type Page = ChromePage;

    async fn new_page(&mut self) -> Result<ChromePage> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| RunnerError::Browser("session is closed".to_string()))?;
        if self.page_opened {
            return Err(RunnerError::Browser(
                "session already has a page".to_string(),
            ));
        }

        let tab = browser
            .new_tab()
            .map_err(|e| RunnerError::Browser(format!("page creation failed: {e}")))?;
        self.page_opened = true;
        Ok(ChromePage { tab })
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the handle tears down the underlying process.
        if let Some(browser) = self.browser.take() {
            drop(browser);
            debug!("browser session closed");
        }
        Ok(())
    }
}

impl ChromePage {
    async fn with_tab<T, F>(
        &self,
        op: F,
    ) -> std::result::Result<anyhow::Result<T>, task::JoinError>
    where
        F: FnOnce(Arc<Tab>) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tab = self.tab.clone();
        task::spawn_blocking(move || op(tab)).await
    }

    async fn evaluate(&self, expression: String) -> Result<Value> {
        match self
            .with_tab(move |tab| {
                let result = tab.evaluate(&expression, false)?;
                Ok(result.value.unwrap_or(Value::Null))
            })
            .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RunnerError::Browser(e.to_string())),
            Err(e) => Err(RunnerError::Browser(e.to_string())),
        }
    }

    /// Post-navigation settle: the load event has fired, now wait for the
    /// page's resource count to stop moving for a full quiescence window.
    async fn wait_for_network_idle(&self, budget: Duration) -> Result<()> {
        let started = tokio::time::Instant::now();
        let mut last_count: Option<u64> = None;
        let mut stable_since = tokio::time::Instant::now();

        while started.elapsed() < budget {
            let count = self
                .evaluate("performance.getEntriesByType('resource').length".to_string())
                .await?
                .as_u64()
                .unwrap_or(0);
            let ready = self.evaluate("document.readyState".to_string()).await?;
            let complete = ready.as_str() == Some("complete");

            if last_count == Some(count) {
                if complete
                    && stable_since.elapsed() >= Duration::from_millis(NETWORK_IDLE_WINDOW_MS)
                {
                    return Ok(());
                }
            } else {
                last_count = Some(count);
                stable_since = tokio::time::Instant::now();
            }

            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }

        Err(RunnerError::Timeout(format!(
            "page did not reach network idle within {}ms",
            budget.as_millis()
        )))
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        let started = tokio::time::Instant::now();
        let target = url.to_string();
        let navigation = self.with_tab(move |tab| {
            tab.navigate_to(&target)?;
            tab.wait_until_navigated()?;
            Ok(())
        });

        match tokio::time::timeout(timeout, navigation).await {
            Err(_) => {
                return Err(RunnerError::Timeout(format!(
                    "navigation to {url} timed out after {}ms",
                    timeout.as_millis()
                )))
            }
            Ok(Err(join)) => return Err(RunnerError::Navigation(join.to_string())),
            Ok(Ok(Err(e))) => {
                return Err(RunnerError::Navigation(format!(
                    "navigation to {url} failed: {e}"
                )))
            }
            Ok(Ok(Ok(()))) => {}
        }

        self.wait_for_network_idle(timeout.saturating_sub(started.elapsed()))
            .await
    }

    async fn click(&self, selector: &str, timeout: Duration) -> Result<()> {
        let sel = selector.to_string();
        let click = self.with_tab(move |tab| {
            let element = tab.wait_for_element_with_custom_timeout(&sel, timeout)?;
            element.scroll_into_view()?;
            element.click()?;
            Ok(())
        });

        match tokio::time::timeout(timeout, click).await {
            Err(_) => Err(RunnerError::Element(format!(
                "element {selector} was not actionable within {}ms",
                timeout.as_millis()
            ))),
            Ok(Err(join)) => Err(RunnerError::Element(join.to_string())),
            Ok(Ok(Err(e))) => Err(RunnerError::Element(format!(
                "click on {selector} failed: {e}"
            ))),
            Ok(Ok(Ok(()))) => Ok(()),
        }
    }

    async fn fill(&self, selector: &str, value: &str, timeout: Duration) -> Result<()> {
        let sel = selector.to_string();
        let text = value.to_string();
        let fill = self.with_tab(move |tab| {
            let element = tab.wait_for_element_with_custom_timeout(&sel, timeout)?;
            element.scroll_into_view()?;
            element.call_js_fn(FILL_FN, vec![Value::String(text)], false)?;
            Ok(())
        });

        match tokio::time::timeout(timeout, fill).await {
            Err(_) => Err(RunnerError::Element(format!(
                "element {selector} was not actionable within {}ms",
                timeout.as_millis()
            ))),
            Ok(Err(join)) => Err(RunnerError::Element(join.to_string())),
            Ok(Ok(Err(e))) => Err(RunnerError::Element(format!(
                "fill on {selector} failed: {e}"
            ))),
            Ok(Ok(Ok(()))) => Ok(()),
        }
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        state: SelectorState,
        timeout: Duration,
    ) -> Result<()> {
        let started = tokio::time::Instant::now();
        let probe = selector_probe(selector);

        while started.elapsed() < timeout {
            let observed = self.evaluate(probe.clone()).await?;
            let observed = observed.as_str().unwrap_or("detached");
            let satisfied = match state {
                SelectorState::Attached => observed != "detached",
                SelectorState::Detached => observed == "detached",
                SelectorState::Visible => observed == "visible",
                SelectorState::Hidden => observed != "visible",
            };
            if satisfied {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }

        Err(RunnerError::Timeout(format!(
            "selector {selector} did not become {} within {}ms",
            state.as_str(),
            timeout.as_millis()
        )))
    }

    async fn screenshot(&self, path: &Path, full_page: bool) -> Result<()> {
        let clip = if full_page {
            self.content_clip().await?
        } else {
            None
        };

        let bytes = match self
            .with_tab(move |tab| {
                tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, clip, true)
            })
            .await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(RunnerError::Browser(format!("screenshot capture failed: {e}"))),
            Err(e) => return Err(RunnerError::Browser(e.to_string())),
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, bytes).await?;
        debug!(path = %path.display(), "screenshot written");
        Ok(())
    }
}

impl ChromePage {
    async fn content_clip(&self) -> Result<Option<Viewport>> {
        let raw = self.evaluate(CONTENT_SIZE_JS.to_string()).await?;
        let metrics: Value = match raw.as_str() {
            Some(json) => serde_json::from_str(json)?,
            None => return Ok(None),
        };
        let width = metrics.get("width").and_then(Value::as_f64).unwrap_or(0.0);
        let height = metrics.get("height").and_then(Value::as_f64).unwrap_or(0.0);
        if width <= 0.0 || height <= 0.0 {
            return Ok(None);
        }
        Ok(Some(Viewport {
            x: 0.0,
            y: 0.0,
            width,
            height,
            scale: 1.0,
        }))
    }
}

// JSON-encode the selector so arbitrary quoting survives embedding.
fn selector_probe(selector: &str) -> String {
    let encoded = Value::String(selector.to_string()).to_string();
    format!(
        r#"(function() {{
            const el = document.querySelector({encoded});
            if (!el) return 'detached';
            const style = window.getComputedStyle(el);
            const visible = el.getClientRects().length > 0 && style.visibility !== 'hidden';
            return visible ? 'visible' : 'attached';
        }})()"#
    )
}
