use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::BrowserConfig;
use crate::errors::Result;
use crate::types::{BrowserKind, SelectorState};

/// Engine seam. The executor drives jobs through these traits so a scripted
/// engine can stand in for a real browser under test.
#[async_trait]
pub trait BrowserDriver: Send + Sync + 'static {
    type Session: BrowserSession<Page = Self::Page>;
    type Page: PageDriver;

    /// Launch an isolated browser process of the requested kind.
    async fn open(&self, kind: BrowserKind, config: &BrowserConfig) -> Result<Self::Session>;
}

#[async_trait]
pub trait BrowserSession: Send {
    type Page;

    /// Open the session's single page. One page per job.
    async fn new_page(&mut self) -> Result<Self::Page>;

    /// Tear the session down. Idempotent: closing an already-closed session
    /// is a no-op.
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;

    async fn click(&self, selector: &str, timeout: Duration) -> Result<()>;

    async fn fill(&self, selector: &str, value: &str, timeout: Duration) -> Result<()>;

    async fn wait_for_selector(
        &self,
        selector: &str,
        state: SelectorState,
        timeout: Duration,
    ) -> Result<()>;

    async fn screenshot(&self, path: &Path, full_page: bool) -> Result<()>;
}
