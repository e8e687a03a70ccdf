//! Browser automation surface the page object is written against

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;

/// Element state to wait for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

/// Page load milestone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadState {
    #[serde(rename = "load")]
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[default]
    #[serde(rename = "networkidle")]
    NetworkIdle,
}

#[derive(Debug, Clone, Copy)]
pub struct ClickOptions {
    /// Skip actionability checks, e.g. when an overlay covers the element
    pub force: bool,
    pub timeout: Duration,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            force: false,
            timeout: Duration::from_secs(10),
        }
    }
}

/// A single browser page.
///
/// Every method takes `&self` so that two waits can be in flight on the
/// same page at once. Timeouts come back as [`E2eError::Timeout`], other
/// failed interactions as [`E2eError::StepFailed`].
///
/// [`E2eError::Timeout`]: crate::E2eError::Timeout
/// [`E2eError::StepFailed`]: crate::E2eError::StepFailed
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> E2eResult<()>;

    async fn fill(&self, selector: &str, value: &str, timeout: Duration) -> E2eResult<()>;

    async fn click(&self, selector: &str, options: ClickOptions) -> E2eResult<()>;

    async fn wait_for_selector(&self, selector: &str, state: WaitState, timeout: Duration) -> E2eResult<()>;

    /// Resolve on the next navigation whose URL equals `url`
    async fn wait_for_navigation(&self, url: &str, timeout: Duration) -> E2eResult<()>;

    /// Resolve as soon as the page is at `url`, immediately if it already is
    async fn wait_for_url(&self, url: &str, timeout: Duration) -> E2eResult<()>;

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> E2eResult<()>;

    async fn wait_for_timeout(&self, duration: Duration) -> E2eResult<()>;

    /// Evaluate a JavaScript expression in the page and return its JSON value
    async fn evaluate(&self, script: &str) -> E2eResult<serde_json::Value>;

    async fn local_storage_item(&self, key: &str) -> E2eResult<Option<String>>;

    async fn text_content(&self, selector: &str, timeout: Duration) -> E2eResult<String>;

    async fn url(&self) -> E2eResult<String>;

    async fn screenshot(&self, path: &Path) -> E2eResult<()>;

    async fn close(&self) -> E2eResult<()>;
}

/// Launches a fresh, isolated page for each scenario
#[async_trait]
pub trait DriverFactory: Send + Sync {
    type Driver: PageDriver;

    async fn launch(&self) -> E2eResult<Self::Driver>;
}
