//! Playwright browser automation
//!
//! The driver spawns `node` on a small bridge script that owns one browser,
//! context and page. Requests go to the bridge as JSON lines on stdin and
//! replies come back as JSON lines on stdout, tagged with the request id.
//! The bridge answers requests as they complete rather than in order, so
//! several calls can be in flight on the same page.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::driver::{ClickOptions, DriverFactory, LoadState, PageDriver, WaitState};
use crate::error::{E2eError, E2eResult};

/// Extra time the Rust side waits beyond a command's own budget before
/// giving up on the bridge.
const BRIDGE_GRACE: Duration = Duration::from_secs(5);

const BRIDGE_SCRIPT: &str = r#"
const { chromium, firefox, webkit } = require('playwright');
const readline = require('readline');

const send = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');

(async () => {
  const browser = await __BROWSER__.launch({ headless: __HEADLESS__ });
  const context = await browser.newContext({
    viewport: { width: __WIDTH__, height: __HEIGHT__ }
  });
  const page = await context.newPage();

  const handlers = {
    goto: (c) => page.goto(c.url, { timeout: c.timeout_ms }),
    fill: (c) => page.fill(c.selector, c.value, { timeout: c.timeout_ms }),
    click: (c) => page.click(c.selector, { force: c.force, timeout: c.timeout_ms }),
    wait_for_selector: (c) => page.locator(c.selector).waitFor({ state: c.state, timeout: c.timeout_ms }),
    wait_for_navigation: (c) => page.waitForNavigation({ url: c.url, timeout: c.timeout_ms }),
    wait_for_url: (c) => page.waitForURL(c.url, { timeout: c.timeout_ms }),
    wait_for_load_state: (c) => page.waitForLoadState(c.state, { timeout: c.timeout_ms }),
    wait_for_timeout: (c) => page.waitForTimeout(c.ms),
    evaluate: (c) => page.evaluate(c.script),
    local_storage_item: (c) => page.evaluate((key) => localStorage.getItem(key), c.key),
    text_content: (c) => page.locator(c.selector).textContent({ timeout: c.timeout_ms }),
    url: async () => page.url(),
    screenshot: (c) => page.screenshot({ path: c.path, fullPage: true }),
    close: () => browser.close(),
  };
  const returnsValue = new Set(['evaluate', 'local_storage_item', 'text_content', 'url']);

  const rl = readline.createInterface({ input: process.stdin });
  rl.on('line', async (line) => {
    let req;
    try {
      req = JSON.parse(line);
    } catch (error) {
      console.error('bridge: unparseable request: ' + line);
      return;
    }
    const handler = handlers[req.op];
    if (!handler) {
      send({ id: req.id, ok: false, error: { kind: 'error', message: 'unsupported op ' + req.op } });
      return;
    }
    try {
      const value = await handler(req);
      send({ id: req.id, ok: true, value: returnsValue.has(req.op) ? (value ?? null) : null });
      if (req.op === 'close') process.exit(0);
    } catch (error) {
      const kind = error && error.name === 'TimeoutError' ? 'timeout' : 'error';
      send({ id: req.id, ok: false, error: { kind, message: String(error && error.message) } });
    }
  });
  rl.on('close', async () => {
    await browser.close().catch(() => {});
    process.exit(0);
  });

  send({ ready: true });
})().catch((error) => {
  console.error(error && error.stack ? error.stack : String(error));
  process.exit(1);
});
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "chromium" => Some(Browser::Chromium),
            "firefox" => Some(Browser::Firefox),
            "webkit" => Some(Browser::Webkit),
            _ => None,
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Node executable used to host the bridge
    pub node_binary: PathBuf,

    /// `node_modules` directory that contains `playwright`
    pub node_modules: PathBuf,

    /// How long the browser may take to come up
    pub launch_timeout: Duration,

    /// Ceiling for calls that carry no budget of their own
    pub call_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: PathBuf::from("node"),
            node_modules: PathBuf::from("node_modules"),
            launch_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl PlaywrightConfig {
    /// Render the bridge script for this browser setup
    pub fn build_script(&self) -> String {
        BRIDGE_SCRIPT
            .replace("__BROWSER__", self.browser.as_str())
            .replace("__HEADLESS__", if self.headless { "true" } else { "false" })
            .replace("__WIDTH__", &self.viewport_width.to_string())
            .replace("__HEIGHT__", &self.viewport_height.to_string())
    }
}

#[async_trait]
impl DriverFactory for PlaywrightConfig {
    type Driver = PlaywrightDriver;

    async fn launch(&self) -> E2eResult<PlaywrightDriver> {
        PlaywrightDriver::launch(self.clone()).await
    }
}

/// One request to the bridge
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BridgeCommand {
    Goto { url: String, timeout_ms: u64 },
    Fill { selector: String, value: String, timeout_ms: u64 },
    Click { selector: String, force: bool, timeout_ms: u64 },
    WaitForSelector { selector: String, state: WaitState, timeout_ms: u64 },
    WaitForNavigation { url: String, timeout_ms: u64 },
    WaitForUrl { url: String, timeout_ms: u64 },
    WaitForLoadState { state: LoadState, timeout_ms: u64 },
    WaitForTimeout { ms: u64 },
    Evaluate { script: String },
    LocalStorageItem { key: String },
    TextContent { selector: String, timeout_ms: u64 },
    Url,
    Screenshot { path: String },
    Close,
}

impl BridgeCommand {
    /// Short label used in logs and errors
    fn describe(&self) -> String {
        match self {
            BridgeCommand::Goto { url, .. } => format!("goto:{}", url),
            BridgeCommand::Fill { selector, .. } => format!("fill:{}", selector),
            BridgeCommand::Click { selector, .. } => format!("click:{}", selector),
            BridgeCommand::WaitForSelector { selector, state, .. } => {
                format!("wait:{}:{:?}", selector, state)
            }
            BridgeCommand::WaitForNavigation { url, .. } => format!("navigation:{}", url),
            BridgeCommand::WaitForUrl { url, .. } => format!("url:{}", url),
            BridgeCommand::WaitForLoadState { state, .. } => format!("load_state:{:?}", state),
            BridgeCommand::WaitForTimeout { ms } => format!("sleep:{}ms", ms),
            BridgeCommand::Evaluate { script } => {
                format!("evaluate:{}", script.chars().take(30).collect::<String>())
            }
            BridgeCommand::LocalStorageItem { key } => format!("local_storage:{}", key),
            BridgeCommand::TextContent { selector, .. } => format!("text:{}", selector),
            BridgeCommand::Url => "url".to_string(),
            BridgeCommand::Screenshot { path } => format!("screenshot:{}", path),
            BridgeCommand::Close => "close".to_string(),
        }
    }

    /// The command's own time budget, if it carries one
    fn budget(&self) -> Option<Duration> {
        match self {
            BridgeCommand::Goto { timeout_ms, .. }
            | BridgeCommand::Fill { timeout_ms, .. }
            | BridgeCommand::Click { timeout_ms, .. }
            | BridgeCommand::WaitForSelector { timeout_ms, .. }
            | BridgeCommand::WaitForNavigation { timeout_ms, .. }
            | BridgeCommand::WaitForUrl { timeout_ms, .. }
            | BridgeCommand::WaitForLoadState { timeout_ms, .. }
            | BridgeCommand::TextContent { timeout_ms, .. } => Some(Duration::from_millis(*timeout_ms)),
            BridgeCommand::WaitForTimeout { ms } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a BridgeCommand,
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<BridgeFailure>,
}

#[derive(Debug, Default, Deserialize)]
struct BridgeFailure {
    #[serde(default)]
    kind: FailureKind,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FailureKind {
    Timeout,
    #[default]
    #[serde(other)]
    Error,
}

impl BridgeReply {
    fn into_result(self, command: &BridgeCommand) -> E2eResult<Value> {
        if self.ok {
            return Ok(self.value);
        }
        let failure = self.error.unwrap_or_default();
        match failure.kind {
            FailureKind::Timeout => Err(E2eError::Timeout(format!(
                "{} ({})",
                command.describe(),
                failure.message
            ))),
            FailureKind::Error => Err(E2eError::StepFailed {
                step: command.describe(),
                reason: failure.message,
            }),
        }
    }
}

/// Requests waiting for a reply, keyed by id
#[derive(Default)]
struct PendingTable {
    closed: bool,
    waiters: HashMap<u64, oneshot::Sender<BridgeReply>>,
}

type Pending = Arc<Mutex<PendingTable>>;

/// Playwright page handle backed by a Node bridge process
pub struct PlaywrightDriver {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    pending: Pending,
    next_id: AtomicU64,
    call_timeout: Duration,

    /// Holds the bridge script until the driver goes away
    _script_dir: tempfile::TempDir,
}

impl PlaywrightDriver {
    /// Start the bridge and wait until the page is ready
    pub async fn launch(config: PlaywrightConfig) -> E2eResult<Self> {
        // Verify playwright is installed
        Self::ensure_installed().await?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, config.build_script())?;

        debug!("Launching Playwright bridge: {}", script_path.display());

        let mut cmd = TokioCommand::new(&config.node_binary);
        cmd.arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // The script lives outside the project, so point module resolution back at it
        if let Ok(node_modules) = std::fs::canonicalize(&config.node_modules) {
            cmd.env("NODE_PATH", node_modules);
        }

        let mut child = cmd.spawn().map_err(|e| {
            E2eError::Playwright(format!(
                "Failed to spawn {}: {}",
                config.node_binary.display(),
                e
            ))
        })?;

        let stdin = take_pipe(child.stdin.take(), "stdin")?;
        let stdout = take_pipe(child.stdout.take(), "stdout")?;
        let stderr = take_pipe(child.stderr.take(), "stderr")?;

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!("[playwright] {}", line);
            }
        });

        let mut lines = BufReader::new(stdout).lines();
        timeout(config.launch_timeout, wait_for_ready(&mut lines))
            .await
            .map_err(|_| E2eError::Timeout(format!("{} to launch", config.browser.as_str())))??;

        info!("Playwright {} ready", config.browser.as_str());

        let pending: Pending = Arc::new(Mutex::new(PendingTable::default()));
        tokio::spawn(read_replies(lines, Arc::clone(&pending)));

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            call_timeout: config.call_timeout,
            _script_dir: script_dir,
        })
    }

    /// Check if Playwright is installed
    pub async fn ensure_installed() -> E2eResult<()> {
        let status = TokioCommand::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    /// Send one command and wait for its reply.
    ///
    /// Dropping the returned future leaves the request running in the
    /// browser; its reply is discarded when it arrives.
    async fn call(&self, command: BridgeCommand) -> E2eResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let label = command.describe();
        debug!("-> [{}] {}", id, label);

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(E2eError::BridgeClosed(label));
            }
            pending.waiters.insert(id, tx);
        }

        let mut line = serde_json::to_string(&BridgeRequest { id, command: &command })?;
        line.push('\n');
        if let Err(e) = self.write_line(&line).await {
            self.pending.lock().await.waiters.remove(&id);
            return Err(e);
        }

        let ceiling = command.budget().unwrap_or(self.call_timeout) + BRIDGE_GRACE;
        let reply = match timeout(ceiling, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(E2eError::BridgeClosed(label)),
            Err(_) => {
                self.pending.lock().await.waiters.remove(&id);
                return Err(E2eError::Timeout(format!("{} (no reply from bridge)", label)));
            }
        };

        debug!("<- [{}] {} ok={}", id, label, reply.ok);
        reply.into_result(&command)
    }

    async fn write_line(&self, line: &str) -> E2eResult<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }
}

fn take_pipe<T>(pipe: Option<T>, name: &str) -> E2eResult<T> {
    pipe.ok_or_else(|| E2eError::Playwright(format!("bridge {} was not captured", name)))
}

async fn wait_for_ready(lines: &mut Lines<BufReader<ChildStdout>>) -> E2eResult<()> {
    while let Some(line) = lines.next_line().await? {
        match serde_json::from_str::<BridgeReply>(&line) {
            Ok(reply) if reply.ready => return Ok(()),
            _ => debug!("[playwright] {}", line),
        }
    }
    Err(E2eError::Playwright(
        "bridge exited before the browser was ready".to_string(),
    ))
}

/// Route replies to their callers until the bridge's stdout closes
async fn read_replies(mut lines: Lines<BufReader<ChildStdout>>, pending: Pending) {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let reply = match serde_json::from_str::<BridgeReply>(&line) {
                    Ok(reply) => reply,
                    Err(_) => {
                        debug!("[playwright] {}", line);
                        continue;
                    }
                };
                let Some(id) = reply.id else {
                    continue;
                };
                match pending.lock().await.waiters.remove(&id) {
                    // The caller may have stopped waiting; that is fine
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => debug!("Dropping reply for abandoned request {}", id),
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed reading from Playwright bridge: {}", e);
                break;
            }
        }
    }

    let mut pending = pending.lock().await;
    pending.closed = true;
    pending.waiters.clear();
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

#[async_trait]
impl PageDriver for PlaywrightDriver {
    async fn goto(&self, url: &str, timeout: Duration) -> E2eResult<()> {
        self.call(BridgeCommand::Goto {
            url: url.to_string(),
            timeout_ms: millis(timeout),
        })
        .await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str, timeout: Duration) -> E2eResult<()> {
        self.call(BridgeCommand::Fill {
            selector: selector.to_string(),
            value: value.to_string(),
            timeout_ms: millis(timeout),
        })
        .await?;
        Ok(())
    }

    async fn click(&self, selector: &str, options: ClickOptions) -> E2eResult<()> {
        self.call(BridgeCommand::Click {
            selector: selector.to_string(),
            force: options.force,
            timeout_ms: millis(options.timeout),
        })
        .await?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, state: WaitState, timeout: Duration) -> E2eResult<()> {
        self.call(BridgeCommand::WaitForSelector {
            selector: selector.to_string(),
            state,
            timeout_ms: millis(timeout),
        })
        .await?;
        Ok(())
    }

    async fn wait_for_navigation(&self, url: &str, timeout: Duration) -> E2eResult<()> {
        self.call(BridgeCommand::WaitForNavigation {
            url: url.to_string(),
            timeout_ms: millis(timeout),
        })
        .await?;
        Ok(())
    }

    async fn wait_for_url(&self, url: &str, timeout: Duration) -> E2eResult<()> {
        self.call(BridgeCommand::WaitForUrl {
            url: url.to_string(),
            timeout_ms: millis(timeout),
        })
        .await?;
        Ok(())
    }

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> E2eResult<()> {
        self.call(BridgeCommand::WaitForLoadState {
            state,
            timeout_ms: millis(timeout),
        })
        .await?;
        Ok(())
    }

    async fn wait_for_timeout(&self, duration: Duration) -> E2eResult<()> {
        self.call(BridgeCommand::WaitForTimeout { ms: millis(duration) }).await?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> E2eResult<Value> {
        self.call(BridgeCommand::Evaluate {
            script: script.to_string(),
        })
        .await
    }

    async fn local_storage_item(&self, key: &str) -> E2eResult<Option<String>> {
        let value = self
            .call(BridgeCommand::LocalStorageItem { key: key.to_string() })
            .await?;
        Ok(match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    async fn text_content(&self, selector: &str, timeout: Duration) -> E2eResult<String> {
        let value = self
            .call(BridgeCommand::TextContent {
                selector: selector.to_string(),
                timeout_ms: millis(timeout),
            })
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn url(&self) -> E2eResult<String> {
        let value = self.call(BridgeCommand::Url).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.call(BridgeCommand::Screenshot {
            path: path.to_string_lossy().to_string(),
        })
        .await?;
        Ok(())
    }

    async fn close(&self) -> E2eResult<()> {
        if let Err(e) = self.call(BridgeCommand::Close).await {
            debug!("Bridge close request failed: {}", e);
        }

        let mut child = self.child.lock().await;
        match timeout(Duration::from_secs(5), child.wait()).await {
            Ok(status) => {
                debug!("Playwright bridge exited: {:?}", status?);
            }
            Err(_) => {
                warn!("Playwright bridge did not exit, killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }
}
