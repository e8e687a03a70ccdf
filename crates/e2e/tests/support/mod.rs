//! In-memory stand-in for a browser page running the login screen

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::watch;

use authflow_e2e::config::{Credential, Messages, SuiteConfig};
use authflow_e2e::driver::{ClickOptions, DriverFactory, LoadState, PageDriver, WaitState};
use authflow_e2e::{E2eError, E2eResult};

pub const LOGIN_URL: &str = "http://app.test/login";
pub const DASHBOARD_URL: &str = "http://app.test/dashboard";
pub const TOKEN: &str = "eyJhbGciOiJIUzI1NiJ9.session";
pub const INVALID_TEXT: &str = "Invalid email or password";
pub const EMPTY_TEXT: &str = "Email and password are required";

pub fn valid_user() -> Credential {
    Credential {
        email: "qa.user@example.com".to_string(),
        password: "correct-horse".to_string(),
    }
}

/// Config matching the fake application, validation scenarios included
pub fn suite_config() -> SuiteConfig {
    let mut config = SuiteConfig::new(LOGIN_URL, DASHBOARD_URL, valid_user());
    config.credentials.invalid_user = Some(Credential {
        email: "nobody@example.com".to_string(),
        password: "wrong".to_string(),
    });
    config.messages = Messages {
        invalid_credentials: Some("invalid email".to_string()),
        empty_fields: Some("REQUIRED".to_string()),
    };
    config
}

/// How the fake application reacts
#[derive(Debug, Clone)]
pub struct Behavior {
    /// Delay before the dashboard loads after a good login; `None` never navigates
    pub dashboard_after: Option<Duration>,

    /// Delay before the login page loads after logout; `None` stays put
    pub login_after_logout: Option<Duration>,

    /// Clicking logout fails as if covered by an overlay
    pub logout_blocked: bool,

    /// Neither the logout handler nor an in-page clear removes the session
    pub logout_keeps_storage: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            dashboard_after: Some(Duration::from_millis(300)),
            login_after_logout: Some(Duration::from_millis(200)),
            logout_blocked: false,
            logout_keeps_storage: false,
        }
    }
}

#[derive(Default)]
struct State {
    fields: HashMap<String, String>,
    storage: HashMap<String, String>,
    visible: HashSet<String>,
    texts: HashMap<String, String>,
    calls: Vec<String>,
    closed: bool,
}

#[derive(Clone)]
pub struct FakePage {
    config: SuiteConfig,
    behavior: Behavior,
    state: Arc<Mutex<State>>,
    url: Arc<watch::Sender<String>>,
}

impl FakePage {
    pub fn new(config: &SuiteConfig, behavior: Behavior) -> Self {
        let (url, _) = watch::channel("about:blank".to_string());
        Self {
            config: config.clone(),
            behavior,
            state: Arc::new(Mutex::new(State::default())),
            url: Arc::new(url),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn storage_item(&self, key: &str) -> Option<String> {
        self.state.lock().unwrap().storage.get(key).cloned()
    }

    pub fn set_storage_item(&self, key: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .storage
            .insert(key.to_string(), value.to_string());
    }

    pub fn current_url(&self) -> String {
        self.url.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn is_visible(&self, selector: &str) -> bool {
        self.state.lock().unwrap().visible.contains(selector)
    }

    fn navigate_later(&self, url: &str, after: Option<Duration>) {
        if let Some(after) = after {
            let sender = Arc::clone(&self.url);
            let url = url.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                sender.send_replace(url);
            });
        }
    }

    fn show(&self, selector: &str, text: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.visible.insert(selector.to_string());
        if let Some(text) = text {
            state.texts.insert(selector.to_string(), text.to_string());
        }
    }

    fn submit_login(&self) {
        let selectors = &self.config.selectors;
        let (email, password) = {
            let state = self.state.lock().unwrap();
            (
                state.fields.get(&selectors.email_input).cloned().unwrap_or_default(),
                state.fields.get(&selectors.password_input).cloned().unwrap_or_default(),
            )
        };

        if email.is_empty() || password.is_empty() {
            self.show(&selectors.error_message_empty_fields, Some(EMPTY_TEXT));
            return;
        }

        let valid = valid_user();
        if email != valid.email || password != valid.password {
            self.show(&selectors.error_message_invalid, Some(INVALID_TEXT));
            return;
        }

        let session = json!({ "state": { "user": { "email": email, "authToken": TOKEN } }, "version": 0 });
        let profile = json!({ "user": { "email": email, "authToken": TOKEN } });
        {
            let mut state = self.state.lock().unwrap();
            state.storage.insert(self.config.storage.session_key.clone(), session.to_string());
            state.storage.insert(self.config.storage.cleared_key.clone(), profile.to_string());
        }
        self.show(&selectors.logout_button, None);
        self.navigate_later(DASHBOARD_URL, self.behavior.dashboard_after);
    }

    fn submit_logout(&self) -> E2eResult<()> {
        let logout_button = &self.config.selectors.logout_button;
        if self.behavior.logout_blocked {
            return Err(E2eError::StepFailed {
                step: format!("click:{}", logout_button),
                reason: "<div class=\"overlay\"> intercepts pointer events".to_string(),
            });
        }
        {
            let mut state = self.state.lock().unwrap();
            state.visible.remove(logout_button);
            if !self.behavior.logout_keeps_storage {
                state.storage.remove(&self.config.storage.session_key);
                state.storage.remove(&self.config.storage.cleared_key);
            }
        }
        self.navigate_later(LOGIN_URL, self.behavior.login_after_logout);
        Ok(())
    }

    async fn wait_until_url(&self, url: &str, timeout: Duration, fresh: bool) -> E2eResult<()> {
        let mut rx = self.url.subscribe();
        let already_there = *rx.borrow_and_update() == url;
        if already_there && !fresh {
            return Ok(());
        }
        let wait = async {
            while rx.changed().await.is_ok() {
                if *rx.borrow_and_update() == url {
                    return true;
                }
            }
            false
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(true) => Ok(()),
            _ => Err(E2eError::Timeout(format!("url:{}", url))),
        }
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> E2eResult<()> {
        self.record(format!("goto:{}", url));
        self.url.send_replace(url.to_string());
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str, _timeout: Duration) -> E2eResult<()> {
        self.record(format!("fill:{}", selector));
        self.state
            .lock()
            .unwrap()
            .fields
            .insert(selector.to_string(), value.to_string());
        Ok(())
    }

    async fn click(&self, selector: &str, options: ClickOptions) -> E2eResult<()> {
        self.record(format!("click:{}:force={}", selector, options.force));
        if selector == self.config.selectors.login_button {
            self.submit_login();
            Ok(())
        } else if selector == self.config.selectors.logout_button {
            self.submit_logout()
        } else {
            Err(E2eError::StepFailed {
                step: format!("click:{}", selector),
                reason: "no such element".to_string(),
            })
        }
    }

    async fn wait_for_selector(&self, selector: &str, state: WaitState, timeout: Duration) -> E2eResult<()> {
        let want_visible = matches!(state, WaitState::Visible | WaitState::Attached);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_visible(selector) == want_visible {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(E2eError::Timeout(format!("wait:{}:{:?}", selector, state)));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn wait_for_navigation(&self, url: &str, timeout: Duration) -> E2eResult<()> {
        self.wait_until_url(url, timeout, true).await
    }

    async fn wait_for_url(&self, url: &str, timeout: Duration) -> E2eResult<()> {
        self.wait_until_url(url, timeout, false).await
    }

    async fn wait_for_load_state(&self, _state: LoadState, _timeout: Duration) -> E2eResult<()> {
        Ok(())
    }

    async fn wait_for_timeout(&self, duration: Duration) -> E2eResult<()> {
        tokio::time::sleep(duration).await;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> E2eResult<Value> {
        self.record(format!("evaluate:{}", script));
        if script.contains("localStorage.clear()") {
            {
                let mut state = self.state.lock().unwrap();
                if !self.behavior.logout_keeps_storage {
                    state.storage.clear();
                }
                state.visible.remove(&self.config.selectors.logout_button);
            }
            self.url.send_replace(LOGIN_URL.to_string());
        }
        Ok(Value::Null)
    }

    async fn local_storage_item(&self, key: &str) -> E2eResult<Option<String>> {
        Ok(self.storage_item(key))
    }

    async fn text_content(&self, selector: &str, timeout: Duration) -> E2eResult<String> {
        self.wait_for_selector(selector, WaitState::Attached, timeout).await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .texts
            .get(selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn url(&self) -> E2eResult<String> {
        Ok(self.current_url())
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        self.record(format!("screenshot:{}", path.display()));
        Ok(())
    }

    async fn close(&self) -> E2eResult<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Hands out fake pages and keeps them for inspection
pub struct FakeFactory {
    config: SuiteConfig,
    behavior: Behavior,
    launched: Mutex<Vec<FakePage>>,
}

impl FakeFactory {
    pub fn new(config: &SuiteConfig, behavior: Behavior) -> Self {
        Self {
            config: config.clone(),
            behavior,
            launched: Mutex::new(Vec::new()),
        }
    }

    pub fn launched(&self) -> Vec<FakePage> {
        self.launched.lock().unwrap().clone()
    }
}

#[async_trait]
impl DriverFactory for FakeFactory {
    type Driver = FakePage;

    async fn launch(&self) -> E2eResult<FakePage> {
        let page = FakePage::new(&self.config, self.behavior.clone());
        self.launched.lock().unwrap().push(page.clone());
        Ok(page)
    }
}

pub fn screenshot_calls(page: &FakePage) -> Vec<PathBuf> {
    page.calls()
        .into_iter()
        .filter_map(|c| c.strip_prefix("screenshot:").map(PathBuf::from))
        .collect()
}
