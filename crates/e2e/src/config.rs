//! Suite configuration: URLs, credentials, selectors and timeouts
//!
//! Loaded once per run from YAML. Every section except `urls` and
//! `credentials.valid_user` has defaults, and the URLs and the valid user
//! can be overridden from the environment so credentials stay out of the
//! config file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{E2eError, E2eResult};

pub const ENV_LOGIN_URL: &str = "AUTHFLOW_LOGIN_URL";
pub const ENV_DASHBOARD_URL: &str = "AUTHFLOW_DASHBOARD_URL";
pub const ENV_EMAIL: &str = "AUTHFLOW_EMAIL";
pub const ENV_PASSWORD: &str = "AUTHFLOW_PASSWORD";

/// Everything a scenario needs to know about the application under test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// Navigation targets
    pub urls: Urls,

    /// Credential pairs
    pub credentials: Credentials,

    /// Expected error texts (case-insensitive patterns)
    #[serde(default)]
    pub messages: Messages,

    /// Logical element name to selector
    #[serde(default)]
    pub selectors: Selectors,

    /// localStorage keys holding the session
    #[serde(default)]
    pub storage: StorageKeys,

    /// Per-operation wait budgets
    #[serde(default)]
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Urls {
    pub login: String,
    pub dashboard: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub valid_user: Credential,

    #[serde(default)]
    pub invalid_user: Option<Credential>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Messages {
    #[serde(default)]
    pub invalid_credentials: Option<String>,

    #[serde(default)]
    pub empty_fields: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub email_input: String,
    pub password_input: String,
    pub login_button: String,
    pub logout_button: String,
    pub error_message_invalid: String,
    pub error_message_empty_fields: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            email_input: r#"input[name="email"]"#.to_string(),
            password_input: r#"input[name="password"]"#.to_string(),
            login_button: r#"button[type="submit"]"#.to_string(),
            logout_button: r#"[data-testid="logout-button"]"#.to_string(),
            error_message_invalid: r#"[data-testid="login-error"]"#.to_string(),
            error_message_empty_fields: r#"[data-testid="login-validation-error"]"#.to_string(),
        }
    }
}

/// The application writes the session under one key and the logout check
/// reads another. Both are kept configurable until the real storage
/// contract is confirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    /// Entry shaped `{ state: { user: { authToken } } }`, read after login
    pub session_key: String,

    /// Entry shaped `{ user: { authToken } }`, read after logout
    pub cleared_key: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            session_key: "user".to_string(),
            cleared_key: "state".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Wait for the dashboard after submitting the login form
    pub navigation_ms: u64,

    /// Wait for an element to become visible
    pub element_ms: u64,

    /// Wait for the login URL after clicking logout
    pub logout_url_ms: u64,

    /// Fixed delay raced against `logout_url_ms`
    pub logout_fallback_ms: u64,

    /// Settle time between logout and the storage check
    pub post_logout_ms: u64,

    /// Retry budget of text and URL assertions
    pub expect_ms: u64,

    pub network_idle_ms: u64,

    /// Budget for a single goto/fill/click
    pub action_ms: u64,

    /// How long to wait for the application to answer HTTP before running
    pub preflight_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation_ms: 15_000,
            element_ms: 10_000,
            logout_url_ms: 10_000,
            logout_fallback_ms: 5_000,
            post_logout_ms: 2_000,
            expect_ms: 5_000,
            network_idle_ms: 30_000,
            action_ms: 10_000,
            preflight_ms: 30_000,
        }
    }
}

impl Timeouts {
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn element(&self) -> Duration {
        Duration::from_millis(self.element_ms)
    }

    pub fn logout_url(&self) -> Duration {
        Duration::from_millis(self.logout_url_ms)
    }

    pub fn logout_fallback(&self) -> Duration {
        Duration::from_millis(self.logout_fallback_ms)
    }

    pub fn post_logout(&self) -> Duration {
        Duration::from_millis(self.post_logout_ms)
    }

    pub fn expect(&self) -> Duration {
        Duration::from_millis(self.expect_ms)
    }

    pub fn network_idle(&self) -> Duration {
        Duration::from_millis(self.network_idle_ms)
    }

    pub fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    pub fn preflight(&self) -> Duration {
        Duration::from_millis(self.preflight_ms)
    }
}

impl SuiteConfig {
    /// Build a config for the given URLs and valid user, everything else default
    pub fn new(login_url: &str, dashboard_url: &str, valid_user: Credential) -> Self {
        Self {
            urls: Urls {
                login: login_url.to_string(),
                dashboard: dashboard_url.to_string(),
            },
            credentials: Credentials {
                valid_user,
                invalid_user: None,
            },
            messages: Messages::default(),
            selectors: Selectors::default(),
            storage: StorageKeys::default(),
            timeouts: Timeouts::default(),
        }
    }

    /// Parse a suite config from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a suite config from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Replace URLs and valid credentials with values found by `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_LOGIN_URL) {
            self.urls.login = url;
        }
        if let Some(url) = lookup(ENV_DASHBOARD_URL) {
            self.urls.dashboard = url;
        }
        if let Some(email) = lookup(ENV_EMAIL) {
            self.credentials.valid_user.email = email;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.credentials.valid_user.password = password;
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    }

    /// Reject configs no scenario could run against
    pub fn validate(&self) -> E2eResult<()> {
        if self.urls.login.is_empty() {
            return Err(E2eError::Config("urls.login is empty".to_string()));
        }
        if self.urls.dashboard.is_empty() {
            return Err(E2eError::Config("urls.dashboard is empty".to_string()));
        }
        let user = &self.credentials.valid_user;
        if user.email.is_empty() || user.password.is_empty() {
            return Err(E2eError::Config(format!(
                "credentials.valid_user needs an email and a password (or set {} and {})",
                ENV_EMAIL, ENV_PASSWORD
            )));
        }
        Ok(())
    }
}
