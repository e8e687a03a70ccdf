//! Login page object
//!
//! Wraps a [`PageDriver`] and exposes the login screen as named operations.
//! Selectors, URLs and timing live in [`SuiteConfig`]; scenarios only see
//! `goto`, `login`, `logout` and the assertion helpers.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SuiteConfig;
use crate::driver::{ClickOptions, LoadState, PageDriver, WaitState};
use crate::error::{E2eError, E2eResult};
use crate::expect;
use crate::session;

/// Whether the dashboard was reached after submitting the login form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Navigation {
    Reached,
    TimedOut,
}

/// Which branch of the logout race settled first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutSettle {
    ReachedLogin,
    DelayElapsed,
}

/// How logout was carried out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LogoutOutcome {
    /// The logout control was clicked
    Succeeded { settle: LogoutSettle },

    /// The UI path failed; storage was cleared from inside the page
    FallbackApplied { reason: String },
}

/// In-page script used when the logout control cannot be clicked
pub fn force_logout_script(login_url: &str) -> String {
    let target = serde_json::Value::String(login_url.to_string());
    format!(
        "(() => {{ localStorage.clear(); window.location.href = {}; }})()",
        target
    )
}

pub struct LoginPage<'a, D: PageDriver + ?Sized> {
    page: &'a D,
    config: &'a SuiteConfig,
}

impl<'a, D: PageDriver + ?Sized> LoginPage<'a, D> {
    pub fn new(page: &'a D, config: &'a SuiteConfig) -> Self {
        Self { page, config }
    }

    /// Navigate to the login page
    pub async fn goto(&self) -> E2eResult<()> {
        self.page
            .goto(&self.config.urls.login, self.config.timeouts.action())
            .await
    }

    /// Fill the form and submit it.
    ///
    /// An empty `email` or `password` leaves that field untouched so the
    /// empty-field validation can be exercised. Not reaching the dashboard
    /// is reported, not treated as failure.
    pub async fn login(&self, email: &str, password: &str) -> E2eResult<Navigation> {
        let selectors = &self.config.selectors;
        let timeouts = &self.config.timeouts;

        if !email.is_empty() {
            self.page.fill(&selectors.email_input, email, timeouts.action()).await?;
        }
        if !password.is_empty() {
            self.page.fill(&selectors.password_input, password, timeouts.action()).await?;
        }

        let navigation = async {
            match self
                .page
                .wait_for_navigation(&self.config.urls.dashboard, timeouts.navigation())
                .await
            {
                Ok(()) => Ok::<_, E2eError>(Navigation::Reached),
                Err(e) => {
                    warn!("Navigation to dashboard did not complete ({}), checking current state", e);
                    Ok(Navigation::TimedOut)
                }
            }
        };
        let click = self.page.click(
            &selectors.login_button,
            ClickOptions {
                force: false,
                timeout: timeouts.action(),
            },
        );

        // A click failure returns without waiting out the navigation
        let (navigation, ()) = tokio::try_join!(navigation, click)?;

        self.page
            .wait_for_load_state(LoadState::NetworkIdle, timeouts.network_idle())
            .await?;

        debug!("Login submitted, navigation {:?}", navigation);
        Ok(navigation)
    }

    /// Log out through the UI, falling back to clearing storage in-page
    pub async fn logout(&self) -> E2eResult<LogoutOutcome> {
        match self.logout_via_ui().await {
            Ok(settle) => Ok(LogoutOutcome::Succeeded { settle }),
            Err(e) => {
                warn!("Logout click failed, trying alternative approach: {}", e);
                self.page
                    .evaluate(&force_logout_script(&self.config.urls.login))
                    .await?;
                Ok(LogoutOutcome::FallbackApplied { reason: e.to_string() })
            }
        }
    }

    async fn logout_via_ui(&self) -> E2eResult<LogoutSettle> {
        let logout_button = &self.config.selectors.logout_button;
        let timeouts = &self.config.timeouts;

        self.page
            .wait_for_selector(logout_button, WaitState::Visible, timeouts.element())
            .await?;
        self.page
            .click(
                logout_button,
                ClickOptions {
                    force: true,
                    timeout: timeouts.element(),
                },
            )
            .await?;

        // First to settle wins; the other wait keeps running in the browser
        tokio::select! {
            reached = self.page.wait_for_url(&self.config.urls.login, timeouts.logout_url()) => {
                reached?;
                Ok(LogoutSettle::ReachedLogin)
            }
            delay = self.page.wait_for_timeout(timeouts.logout_fallback()) => {
                delay?;
                Ok(LogoutSettle::DelayElapsed)
            }
        }
    }

    pub async fn expect_error_message_invalid(&self, text: &str) -> E2eResult<()> {
        self.expect_error_message(&self.config.selectors.error_message_invalid, text)
            .await
    }

    pub async fn expect_error_message_empty_fields(&self, text: &str) -> E2eResult<()> {
        self.expect_error_message(&self.config.selectors.error_message_empty_fields, text)
            .await
    }

    async fn expect_error_message(&self, selector: &str, text: &str) -> E2eResult<()> {
        let pattern = expect::case_insensitive(text)?;
        self.page
            .wait_for_selector(selector, WaitState::Visible, self.config.timeouts.element())
            .await?;
        expect::to_have_text(self.page, selector, &pattern, self.config.timeouts.expect()).await
    }

    pub async fn expect_redirect_to_dashboard(&self) -> E2eResult<()> {
        expect::to_have_url(self.page, &self.config.urls.dashboard, self.config.timeouts.expect()).await
    }

    pub async fn expect_redirect_to_login(&self) -> E2eResult<()> {
        expect::to_have_url(self.page, &self.config.urls.login, self.config.timeouts.expect()).await
    }

    /// The logout control is visible and the session entry holds a token
    pub async fn token_should_exist(&self) -> E2eResult<()> {
        self.page
            .wait_for_selector(
                &self.config.selectors.logout_button,
                WaitState::Visible,
                self.config.timeouts.element(),
            )
            .await?;

        let key = &self.config.storage.session_key;
        let raw = self.page.local_storage_item(key).await?;
        session::require_auth_token(key, raw.as_deref())?;

        info!("Auth token present in localStorage[{:?}]", key);
        Ok(())
    }

    /// The cleared-session entry is gone or no longer carries a token
    pub async fn token_should_be_cleared(&self) -> E2eResult<()> {
        let key = &self.config.storage.cleared_key;
        let raw = self.page.local_storage_item(key).await?;
        session::require_no_auth_token(key, raw.as_deref())
    }

    /// Current URL, for soft checks in scenarios
    pub async fn current_url(&self) -> E2eResult<String> {
        self.page.url().await
    }
}
