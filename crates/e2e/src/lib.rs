//! AuthFlow E2E Test Framework
//!
//! Browser-driven tests for the login and logout flow of the web console:
//! - Drives Playwright from Rust through a long-lived Node bridge
//! - Hides selectors and timing behind the `LoginPage` page object
//! - Runs each scenario in a fresh browser and records a JSON report
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner<F: DriverFactory>                               │
//! │    ├── preflight()            -> login page answers HTTP    │
//! │    ├── factory.launch()       -> PageDriver per scenario    │
//! │    ├── Scenario::run(page)    -> ScenarioReport             │
//! │    └── write_results()        -> test-results.json          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  LoginPage<D: PageDriver>                                   │
//! │    ├── goto / login / logout                                │
//! │    ├── expect_error_message_* / expect_redirect_to_*        │
//! │    └── token_should_exist / token_should_be_cleared         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PlaywrightDriver                                           │
//! │    └── node bridge.js  <── JSON lines ──>  browser page     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod expect;
pub mod page;
pub mod playwright;
pub mod runner;
pub mod scenarios;
pub mod session;

pub use config::SuiteConfig;
pub use driver::{DriverFactory, PageDriver};
pub use error::{E2eError, E2eResult};
pub use page::{LoginPage, LogoutOutcome, LogoutSettle, Navigation};
pub use runner::TestRunner;
pub use scenarios::Scenario;
