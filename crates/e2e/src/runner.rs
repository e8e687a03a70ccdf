//! Test runner that checks the app is up, then runs each scenario in its own browser

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::config::SuiteConfig;
use crate::driver::{DriverFactory, PageDriver};
use crate::error::{E2eError, E2eResult};
use crate::scenarios::{Scenario, ScenarioReport};

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub skipped: bool,
    pub duration_ms: u64,
    pub report: Option<ScenarioReport>,
    pub screenshot_path: Option<PathBuf>,
    pub error: Option<String>,
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Main E2E test runner
pub struct TestRunner<F: DriverFactory> {
    /// Launches one page per scenario
    factory: F,

    /// Application under test
    config: SuiteConfig,

    /// Output directory for results and failure screenshots
    output_dir: PathBuf,
}

impl<F: DriverFactory> TestRunner<F> {
    pub fn new(factory: F, config: SuiteConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            factory,
            config,
            output_dir: output_dir.into(),
        }
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Wait until the login page answers over HTTP
    pub async fn preflight(&self) -> E2eResult<()> {
        let url = &self.config.urls.login;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let timeout_duration = self.config.timeouts.preflight();
        let start = Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            match client.get(url).send().await {
                Ok(resp) => {
                    if !resp.status().is_success() {
                        warn!("Login page returned {}", resp.status());
                    }
                    info!("Application is reachable at {}", url);
                    return Ok(());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for application at {}...", url);
                    }
                    // Connection refused is expected while the app is starting
                    if !e.is_connect() {
                        warn!("Preflight error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(100)).await;
        }

        Err(E2eError::AppUnreachable(attempts))
    }

    /// Run every scenario
    pub async fn run_all(&self) -> E2eResult<TestSuiteResult> {
        self.run_scenarios(&Scenario::ALL).await
    }

    /// Run scenarios carrying a tag
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<TestSuiteResult> {
        let filtered: Vec<Scenario> = Scenario::ALL
            .into_iter()
            .filter(|s| s.tags().contains(&tag))
            .collect();
        self.run_scenarios(&filtered).await
    }

    /// Run a specific scenario by name
    pub async fn run_named(&self, name: &str) -> E2eResult<TestSuiteResult> {
        let scenario =
            Scenario::from_name(name).ok_or_else(|| E2eError::ScenarioNotFound(name.to_string()))?;
        self.run_scenarios(&[scenario]).await
    }

    /// Run a list of scenarios
    pub async fn run_scenarios(&self, scenarios: &[Scenario]) -> E2eResult<TestSuiteResult> {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;
        let mut skipped = 0;

        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            let result = self.run_scenario(*scenario).await;
            if result.skipped {
                skipped += 1;
                info!("- {} skipped ({})", result.name, result.error.as_deref().unwrap_or(""));
            } else if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!("✗ {} - {}", result.name, result.error.as_deref().unwrap_or("unknown error"));
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        Ok(TestSuiteResult {
            started_at,
            total: scenarios.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            results,
        })
    }

    /// Run a single scenario in a fresh page
    pub async fn run_scenario(&self, scenario: Scenario) -> TestResult {
        let start = Instant::now();
        let name = scenario.name().to_string();

        if let Some(reason) = scenario.skip_reason(&self.config) {
            return TestResult {
                name,
                success: false,
                skipped: true,
                duration_ms: 0,
                report: None,
                screenshot_path: None,
                error: Some(reason.to_string()),
            };
        }

        debug!("Running scenario: {}", name);

        let page = match self.factory.launch().await {
            Ok(page) => page,
            Err(e) => {
                return TestResult {
                    name,
                    success: false,
                    skipped: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                    report: None,
                    screenshot_path: None,
                    error: Some(format!("failed to launch browser: {}", e)),
                };
            }
        };

        let mut report = ScenarioReport::default();
        let outcome = scenario.run_into(&page, &self.config, &mut report).await;

        let screenshot_path = match &outcome {
            Err(_) => self.capture_failure(&page, &name).await,
            Ok(_) => None,
        };

        if let Err(e) = page.close().await {
            warn!("Failed to close browser for {}: {}", name, e);
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => TestResult {
                name,
                success: true,
                skipped: false,
                duration_ms,
                report: Some(report),
                screenshot_path,
                error: None,
            },
            Err(e) => TestResult {
                name,
                success: false,
                skipped: false,
                duration_ms,
                report: Some(report),
                screenshot_path,
                error: Some(e.to_string()),
            },
        }
    }

    async fn capture_failure(&self, page: &F::Driver, name: &str) -> Option<PathBuf> {
        let path = self.output_dir.join("screenshots").join(format!("{}.png", name));
        match page.screenshot(&path).await {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("Could not capture failure screenshot for {}: {}", name, e);
                None
            }
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        write_results(&self.output_dir, results)
    }
}

/// Write `test-results.json` under `output_dir`
pub fn write_results(output_dir: &Path, results: &TestSuiteResult) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let path = output_dir.join("test-results.json");
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}
