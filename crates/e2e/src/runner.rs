//! Suite runner that wraps the scenarios in cleanup and collects results

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::cleanup::{close_all_sessions, CleanupReport};
use crate::client::{ParkingApp, Session};
use crate::config::HarnessConfig;
use crate::error::{E2eError, E2eResult};
use crate::scenario::{LogEntry, Scenario, ScenarioLog, SuiteContext};

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub entries: Vec<LogEntry>,
    pub error: Option<String>,
}

/// Result of running the suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub cleanup_before: CleanupReport,
    pub cleanup_after: CleanupReport,
    /// Set when the closing cleanup could not run to completion
    #[serde(default)]
    pub cleanup_after_error: Option<String>,
    pub results: Vec<ScenarioResult>,
}

impl SuiteResult {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Runs scenarios against one application instance
pub struct SuiteRunner {
    config: HarnessConfig,

    /// Output directory for results
    output_dir: PathBuf,
}

impl SuiteRunner {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            output_dir: PathBuf::from("test-results"),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run every scenario in order
    pub async fn run_all(&self) -> E2eResult<SuiteResult> {
        self.run_scenarios(&Scenario::ALL).await
    }

    /// Run a single scenario by name
    pub async fn run_named(&self, name: &str) -> E2eResult<SuiteResult> {
        let scenario = Scenario::from_name(name)
            .ok_or_else(|| E2eError::ScenarioNotFound(name.to_string()))?;
        self.run_scenarios(&[scenario]).await
    }

    /// Clean up, run `scenarios` sequentially on shared sessions, clean up again.
    ///
    /// A failing scenario does not stop the ones after it. Failing the first
    /// cleanup or the administrator login is an error for the whole run. A
    /// failing closing cleanup is logged and kept in the result so that the
    /// scenario results are not lost.
    pub async fn run_scenarios(&self, scenarios: &[Scenario]) -> E2eResult<SuiteResult> {
        self.config.validate()?;
        let start = Instant::now();

        let app = ParkingApp::new(self.config.base_url.clone());
        let cleanup_session = Session::new("cleanup")?;
        app.login(&cleanup_session, &self.config.admin).await?;

        let cleanup_before = close_all_sessions(&app, &cleanup_session, &self.config.cleanup).await?;

        let mut ctx = match SuiteContext::setup(self.config.clone()).await {
            Ok(ctx) => ctx,
            Err(e) => {
                error!("Suite setup failed: {}", e);
                if let Err(cleanup_err) =
                    close_all_sessions(&app, &cleanup_session, &self.config.cleanup).await
                {
                    error!("Cleanup after failed setup also failed: {}", cleanup_err);
                }
                return Err(e);
            }
        };

        info!("Running {} scenario(s)...", scenarios.len());

        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;

        for scenario in scenarios {
            let result = Self::run_one(&mut ctx, *scenario).await;
            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        let (cleanup_after, cleanup_after_error) =
            match close_all_sessions(&app, &cleanup_session, &self.config.cleanup).await {
                Ok(report) => (report, None),
                Err(e) => {
                    error!("Closing cleanup failed: {}", e);
                    (CleanupReport::default(), Some(e.to_string()))
                }
            };

        let skipped = Scenario::ALL.len().saturating_sub(scenarios.len());
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Scenario results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        Ok(SuiteResult {
            total: scenarios.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            cleanup_before,
            cleanup_after,
            cleanup_after_error,
            results,
        })
    }

    async fn run_one(ctx: &mut SuiteContext, scenario: Scenario) -> ScenarioResult {
        let start = Instant::now();
        debug!("Running scenario: {}", scenario.name());

        let mut log = ScenarioLog::default();
        let outcome = scenario.run(ctx, &mut log).await;

        ScenarioResult {
            name: scenario.name().to_string(),
            success: outcome.is_ok(),
            duration_ms: start.elapsed().as_millis() as u64,
            entries: log.into_entries(),
            error: outcome.err().map(|e| e.to_string()),
        }
    }

    /// Write suite results to `test-results.json` in the output directory
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
