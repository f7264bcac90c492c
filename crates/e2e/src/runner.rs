//! Suite orchestration: drives the per-section controllers and
//! aggregates their results

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::casper::{self, CasperSummary};
use crate::controller::{ControllerConfig, TestController};
use crate::error::E2eResult;
use crate::section::{default_sections, TestSection};

/// Outcome of one section's run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionResult {
    pub section: TestSection,
    pub exit_code: i32,
    pub success: bool,
    pub summary: Option<CasperSummary>,
}

/// Outcome of the whole suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<SectionResult>,
}

/// Builds the controllers a run will drive. Injected so hosts can swap
/// the suite composition without reaching into the runner's internals.
pub type ControllerFactory = Box<dyn Fn(&ControllerConfig) -> E2eResult<Vec<TestController>>>;

/// Configuration for the suite runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub controller: ControllerConfig,
    pub output_dir: PathBuf,
    pub buffer_output: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            output_dir: PathBuf::from("test-results"),
            buffer_output: false,
        }
    }
}

/// Main suite runner
pub struct JsTestRunner {
    config: RunnerConfig,
    factory: ControllerFactory,
}

impl JsTestRunner {
    /// Runner over the fixed auth/noauth pair.
    pub fn new(config: RunnerConfig) -> Self {
        Self::with_factory(config, Box::new(default_controllers))
    }

    /// Runner with an injected controller factory.
    pub fn with_factory(config: RunnerConfig, factory: ControllerFactory) -> Self {
        Self { config, factory }
    }

    /// Drive every controller through its lifecycle, strictly one at a
    /// time, and aggregate the per-section exit codes. Readiness
    /// degradation is per section; configuration-level errors abort the
    /// whole run.
    pub async fn run_all(&self) -> E2eResult<SuiteResult> {
        let start = Instant::now();
        let controllers = (self.factory)(&self.config.controller)?;
        let total = controllers.len();

        info!("Running {} section(s)...", total);

        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;

        for mut controller in controllers {
            let section = controller.section;
            let result = self.run_section(&mut controller).await?;
            if result.success {
                passed += 1;
                info!("✓ {} (exit code 0)", section);
            } else {
                failed += 1;
                error!("✗ {} (exit code {})", section, result.exit_code);
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Section results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        Ok(SuiteResult {
            total,
            passed,
            failed,
            duration_ms,
            results,
        })
    }

    async fn run_section(&self, controller: &mut TestController) -> E2eResult<SectionResult> {
        controller.setup().await?;
        controller.launch(self.config.buffer_output)?;
        let exit_code = controller.wait()?;
        let summary = controller.runner_output().and_then(casper::parse_summary);
        controller.cleanup()?;

        Ok(SectionResult {
            section: controller.section,
            exit_code,
            success: exit_code == 0,
            summary,
        })
    }

    /// Write the machine-readable suite result next to the logs.
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// One controller per section, in suite order. Never a third.
fn default_controllers(config: &ControllerConfig) -> E2eResult<Vec<TestController>> {
    default_sections()
        .into_iter()
        .map(|section| TestController::new(section, config.clone()))
        .collect()
}
