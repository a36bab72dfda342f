//! Sequential batch runs with a JSON report

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use sculpt_core::WorkflowOutcome;
use sculpt_orchestrator::Orchestrator;

/// Prompts used when no prompt file is given
pub const DEFAULT_PROMPTS: &[&str] = &[
    "Create a table: make a rectangular top 200 mm × 100 mm × 15 mm, add four cylindrical legs diameter 12 mm height 120 mm inset 15 mm from each corner under the top, and union all parts.",
    "Create a vase by revolving a smooth profile with radius 30 mm at base, 22 mm at mid-height 60 mm, and 35 mm at top height 120 mm, then shell to 3 mm wall thickness and keep a flat 3 mm bottom.",
    "Create a drinking glass: make an outer cylinder radius 35 mm height 100 mm, subtract an inner cylinder radius 32.5 mm height 92 mm to leave an 8 mm solid bottom, then fillet the rim 1 mm.",
    "Create a helical spring by sweeping a circle radius 1.5 mm along a right-hand helix with major radius 20 mm, pitch 8 mm, and 10 turns, then trim both ends flat.",
    "Create a pipe by subtracting an inner cylinder radius 15 mm length 150 mm from an outer cylinder radius 20 mm length 150 mm, then optionally chamfer both rim edges 1 mm.",
    "Create a hemispherical bowl by revolving a semicircle radius 40 mm to form a hemisphere, then shell to 3 mm wall thickness while keeping a 3 mm bottom and fillet the rim 1 mm.",
    "Create a screw: make a cylindrical shaft radius 4 mm height 50 mm, place a hexagonal head circumradius 6 mm height 5 mm on top, and union the head and shaft (optional 0.5 mm chamfer on head edges).",
    "Create a torus with major radius 50 mm and minor radius 8 mm.",
];

#[derive(Debug, Deserialize)]
struct PromptFile {
    #[serde(default)]
    prompts: Vec<PromptEntry>,
}

#[derive(Debug, Deserialize)]
struct PromptEntry {
    prompt: String,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

/// Enabled prompts from a `{"prompts": [{"prompt": ..., "enabled": ...}]}` file
///
/// Without a path, or when the file does not exist, the default list is used.
pub fn load_prompts(path: Option<&Path>) -> Result<Vec<String>> {
    let Some(path) = path else {
        return Ok(default_prompts());
    };
    if !path.exists() {
        warn!("{} not found, using default prompts", path.display());
        return Ok(default_prompts());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file: PromptFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse prompt file {}", path.display()))?;
    let prompts: Vec<String> = file
        .prompts
        .into_iter()
        .filter(|p| p.enabled)
        .map(|p| p.prompt)
        .collect();
    info!(count = prompts.len(), "loaded prompts from {}", path.display());
    Ok(prompts)
}

fn default_prompts() -> Vec<String> {
    DEFAULT_PROMPTS.iter().map(|p| p.to_string()).collect()
}

/// Outcome of one prompt in a batch
#[derive(Debug, Clone, Serialize)]
pub struct PromptReport {
    pub index: usize,
    pub prompt: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub success: bool,
    pub code: Option<String>,
    pub artifact_reference: Option<String>,
    pub retry_count: usize,
    pub errors: Vec<String>,
    pub logs: Vec<String>,
    pub execution_time_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub timestamp: DateTime<Utc>,
    pub total_prompts: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<PromptReport>,
}

impl BatchReport {
    pub fn new(results: Vec<PromptReport>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            timestamp: Utc::now(),
            total_prompts: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))
    }
}

/// Run every prompt in order through the same orchestrator
pub async fn run_batch(orchestrator: &Orchestrator, prompts: &[String]) -> BatchReport {
    let total = prompts.len();
    let mut results = Vec::with_capacity(total);

    for (i, prompt) in prompts.iter().enumerate() {
        info!("[{}/{}] {}", i + 1, total, prompt);
        let logs = Arc::new(Mutex::new(Vec::new()));
        let sink = logs.clone();
        let start_time = Utc::now();

        let outcome = orchestrator
            .run(
                prompt,
                Some(Arc::new(move |message: &str, percent: u8| {
                    if let Ok(mut logs) = sink.lock() {
                        logs.push(format!("[Progress {}%] {}", percent, message));
                    }
                })),
            )
            .await;

        let end_time = Utc::now();
        let logs = logs.lock().map(|l| l.clone()).unwrap_or_default();
        let report = PromptReport {
            index: i + 1,
            prompt: prompt.clone(),
            start_time,
            end_time,
            success: outcome.is_success(),
            code: outcome.code().map(str::to_string),
            artifact_reference: match &outcome {
                WorkflowOutcome::Success(s) => Some(s.artifact_reference.clone()),
                WorkflowOutcome::Failure(_) => None,
            },
            retry_count: outcome.retry_count(),
            errors: outcome.errors().to_vec(),
            logs,
            execution_time_seconds: (end_time - start_time).num_milliseconds() as f64 / 1000.0,
        };

        match &report.artifact_reference {
            Some(artifact) => info!("  success, artifact at {}", artifact),
            None => error!(
                "  failed: {}",
                report.errors.first().map(String::as_str).unwrap_or("unknown error")
            ),
        }
        results.push(report);
    }

    BatchReport::new(results)
}
