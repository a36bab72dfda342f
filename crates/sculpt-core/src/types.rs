//! Core type definitions for the sculpt pipeline

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Default bound on attempts for any retried phase
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Status of one phase attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Retry,
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Retry => write!(f, "retry"),
        }
    }
}

impl std::str::FromStr for PhaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "retry" => Ok(Self::Retry),
            _ => Err(format!("Invalid phase status: {}", s)),
        }
    }
}

/// Uniform wrapper for every phase outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub status: PhaseStatus,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl PhaseResult {
    /// Successful result carrying a payload
    pub fn success(payload: impl Serialize) -> Self {
        Self {
            status: PhaseStatus::Success,
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
            errors: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Failed result carrying error strings
    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            status: PhaseStatus::Failed,
            payload: Value::Null,
            errors,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_payload(mut self, payload: impl Serialize) -> Self {
        self.payload = serde_json::to_value(payload).unwrap_or(Value::Null);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.metadata.insert(
            key.into(),
            serde_json::to_value(value).unwrap_or(Value::Null),
        );
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == PhaseStatus::Success
    }

    /// Deserialize the payload into a concrete type
    pub fn payload_as<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.payload.clone()).ok()
    }

    /// Read a boolean metadata flag, defaulting to false
    pub fn flag(&self, key: &str) -> bool {
        self.metadata
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Normalization of a phase function's native return value into a PhaseResult
///
/// Values that are not already a `PhaseResult` count as an implicit success.
pub trait IntoPhaseResult {
    fn into_phase_result(self) -> PhaseResult;
}

impl IntoPhaseResult for PhaseResult {
    fn into_phase_result(self) -> PhaseResult {
        self
    }
}

impl IntoPhaseResult for String {
    fn into_phase_result(self) -> PhaseResult {
        PhaseResult::success(self)
    }
}

impl IntoPhaseResult for Value {
    fn into_phase_result(self) -> PhaseResult {
        PhaseResult::success(self)
    }
}

impl IntoPhaseResult for ShapeDescriptor {
    fn into_phase_result(self) -> PhaseResult {
        PhaseResult::success(self)
    }
}

impl IntoPhaseResult for DesignAnalysis {
    fn into_phase_result(self) -> PhaseResult {
        PhaseResult::success(self)
    }
}

impl IntoPhaseResult for ConstructionPlan {
    fn into_phase_result(self) -> PhaseResult {
        PhaseResult::success(self)
    }
}

impl IntoPhaseResult for ExecutionOutcome {
    fn into_phase_result(self) -> PhaseResult {
        if self.success {
            PhaseResult::success(&self)
        } else {
            PhaseResult::failed(self.errors.clone()).with_payload(&self)
        }
    }
}

/// Structured guess about the requested geometry, produced by the analyst
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDescriptor {
    #[serde(rename = "type")]
    pub shape_type: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

impl ShapeDescriptor {
    pub fn new(shape_type: impl Into<String>) -> Self {
        Self {
            shape_type: shape_type.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn unknown() -> Self {
        Self::new("unknown")
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Numeric parameter lookup
    pub fn number(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(Value::as_f64)
    }

    /// Numeric parameter lookup with a default
    pub fn number_or(&self, key: &str, default: f64) -> f64 {
        self.number(key).unwrap_or(default)
    }

    pub fn is_unknown(&self) -> bool {
        self.shape_type.is_empty() || self.shape_type == "unknown"
    }
}

/// One failed attempt recorded during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub phase: String,
    pub message: String,
    pub attempt: usize,
    pub timestamp: DateTime<Utc>,
}

/// A phase outcome kept for the final result metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub phase: String,
    pub result: PhaseResult,
}

/// The mutable record threaded through one pipeline run
///
/// The generated code can only be obtained for execution through
/// [`WorkflowRecord::executable_code`], which returns `None` unless the most
/// recent syntax check ran against the current code and succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRecord {
    pub id: String,
    prompt: String,
    pub shape_descriptor: Option<ShapeDescriptor>,
    generated_code: String,
    syntax_verified: bool,
    pub validation_reports: Vec<ValidationReport>,
    pub error_log: Vec<ErrorLogEntry>,
    pub retry_count: usize,
    pub max_retries: usize,
}

impl WorkflowRecord {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: format!("run-{}", &Uuid::new_v4().to_string()[..8]),
            prompt: prompt.into(),
            shape_descriptor: None,
            generated_code: String::new(),
            syntax_verified: false,
            validation_reports: Vec::new(),
            error_log: Vec::new(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn code(&self) -> &str {
        &self.generated_code
    }

    /// Replace the code in place; any earlier syntax verdict no longer applies
    pub fn replace_code(&mut self, code: impl Into<String>) {
        let code = code.into();
        if code != self.generated_code {
            self.syntax_verified = false;
        }
        self.generated_code = code;
    }

    /// Record the outcome of a syntax check against the current code
    pub fn record_syntax_check(&mut self, passed: bool) {
        self.syntax_verified = passed;
    }

    pub fn syntax_verified(&self) -> bool {
        self.syntax_verified
    }

    /// The code, only if its latest syntax check passed
    pub fn executable_code(&self) -> Option<&str> {
        if self.syntax_verified {
            Some(&self.generated_code)
        } else {
            None
        }
    }

    pub fn log_error(&mut self, phase: impl Into<String>, message: impl Into<String>, attempt: usize) {
        self.error_log.push(ErrorLogEntry {
            phase: phase.into(),
            message: message.into(),
            attempt,
            timestamp: Utc::now(),
        });
    }

    pub fn add_report(&mut self, phase: impl Into<String>, result: PhaseResult) {
        self.validation_reports.push(ValidationReport {
            phase: phase.into(),
            result,
        });
    }

    pub fn shape_type(&self) -> &str {
        self.shape_descriptor
            .as_ref()
            .map(|d| d.shape_type.as_str())
            .unwrap_or("unknown")
    }
}

/// Result reported by the executor collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    #[serde(default)]
    pub artifact_reference: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ExecutionOutcome {
    pub fn succeeded(artifact_reference: impl Into<String>) -> Self {
        Self {
            success: true,
            artifact_reference: Some(artifact_reference.into()),
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            artifact_reference: None,
            errors,
        }
    }
}

/// Architect output: what the requested shape is and how to build it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignAnalysis {
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "primitives_needed")]
    pub primitives: Vec<String>,
    #[serde(default, alias = "operations_sequence")]
    pub operation_sequence: Vec<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default = "default_complexity")]
    pub complexity: String,
    #[serde(default)]
    pub reasoning: String,
}

fn default_complexity() -> String {
    "medium".to_string()
}

/// One abstract construction step produced by the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub operation: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub description: String,
}

/// Ordered construction plan produced by the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructionPlan {
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default = "default_estimated_complexity")]
    pub estimated_complexity: u32,
}

fn default_estimated_complexity() -> u32 {
    5
}

/// Metadata attached to a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessMetadata {
    pub validation_reports: Vec<ValidationReport>,
    pub retry_count: usize,
}

/// Metadata attached to a failed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureMetadata {
    pub retry_count: usize,
    pub error_log: Vec<ErrorLogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSuccess {
    pub success: bool,
    pub code: String,
    pub artifact_reference: String,
    pub shape_type: String,
    pub metadata: SuccessMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowFailure {
    pub success: bool,
    pub errors: Vec<String>,
    pub metadata: FailureMetadata,
}

/// Final output of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkflowOutcome {
    Success(WorkflowSuccess),
    Failure(WorkflowFailure),
}

impl WorkflowOutcome {
    pub fn success(record: &WorkflowRecord, code: String, artifact_reference: String) -> Self {
        Self::Success(WorkflowSuccess {
            success: true,
            code,
            artifact_reference,
            shape_type: record.shape_type().to_string(),
            metadata: SuccessMetadata {
                validation_reports: record.validation_reports.clone(),
                retry_count: record.retry_count,
            },
        })
    }

    /// Failure carrying the headline message followed by every logged error
    pub fn failure(record: &WorkflowRecord, message: impl Into<String>) -> Self {
        let mut errors = vec![message.into()];
        errors.extend(
            record
                .error_log
                .iter()
                .map(|e| format!("[{} #{}] {}", e.phase, e.attempt, e.message)),
        );
        Self::Failure(WorkflowFailure {
            success: false,
            errors,
            metadata: FailureMetadata {
                retry_count: record.retry_count,
                error_log: record.error_log.clone(),
            },
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn retry_count(&self) -> usize {
        match self {
            Self::Success(s) => s.metadata.retry_count,
            Self::Failure(f) => f.metadata.retry_count,
        }
    }

    pub fn errors(&self) -> &[String] {
        match self {
            Self::Success(_) => &[],
            Self::Failure(f) => &f.errors,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Success(s) => Some(&s.code),
            Self::Failure(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_status_roundtrip_display() {
        for status in [
            PhaseStatus::Pending,
            PhaseStatus::Running,
            PhaseStatus::Success,
            PhaseStatus::Failed,
            PhaseStatus::Retry,
        ] {
            let parsed: PhaseStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<PhaseStatus>().is_err());
    }

    #[test]
    fn test_bare_values_normalize_to_success() {
        let result = "import cadquery as cq".to_string().into_phase_result();
        assert!(result.is_success());
        assert_eq!(result.payload_as::<String>().unwrap(), "import cadquery as cq");

        let descriptor = ShapeDescriptor::new("torus").with_parameter("major_radius", 50.0);
        let result = descriptor.clone().into_phase_result();
        assert!(result.is_success());
        assert_eq!(result.payload_as::<ShapeDescriptor>().unwrap(), descriptor);
    }

    #[test]
    fn test_failed_execution_normalizes_to_failed() {
        let outcome = ExecutionOutcome::failed(vec!["MemoryError".to_string()]);
        let result = outcome.into_phase_result();
        assert_eq!(result.status, PhaseStatus::Failed);
        assert_eq!(result.errors, vec!["MemoryError".to_string()]);
    }

    #[test]
    fn test_replacing_code_clears_syntax_verdict() {
        let mut record = WorkflowRecord::new("Create a cube");
        record.replace_code("result = 1");
        assert!(record.executable_code().is_none());

        record.record_syntax_check(true);
        assert_eq!(record.executable_code(), Some("result = 1"));

        // Same text keeps the verdict
        record.replace_code("result = 1");
        assert!(record.syntax_verified());

        record.replace_code("result = 2");
        assert!(record.executable_code().is_none());
    }

    #[test]
    fn test_failure_outcome_aggregates_log() {
        let mut record = WorkflowRecord::new("Create a cube");
        record.log_error("Execution", "MemoryError", 1);
        record.log_error("Execution", "MemoryError", 2);
        record.retry_count = 2;

        let outcome = WorkflowOutcome::failure(&record, "Execution failed");
        assert!(!outcome.is_success());
        assert_eq!(outcome.errors().len(), 3);
        assert_eq!(outcome.errors()[0], "Execution failed");
        assert_eq!(outcome.retry_count(), 2);

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], Value::Bool(false));
        assert_eq!(json["metadata"]["error_log"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_design_analysis_accepts_oracle_field_names() {
        let json = r#"{
            "description": "A cube",
            "primitives_needed": ["box"],
            "operations_sequence": ["create_workplane", "create_box"],
            "parameters": {"width": 50}
        }"#;
        let analysis: DesignAnalysis = serde_json::from_str(json).unwrap();
        assert_eq!(analysis.primitives, vec!["box".to_string()]);
        assert_eq!(analysis.complexity, "medium");
    }
}
