//! Seams to external collaborators
//!
//! The pipeline core only sees these traits. Concrete implementations live in
//! `sculpt-agent`; tests substitute scripted ones.

use async_trait::async_trait;

use crate::types::{ConstructionPlan, DesignAnalysis, ExecutionOutcome, ShapeDescriptor};
use crate::Result;

/// A single request to a text-generation oracle
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    /// Role instructions, if any
    pub system: Option<String>,
    /// The request body
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl OracleRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// External text/code generation service
#[async_trait]
pub trait TextOracle: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn generate(&self, request: &OracleRequest) -> Result<String>;
}

/// Turns a prompt into a shape descriptor
#[async_trait]
pub trait Analyst: Send + Sync {
    async fn analyze(&self, prompt: &str) -> Result<ShapeDescriptor>;
}

/// Deterministic code producer for known shape types
pub trait TemplateGenerator: Send + Sync {
    fn supports(&self, shape_type: &str) -> bool;

    fn generate(&self, descriptor: &ShapeDescriptor) -> Result<String>;
}

/// First stage of the generative chain
#[async_trait]
pub trait Architect: Send + Sync {
    async fn analyze_design(&self, prompt: &str) -> Result<DesignAnalysis>;
}

/// Second stage of the generative chain
#[async_trait]
pub trait Planner: Send + Sync {
    async fn create_plan(&self, analysis: &DesignAnalysis, prompt: &str)
        -> Result<ConstructionPlan>;
}

/// Third stage of the generative chain
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, plan: &ConstructionPlan, analysis: &DesignAnalysis)
        -> Result<String>;
}

/// Runs a script in a restricted environment and reports the artifact
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, code: &str) -> Result<ExecutionOutcome>;
}
