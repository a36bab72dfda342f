//! # sculpt-agent
//!
//! Concrete collaborators for the sculpt pipeline.
//!
//! - Ollama chat client with a shared circuit breaker
//! - Heuristic oracle used when no server is reachable
//! - Keyword analyst and primitive templates for recognized shapes
//! - Architect, planner and synthesizer for everything else
//! - Sandboxed Python executor
//!
//! Every oracle-backed collaborator wraps its calls in
//! [`sculpt_core::with_fallback`], so a dead or slow server degrades the output
//! to a deterministic answer instead of failing the run.

mod analyst;
mod circuit_breaker;
mod client;
pub mod cot;
mod executor;
mod fallback;
mod templates;
mod types;

pub use analyst::KeywordAnalyst;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use client::{OllamaClient, OracleRoles};
pub use cot::{extract_json, OracleArchitect, OraclePlanner, OracleSynthesizer};
pub use executor::{validate_artifact_name, PythonExecutor};
pub use fallback::HeuristicOracle;
pub use templates::PrimitiveTemplates;
pub use types::*;
