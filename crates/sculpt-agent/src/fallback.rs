//! Offline stand-in for the oracle

use async_trait::async_trait;
use tracing::debug;

use sculpt_core::{OracleRequest, Result, TextOracle};

/// Deterministic oracle used when no server is configured
///
/// Replies with a one-line construction hint keyed on the request's wording.
/// Callers that expect JSON or code fall through to their own fallbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicOracle;

impl HeuristicOracle {
    pub fn new() -> Self {
        Self
    }

    pub fn respond(prompt: &str) -> &'static str {
        let lower = prompt.to_lowercase();
        if lower.contains("cube") || lower.contains("box") {
            "Create a box with dimensions 50x50x50mm using workplane and box primitive."
        } else if lower.contains("cylinder") || lower.contains("circle") {
            "Create a cylinder with radius 25mm and height 50mm using circle and extrude."
        } else if lower.contains("sphere") {
            "Create a sphere using sphere primitive with radius 25mm."
        } else {
            "Create basic shape using CadQuery primitives: workplane, box, circle, extrude."
        }
    }
}

#[async_trait]
impl TextOracle for HeuristicOracle {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn generate(&self, request: &OracleRequest) -> Result<String> {
        debug!("heuristic oracle answering locally");
        Ok(Self::respond(&request.prompt).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keyed_replies() {
        let oracle = HeuristicOracle::new();
        let reply = oracle
            .generate(&OracleRequest::new("Analyze this CAD request: a Cube"))
            .await
            .unwrap();
        assert!(reply.contains("50x50x50mm"));
        assert!(HeuristicOracle::respond("a gear with 20 teeth").starts_with("Create basic shape"));
    }
}
