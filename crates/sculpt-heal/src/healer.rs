//! The two-tier self-healer
//!
//! Tier 1 runs the deterministic rule table. Tier 2 asks the repair oracle,
//! and only when tier 1 changed nothing. Whatever tier produced the new code,
//! it must parse; otherwise the caller gets the original code back along with
//! the new syntax error.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use sculpt_core::{HealingConfig, Issue, PhaseResult};
use sculpt_validation::{RuleTable, SyntaxChecker};

use crate::normalize::{normalize_indentation, strip_disallowed_imports, substitute_characters};
use crate::repair::RepairOracle;
use crate::rules::{apply_rules, RewriteContext};

/// Which tier produced the healed code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealTier {
    /// Nothing was rewritten
    #[default]
    None,
    Deterministic,
    Generative,
}

/// Result of one healing request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealOutcome {
    pub success: bool,
    /// Healed code on success, the untouched input otherwise
    pub code: String,
    /// Tier-1 rules that changed the code, in application order
    pub applied: Vec<String>,
    pub tier: HealTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealOutcome {
    fn unchanged(code: &str) -> Self {
        Self {
            success: true,
            code: code.to_string(),
            applied: Vec::new(),
            tier: HealTier::None,
            error: None,
        }
    }

    fn failed(code: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            code: code.to_string(),
            applied: Vec::new(),
            tier: HealTier::None,
            error: Some(error.into()),
        }
    }

    /// Whether the code differs from what was submitted
    pub fn changed(&self) -> bool {
        self.tier != HealTier::None
    }

    pub fn into_phase_result(self) -> PhaseResult {
        let result = if self.success {
            PhaseResult::success(serde_json::json!({ "code": self.code }))
        } else {
            PhaseResult::failed(self.error.iter().cloned().collect())
                .with_payload(serde_json::json!({ "code": self.code }))
        };
        result
            .with_metadata("tier", self.tier)
            .with_metadata("applied", self.applied)
    }
}

/// Repairs generated scripts given the issues found in them
#[derive(Debug, Clone)]
pub struct SelfHealer {
    rules: Arc<RuleTable>,
    config: HealingConfig,
    oracle: Option<RepairOracle>,
    syntax: SyntaxChecker,
}

impl Default for SelfHealer {
    fn default() -> Self {
        Self::new(RuleTable::builtin(), HealingConfig::default())
    }
}

impl SelfHealer {
    pub fn new(rules: Arc<RuleTable>, config: HealingConfig) -> Self {
        Self {
            rules,
            config,
            oracle: None,
            syntax: SyntaxChecker::new(),
        }
    }

    /// Enable tier-2 repair
    pub fn with_oracle(mut self, oracle: RepairOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn config(&self) -> &HealingConfig {
        &self.config
    }

    /// Heal `code` against `issues`
    ///
    /// An empty issue list returns the code unchanged.
    pub async fn heal(&self, code: &str, issues: &[Issue], prompt: &str) -> HealOutcome {
        if issues.is_empty() {
            return HealOutcome::unchanged(code);
        }

        let (rewritten, applied) = self.tier_one(code, issues, prompt);
        if rewritten != code {
            return self.finish(code, rewritten, applied, HealTier::Deterministic);
        }

        let Some(oracle) = &self.oracle else {
            debug!(issues = issues.len(), "no tier-1 rule applied and no repair oracle");
            return HealOutcome::failed(code, "no repair rule applied");
        };
        match oracle.repair(code, issues, &self.config).await {
            Some(repaired) if repaired != code => {
                self.finish(code, repaired, Vec::new(), HealTier::Generative)
            }
            _ => HealOutcome::failed(code, "no repair rule applied"),
        }
    }

    /// Tier 1 only, without the oracle
    pub fn heal_deterministic(&self, code: &str, issues: &[Issue], prompt: &str) -> HealOutcome {
        if issues.is_empty() {
            return HealOutcome::unchanged(code);
        }
        let (rewritten, applied) = self.tier_one(code, issues, prompt);
        if rewritten == code {
            return HealOutcome::failed(code, "no repair rule applied");
        }
        self.finish(code, rewritten, applied, HealTier::Deterministic)
    }

    /// Strip imports outside the allow-list; run on every script before execution
    pub fn cleanup(&self, code: &str) -> String {
        let cleaned = strip_disallowed_imports(code, &self.config);
        if cleaned != code {
            info!("removed disallowed imports before execution");
        }
        cleaned
    }

    fn tier_one(&self, code: &str, issues: &[Issue], prompt: &str) -> (String, Vec<String>) {
        let ctx = RewriteContext {
            prompt,
            rules: &self.rules,
            config: &self.config,
        };
        let (rewritten, applied) = apply_rules(code, issues, &ctx);
        if rewritten == code {
            return (rewritten, Vec::new());
        }
        let normalized = normalize_indentation(&substitute_characters(&rewritten));
        (normalized, applied.into_iter().map(String::from).collect())
    }

    fn finish(&self, original: &str, healed: String, applied: Vec<String>, tier: HealTier) -> HealOutcome {
        let report = self.syntax.check(&healed);
        if let Some(error) = report.first_error() {
            warn!(?tier, %error, "healed code does not parse, keeping original");
            return HealOutcome::failed(original, error);
        }
        info!(?tier, rules = ?applied, "healed code");
        HealOutcome {
            success: true,
            code: healed,
            applied,
            tier,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sculpt_core::{OracleRequest, Result, TextOracle};
    use sculpt_validation::Critic;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        reply: String,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TextOracle for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _request: &OracleRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn defects(code: &str, prompt: &str) -> Vec<Issue> {
        Critic::default()
            .critique(code, prompt)
            .into_iter()
            .map(Issue::from)
            .collect()
    }

    #[tokio::test]
    async fn test_empty_issues_is_identity() {
        let code = "import cadquery as cq\nresult = cq.Workplane(\"XY\").box(1, 1, 1)\n";
        let outcome = SelfHealer::default().heal(code, &[], "a box").await;
        assert!(outcome.success);
        assert_eq!(outcome.code, code);
        assert!(!outcome.changed());
    }

    #[tokio::test]
    async fn test_torus_rebuilt_from_sphere() {
        let prompt = "Create a torus major radius 50 mm minor radius 8 mm";
        let code = "import cadquery as cq\n\nresult = cq.Workplane(\"XY\").sphere(8)\n\ncq.exporters.export(result, \"torus.stl\")\n";
        let issues = defects(code, prompt);
        assert!(!issues.is_empty());

        let outcome = SelfHealer::default().heal(code, &issues, prompt).await;
        assert!(outcome.success);
        assert_eq!(outcome.tier, HealTier::Deterministic);
        assert_eq!(outcome.applied, vec!["rebuild_shape"]);
        assert!(outcome.code.contains(".moveTo(50, 0)"));
        assert!(outcome.code.contains(".circle(8)"));
        assert!(outcome.code.contains(".revolve(360, (0, 0, 0), (0, 1, 0))"));
        assert!(!outcome.code.contains(".sphere("));
        assert!(outcome.code.ends_with("cq.exporters.export(result, \"torus.stl\")\n"));
        assert!(Critic::default().critique(&outcome.code, prompt).is_empty());
    }

    #[tokio::test]
    async fn test_cylinder_rebuilt_from_box() {
        let prompt = "Create a cylinder radius 25 height 50";
        let code = "import cadquery as cq\nresult = cq.Workplane(\"XY\").box(50, 50, 50)\n";
        let issues = defects(code, prompt);
        let outcome = SelfHealer::default().heal(code, &issues, prompt).await;
        assert!(outcome.success);
        assert_eq!(
            outcome.code,
            "import cadquery as cq\nresult = cq.Workplane(\"XY\").circle(25).extrude(50)\n"
        );
        assert!(Critic::default().critique(&outcome.code, prompt).is_empty());
    }

    #[tokio::test]
    async fn test_table_legs_moved_to_corners() {
        let prompt = "Create a four-legged table with a 120 x 80 mm top, 75 mm tall";
        let code = r#"import cadquery as cq
top = cq.Workplane("XY").box(120, 80, 5).translate((0, 0, 72.5))
legs = cq.Workplane("XY").pushPoints([(2, 2), (-2, 2), (2, -2), (-2, -2)]).rect(5, 5).extrude(70)
result = top.union(legs)
"#;
        let issues = defects(code, prompt);
        let outcome = SelfHealer::default().heal(code, &issues, prompt).await;
        assert!(outcome.success);
        assert!(outcome
            .code
            .contains("pushPoints([(55, 35), (-55, 35), (55, -35), (-55, -35)])"));
        assert!(outcome.code.contains(".translate((0, 0, 72.5))"));
        assert!(Critic::default().critique(&outcome.code, prompt).is_empty());
    }

    #[tokio::test]
    async fn test_glass_negative_extrude() {
        let prompt = "A drinking glass 70 mm wide, 100 mm tall";
        let code = "import cadquery as cq\nresult = cq.Workplane(\"XY\").circle(35).extrude(100).faces(\">Z\").workplane().circle(32.5).extrude(-92)\n";
        let issues = defects(code, prompt);
        let outcome = SelfHealer::default().heal(code, &issues, prompt).await;
        assert!(outcome.success);
        assert!(outcome.code.contains(".cutBlind(-92)"));
        assert!(outcome.code.contains(".extrude(100)"));
        assert!(Critic::default().critique(&outcome.code, prompt).is_empty());
    }

    #[tokio::test]
    async fn test_vase_gets_shell() {
        let prompt = "a vase with wall thickness 3";
        let code = "import cadquery as cq\nresult = cq.Workplane(\"XY\").circle(30).workplane(offset=100).circle(20).loft()\ncq.exporters.export(result, \"vase.stl\")\n";
        let issues = defects(code, prompt);
        let outcome = SelfHealer::default().heal(code, &issues, prompt).await;
        assert!(outcome.success);
        assert!(outcome
            .code
            .contains("result = result.faces(\">Z\").shell(-3)\ncq.exporters.export"));
        assert!(Critic::default().critique(&outcome.code, prompt).is_empty());
    }

    #[tokio::test]
    async fn test_rehealing_is_noop() {
        let prompt = "Create a torus major radius 50 mm minor radius 8 mm";
        let code = "import cadquery as cq\nresult = cq.Workplane(\"XY\").sphere(8)\n";
        let issues = defects(code, prompt);
        let healer = SelfHealer::default();
        let first = healer.heal_deterministic(code, &issues, prompt);
        let second = healer.heal_deterministic(&first.code, &issues, prompt);
        assert!(!second.changed());
        assert_eq!(second.code, first.code);
    }

    #[test]
    fn test_tier_one_is_deterministic() {
        let prompt = "A helical spring";
        let code = "import cadquery as cq\npath = cq.Wire.makeHelix(pitch=8, height=80, radius=20)\nresult = cq.Workplane(\"XY\").circle(1.5).sweep(path, isFrenet=True)\n";
        let issues = defects(code, prompt);
        let healer = SelfHealer::default();
        let runs: Vec<HealOutcome> = (0..3)
            .map(|_| healer.heal_deterministic(code, &issues, prompt))
            .collect();
        assert!(runs[0].success);
        assert!(runs.iter().all(|r| r == &runs[0]));
    }

    #[tokio::test]
    async fn test_tier_two_only_when_tier_one_idle() {
        let oracle = Scripted::new("```python\nimport cadquery as cq\nresult = cq.Workplane(\"XY\").box(2, 2, 2)\n```");
        let healer = SelfHealer::default().with_oracle(RepairOracle::new(oracle.clone()));

        let code = "import cadquery as cq\nresult = cq.Workplane(\"XY\").box(1, 1, 1).fillet(5)\n";
        let issue = Issue::execution("StdFail_NotDone: BRep_API: command not done");
        let outcome = healer.heal(code, &[issue], "a box").await;
        assert_eq!(outcome.tier, HealTier::Generative);
        assert!(outcome.code.contains("box(2, 2, 2)"));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);

        let cube = "import cadquery as cq\nresult = cq.Workplane(\"XY\").cube(5)\n";
        let issue = Issue::execution("AttributeError: 'Workplane' object has no attribute 'cube'");
        let outcome = healer.heal(cube, &[issue], "a cube").await;
        assert_eq!(outcome.tier, HealTier::Deterministic);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unparseable_repair_returns_original() {
        let oracle = Scripted::new("```python\nresult = cq.Workplane(\"XY\").box(1, 1\n```");
        let healer = SelfHealer::default().with_oracle(RepairOracle::new(oracle));
        let code = "import cadquery as cq\nresult = cq.Workplane(\"XY\").box(1, 1, 1)\n";
        let outcome = healer
            .heal(code, &[Issue::execution("RuntimeError: boom")], "a box")
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.code, code);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_successful_output_parses() {
        let prompt = "Create a cylinder radius 25 height 50";
        let code = "import cadquery as cq\nresult = cq.Workplane(\"XY\").box(50, 50, 50)\n";
        let outcome = SelfHealer::default()
            .heal(code, &defects(code, prompt), prompt)
            .await;
        assert!(outcome.success);
        assert!(SyntaxChecker::new().check(&outcome.code).is_valid());
    }

    #[test]
    fn test_cleanup_strips_imports() {
        let healer = SelfHealer::default();
        let code = "import cadquery as cq\nimport subprocess\nresult = 1\n";
        assert_eq!(healer.cleanup(code), "import cadquery as cq\nresult = 1\n");
    }

    #[test]
    fn test_phase_result() {
        let outcome = SelfHealer::default().heal_deterministic(
            "result = 1\n",
            &[Issue::execution("RuntimeError: boom")],
            "",
        );
        let result = outcome.into_phase_result();
        assert!(!result.is_success());
        assert_eq!(result.errors, vec!["no repair rule applied".to_string()]);
    }
}
