//! Chain-of-thought generation: architect, planner, synthesizer
//!
//! Used for prompts the analyst cannot map to a template. Each stage asks the
//! oracle for structured output and substitutes a 50 mm box when the oracle is
//! down, slow, or answers with something unusable.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use sculpt_core::{
    with_fallback, Architect, ConstructionPlan, DesignAnalysis, OracleRequest, Planner, PlanStep,
    Result, SculptError, Synthesizer, TextOracle,
};
use sculpt_heal::normalize::ensure_import;
use sculpt_heal::rewrite::{binds_result, export_offset, insert_before_export, RESULT};
use sculpt_heal::snippets::CADQUERY_IMPORT;
use sculpt_heal::{export_block, extract_code, Primitive};
use sculpt_validation::chain::top_level_statements;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const OUTPUT_NAME: &str = "generated";
const FALLBACK_SIZE: f64 = 50.0;

const ARCHITECT_SYSTEM: &str = r#"You are an expert CAD architect. Your role is to analyze user requests for 3D shapes and reason about how to construct them.

Think step by step:
1. What is the user asking for?
2. What are the basic geometric primitives needed? (box, cylinder, sphere, cone, torus, etc.)
3. What operations are needed? (extrude, revolve, loft, sweep, fillet, chamfer, boolean ops, etc.)
4. What's the construction sequence?
5. What parameters are important?

Output your analysis in this JSON format:
{
  "description": "Brief description of the shape",
  "primitives_needed": ["primitive1", "primitive2"],
  "operations_sequence": ["step1", "step2", "step3"],
  "parameters": {"param1": value1, "param2": value2},
  "complexity": "simple|medium|complex",
  "reasoning": "Your step-by-step reasoning"
}"#;

const PLANNER_SYSTEM: &str = r#"You are a CAD construction planner. Given an architectural analysis, create a detailed step-by-step construction plan for CadQuery.

Each step should specify:
- operation: The CadQuery operation to perform
- parameters: The parameters for that operation
- description: What this step does

CadQuery operations available:
- Workplane(plane): Create a workplane (XY, XZ, YZ)
- box(length, width, height): Create a box
- circle(radius): Create a circle
- rect(width, height): Create a rectangle
- extrude(distance): Extrude 2D to 3D
- revolve(angle): Revolve around axis
- fillet(radius): Round edges
- chamfer(distance): Chamfer edges
- union(): Boolean union
- cut(): Boolean subtraction
- intersect(): Boolean intersection
- translate(x, y, z): Move shape
- rotate(axis, angle): Rotate shape
- polarArray(radius, count): Circular pattern

Output JSON format:
{
  "steps": [
    {"operation": "Workplane", "parameters": {"plane": "XY"}, "description": "Create base plane"},
    {"operation": "box", "parameters": {"length": 50, "width": 50, "height": 50}, "description": "Create main body"}
  ],
  "variables": {"main_size": 50, "detail_size": 10},
  "constraints": ["All dimensions positive", "Feature size > 1mm"],
  "estimated_complexity": 3
}"#;

const SYNTHESIZER_SYSTEM: &str = r#"You are an expert CadQuery code generator. Generate clean, working CadQuery code based on the construction plan.

IMPORTANT RULES:
1. Start with: import cadquery as cq
2. Create the shape step by step following the plan
3. End with: result = <final_shape>
4. Use proper CadQuery syntax
5. Only import cadquery, math, numpy, pathlib or struct
6. Ensure all operations are chained correctly

Output ONLY the Python code, no explanations."#;

/// JSON object embedded in an oracle reply
///
/// Tries a ```json fence, then any fence, then the outermost braces.
pub fn extract_json<T: DeserializeOwned>(reply: &str) -> Result<T> {
    let fenced = fenced_block(reply, "```json").or_else(|| fenced_block(reply, "```"));
    let candidate = match fenced {
        Some(block) => block,
        None => {
            let start = reply.find('{');
            let end = reply.rfind('}');
            match (start, end) {
                (Some(s), Some(e)) if s < e => &reply[s..=e],
                _ => reply.trim(),
            }
        }
    };
    Ok(serde_json::from_str(candidate)?)
}

fn fenced_block<'a>(reply: &'a str, fence: &str) -> Option<&'a str> {
    let start = reply.find(fence)? + fence.len();
    let rest = &reply[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

/// Analysis used when the architect cannot answer
pub fn fallback_analysis(prompt: &str) -> DesignAnalysis {
    let parameters: BTreeMap<String, serde_json::Value> = ["width", "height", "depth"]
        .iter()
        .map(|k| (k.to_string(), json!(FALLBACK_SIZE)))
        .collect();
    DesignAnalysis {
        description: prompt.to_string(),
        primitives: vec!["box".to_string()],
        operation_sequence: vec!["create_workplane".to_string(), "create_box".to_string()],
        parameters,
        complexity: "simple".to_string(),
        reasoning: "Fallback analysis - creating basic box".to_string(),
    }
}

/// Plan used when the planner cannot answer
pub fn fallback_plan() -> ConstructionPlan {
    ConstructionPlan {
        steps: vec![
            PlanStep {
                operation: "Workplane".to_string(),
                parameters: BTreeMap::from([("plane".to_string(), json!("XY"))]),
                description: "Create base".to_string(),
            },
            PlanStep {
                operation: "box".to_string(),
                parameters: ["length", "width", "height"]
                    .iter()
                    .map(|k| (k.to_string(), json!(FALLBACK_SIZE)))
                    .collect(),
                description: "Create box".to_string(),
            },
        ],
        variables: BTreeMap::new(),
        constraints: Vec::new(),
        estimated_complexity: 1,
    }
}

/// Script used when the synthesizer cannot answer
pub fn fallback_code() -> String {
    Primitive::Box {
        width: FALLBACK_SIZE,
        depth: FALLBACK_SIZE,
        height: FALLBACK_SIZE,
    }
    .script(OUTPUT_NAME)
}

/// Oracle-backed architect
#[derive(Clone)]
pub struct OracleArchitect {
    oracle: Arc<dyn TextOracle>,
    timeout: Duration,
}

impl OracleArchitect {
    pub fn new(oracle: Arc<dyn TextOracle>) -> Self {
        Self {
            oracle,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn ask(&self, prompt: &str) -> Result<DesignAnalysis> {
        let request = OracleRequest::new(format!("Analyze this CAD request: {}", prompt))
            .with_system(ARCHITECT_SYSTEM)
            .with_temperature(0.7)
            .with_max_tokens(1000);
        let reply = self.oracle.generate(&request).await?;
        let mut analysis: DesignAnalysis = extract_json(&reply)?;
        if analysis.description.trim().is_empty() {
            analysis.description = prompt.to_string();
        }
        Ok(analysis)
    }
}

#[async_trait]
impl Architect for OracleArchitect {
    async fn analyze_design(&self, prompt: &str) -> Result<DesignAnalysis> {
        let analysis = with_fallback("architect", self.timeout, self.ask(prompt), || {
            fallback_analysis(prompt)
        })
        .await;
        info!(
            primitives = ?analysis.primitives,
            complexity = %analysis.complexity,
            "design analysed"
        );
        Ok(analysis)
    }
}

/// Oracle-backed planner
#[derive(Clone)]
pub struct OraclePlanner {
    oracle: Arc<dyn TextOracle>,
    timeout: Duration,
}

impl OraclePlanner {
    pub fn new(oracle: Arc<dyn TextOracle>) -> Self {
        Self {
            oracle,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn ask(&self, analysis: &DesignAnalysis, prompt: &str) -> Result<ConstructionPlan> {
        let request = OracleRequest::new(format!(
            "Create a construction plan for:\nDescription: {}\nPrimitives needed: {}\nOperations: {}\nParameters: {}\nOriginal prompt: {}\n",
            analysis.description,
            analysis.primitives.join(", "),
            analysis.operation_sequence.join(", "),
            serde_json::to_string(&analysis.parameters)?,
            prompt
        ))
        .with_system(PLANNER_SYSTEM)
        .with_temperature(0.5)
        .with_max_tokens(1500);
        let reply = self.oracle.generate(&request).await?;
        let plan: ConstructionPlan = extract_json(&reply)?;
        if plan.steps.is_empty() {
            return Err(SculptError::collaborator("planner", "plan has no steps"));
        }
        Ok(plan)
    }
}

#[async_trait]
impl Planner for OraclePlanner {
    async fn create_plan(
        &self,
        analysis: &DesignAnalysis,
        prompt: &str,
    ) -> Result<ConstructionPlan> {
        let plan = with_fallback("planner", self.timeout, self.ask(analysis, prompt), fallback_plan)
            .await;
        info!(steps = plan.steps.len(), "construction plan ready");
        Ok(plan)
    }
}

/// Oracle-backed code synthesizer
#[derive(Clone)]
pub struct OracleSynthesizer {
    oracle: Arc<dyn TextOracle>,
    timeout: Duration,
}

impl OracleSynthesizer {
    pub fn new(oracle: Arc<dyn TextOracle>) -> Self {
        Self {
            oracle,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn ask(&self, plan: &ConstructionPlan, analysis: &DesignAnalysis) -> Result<String> {
        let plan_text = serde_json::to_string_pretty(&json!({
            "steps": plan.steps,
            "variables": plan.variables,
            "constraints": plan.constraints,
        }))?;
        let request = OracleRequest::new(format!(
            "Generate CadQuery code for:\nDescription: {}\nPrimitives: {}\n\nConstruction Plan:\n{}\n\nGenerate the complete working CadQuery code.\n",
            analysis.description,
            analysis.primitives.join(", "),
            plan_text
        ))
        .with_system(SYNTHESIZER_SYSTEM)
        .with_temperature(0.3)
        .with_max_tokens(2000);
        let reply = self.oracle.generate(&request).await?;
        let code = extract_code(&reply)
            .ok_or_else(|| SculptError::collaborator("synthesizer", "reply contains no code"))?;
        finish_script(&code)
            .ok_or_else(|| SculptError::collaborator("synthesizer", "script binds no shape"))
    }
}

/// Import, `result` binding and export a synthesized script must carry
///
/// A script that binds nothing at top level is unusable.
pub fn finish_script(code: &str) -> Option<String> {
    let mut code = ensure_import(code, CADQUERY_IMPORT);
    if !binds_result(&code) {
        let last = top_level_statements(&code)
            .into_iter()
            .filter_map(|s| s.target)
            .last()?;
        warn!(variable = %last, "synthesized script has no result binding, aliasing last shape");
        code = insert_before_export(&code, &format!("{} = {}\n", RESULT, last));
    }
    if export_offset(&code).is_none() {
        if !code.ends_with('\n') {
            code.push('\n');
        }
        code.push_str(&export_block(OUTPUT_NAME));
    }
    Some(code)
}

#[async_trait]
impl Synthesizer for OracleSynthesizer {
    async fn synthesize(
        &self,
        plan: &ConstructionPlan,
        analysis: &DesignAnalysis,
    ) -> Result<String> {
        let code = with_fallback(
            "synthesizer",
            self.timeout,
            self.ask(plan, analysis),
            fallback_code,
        )
        .await;
        info!(lines = code.lines().count(), "code synthesized");
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(&'static str);

    #[async_trait]
    impl TextOracle for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _request: &OracleRequest) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Down;

    #[async_trait]
    impl TextOracle for Down {
        fn name(&self) -> &str {
            "down"
        }

        async fn generate(&self, _request: &OracleRequest) -> Result<String> {
            Err(SculptError::OracleUnavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn test_extract_json_variants() {
        let fenced = "Sure:\n```json\n{\"steps\": [], \"estimated_complexity\": 2}\n```";
        let plan: ConstructionPlan = extract_json(fenced).unwrap();
        assert_eq!(plan.estimated_complexity, 2);

        let bare = "Analysis follows {\"description\": \"a gear\", \"primitives_needed\": [\"cylinder\"]} done";
        let analysis: DesignAnalysis = extract_json(bare).unwrap();
        assert_eq!(analysis.description, "a gear");
        assert_eq!(analysis.primitives, vec!["cylinder".to_string()]);
        assert_eq!(analysis.complexity, "medium");

        assert!(extract_json::<DesignAnalysis>("no json here").is_err());
    }

    #[tokio::test]
    async fn test_architect_parses_reply() {
        let architect = OracleArchitect::new(Arc::new(Scripted(
            "```json\n{\"description\": \"gear\", \"primitives_needed\": [\"cylinder\"], \"operations_sequence\": [\"extrude\", \"polarArray\"], \"parameters\": {\"teeth\": 20}, \"complexity\": \"complex\", \"reasoning\": \"r\"}\n```",
        )));
        let analysis = architect.analyze_design("a gear with 20 teeth").await.unwrap();
        assert_eq!(analysis.description, "gear");
        assert_eq!(analysis.operation_sequence.len(), 2);
        assert_eq!(analysis.parameters["teeth"], json!(20));
    }

    #[tokio::test]
    async fn test_chain_falls_back_when_oracle_is_down() {
        let oracle: Arc<dyn TextOracle> = Arc::new(Down);
        let analysis = OracleArchitect::new(oracle.clone())
            .analyze_design("a gear")
            .await
            .unwrap();
        assert_eq!(analysis, fallback_analysis("a gear"));

        let plan = OraclePlanner::new(oracle.clone())
            .create_plan(&analysis, "a gear")
            .await
            .unwrap();
        assert_eq!(plan.estimated_complexity, 1);
        assert_eq!(plan.steps[1].operation, "box");

        let code = OracleSynthesizer::new(oracle)
            .synthesize(&plan, &analysis)
            .await
            .unwrap();
        assert_eq!(code, fallback_code());
        assert!(code.contains(".box(50, 50, 50)"));
    }

    #[tokio::test]
    async fn test_planner_rejects_prose() {
        let planner = OraclePlanner::new(Arc::new(Scripted("I would start with a box.")));
        let plan = planner
            .create_plan(&fallback_analysis("x"), "x")
            .await
            .unwrap();
        assert_eq!(plan, fallback_plan());
    }

    #[tokio::test]
    async fn test_synthesizer_completes_script() {
        let synthesizer = OracleSynthesizer::new(Arc::new(Scripted(
            "```python\nbody = cq.Workplane(\"XY\").circle(20).extrude(10)\n```",
        )));
        let code = synthesizer
            .synthesize(&fallback_plan(), &fallback_analysis("disc"))
            .await
            .unwrap();
        assert!(code.starts_with("import cadquery as cq\n"));
        assert!(code.contains("result = body\n"));
        assert!(code.ends_with("cq.exporters.export(result, \"generated.stl\")\n"));
    }

    #[test]
    fn test_finish_script_needs_a_binding() {
        assert!(finish_script("print('hello')\n").is_none());
        let done = finish_script("import cadquery as cq\nresult = cq.Workplane(\"XY\").box(1, 2, 3)\n")
            .unwrap();
        assert_eq!(done.matches("import cadquery as cq").count(), 1);
        assert!(done.contains("exporters.export"));
    }
}
