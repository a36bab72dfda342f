//! The pipeline orchestrator
//!
//! Drives one workflow run through the pure state machine: every
//! [`Action::Run`] becomes a call into a collaborator or a local check, and
//! its outcome is fed back as the next [`Event`].

use std::sync::Arc;
use tracing::{error, info, warn};

use sculpt_core::{
    Analyst, Architect, ConstructionPlan, DesignAnalysis, Executor, Issue, PhaseResult, Planner,
    Result, SculptConfig, ShapeDescriptor, Synthesizer, TemplateGenerator, WorkflowOutcome,
    WorkflowRecord, DEFAULT_MAX_RETRIES,
};
use sculpt_heal::{HealOutcome, SelfHealer};
use sculpt_validation::{
    ConstraintValidator, Critic, DesignRuleValidator, ErrorHandler, RuleTable, SyntaxChecker,
};

use crate::progress::{ProgressCallback, ProgressReporter};
use crate::retry::{execute_bounded, execute_with_retry, RetryPolicy};
use crate::state_machine::{transition, Action, Event, State, Step};

/// External collaborators the pipeline calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub analyst: Arc<dyn Analyst>,
    pub templates: Arc<dyn TemplateGenerator>,
    pub architect: Arc<dyn Architect>,
    pub planner: Arc<dyn Planner>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub executor: Arc<dyn Executor>,
}

/// Per-run scratch state alongside the record
#[derive(Debug)]
struct RunContext {
    record: WorkflowRecord,
    progress: ProgressReporter,
    analysis: Option<DesignAnalysis>,
    plan: Option<ConstructionPlan>,
    issues: Vec<Issue>,
    execution_errors: Vec<String>,
    artifact: Option<String>,
}

/// Runs prompts through analysis, generation, checking, healing and execution
#[derive(Clone)]
pub struct Orchestrator {
    collaborators: Collaborators,
    critic: Critic,
    healer: SelfHealer,
    error_handler: ErrorHandler,
    design_rules: DesignRuleValidator,
    constraints: ConstraintValidator,
    syntax: SyntaxChecker,
    policy: RetryPolicy,
    max_retries: usize,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            critic: Critic::default(),
            healer: SelfHealer::default(),
            error_handler: ErrorHandler::new(),
            design_rules: DesignRuleValidator::new(),
            constraints: ConstraintValidator::new(),
            syntax: SyntaxChecker::new(),
            policy: RetryPolicy::default(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Orchestrator using the configured rule table, limits and retry policy
    ///
    /// The healer gets no repair oracle; attach one with [`Self::with_healer`].
    pub fn from_config(config: &SculptConfig, collaborators: Collaborators) -> Result<Self> {
        let rules = RuleTable::load(config.rules_path.as_deref())?;
        Ok(Self::new(collaborators)
            .with_critic(
                Critic::new(rules.clone()).with_min_array_spacing(config.healing.min_array_spacing),
            )
            .with_healer(SelfHealer::new(rules, config.healing.clone()))
            .with_retry_policy(RetryPolicy::from_config(&config.pipeline))
            .with_max_retries(config.pipeline.max_retries))
    }

    pub fn with_critic(mut self, critic: Critic) -> Self {
        self.critic = critic;
        self
    }

    pub fn with_healer(mut self, healer: SelfHealer) -> Self {
        self.healer = healer;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn healer(&self) -> &SelfHealer {
        &self.healer
    }

    /// Run one prompt to completion
    pub async fn run(&self, prompt: &str, progress: Option<ProgressCallback>) -> WorkflowOutcome {
        let mut ctx = RunContext {
            record: WorkflowRecord::new(prompt).with_max_retries(self.max_retries),
            progress: ProgressReporter::new(progress),
            analysis: None,
            plan: None,
            issues: Vec::new(),
            execution_errors: Vec::new(),
            artifact: None,
        };
        info!(run = %ctx.record.id, "starting workflow");

        let (mut state, mut actions) = transition(State::Idle, Event::Start);
        loop {
            let mut next = None;
            for action in actions {
                match action {
                    Action::Progress { message, percent } => ctx.progress.report(&message, percent),
                    Action::Warn { message } => warn!(run = %ctx.record.id, "{}", message),
                    Action::Run { step } => next = Some(self.run_step(step, &mut ctx).await),
                    Action::Finish => return self.finish(&ctx),
                    Action::Abort { error } => {
                        error!(run = %ctx.record.id, retries = ctx.record.retry_count, "workflow failed: {}", error);
                        return WorkflowOutcome::failure(&ctx.record, error);
                    }
                }
            }
            let Some(event) = next else {
                return WorkflowOutcome::failure(
                    &ctx.record,
                    format!("Pipeline stalled in state {:?}", state),
                );
            };
            (state, actions) = transition(state, event);
        }
    }

    fn finish(&self, ctx: &RunContext) -> WorkflowOutcome {
        match (ctx.record.executable_code(), &ctx.artifact) {
            (Some(code), Some(artifact)) => {
                info!(run = %ctx.record.id, artifact = %artifact, retries = ctx.record.retry_count, "workflow complete");
                WorkflowOutcome::success(&ctx.record, code.to_string(), artifact.clone())
            }
            _ => WorkflowOutcome::failure(&ctx.record, "Execution produced no artifact"),
        }
    }

    async fn run_step(&self, step: Step, ctx: &mut RunContext) -> Event {
        match step {
            Step::Analyze => self.analyze(ctx).await,
            Step::ValidateDesign => self.validate_design(ctx),
            Step::ValidateConstraints => self.validate_constraints(ctx),
            Step::Architect => self.architect(ctx).await,
            Step::Plan => self.plan(ctx).await,
            Step::Synthesize => self.synthesize(ctx).await,
            Step::Template => self.template(ctx).await,
            Step::CheckSyntax => self.check_syntax(ctx),
            Step::Critique => self.critique(ctx),
            Step::HealSyntax | Step::HealDefects | Step::HealExecution => {
                self.heal(step, ctx).await
            }
            Step::Cleanup => self.cleanup(ctx),
            Step::Execute => self.execute(ctx).await,
            Step::Classify => self.classify(ctx),
        }
    }

    async fn analyze(&self, ctx: &mut RunContext) -> Event {
        let analyst = &self.collaborators.analyst;
        let prompt = ctx.record.prompt().to_string();
        let result = execute_with_retry(
            &mut ctx.record,
            Step::Analyze.phase_name(),
            &self.policy,
            |_| analyst.analyze(&prompt),
        )
        .await;

        let Some(descriptor) = result
            .is_success()
            .then(|| result.payload_as::<ShapeDescriptor>())
            .flatten()
        else {
            return Event::Error {
                message: "Analysis failed".to_string(),
            };
        };

        let known_shape =
            !descriptor.is_unknown() && self.collaborators.templates.supports(&descriptor.shape_type);
        info!(shape = %descriptor.shape_type, known_shape, "prompt analysed");
        ctx.record.shape_descriptor = Some(descriptor);
        ctx.record.add_report(Step::Analyze.phase_name(), result);
        Event::Analyzed { known_shape }
    }

    fn descriptor(ctx: &RunContext) -> ShapeDescriptor {
        ctx.record
            .shape_descriptor
            .clone()
            .unwrap_or_else(ShapeDescriptor::unknown)
    }

    fn validate_design(&self, ctx: &mut RunContext) -> Event {
        let result = self.design_rules.validate(&Self::descriptor(ctx));
        let passed = result.is_success();
        if !passed {
            warn!(errors = ?result.errors, "design rule violations");
        }
        ctx.record.add_report(Step::ValidateDesign.phase_name(), result);
        Event::DesignChecked { passed }
    }

    fn validate_constraints(&self, ctx: &mut RunContext) -> Event {
        let result = self.constraints.validate(&Self::descriptor(ctx));
        let passed = result.is_success();
        if !passed {
            for message in &result.errors {
                ctx.record
                    .log_error(Step::ValidateConstraints.phase_name(), message.clone(), 1);
            }
        }
        ctx.record
            .add_report(Step::ValidateConstraints.phase_name(), result);
        Event::ConstraintsChecked { passed }
    }

    async fn architect(&self, ctx: &mut RunContext) -> Event {
        let architect = &self.collaborators.architect;
        let prompt = ctx.record.prompt().to_string();
        let result = execute_with_retry(
            &mut ctx.record,
            Step::Architect.phase_name(),
            &self.policy,
            |_| architect.analyze_design(&prompt),
        )
        .await;
        match result.payload_as::<DesignAnalysis>().filter(|_| result.is_success()) {
            Some(analysis) => {
                info!(complexity = %analysis.complexity, "architect: {}", analysis.description);
                ctx.record.add_report(Step::Architect.phase_name(), result);
                ctx.analysis = Some(analysis);
                Event::DesignAnalyzed
            }
            None => Event::Error {
                message: format!("Architect analysis failed: {}", result.errors.join("; ")),
            },
        }
    }

    async fn plan(&self, ctx: &mut RunContext) -> Event {
        let Some(analysis) = ctx.analysis.clone() else {
            return Event::Error {
                message: "Planning failed: no design analysis".to_string(),
            };
        };
        let planner = &self.collaborators.planner;
        let prompt = ctx.record.prompt().to_string();
        let result = execute_with_retry(
            &mut ctx.record,
            Step::Plan.phase_name(),
            &self.policy,
            |_| planner.create_plan(&analysis, &prompt),
        )
        .await;
        match result.payload_as::<ConstructionPlan>().filter(|_| result.is_success()) {
            Some(plan) => {
                info!(steps = plan.steps.len(), complexity = plan.estimated_complexity, "plan ready");
                ctx.record.add_report(Step::Plan.phase_name(), result);
                ctx.plan = Some(plan);
                Event::PlanCreated
            }
            None => Event::Error {
                message: format!("Planning failed: {}", result.errors.join("; ")),
            },
        }
    }

    async fn synthesize(&self, ctx: &mut RunContext) -> Event {
        let (Some(analysis), Some(plan)) = (ctx.analysis.clone(), ctx.plan.clone()) else {
            return Event::Error {
                message: "Code synthesis failed: no construction plan".to_string(),
            };
        };
        let synthesizer = &self.collaborators.synthesizer;
        let result = execute_with_retry(
            &mut ctx.record,
            Step::Synthesize.phase_name(),
            &self.policy,
            |_| synthesizer.synthesize(&plan, &analysis),
        )
        .await;
        self.accept_code(ctx, Step::Synthesize, result, "Code synthesis failed")
    }

    async fn template(&self, ctx: &mut RunContext) -> Event {
        let descriptor = Self::descriptor(ctx);
        let templates = &self.collaborators.templates;
        let result = execute_with_retry(
            &mut ctx.record,
            Step::Template.phase_name(),
            &self.policy,
            |_| {
                let code = templates.generate(&descriptor);
                async move { code }
            },
        )
        .await;
        self.accept_code(ctx, Step::Template, result, "Code generation failed")
    }

    fn accept_code(
        &self,
        ctx: &mut RunContext,
        step: Step,
        result: PhaseResult,
        failure: &str,
    ) -> Event {
        match result.payload_as::<String>().filter(|_| result.is_success()) {
            Some(code) => {
                ctx.record.replace_code(code);
                ctx.record.add_report(step.phase_name(), result);
                Event::CodeGenerated
            }
            None => Event::Error {
                message: format!("{}: {}", failure, result.errors.join("; ")),
            },
        }
    }

    /// Check the current code and record the verdict on the record
    fn verify_syntax(&self, ctx: &mut RunContext) -> PhaseResult {
        let report = self.syntax.check(ctx.record.code());
        ctx.record.record_syntax_check(report.is_valid());
        ctx.issues = report
            .errors
            .iter()
            .map(|e| Issue::compile(e.to_string()))
            .collect();
        report.into_phase_result()
    }

    fn check_syntax(&self, ctx: &mut RunContext) -> Event {
        let result = self.verify_syntax(ctx);
        let valid = result.is_success();
        if !valid {
            for message in &result.errors {
                ctx.record
                    .log_error(Step::CheckSyntax.phase_name(), message.clone(), 1);
            }
        }
        ctx.record.add_report(Step::CheckSyntax.phase_name(), result);
        Event::SyntaxChecked { valid }
    }

    fn critique(&self, ctx: &mut RunContext) -> Event {
        let defects = self.critic.critique(ctx.record.code(), ctx.record.prompt());
        let result = if defects.is_empty() {
            PhaseResult::success(serde_json::json!({ "defects": [] }))
        } else {
            PhaseResult::failed(defects.iter().map(ToString::to_string).collect())
                .with_payload(&defects)
        };
        info!(defects = defects.len(), "critique complete");
        ctx.record.add_report(Step::Critique.phase_name(), result);

        let clean = defects.is_empty();
        ctx.issues = defects.into_iter().map(Issue::from).collect();
        Event::Critiqued { clean }
    }

    async fn heal(&self, step: Step, ctx: &mut RunContext) -> Event {
        let issues = match step {
            Step::HealExecution => ctx
                .execution_errors
                .iter()
                .map(|e| Issue::execution(e.clone()))
                .collect(),
            _ => std::mem::take(&mut ctx.issues),
        };
        let outcome = self
            .healer
            .heal(ctx.record.code(), &issues, ctx.record.prompt())
            .await;
        let success = self.apply_heal(step, ctx, outcome);
        Event::Healed { success }
    }

    /// Adopt healed code; returns whether the code changed and still parses
    fn apply_heal(&self, step: Step, ctx: &mut RunContext, outcome: HealOutcome) -> bool {
        let phase = step.phase_name();
        if !outcome.success {
            let message = outcome
                .error
                .clone()
                .unwrap_or_else(|| "healing failed".to_string());
            ctx.record.log_error(phase, message, 1);
            ctx.record.add_report(phase, outcome.into_phase_result());
            return false;
        }
        let changed = outcome.changed();
        ctx.record.replace_code(outcome.code.clone());
        ctx.record.add_report(phase, outcome.into_phase_result());
        changed && self.verify_syntax(ctx).is_success()
    }

    fn cleanup(&self, ctx: &mut RunContext) -> Event {
        let cleaned = self.healer.cleanup(ctx.record.code());
        ctx.record.replace_code(cleaned);
        let result = self.verify_syntax(ctx);
        let valid = result.is_success();
        ctx.record.add_report(Step::Cleanup.phase_name(), result);
        Event::CleanedUp { valid }
    }

    async fn execute(&self, ctx: &mut RunContext) -> Event {
        let Some(code) = ctx.record.executable_code().map(str::to_string) else {
            return Event::Error {
                message: "Refusing to execute code without a passing syntax check".to_string(),
            };
        };
        let executor = &self.collaborators.executor;
        let retrying = !ctx.execution_errors.is_empty();
        let (phase, attempts) = if retrying {
            ("Execution (Retry)", 1)
        } else {
            (Step::Execute.phase_name(), ctx.record.max_retries)
        };
        let result = execute_bounded(&mut ctx.record, phase, &self.policy, attempts, |_| {
            executor.execute(&code)
        })
        .await;

        let success = result.is_success();
        if success {
            ctx.artifact = result
                .payload
                .get("artifact_reference")
                .and_then(|v| v.as_str())
                .map(str::to_string);
        } else {
            ctx.execution_errors = result.errors.clone();
        }
        ctx.record.add_report(phase, result);
        Event::Executed { success }
    }

    fn classify(&self, ctx: &mut RunContext) -> Event {
        let classification = self.error_handler.classify(&ctx.execution_errors);
        let retry = classification.should_retry();
        for classified in &classification.errors {
            info!(
                category = %classified.category,
                severity = %classified.severity,
                can_retry = classified.can_retry,
                "execution failure classified"
            );
        }
        ctx.record.add_report(
            Step::Classify.phase_name(),
            classification.into_phase_result(),
        );
        Event::Classified { retry }
    }
}
