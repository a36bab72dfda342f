//! Pure state machine for the generation pipeline
//!
//! This module has NO I/O. It encodes the phase order, the branch between
//! template and generative code, and the bounds on every heal cycle:
//! - one heal and one re-check after a failed syntax check
//! - one heal and one re-critique after defects
//! - one heal and one re-execution after a retryable execution failure
//!
//! The orchestrator runs the [`Step`] named by each [`Action::Run`] and feeds
//! the outcome back as an [`Event`]. Invalid transitions go to `Failed`,
//! never panic.

use serde::{Deserialize, Serialize};

/// Pipeline state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum State {
    Idle,
    Analyzing,
    CheckingDesign { known_shape: bool },
    CheckingConstraints { known_shape: bool },
    Architecting,
    Planning,
    Synthesizing,
    Templating,
    /// `healed` marks the one re-check after a syntax heal
    CheckingSyntax { healed: bool },
    HealingSyntax,
    /// `healed` marks the one re-critique after a defect heal
    Critiquing { healed: bool },
    HealingDefects,
    /// `healed` marks the cleanup after an execution heal
    CleaningUp { healed: bool },
    /// `healed` marks the one re-execution after an execution heal
    Executing { healed: bool },
    Classifying,
    HealingExecution,
    Complete,
    Failed { error: String },
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed { .. })
    }
}

/// Outcomes reported by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Start,
    Analyzed { known_shape: bool },
    DesignChecked { passed: bool },
    ConstraintsChecked { passed: bool },
    DesignAnalyzed,
    PlanCreated,
    CodeGenerated,
    SyntaxChecked { valid: bool },
    Healed { success: bool },
    Critiqued { clean: bool },
    CleanedUp { valid: bool },
    Executed { success: bool },
    Classified { retry: bool },
    Error { message: String },
}

/// Units of work the orchestrator performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Analyze,
    ValidateDesign,
    ValidateConstraints,
    Architect,
    Plan,
    Synthesize,
    Template,
    CheckSyntax,
    HealSyntax,
    Critique,
    HealDefects,
    Cleanup,
    Execute,
    Classify,
    HealExecution,
}

impl Step {
    /// Phase name used in logs and the error log
    pub fn phase_name(self) -> &'static str {
        match self {
            Self::Analyze => "Analysis",
            Self::ValidateDesign => "Design Validation",
            Self::ValidateConstraints => "Constraint Validation",
            Self::Architect => "Architect",
            Self::Plan => "Planner",
            Self::Synthesize => "Synthesizer",
            Self::Template => "Code Generation (Template)",
            Self::CheckSyntax => "Syntax Validation",
            Self::HealSyntax => "Syntax Healing",
            Self::Critique => "Semantic Critique",
            Self::HealDefects => "Semantic Healing",
            Self::Cleanup => "Cleanup",
            Self::Execute => "Execution",
            Self::Classify => "Error Classification",
            Self::HealExecution => "Execution Healing",
        }
    }
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Report progress to the caller
    Progress { message: String, percent: u8 },
    /// Run a step and report its outcome
    Run { step: Step },
    /// Record a non-fatal problem
    Warn { message: String },
    /// Assemble the success result
    Finish,
    /// Assemble the failure result
    Abort { error: String },
}

fn progress(message: &str, percent: u8) -> Action {
    Action::Progress {
        message: message.to_string(),
        percent,
    }
}

fn run(step: Step) -> Action {
    Action::Run { step }
}

fn fail(error: impl Into<String>) -> (State, Vec<Action>) {
    let error = error.into();
    (
        State::Failed {
            error: error.clone(),
        },
        vec![Action::Abort { error }],
    )
}

fn check_syntax(healed: bool) -> (State, Vec<Action>) {
    let mut actions = Vec::new();
    if !healed {
        actions.push(progress("Validating syntax...", 60));
    }
    actions.push(run(Step::CheckSyntax));
    (State::CheckingSyntax { healed }, actions)
}

fn execute(healed: bool) -> (State, Vec<Action>) {
    let mut actions = Vec::new();
    if !healed {
        actions.push(progress("Executing and validating...", 80));
    }
    actions.push(run(Step::Execute));
    (State::Executing { healed }, actions)
}

/// Pure state transition function
///
/// Deterministic, no side effects, never panics.
pub fn transition(state: State, event: Event) -> (State, Vec<Action>) {
    match (state, event) {
        (State::Idle, Event::Start) => (
            State::Analyzing,
            vec![progress("Analyzing prompt...", 10), run(Step::Analyze)],
        ),

        (State::Analyzing, Event::Analyzed { known_shape }) => (
            State::CheckingDesign { known_shape },
            vec![
                progress("Validating design rules...", 20),
                run(Step::ValidateDesign),
            ],
        ),

        (State::CheckingDesign { known_shape }, Event::DesignChecked { passed }) => {
            let mut actions = Vec::new();
            if !passed {
                actions.push(Action::Warn {
                    message: "Design validation warnings, continuing".to_string(),
                });
            }
            actions.push(progress("Checking manufacturing constraints...", 30));
            actions.push(run(Step::ValidateConstraints));
            (State::CheckingConstraints { known_shape }, actions)
        }

        (State::CheckingConstraints { .. }, Event::ConstraintsChecked { passed: false }) => {
            fail("Constraint validation failed")
        }

        (State::CheckingConstraints { known_shape: true }, Event::ConstraintsChecked { .. }) => (
            State::Templating,
            vec![
                progress("Generating code from template...", 45),
                run(Step::Template),
            ],
        ),

        (State::CheckingConstraints { known_shape: false }, Event::ConstraintsChecked { .. }) => (
            State::Architecting,
            vec![
                progress("Architect analyzing design...", 40),
                run(Step::Architect),
            ],
        ),

        (State::Architecting, Event::DesignAnalyzed) => (
            State::Planning,
            vec![
                progress("Planner creating construction plan...", 50),
                run(Step::Plan),
            ],
        ),

        (State::Planning, Event::PlanCreated) => (
            State::Synthesizing,
            vec![
                progress("Synthesizer generating code...", 60),
                run(Step::Synthesize),
            ],
        ),

        (State::Synthesizing, Event::CodeGenerated) | (State::Templating, Event::CodeGenerated) => {
            check_syntax(false)
        }

        // Syntax: one heal, one re-check
        (State::CheckingSyntax { .. }, Event::SyntaxChecked { valid: true }) => (
            State::Critiquing { healed: false },
            vec![progress("Reviewing semantics...", 70), run(Step::Critique)],
        ),
        (State::CheckingSyntax { healed: false }, Event::SyntaxChecked { valid: false }) => (
            State::HealingSyntax,
            vec![progress("Self-healing code...", 65), run(Step::HealSyntax)],
        ),
        (State::CheckingSyntax { healed: true }, Event::SyntaxChecked { valid: false }) => {
            fail("Syntax validation failed after healing")
        }
        (State::HealingSyntax, Event::Healed { success: true }) => check_syntax(true),
        (State::HealingSyntax, Event::Healed { success: false }) => {
            fail("Syntax validation failed")
        }

        // Critique: one heal, one re-critique, then proceed regardless
        (State::Critiquing { healed: false }, Event::Critiqued { clean: false }) => (
            State::HealingDefects,
            vec![progress("Healing semantic defects...", 75), run(Step::HealDefects)],
        ),
        (State::Critiquing { healed }, Event::Critiqued { clean }) => {
            let mut actions = Vec::new();
            if healed && !clean {
                actions.push(Action::Warn {
                    message: "Defects remain after healing, continuing".to_string(),
                });
            }
            actions.push(run(Step::Cleanup));
            (State::CleaningUp { healed: false }, actions)
        }
        (State::HealingDefects, Event::Healed { .. }) => (
            State::Critiquing { healed: true },
            vec![run(Step::Critique)],
        ),

        (State::CleaningUp { healed }, Event::CleanedUp { valid: true }) => execute(healed),
        (State::CleaningUp { .. }, Event::CleanedUp { valid: false }) => {
            fail("Code does not parse after cleanup")
        }

        // Execution: classify, then at most one heal and one re-execution
        (State::Executing { .. }, Event::Executed { success: true }) => (
            State::Complete,
            vec![progress("Generation complete!", 100), Action::Finish],
        ),
        (State::Executing { healed: false }, Event::Executed { success: false }) => (
            State::Classifying,
            vec![run(Step::Classify)],
        ),
        (State::Executing { healed: true }, Event::Executed { success: false }) => {
            fail("Execution failed after healing")
        }
        (State::Classifying, Event::Classified { retry: true }) => (
            State::HealingExecution,
            vec![
                progress("Healing execution failure...", 90),
                run(Step::HealExecution),
            ],
        ),
        (State::Classifying, Event::Classified { retry: false }) => {
            fail("Execution failed")
        }
        (State::HealingExecution, Event::Healed { success: true }) => (
            State::CleaningUp { healed: true },
            vec![run(Step::Cleanup)],
        ),
        (State::HealingExecution, Event::Healed { success: false }) => {
            fail("Execution failed")
        }

        (state, Event::Error { message }) if !state.is_terminal() => fail(message),

        (State::Complete, event) => (
            State::Failed {
                error: format!("Invalid transition from Complete state on event: {:?}", event),
            },
            vec![],
        ),

        (State::Failed { error }, event) => (
            State::Failed {
                error: format!(
                    "Invalid transition from Failed state (error: {}) on event: {:?}",
                    error, event
                ),
            },
            vec![],
        ),

        (state, event) => fail(format!(
            "Invalid state transition: {:?} cannot handle event {:?}",
            state, event
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(actions: &[Action]) -> Vec<Step> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Run { step } => Some(*step),
                _ => None,
            })
            .collect()
    }

    fn percents(actions: &[Action]) -> Vec<u8> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect()
    }

    /// Drive the machine through `events`, collecting every action
    fn drive(events: Vec<Event>) -> (State, Vec<Action>) {
        let mut state = State::Idle;
        let mut all = Vec::new();
        for event in events {
            let (next, actions) = transition(state, event);
            state = next;
            all.extend(actions);
        }
        (state, all)
    }

    #[test]
    fn test_template_happy_path() {
        let (state, actions) = drive(vec![
            Event::Start,
            Event::Analyzed { known_shape: true },
            Event::DesignChecked { passed: true },
            Event::ConstraintsChecked { passed: true },
            Event::CodeGenerated,
            Event::SyntaxChecked { valid: true },
            Event::Critiqued { clean: true },
            Event::CleanedUp { valid: true },
            Event::Executed { success: true },
        ]);
        assert_eq!(state, State::Complete);
        assert_eq!(
            steps(&actions),
            vec![
                Step::Analyze,
                Step::ValidateDesign,
                Step::ValidateConstraints,
                Step::Template,
                Step::CheckSyntax,
                Step::Critique,
                Step::Cleanup,
                Step::Execute,
            ]
        );
        assert_eq!(percents(&actions), vec![10, 20, 30, 45, 60, 70, 80, 100]);
        assert_eq!(actions.last(), Some(&Action::Finish));
    }

    #[test]
    fn test_generative_path_with_every_heal() {
        let (state, actions) = drive(vec![
            Event::Start,
            Event::Analyzed { known_shape: false },
            Event::DesignChecked { passed: false },
            Event::ConstraintsChecked { passed: true },
            Event::DesignAnalyzed,
            Event::PlanCreated,
            Event::CodeGenerated,
            Event::SyntaxChecked { valid: false },
            Event::Healed { success: true },
            Event::SyntaxChecked { valid: true },
            Event::Critiqued { clean: false },
            Event::Healed { success: true },
            Event::Critiqued { clean: false },
            Event::CleanedUp { valid: true },
            Event::Executed { success: false },
            Event::Classified { retry: true },
            Event::Healed { success: true },
            Event::CleanedUp { valid: true },
            Event::Executed { success: true },
        ]);
        assert_eq!(state, State::Complete);
        let tail: Vec<Step> = steps(&actions).into_iter().rev().take(3).collect();
        assert_eq!(tail, vec![Step::Execute, Step::Cleanup, Step::HealExecution]);

        let percents = percents(&actions);
        assert_eq!(percents, vec![10, 20, 30, 40, 50, 60, 60, 65, 70, 75, 80, 90, 100]);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));

        let warnings = actions
            .iter()
            .filter(|a| matches!(a, Action::Warn { .. }))
            .count();
        assert_eq!(warnings, 2);
    }

    #[test]
    fn test_constraint_failure_is_fatal() {
        let (state, actions) = drive(vec![
            Event::Start,
            Event::Analyzed { known_shape: true },
            Event::DesignChecked { passed: true },
            Event::ConstraintsChecked { passed: false },
        ]);
        assert!(matches!(state, State::Failed { .. }));
        assert!(matches!(actions.last(), Some(Action::Abort { .. })));
    }

    #[test]
    fn test_syntax_recheck_is_bounded() {
        let (state, _) = transition(
            State::CheckingSyntax { healed: true },
            Event::SyntaxChecked { valid: false },
        );
        assert!(matches!(state, State::Failed { .. }));

        let (state, _) = transition(State::HealingSyntax, Event::Healed { success: false });
        assert!(matches!(state, State::Failed { .. }));
    }

    #[test]
    fn test_recritique_happens_once() {
        let (state, actions) = transition(
            State::Critiquing { healed: true },
            Event::Critiqued { clean: false },
        );
        assert_eq!(state, State::CleaningUp { healed: false });
        assert_eq!(steps(&actions), vec![Step::Cleanup]);

        // A failed heal still gets its single re-critique
        let (state, actions) = transition(State::HealingDefects, Event::Healed { success: false });
        assert_eq!(state, State::Critiquing { healed: true });
        assert_eq!(steps(&actions), vec![Step::Critique]);
    }

    #[test]
    fn test_execution_cycle_is_bounded() {
        let (state, _) = transition(
            State::Executing { healed: true },
            Event::Executed { success: false },
        );
        assert!(matches!(state, State::Failed { .. }));

        let (state, actions) = transition(State::Classifying, Event::Classified { retry: false });
        assert!(matches!(state, State::Failed { .. }));
        assert!(steps(&actions).is_empty());
    }

    #[test]
    fn test_execution_heal_is_cleaned_before_rerun() {
        let (state, actions) =
            transition(State::HealingExecution, Event::Healed { success: true });
        assert_eq!(state, State::CleaningUp { healed: true });
        assert_eq!(steps(&actions), vec![Step::Cleanup]);

        let (state, actions) = transition(state, Event::CleanedUp { valid: true });
        assert_eq!(state, State::Executing { healed: true });
        assert_eq!(steps(&actions), vec![Step::Execute]);
        assert!(percents(&actions).is_empty());

        let (state, _) = transition(
            State::CleaningUp { healed: true },
            Event::CleanedUp { valid: false },
        );
        assert!(matches!(state, State::Failed { .. }));
    }

    #[test]
    fn test_error_from_any_running_state() {
        let (state, actions) = transition(
            State::Planning,
            Event::Error {
                message: "planner crashed".to_string(),
            },
        );
        assert_eq!(
            state,
            State::Failed {
                error: "planner crashed".to_string()
            }
        );
        assert_eq!(
            actions,
            vec![Action::Abort {
                error: "planner crashed".to_string()
            }]
        );
    }

    #[test]
    fn test_invalid_transition_never_panics() {
        let (state, _) = transition(State::Idle, Event::Executed { success: true });
        assert!(matches!(state, State::Failed { .. }));

        let (state, _) = transition(State::Templating, Event::PlanCreated);
        assert!(matches!(state, State::Failed { .. }));
    }

    #[test]
    fn test_terminal_states_reject_all_events() {
        let (state, actions) = transition(State::Complete, Event::Start);
        assert!(matches!(state, State::Failed { .. }));
        assert!(actions.is_empty());

        let failed = State::Failed {
            error: "Original error".to_string(),
        };
        let (state, actions) = transition(
            failed,
            Event::Error {
                message: "Another error".to_string(),
            },
        );
        assert!(matches!(state, State::Failed { .. }));
        assert!(actions.is_empty());
    }
}
