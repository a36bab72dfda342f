//! Sculpt CLI - text to CadQuery to STL
//!
//! Usage:
//!   sculpt init                          Write a default .sculpt/config.toml
//!   sculpt generate <prompt>             Run the full pipeline on one prompt
//!   sculpt critique <file> -p <prompt>   Report semantic defects in a script
//!   sculpt heal <file> -p <prompt>       Repair a script
//!   sculpt classify <error>...           Classify execution errors
//!   sculpt batch [prompts.json]          Run many prompts and write a report

mod batch;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sculpt_agent::{
    HeuristicOracle, KeywordAnalyst, OracleArchitect, OraclePlanner, OracleRoles,
    OracleSynthesizer, PrimitiveTemplates, PythonExecutor,
};
use sculpt_core::{Issue, SculptConfig, TextOracle, WorkflowOutcome};
use sculpt_heal::{RepairOracle, SelfHealer};
use sculpt_orchestrator::{Collaborators, Orchestrator, ProgressCallback};
use sculpt_validation::{Critic, ErrorHandler, RuleTable, SyntaxChecker};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "sculpt")]
#[command(author, version, about = "Generate, check and repair CadQuery scripts from text")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding .sculpt/config.toml
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration
    Init,

    /// Run the full pipeline on one prompt
    Generate {
        /// Shape description
        prompt: String,

        /// Use local heuristics instead of the oracle server
        #[arg(long)]
        offline: bool,

        /// Write the final script here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the workflow result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report syntax errors and semantic defects in a script
    Critique {
        /// CadQuery script
        file: PathBuf,

        /// Prompt the script was generated for
        #[arg(short, long)]
        prompt: String,

        /// Print the phase result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Repair a script against its defects and any given errors
    Heal {
        /// CadQuery script
        file: PathBuf,

        /// Prompt the script was generated for
        #[arg(short, long)]
        prompt: String,

        /// Execution error to repair against (repeatable)
        #[arg(short, long = "error")]
        errors: Vec<String>,

        /// Deterministic rules only
        #[arg(long)]
        offline: bool,

        /// Write the healed script here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Classify execution error messages
    Classify {
        /// Error messages
        #[arg(required = true)]
        errors: Vec<String>,
    },

    /// Run a list of prompts sequentially
    Batch {
        /// Prompt file; the built-in list is used when omitted or missing
        prompts: Option<PathBuf>,

        /// Where to write the JSON report
        #[arg(long, default_value = "batch_report.json")]
        report: PathBuf,

        /// Use local heuristics instead of the oracle server
        #[arg(long)]
        offline: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init => cmd_init(&cli.root),
        Commands::Generate {
            prompt,
            offline,
            output,
            json,
        } => cmd_generate(&cli.root, prompt, offline, output, json).await,
        Commands::Critique { file, prompt, json } => cmd_critique(&cli.root, file, prompt, json),
        Commands::Heal {
            file,
            prompt,
            errors,
            offline,
            output,
        } => cmd_heal(&cli.root, file, prompt, errors, offline, output).await,
        Commands::Classify { errors } => cmd_classify(errors),
        Commands::Batch {
            prompts,
            report,
            offline,
        } => cmd_batch(&cli.root, prompts, report, offline).await,
    }
}

fn load_config(root: &Path) -> Result<SculptConfig> {
    SculptConfig::load_or_default(root).context("Failed to load configuration")
}

/// Oracles for the architect, planner, synthesizer and repair roles
fn oracles(config: &SculptConfig, offline: bool) -> [Arc<dyn TextOracle>; 4] {
    if offline {
        let heuristic: Arc<dyn TextOracle> = Arc::new(HeuristicOracle::new());
        return [
            heuristic.clone(),
            heuristic.clone(),
            heuristic.clone(),
            heuristic,
        ];
    }
    let roles = OracleRoles::from_config(&config.oracle);
    [
        Arc::new(roles.architect),
        Arc::new(roles.planner),
        Arc::new(roles.synthesizer),
        Arc::new(roles.repair),
    ]
}

fn build_healer(config: &SculptConfig, rules: Arc<RuleTable>, repair: Option<Arc<dyn TextOracle>>) -> SelfHealer {
    let healer = SelfHealer::new(rules, config.healing.clone());
    match repair {
        Some(oracle) => healer.with_oracle(
            RepairOracle::new(oracle).with_timeout(config.pipeline.oracle_timeout()),
        ),
        None => healer,
    }
}

fn build_orchestrator(config: &SculptConfig, offline: bool) -> Result<Orchestrator> {
    let rules = RuleTable::load(config.rules_path.as_deref()).context("Failed to load rule table")?;
    let timeout = config.pipeline.oracle_timeout();
    let [architect, planner, synthesizer, repair] = oracles(config, offline);

    let collaborators = Collaborators {
        analyst: Arc::new(KeywordAnalyst::new(rules.clone())),
        templates: Arc::new(PrimitiveTemplates::default()),
        architect: Arc::new(OracleArchitect::new(architect).with_timeout(timeout)),
        planner: Arc::new(OraclePlanner::new(planner).with_timeout(timeout)),
        synthesizer: Arc::new(OracleSynthesizer::new(synthesizer).with_timeout(timeout)),
        executor: Arc::new(PythonExecutor::from_config(config)),
    };

    let repair = (!offline).then_some(repair);
    Ok(Orchestrator::from_config(config, collaborators)?
        .with_healer(build_healer(config, rules, repair)))
}

fn cmd_init(root: &Path) -> Result<()> {
    let path = SculptConfig::write_default(root).context("Failed to write configuration")?;
    println!("Created {}", path.display());
    Ok(())
}

async fn cmd_generate(
    root: &Path,
    prompt: String,
    offline: bool,
    output: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let config = load_config(root)?;
    let orchestrator = build_orchestrator(&config, offline)?;
    info!("Generating: {}", prompt);

    let progress: ProgressCallback =
        Arc::new(|message: &str, percent: u8| eprintln!("[{:>3}%] {}", percent, message));
    let outcome = orchestrator.run(&prompt, Some(progress)).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }

    match &outcome {
        WorkflowOutcome::Success(success) => {
            if let Some(path) = output {
                std::fs::write(&path, &success.code)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Script written to {}", path.display());
            } else if !json {
                println!("{}", success.code);
            }
            println!("STL: {}", success.artifact_reference);
            println!("Retries: {}", success.metadata.retry_count);
            Ok(())
        }
        WorkflowOutcome::Failure(failure) => {
            if !json {
                for error in &failure.errors {
                    eprintln!("  {}", error);
                }
            }
            anyhow::bail!(
                "Generation failed after {} retries",
                failure.metadata.retry_count
            )
        }
    }
}

fn read_script(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

fn cmd_critique(root: &Path, file: PathBuf, prompt: String, json: bool) -> Result<()> {
    let config = load_config(root)?;
    let rules = RuleTable::load(config.rules_path.as_deref())?;
    let code = read_script(&file)?;

    let syntax = SyntaxChecker::new().check(&code);
    let critic = Critic::new(rules).with_min_array_spacing(config.healing.min_array_spacing);
    let review = critic.review(&code, &prompt);

    if json {
        let report = serde_json::json!({
            "syntax": syntax.into_phase_result(),
            "critique": review,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Critique of {}", file.display());
    println!("==================");
    for error in &syntax.errors {
        println!("  syntax: {}", error);
    }
    for warning in &syntax.warnings {
        println!("  warning: {}", warning);
    }
    if review.is_success() {
        println!("  no semantic defects");
    } else {
        for defect in &review.errors {
            println!("  {}", defect);
        }
    }
    Ok(())
}

async fn cmd_heal(
    root: &Path,
    file: PathBuf,
    prompt: String,
    errors: Vec<String>,
    offline: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(root)?;
    let rules = RuleTable::load(config.rules_path.as_deref())?;
    let code = read_script(&file)?;

    let mut issues: Vec<Issue> = SyntaxChecker::new()
        .check(&code)
        .errors
        .iter()
        .map(|e| Issue::compile(e.to_string()))
        .collect();
    issues.extend(
        Critic::new(rules.clone())
            .with_min_array_spacing(config.healing.min_array_spacing)
            .critique(&code, &prompt)
            .into_iter()
            .map(Issue::from),
    );
    issues.extend(errors.into_iter().map(Issue::execution));

    if issues.is_empty() {
        println!("No issues found in {}", file.display());
        return Ok(());
    }
    for issue in &issues {
        info!("issue: {}", issue);
    }

    let [_, _, _, repair] = oracles(&config, offline);
    let healer = build_healer(&config, rules, (!offline).then_some(repair));
    let outcome = healer.heal(&code, &issues, &prompt).await;
    if !outcome.success {
        anyhow::bail!(
            "Healing failed: {}",
            outcome.error.as_deref().unwrap_or("no rule applied")
        );
    }

    let healed = healer.cleanup(&outcome.code);
    match output {
        Some(path) => {
            std::fs::write(&path, &healed)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Healed script written to {}", path.display());
        }
        None => print!("{}", healed),
    }
    if !outcome.applied.is_empty() {
        eprintln!("Applied: {}", outcome.applied.join(", "));
    }
    Ok(())
}

fn cmd_classify(errors: Vec<String>) -> Result<()> {
    let classification = ErrorHandler::new().classify(&errors);

    for error in &classification.errors {
        println!("{}", error);
        if let Some(action) = &error.recovery_action {
            println!("    -> {}", action);
        }
    }
    println!();
    println!("Retryable: {}", classification.should_retry());
    if let Some(severity) = classification.highest_severity() {
        println!("Highest severity: {}", severity);
    }
    Ok(())
}

async fn cmd_batch(root: &Path, prompts: Option<PathBuf>, report: PathBuf, offline: bool) -> Result<()> {
    let config = load_config(root)?;
    let prompts = batch::load_prompts(prompts.as_deref())?;
    if prompts.is_empty() {
        anyhow::bail!("No prompts to run");
    }

    let orchestrator = build_orchestrator(&config, offline)?;
    info!("Starting batch run with {} prompts", prompts.len());
    let summary = batch::run_batch(&orchestrator, &prompts).await;
    summary.write(&report)?;

    println!("Batch run summary");
    println!("=================");
    println!("Total prompts: {}", summary.total_prompts);
    println!("Successful:    {}", summary.successful);
    println!("Failed:        {}", summary.failed);
    for result in summary.results.iter().filter(|r| !r.success) {
        println!(
            "  [{}] {}: {}",
            result.index,
            result.prompt,
            result.errors.first().map(String::as_str).unwrap_or("unknown error")
        );
    }
    println!("Report written to {}", report.display());
    Ok(())
}
