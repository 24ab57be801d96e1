//! Pilot CLI - drive a browser with an LLM, one validated action at a time
//!
//! Usage:
//!   pilot init                  Write .pilot/config.toml and a PILOT.md template
//!   pilot run <command>         Carry out a command in the browser
//!   pilot context               Show the project context the oracle will see
//!   pilot check <file>          Validate a saved oracle reply

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pilot_agent::{AnthropicOracle, Model};
use pilot_browser::{BrowserConfig, BrowserSession};
use pilot_core::config::PILOT_DIR;
use pilot_core::{Action, PilotConfig};
use pilot_orchestrator::{
    format_context_for_prompt, ActionDecisionLoop, CancelFlag, LoopConfig, LoopReport,
    ProjectContextLoader,
};
use pilot_validation::{ActionValidator, ResponseValidator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const CONTEXT_TEMPLATE: &str = r#"# My Project

## Description
What this project is and which site or app Pilot works in.

## Goals
- What a successful command looks like

## Instructions
- Rules the oracle must follow on every step

## Custom Commands
- "open dashboard" → navigate to https://example.com/dashboard

## Preferences
- language: en
"#;

#[derive(Parser)]
#[command(name = "pilot")]
#[command(author, version, about = "LLM-driven browser automation")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize Pilot in the current directory
    Init {
        /// Project path (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },

    /// Carry out a command
    Run {
        /// What to do, or a custom command trigger from PILOT.md
        command: String,

        /// Maximum number of decide/execute steps
        #[arg(short = 'n', long)]
        max_steps: Option<usize>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<CliModel>,

        /// Do not append to .pilot/activity.md
        #[arg(long)]
        no_activity_log: bool,

        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the located context file and its prompt block
    Context {
        /// Directory to search upward from
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Validate a saved oracle reply
    Check {
        /// File containing the raw reply
        file: PathBuf,

        /// Check as a free-text reasoning reply instead of an action
        #[arg(long)]
        text: bool,
    },
}

/// CLI-friendly model enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliModel {
    Opus,
    Sonnet,
    Haiku,
}

impl From<CliModel> for Model {
    fn from(m: CliModel) -> Self {
        match m {
            CliModel::Opus => Model::Opus,
            CliModel::Sonnet => Model::Sonnet,
            CliModel::Haiku => Model::Haiku,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over --verbose
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Run {
            command,
            max_steps,
            headed,
            model,
            no_activity_log,
            json,
        } => cmd_run(command, max_steps, headed, model, no_activity_log, json).await,
        Commands::Context { dir } => cmd_context(&dir),
        Commands::Check { file, text } => cmd_check(&file, text),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing Pilot in {:?}", path);

    let created = init_project(path, force)?;
    if created.is_empty() {
        println!("Pilot is already initialized in {:?} (use --force to overwrite)", path);
        return Ok(());
    }

    println!("Initialized Pilot in {:?}", path);
    println!("Created:");
    for file in created {
        println!("  {}", file);
    }
    println!("\nNext steps:");
    println!("  1. Describe your project in PILOT.md");
    println!("  2. Export ANTHROPIC_API_KEY");
    println!("  3. Run 'pilot run \"<what to do>\"'");

    Ok(())
}

/// Write the default config and context template, returning what was written
fn init_project(path: &Path, force: bool) -> Result<Vec<&'static str>> {
    let mut created = Vec::new();

    let config_path = path.join(PILOT_DIR).join("config.toml");
    if force || !config_path.exists() {
        PilotConfig::write_default(path).context("Failed to write config")?;
        created.push(".pilot/config.toml");
    }

    let context_path = path.join("PILOT.md");
    if force || !context_path.exists() {
        std::fs::write(&context_path, CONTEXT_TEMPLATE).context("Failed to write PILOT.md")?;
        created.push("PILOT.md");
    }

    Ok(created)
}

async fn cmd_run(
    command: String,
    max_steps: Option<usize>,
    headed: bool,
    model: Option<CliModel>,
    no_activity_log: bool,
    json: bool,
) -> Result<()> {
    let root = std::env::current_dir().context("Failed to read current directory")?;
    let config = PilotConfig::load_or_default(&root)?;

    let mut loop_config = LoopConfig::from(&config.loop_defaults);
    if let Some(max_steps) = max_steps {
        loop_config.max_steps = max_steps;
    }

    let oracle = match model {
        Some(model) => AnthropicOracle::new(model.into())
            .with_max_tokens(config.models.max_tokens)
            .with_api_key_env(&config.models.api_key_env),
        None => AnthropicOracle::from_config(&config.models)?,
    };

    let mut browser_config = BrowserConfig::from(&config.browser);
    if headed {
        browser_config.headless = false;
    }
    let session = Arc::new(
        BrowserSession::launch_with_config(browser_config)
            .await
            .context("Failed to launch browser")?,
    );

    let loader = ProjectContextLoader::new(config.context.file_names.clone());
    let context = loader.get_or_load(&root);

    let mut decision_loop =
        ActionDecisionLoop::new(Arc::new(oracle), session.clone(), session, loop_config)
            .with_project_context(context);
    if !no_activity_log {
        decision_loop = decision_loop.with_activity_logging(root.join(PILOT_DIR));
    }

    // Ctrl-C stops the command before its next decision
    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current action");
            on_interrupt.cancel();
        }
    });

    println!("Running: {}", command);
    println!("  Model: {}", decision_loop_model(model, &config));
    println!("  Max steps: {}", decision_loop.config().max_steps);
    println!();

    let report = decision_loop.run_with_cancel(&command, &cancel).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.is_done() {
        anyhow::bail!(
            "Command stopped: {}",
            report.diagnostic.as_deref().unwrap_or("unknown reason")
        );
    }
    Ok(())
}

fn decision_loop_model(model: Option<CliModel>, config: &PilotConfig) -> String {
    match model {
        Some(model) => Model::from(model).to_string(),
        None => config.models.default.clone(),
    }
}

fn print_report(report: &LoopReport) {
    println!();
    println!("Command finished: {}", report.state);
    if report.goal != report.command.trim() {
        println!("  Expanded to: {}", report.goal);
    }
    println!("  Steps: {}", report.steps);
    println!(
        "  Actions: {} executed, {} failed",
        report.history.len(),
        report.history.failure_count()
    );
    println!("  Stop reason: {}", report.stop_reason);
    if let Some(diagnostic) = &report.diagnostic {
        println!("  Diagnostic: {}", diagnostic);
    }
    println!("  Elapsed: {:.1}s", report.elapsed_ms as f64 / 1000.0);

    if !report.history.is_empty() {
        println!();
        for outcome in report.history.outcomes() {
            let status = if outcome.succeeded { "ok" } else { "FAILED" };
            println!(
                "  {:>3}. [{}] {}",
                outcome.attempted_at,
                status,
                outcome.action.summary()
            );
        }
    }
}

fn cmd_context(dir: &Path) -> Result<()> {
    let config = PilotConfig::load_or_default(dir)?;
    let loader = ProjectContextLoader::new(config.context.file_names.clone());

    let Some(path) = loader.find_context_file(dir) else {
        println!(
            "No project context file found (looked for {:?})",
            config.context.file_names
        );
        return Ok(());
    };

    let context = loader
        .load_context(&path)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    println!("Context file: {}", path.display());
    println!();
    print!("{}", format_context_for_prompt(Some(&context)));
    Ok(())
}

/// Outcome of running a saved reply through the validators
#[derive(Debug)]
enum Verdict {
    ValidText(usize),
    ValidAction(Action),
    Invalid { stage: &'static str, reason: String },
}

fn check_reply(raw: &str, as_text: bool) -> Verdict {
    if as_text {
        return match ResponseValidator::default().validate_text(raw).into_result() {
            Ok(text) => Verdict::ValidText(text.trim().chars().count()),
            Err(reason) => Verdict::Invalid {
                stage: "text",
                reason,
            },
        };
    }

    let value = match ResponseValidator::default().validate_json(raw).into_result() {
        Ok(value) => value,
        Err(reason) => {
            return Verdict::Invalid {
                stage: "json",
                reason,
            }
        }
    };

    match ActionValidator::new().validate_action(&value).into_result() {
        Ok(action) => Verdict::ValidAction(action),
        Err(reason) => Verdict::Invalid {
            stage: "action",
            reason,
        },
    }
}

fn cmd_check(file: &Path, as_text: bool) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    match check_reply(&raw, as_text) {
        Verdict::ValidText(chars) => {
            println!("✓ Valid reasoning reply ({} chars)", chars);
            Ok(())
        }
        Verdict::ValidAction(action) => {
            println!("✓ Valid action: {}", action.summary());
            Ok(())
        }
        Verdict::Invalid { stage, reason } => {
            println!("✗ Rejected at {} stage: {}", stage, reason);
            anyhow::bail!("{} is not a valid oracle reply", file.display())
        }
    }
}
