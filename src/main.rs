//! `gitgoap` CLI — observe a repository, plan a path to a declared goal
//! state, and drive it one atomic action at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use gitgoap::config::Config;
use gitgoap::executor::{self, Executor};
use gitgoap::logging::{self, LogFormat};
use gitgoap::observer;
use gitgoap::planner;
use goap_git::facade::SubprocessFacade;

/// Observes a git repository, A*-searches a path to a declared goal state,
/// and drives it one action at a time, replanning on drift.
#[derive(Parser)]
#[command(name = "gitgoap")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full perceive-plan-act loop until the goal is reached
    Run(CommonArgs),

    /// Observe once, compute a plan, and print it without executing anything
    Plan(CommonArgs),

    /// Observe once and print the resulting repository state
    Observe(CommonArgs),

    /// Verify the git binary is present and at least 2.40
    Doctor(CommonArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// Path to the repository to operate on
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Path to the config file
    #[arg(long, default_value = ".gitgoap.toml")]
    config: PathBuf,

    /// Suppress every mutating subprocess call, journaling it instead
    #[arg(long)]
    dry_run: bool,

    /// Output format for the final report
    #[arg(long, value_enum, default_value = "pretty")]
    format: LogFormat,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = match &cli.command {
        Commands::Run(a) | Commands::Plan(a) | Commands::Observe(a) | Commands::Doctor(a) => a.format,
    };
    logging::init(format);

    let exit_code = match cli.command {
        Commands::Run(args) => run_loop(&args)?,
        Commands::Plan(args) => print_plan(&args)?,
        Commands::Observe(args) => print_observation(&args)?,
        Commands::Doctor(args) => run_doctor(&args)?,
    };

    std::process::exit(exit_code);
}

fn load_config(args: &CommonArgs) -> Result<Config> {
    let mut config = Config::load_or_default(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;
    if args.dry_run {
        config.safety.dry_run = true;
    }
    Ok(config)
}

fn repo_root(args: &CommonArgs) -> Result<PathBuf> {
    executor::canonical_repo_root(&args.repo)
        .with_context(|| format!("resolving repository path {}", args.repo.display()))
}

fn run_loop(args: &CommonArgs) -> Result<i32> {
    let config = load_config(args)?;
    let root = repo_root(args)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("installing SIGINT handler")?;

    let mut executor = Executor::new();
    let report = executor.execute(&root, &config, &cancel);

    if config.safety.dry_run {
        for command in executor.journal() {
            tracing::info!(dry_run_command = %command, "recorded");
        }
    }

    print_report(&report, args.format);
    Ok(report.exit_code())
}

fn print_report(report: &gitgoap::ExecutionReport, format: LogFormat) {
    match format {
        LogFormat::Json => {
            for record in &report.records {
                match serde_json::to_string(record) {
                    Ok(line) => println!("{line}"),
                    Err(err) => eprintln!("failed to serialize report record: {err}"),
                }
            }
        }
        LogFormat::Pretty => {
            for record in &report.records {
                let action = record.action.as_deref().unwrap_or("-");
                println!("[{:?}] {action}: {}", record.level, record.message);
            }
            println!("terminal: {:?} (replans: {})", report.terminal, report.replan_count);
        }
    }
}

fn print_plan(args: &CommonArgs) -> Result<i32> {
    let config = load_config(args)?;
    let root = repo_root(args)?;
    let mut facade = SubprocessFacade::new();
    let state = observer::observe(&mut facade, &root, &config)?;

    match planner::plan(&state, &config.goal, &config) {
        Ok(plan) => {
            print_plan_value(&plan, args.format);
            Ok(0)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(err.exit_code())
        }
    }
}

fn print_plan_value(plan: &gitgoap::Plan, format: LogFormat) {
    match format {
        LogFormat::Json => match serde_json::to_string(plan) {
            Ok(line) => println!("{line}"),
            Err(err) => eprintln!("failed to serialize plan: {err}"),
        },
        LogFormat::Pretty => {
            if plan.actions.is_empty() {
                println!("(goal already satisfied, no actions needed)");
                return;
            }
            for (i, step) in plan.actions.iter().enumerate() {
                println!("{}. {} (cost {:.2})", i + 1, step.name, step.cost);
            }
            println!("estimated total cost: {:.2}", plan.estimated_cost);
            for note in &plan.notes {
                println!("  note: {note}");
            }
        }
    }
}

fn print_observation(args: &CommonArgs) -> Result<i32> {
    let config = load_config(args)?;
    let root = repo_root(args)?;
    let mut facade = SubprocessFacade::new();
    let state = observer::observe(&mut facade, &root, &config)?;

    match args.format {
        LogFormat::Json => println!("{}", serde_json::to_string(&state)?),
        LogFormat::Pretty => {
            println!("branch: {:?}", state.current_ref.name);
            println!("working tree clean: {}", state.working_tree_clean);
            println!("conflicts: {}", state.conflicts.len());
            println!("ahead/behind: {}/{}", state.diverged_local, state.diverged_remote);
            println!("ongoing rebase/merge: {}/{}", state.ongoing_rebase, state.ongoing_merge);
            println!("risk level: {:?}", state.risk_level);
        }
    }
    Ok(0)
}

fn run_doctor(args: &CommonArgs) -> Result<i32> {
    let root = repo_root_best_effort(&args.repo);
    let mut facade = SubprocessFacade::new();

    match facade.check_environment(&root) {
        Ok(version) => {
            println!("[OK] git: {version}");
            Ok(0)
        }
        Err(err) => {
            println!("[FAIL] git: {err}");
            Ok(4)
        }
    }
}

fn repo_root_best_effort(path: &Path) -> PathBuf {
    executor::canonical_repo_root(path).unwrap_or_else(|_| path.to_path_buf())
}
