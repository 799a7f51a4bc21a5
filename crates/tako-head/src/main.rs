//! `tako` command line: run and inspect workflow files.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tako_core::Settings;
use tako_head::{init_tracing, Head, Plan, Workflow};

#[derive(Parser)]
#[command(name = "tako")]
#[command(version, about = "Run image-processing workflows through headless ImageJ arms")]
struct Cli {
    /// Settings file (YAML); TAKO_* variables override it
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow file
    Run {
        workflow: PathBuf,
        /// Resolve every task without executing
        #[arg(long)]
        dry_run: bool,
        /// Write the run report here instead of stdout
        #[arg(long)]
        report: Option<PathBuf>,
        /// Write the monitoring log as JSON lines
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Validate a workflow file and print its plan
    Plan {
        workflow: PathBuf,
        /// Print a Graphviz graph instead of JSON
        #[arg(long)]
        dot: bool,
    },
    /// List arms and their algorithms
    Arms,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    }
    .apply_env()?;
    init_tracing(&settings.log);

    match cli.command {
        Commands::Run {
            workflow,
            dry_run,
            report,
            log,
        } => run(settings, &workflow, dry_run, report.as_deref(), log.as_deref()).await,
        Commands::Plan { workflow, dot } => {
            let plan = Plan::build(load(&workflow)?)?;
            if dot {
                print!("{}", plan.to_dot());
            } else {
                println!("{}", serde_json::to_string_pretty(&plan.view())?);
            }
            Ok(())
        }
        Commands::Arms => {
            for info in tako_arms::catalog() {
                println!("{} (output suffix _{})", info.arm, info.suffix);
                for algorithm in info.algorithms {
                    let params = if algorithm.params.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", algorithm.params.join(", "))
                    };
                    println!("  {:<12}{}{}", algorithm.name, algorithm.description, params);
                }
            }
            Ok(())
        }
    }
}

fn load(path: &Path) -> Result<Workflow> {
    Workflow::from_file(path).with_context(|| format!("cannot load workflow {}", path.display()))
}

async fn run(
    settings: Settings,
    workflow: &Path,
    dry_run: bool,
    report_path: Option<&Path>,
    log_path: Option<&Path>,
) -> Result<()> {
    let head = Head::new(settings)?;
    let workflow = load(workflow)?;
    let submission = if dry_run {
        head.dry_run(workflow).await
    } else {
        head.submit(workflow).await
    };

    if let Some(path) = log_path {
        std::fs::write(path, submission.log.to_jsonl())
            .with_context(|| format!("cannot write log {}", path.display()))?;
    }

    let report = submission
        .outcome
        .with_context(|| format!("run {} of '{}' failed", submission.run_id, submission.workflow))?;
    let json = serde_json::to_string_pretty(&report)?;

    match report_path {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("cannot write report {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}
