use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use txprop::scenario::{Scenario, ScenarioRunner};
use txprop::{Propagation, TransactionalConfig, kinds};

#[derive(Parser)]
#[command(name = "txprop")]
#[command(about = "Replay transaction propagation scenarios against an in-memory manager")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a JSON scenario of nested units of work
    Run {
        #[arg(long)]
        scenario: PathBuf,
        /// Route attributes; every route uses REQUIRES without one
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List the propagation policies
    Policies,
    /// List the built-in failure kinds
    Kinds,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { scenario, config } => run(&scenario, config.as_deref()).await,
        Command::Policies => {
            for policy in Propagation::ALL {
                println!("{:<14} {}", policy, policy.description());
            }
            Ok(())
        }
        Command::Kinds => {
            for kind in kinds::all() {
                let lineage: Vec<_> = kind.lineage().map(|k| k.name()).collect();
                println!("{}", lineage.join(" < "));
            }
            Ok(())
        }
    }
}

async fn run(scenario_path: &std::path::Path, config_path: Option<&std::path::Path>) -> Result<()> {
    let config = match config_path {
        Some(path) => TransactionalConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => TransactionalConfig::default(),
    };
    let scenario = Scenario::from_file(scenario_path)
        .with_context(|| format!("failed to load scenario {}", scenario_path.display()))?;

    let runner = ScenarioRunner::new(config);
    let report = runner.run(&scenario).await?;

    for event in &report.events {
        println!("{}", event);
    }
    if let Some((txn, status)) = report.outer {
        println!("caller transaction {} is {}", txn, status);
    }
    if let Some(error) = &report.error {
        println!("scenario failed: {}", error);
    }
    println!(
        "{} committed, {} rolled back",
        report.committed().len(),
        report.rolled_back().len()
    );
    Ok(())
}
