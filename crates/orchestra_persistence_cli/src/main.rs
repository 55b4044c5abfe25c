//! Command line entry point for schema lifecycle and context inspection.
//!
//! # Responsibility
//! - Apply or revert the persistence schema on a database file.
//! - Print stored contexts as JSON for operators.

use clap::{Parser, Subcommand};
use orchestra_persistence::db::migrations::{current_version, downgrade, latest_version, upgrade};
use orchestra_persistence::{default_log_level, init_logging, Context, Crud, Engine, EngineConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "orchestra-persistence", version, about)]
struct Cli {
    /// SQLite database file.
    #[arg(long)]
    db: PathBuf,

    /// Log level (trace|debug|info|warn|error).
    #[arg(long)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files. Logging is off when unset.
    #[arg(long)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply every pending schema revision.
    Upgrade,
    /// Revert every applied schema revision.
    Downgrade,
    /// Print applied and latest schema revisions.
    Version,
    /// Print every context as one JSON object per line.
    Contexts,
    /// Print one context with its nodes.
    Assemble { name: String },
    /// Delete one context row; its nodes are kept.
    DeleteContext { name: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        if let Err(err) = init_logging(level, log_dir) {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    }

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let engine = Engine::open(EngineConfig::file(&cli.db))?;

    match &cli.command {
        Command::Upgrade => upgrade(&engine)?,
        Command::Downgrade => downgrade(&engine)?,
        Command::Version => {
            println!(
                "current={} latest={}",
                current_version(&engine)?,
                latest_version()
            );
        }
        Command::Contexts => {
            for context in Context::list(&engine)? {
                println!("{}", context.jsonify());
            }
        }
        Command::Assemble { name } => match Context::assemble(name, &engine)? {
            Some(assembled) => {
                println!("{}", serde_json::to_string_pretty(&assembled.jsonify())?);
            }
            None => {
                eprintln!("context not found: {name}");
                return Ok(ExitCode::FAILURE);
            }
        },
        Command::DeleteContext { name } => {
            let Some(context) = Context::find(&engine, name)? else {
                eprintln!("context not found: {name}");
                return Ok(ExitCode::FAILURE);
            };
            context.delete(&engine)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
