use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};

#[derive(Debug, Parser)]
#[command(name = "archive-merger")]
#[command(version, about = "Merge several social-media data exports into one browsable archive")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Merge source archives into a fresh output archive
    Merge {
        /// Source archive directories, in any order
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        /// Output directory; must be empty or absent
        #[arg(short, long)]
        output: PathBuf,
        /// Merge into a non-empty output directory
        #[arg(long)]
        force: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Summarize one source archive without writing anything
    Inspect {
        source: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show resolved paths, effective configuration and unknown MERGE_* variables
    Config {
        #[arg(long)]
        json: bool,
    },
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let status = if report.ok { "ok" } else { "failed" };
    println!("{}: {status}", report.command);
    for detail in &report.details {
        println!("  {detail}");
    }
    if !report.issues.is_empty() {
        println!("issues:");
        for issue in &report.issues {
            println!("  - {issue}");
        }
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let (report, json) = match cli.command {
        Command::Merge {
            sources,
            output,
            force,
            json,
        } => {
            let opts = commands::merge::MergeCommandOptions {
                sources,
                output,
                force,
                quiet: json,
            };
            (commands::merge::run(&opts)?, json)
        }
        Command::Inspect { source, json } => {
            let opts = commands::inspect::InspectOptions { source };
            (commands::inspect::run(&opts)?, json)
        }
        Command::Config { json } => (commands::config::run()?, json),
    };

    print_report(&report, json)?;
    if !report.ok {
        std::process::exit(1);
    }
    Ok(())
}
