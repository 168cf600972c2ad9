mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use verdict_common::config::{KeyOrder, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(name = "verdict-cli")]
#[command(about = "Verdict CLI - Run and judge JavaScript solutions locally", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a source file and judge it against test cases
    Run {
        /// JavaScript source file
        #[arg(short, long)]
        code: PathBuf,

        /// JSON array of test cases ({ input, expectedOutput, id })
        #[arg(short, long)]
        tests: Option<PathBuf>,

        /// Per-invocation deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Map key order policy (sensitive or insensitive)
        #[arg(long)]
        key_order: Option<KeyOrder>,

        /// Engine config file (missing file means defaults)
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Print the raw response as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Show which function test cases would call
    Detect {
        /// JavaScript source file
        #[arg(short, long)]
        code: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            code,
            tests,
            timeout_ms,
            key_order,
            config,
            json,
        } => {
            let options = commands::RunOptions {
                code_path: code,
                tests_path: tests,
                config_path: config,
                timeout_ms,
                key_order,
                json,
            };
            let passed = commands::run_submission(&options).await?;
            if !passed {
                std::process::exit(1);
            }
        }
        Commands::Detect { code } => {
            commands::detect(&code)?;
        }
    }

    Ok(())
}
