pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "recfm",
    about = "Retail recommender workflow CLI",
    long_about = "Prepare transaction data, train a factorization-machine model on the managed platform, register and deploy it, and score recommendations for a customer.",
    after_help = "Examples:\n  recfm prepare\n  recfm run --dry-run\n  recfm approve\n  recfm recommend --customer 17850 --count 5\n  recfm teardown"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Options shared by every command.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Config file (default: recfm.toml or config/recfm.toml)"
    )]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, help = "Use the in-process platform instead of the remote service")]
    pub dry_run: bool,
    #[arg(long, global = true, value_name = "DIR", help = "Override data.work_dir")]
    pub work_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH", help = "Override data.transactions_path")]
    pub transactions: Option<PathBuf>,
    #[arg(long, global = true, value_name = "URL", help = "Override platform.base_url")]
    pub base_url: Option<String>,
    #[arg(long, global = true, value_name = "NAME", help = "Override endpoint.name")]
    pub endpoint: Option<String>,
    #[arg(long, global = true, value_name = "LEVEL", help = "Override logging.level")]
    pub log_level: Option<String>,
}

/// Candidate pool and result size for scoring.
#[derive(Debug, Clone, Args)]
pub struct ScoringArgs {
    #[arg(long, default_value_t = 10, help = "Number of recommendations to return")]
    pub count: usize,
    #[arg(long, default_value_t = 100, help = "Number of most popular items to score")]
    pub pool: usize,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Clean transactions, fit the encoder and export train/test matrices")]
    Prepare,
    #[command(about = "Submit the training job and wait for it to finish")]
    Train,
    #[command(about = "Record lineage, write evaluation metrics and register the model package")]
    Register,
    #[command(about = "Approve the registered model package for deployment")]
    Approve,
    #[command(about = "Deploy the approved model package and wait until it is in service")]
    Deploy,
    #[command(about = "Rank the most popular items for one customer using the live endpoint")]
    Recommend {
        #[arg(long, help = "Customer identifier as it appears in the transactions file")]
        customer: String,
        #[command(flatten)]
        scoring: ScoringArgs,
    },
    #[command(
        about = "Run prepare, train, register and deploy in order (needs registry.auto_approve)"
    )]
    Run {
        #[arg(long, help = "Score this customer once the endpoint is in service")]
        customer: Option<String>,
        #[command(flatten)]
        scoring: ScoringArgs,
        #[arg(long, help = "Delete the endpoint after the run")]
        teardown: bool,
    },
    #[command(about = "Delete the deployed endpoint")]
    Teardown,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let global = &cli.global;

    let result = match cli.command {
        Command::Prepare => commands::prepare::run(global),
        Command::Train => commands::train::run(global),
        Command::Register => commands::register::run(global),
        Command::Approve => commands::approve::run(global),
        Command::Deploy => commands::deploy::run(global),
        Command::Recommend { customer, scoring } => {
            commands::recommend::run(global, &customer, &scoring)
        }
        Command::Run { customer, scoring, teardown } => {
            commands::pipeline::run(global, customer.as_deref(), &scoring, teardown)
        }
        Command::Teardown => commands::teardown::run(global),
        Command::Config => commands::config::run(global),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
