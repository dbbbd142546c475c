use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "processflow",
    author,
    version,
    about = "Automated post-processing for climate model output.",
    long_about = "Plans climatology, time series, regridding and diagnostic jobs for each configured simulation, submits them to SLURM or PBS as their inputs appear, and reports the outcome."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short,
        long,
        global = true,
        help = "Path to the run configuration (defaults to $XDG_CONFIG_HOME/processflow/config.toml)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        global = true,
        help = "Increase verbosity level (-v for debug, -vv for trace)"
    )]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run every planned job to completion")]
    Run(RunArgs),

    #[command(about = "Show the planned jobs without submitting anything")]
    Plan(PlanArgs),

    #[command(about = "List the current user's jobs in the resource manager queue")]
    Queue(QueueArgs),

    #[command(about = "Cancel resource manager jobs by id")]
    Cancel(CancelArgs),
}

#[derive(Args)]
pub struct RunArgs {
    #[arg(long, help = "Write submission scripts without submitting them")]
    pub dryrun: bool,

    #[arg(long, help = "Stop after this many polling iterations")]
    pub max_iterations: Option<u64>,

    #[arg(long, help = "Seconds between polling passes")]
    pub poll_interval: Option<u64>,
}

#[derive(Args)]
pub struct PlanArgs {
    #[arg(long, help = "Print the plan as JSON")]
    pub json: bool,
}

#[derive(Args)]
pub struct QueueArgs {
    #[arg(long, help = "Print one JSON object per job")]
    pub json: bool,
}

#[derive(Args)]
pub struct CancelArgs {
    #[arg(required = true, help = "Resource manager job ids")]
    pub ids: Vec<u64>,
}
