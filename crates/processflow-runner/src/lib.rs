pub mod case;
pub mod cli;
pub mod commands;
pub mod error;
pub mod finalize;
pub mod jobs;
pub mod notify;
pub mod scheduler;

use crate::cli::{Cli, Commands};
use crate::error::CliError;

pub fn run(cli: Cli) -> Result<(), CliError> {
    let config = processflow_core::config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => commands::run::handle_run(args, &config),
        Commands::Plan(args) => commands::plan::handle_plan(args, &config),
        Commands::Queue(args) => commands::queue::handle_queue(args, &config),
        Commands::Cancel(args) => commands::cancel::handle_cancel(args, &config),
    }
}
