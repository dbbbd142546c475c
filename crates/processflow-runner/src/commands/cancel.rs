use crate::cli::CancelArgs;
use crate::commands::build_manager;
use crate::error::CliError;
use colored::Colorize;
use processflow_core::config::Config;
use processflow_core::model::ExternalJobId;

/// Cancels each id in turn. Every id is attempted; the first failure is
/// returned afterwards.
pub fn handle_cancel(args: CancelArgs, config: &Config) -> Result<(), CliError> {
    let manager = build_manager(config);
    let mut first_error = None;

    for raw in args.ids {
        let id = ExternalJobId(raw);
        match manager.cancel(id) {
            Ok(true) => println!("{} job {}", "Cancelled".green(), id),
            Ok(false) => println!("Job {} had already finished", id),
            Err(e) => {
                eprintln!("{}", format!("Failed to cancel job {}: {}", id, e).red());
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
