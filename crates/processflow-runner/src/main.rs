use clap::Parser;
use colored::Colorize;
use processflow_runner::cli::Cli;

fn main() {
    let cli = Cli::parse();

    processflow_core::logging::set_log_level_from_env();
    processflow_core::logging::set_verbosity(cli.verbose);

    let logging_config = processflow_core::config::load_config(cli.config.as_deref())
        .map(|c| c.logging)
        .unwrap_or_default();
    if let Err(e) = processflow_core::logging::init_session_logger(&logging_config) {
        eprintln!(
            "{}",
            format!("[ERROR] Failed to initialize session logger: {}", e).red()
        );
        processflow_core::logging::init_stderr_logger();
    }

    if let Err(e) = processflow_runner::run(cli) {
        eprintln!("{}", format!("[ERROR] {}", e).red());
        std::process::exit(1);
    }
}
