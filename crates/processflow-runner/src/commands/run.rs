use crate::case::{build_registry, plan_cases};
use crate::cli::RunArgs;
use crate::commands::build_manager;
use crate::error::CliError;
use crate::finalize::finalize;
use crate::notify::{MailNotifier, Notifier, NullNotifier};
use crate::scheduler::{RunManager, RunOptions};
use colored::Colorize;
use processflow_core::config::Config;
use processflow_core::layout::OutputLayout;
use std::sync::atomic::Ordering;
use std::time::Duration;

pub fn handle_run(args: RunArgs, config: &Config) -> Result<(), CliError> {
    let dryrun = args.dryrun || config.global.dryrun;
    let layout = OutputLayout::new(config.output_root());
    layout.ensure_writable()?;

    let cases = plan_cases(config, dryrun)?;
    let registry = build_registry(config, &cases)?;
    let manager = build_manager(config);

    let mut options = RunOptions::from_config(&config.scheduler);
    if let Some(n) = args.max_iterations {
        options.max_iterations = n;
    }
    if let Some(secs) = args.poll_interval {
        options.poll_interval = Duration::from_secs(secs);
    }

    let total: usize = cases.iter().map(|c| c.jobs.len()).sum();
    println!(
        "- Running {} jobs for {} cases with the '{}' resource manager{}",
        total.to_string().cyan(),
        cases.len().to_string().cyan(),
        manager.kind().to_string().cyan(),
        if dryrun { " (dry run)" } else { "" }
    );

    let mut run_manager = RunManager::new(
        cases,
        manager.as_ref(),
        Box::new(registry),
        layout,
        config.scheduler.clone(),
        config.resources.clone(),
    )
    .with_options(options);

    let interrupted = run_manager.interrupt_handle();
    let _ = ctrlc::set_handler(move || {
        interrupted.store(true, Ordering::SeqCst);
    });

    let report = run_manager.run();

    let notifier: Box<dyn Notifier> = if config.global.email.is_some() {
        Box::new(MailNotifier::new())
    } else {
        Box::new(NullNotifier)
    };
    finalize(&report, config, notifier.as_ref());

    if report.success() {
        Ok(())
    } else {
        Err(CliError::RunFailed {
            outcome: report.outcome,
        })
    }
}
