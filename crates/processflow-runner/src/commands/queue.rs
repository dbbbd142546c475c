use crate::cli::QueueArgs;
use crate::commands::build_manager;
use crate::error::CliError;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets, Attribute, Cell, Color, Table};
use processflow_core::config::Config;

pub fn handle_queue(args: QueueArgs, config: &Config) -> Result<(), CliError> {
    let manager = build_manager(config);
    let jobs = manager.list_queue()?;

    if args.json {
        for job in &jobs {
            println!("{}", job);
        }
        return Ok(());
    }

    if jobs.is_empty() {
        println!("No jobs in the {} queue.", manager.kind());
        return Ok(());
    }

    let map = manager.status_map();
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(
            ["Job ID", "Name", "Partition", "State", "Time", "Status"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(Color::Cyan)),
        );
    for job in &jobs {
        table.add_row(vec![
            Cell::new(job.job_id.to_string()).fg(Color::Yellow),
            Cell::new(&job.name),
            Cell::new(&job.partition),
            Cell::new(&job.state),
            Cell::new(&job.runtime),
            Cell::new(job.status(&map).to_string()),
        ]);
    }
    println!("{}", table);
    Ok(())
}
