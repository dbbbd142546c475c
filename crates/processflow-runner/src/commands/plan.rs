use crate::case::{build_registry, plan_cases, Case};
use crate::cli::PlanArgs;
use crate::error::CliError;
use crate::jobs::Job;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets, Attribute, Cell, Color, Table};
use processflow_core::config::Config;
use processflow_core::model::JobStatus;
use processflow_core::registry::FileRegistry;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PlannedJob {
    pub case: String,
    pub job: String,
    pub depends_on: Vec<String>,
    pub status: JobStatus,
    pub detail: Option<String>,
}

/// Status a job would start the run with, worked out without side effects.
fn initial_status(job: &Job, registry: &dyn FileRegistry) -> (JobStatus, Option<String>) {
    if job.postvalidate() {
        return (JobStatus::Completed, Some("output already complete".into()));
    }
    match job.check_inputs(registry) {
        Ok(()) => (JobStatus::Valid, None),
        Err(e) if e.is_fatal() => (JobStatus::Failed, Some(e.to_string())),
        Err(e) => (JobStatus::Invalid, Some(e.to_string())),
    }
}

pub fn plan(cases: &[Case], registry: &dyn FileRegistry) -> Vec<PlannedJob> {
    cases
        .iter()
        .flat_map(|case| {
            case.jobs.iter().map(move |job| {
                let (status, detail) = initial_status(job, registry);
                PlannedJob {
                    case: case.name.clone(),
                    job: job.key().to_string(),
                    depends_on: job.depends_on().iter().map(|d| d.to_string()).collect(),
                    status,
                    detail,
                }
            })
        })
        .collect()
}

pub fn handle_plan(args: PlanArgs, config: &Config) -> Result<(), CliError> {
    let cases = plan_cases(config, false)?;
    let registry = build_registry(config, &cases)?;
    let planned = plan(&cases, &registry);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&planned)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(
            ["Case", "Job", "Depends On", "Status", "Detail"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(Color::Cyan)),
        );
    for job in &planned {
        let color = match job.status {
            JobStatus::Completed => Color::Green,
            JobStatus::Valid => Color::Yellow,
            JobStatus::Failed => Color::Red,
            _ => Color::Grey,
        };
        table.add_row(vec![
            Cell::new(&job.case),
            Cell::new(&job.job),
            Cell::new(job.depends_on.join("\n")),
            Cell::new(job.status.to_string()).fg(color),
            Cell::new(job.detail.as_deref().unwrap_or("")),
        ]);
    }
    println!("{}", table);

    let ready = planned
        .iter()
        .filter(|j| j.status == JobStatus::Valid)
        .count();
    println!(
        "{} jobs planned, {} ready to submit",
        planned.len().to_string().cyan(),
        ready.to_string().green()
    );
    Ok(())
}
