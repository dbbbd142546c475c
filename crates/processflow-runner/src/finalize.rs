use crate::notify::Notifier;
use crate::scheduler::RunReport;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets, Attribute, Cell, Color, Table};
use processflow_core::config::Config;
use processflow_core::layout::OutputLayout;
use processflow_core::model::JobStatus;

fn status_color(status: JobStatus) -> Color {
    match status {
        JobStatus::Completed => Color::Green,
        JobStatus::Failed | JobStatus::Cancelled => Color::Red,
        JobStatus::Running | JobStatus::Submitted | JobStatus::Pending => Color::Yellow,
        _ => Color::Grey,
    }
}

pub fn summary_table(report: &RunReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Case")
                .add_attribute(Attribute::Bold)
                .fg(Color::Cyan),
            Cell::new("Job")
                .add_attribute(Attribute::Bold)
                .fg(Color::Cyan),
            Cell::new("Status")
                .add_attribute(Attribute::Bold)
                .fg(Color::Cyan),
            Cell::new("Job ID")
                .add_attribute(Attribute::Bold)
                .fg(Color::Cyan),
        ]);
    for case in &report.cases {
        for job in &case.jobs {
            table.add_row(vec![
                Cell::new(&case.case),
                Cell::new(&job.description),
                Cell::new(job.status.to_string()).fg(status_color(job.status)),
                Cell::new(job.job_id.map(|id| id.to_string()).unwrap_or_default()),
            ]);
        }
    }
    table
}

/// Removes native-grid post-processing output for every case. Only the
/// regridded products are kept.
pub fn native_cleanup(config: &Config) -> usize {
    let layout = OutputLayout::new(config.output_root());
    let mut removed = 0;
    for case in config.simulations.cases.values() {
        let native = layout.grid_dir(&case.native_grid_name);
        if !native.exists() {
            continue;
        }
        match fs_err::remove_dir_all(&native) {
            Ok(()) => {
                tracing::info!("Removed native grid output {}", native.display());
                removed += 1;
            }
            Err(e) => tracing::warn!("Could not remove {}: {}", native.display(), e),
        }
    }
    removed
}

/// Reports the run to the operator and, when configured, by mail.
pub fn finalize(report: &RunReport, config: &Config, notifier: &dyn Notifier) {
    println!("{}", summary_table(report));

    if report.success() {
        if config.global.native_grid_cleanup {
            println!("{}", "Performing post run cleanup".green());
            native_cleanup(config);
        } else {
            tracing::info!("Leaving native grid files in place");
        }
        println!("{}", "All processing complete".green().bold());
    } else {
        println!(
            "{}",
            format!(
                "The run ended with {}. The following jobs did not complete:",
                report.outcome
            )
            .red()
        );
        for job in &report.failures {
            let reason = job.note.as_deref().unwrap_or("no further detail");
            println!("  {} ({}): {}", job.description, job.status, reason);
            tracing::error!("{} ended {}: {}", job.description, job.status, reason);
        }
    }

    if let Some(email) = &config.global.email {
        println!("Sending notification email to {}", email);
        if let Err(e) = notifier.notify(email, report) {
            tracing::warn!("Failed to send notification to {}: {}", email, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{CaseReport, JobSummary, RunOutcome};
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: RefCell<Vec<(String, bool)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, recipient: &str, report: &RunReport) -> std::io::Result<()> {
            self.sent
                .borrow_mut()
                .push((recipient.to_string(), report.success()));
            Ok(())
        }
    }

    fn config(project: &std::path::Path, cleanup: bool, email: bool) -> Config {
        let text = format!(
            r#"
[global]
project_path = "{}"
native_grid_cleanup = {}
{}

[simulations]
start_year = 1
end_year = 5

[simulations.cases.caseA]
native_grid_name = "ne30"
data_types = ["atm"]

[data_types.atm]
file_format = "CASEID.cam.h0.YEAR-MONTH.nc"
local_path = "PROJECT_PATH/input"
monthly = true

[post_processing.climo]
run_frequency = [5]
destination_grid_name = "fv129x256"
regrid_map_path = "/maps/m.nc"
"#,
            project.display(),
            cleanup,
            if email { r#"email = "ops@example.com""# } else { "" }
        );
        Config::from_toml_str(&text).unwrap()
    }

    fn report(outcome: RunOutcome) -> RunReport {
        let status = if outcome == RunOutcome::Success {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        let job = JobSummary {
            description: "climo-0001-0005-caseA".into(),
            status,
            job_id: None,
            note: None,
        };
        RunReport {
            outcome,
            failures: if status == JobStatus::Completed {
                vec![]
            } else {
                vec![job.clone()]
            },
            cases: vec![CaseReport {
                case: "caseA".into(),
                jobs: vec![job],
            }],
        }
    }

    #[test]
    fn test_cleanup_only_after_success() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), true, false);
        let native = tmp.path().join("output/pp/ne30/A/climo/5yr");
        let regrid = tmp.path().join("output/pp/fv129x256/A/climo/5yr");
        std::fs::create_dir_all(&native).unwrap();
        std::fs::create_dir_all(&regrid).unwrap();

        finalize(&report(RunOutcome::PartialFailure), &config, &RecordingNotifier::default());
        assert!(native.exists());

        finalize(&report(RunOutcome::Success), &config, &RecordingNotifier::default());
        assert!(!tmp.path().join("output/pp/ne30").exists());
        assert!(regrid.exists());
    }

    #[test]
    fn test_notifies_only_with_address() {
        let tmp = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::default();
        finalize(&report(RunOutcome::Success), &config(tmp.path(), false, false), &notifier);
        assert!(notifier.sent.borrow().is_empty());

        finalize(&report(RunOutcome::PartialFailure), &config(tmp.path(), false, true), &notifier);
        assert_eq!(
            notifier.sent.borrow().as_slice(),
            &[("ops@example.com".to_string(), false)]
        );
    }

    #[test]
    fn test_table_has_a_row_per_job() {
        let rendered = summary_table(&report(RunOutcome::Success)).to_string();
        assert!(rendered.contains("climo-0001-0005-caseA"));
        assert!(rendered.contains("COMPLETED"));
    }
}
