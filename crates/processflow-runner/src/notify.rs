use crate::scheduler::RunReport;
use std::fmt::Write as _;
use std::io::Write as _;
use std::process::{Command, Stdio};

pub const SENDER: &str = "processflow@localhost";

pub trait Notifier {
    fn notify(&self, recipient: &str, report: &RunReport) -> std::io::Result<()>;
}

/// Plain-text body: a status line, then one block per case.
pub fn render_message(report: &RunReport) -> String {
    let mut msg = String::new();
    if report.success() {
        msg.push_str("Your processflow run has completed successfully\n");
    } else {
        let _ = writeln!(msg, "One or more processflow jobs failed ({})", report.outcome);
        msg.push_str("See the session log for additional details\n");
    }
    msg.push('\n');
    for case in &report.cases {
        let rule = "=".repeat(case.case.len() + 4);
        let _ = writeln!(msg, "{}\n # {} #\n{}\n", rule, case.case, rule);
        for job in &case.jobs {
            let _ = writeln!(msg, "\t > {}: {}", job.description, job.status);
        }
        msg.push('\n');
    }
    msg
}

pub fn subject(report: &RunReport) -> &'static str {
    if report.success() {
        "[processflow] run complete"
    } else {
        "[processflow] run failed"
    }
}

/// Hands the message to the local MTA via `sendmail -t`.
pub struct MailNotifier {
    program: String,
}

impl MailNotifier {
    pub fn new() -> Self {
        Self {
            program: "sendmail".to_string(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for MailNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for MailNotifier {
    fn notify(&self, recipient: &str, report: &RunReport) -> std::io::Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        processflow_core::logging::log_and_print_command(&cmd);

        let mut child = cmd.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            write!(
                stdin,
                "To: {}\nFrom: {}\nSubject: {}\n\n{}",
                recipient,
                SENDER,
                subject(report),
                render_message(report)
            )?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        tracing::info!("Sent notification to {}", recipient);
        Ok(())
    }
}

/// Used when no address is configured.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _recipient: &str, _report: &RunReport) -> std::io::Result<()> {
        Ok(())
    }
}
