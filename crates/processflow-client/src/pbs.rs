use crate::error::ManagerError;
use crate::manager::{command_line, ResourceManager};
use crate::runner::CommandRunner;
use processflow_core::model::{ExternalJobId, JobInfo, ManagerKind};
use std::path::Path;

pub struct PbsManager {
    runner: Box<dyn CommandRunner>,
    user: String,
}

impl PbsManager {
    pub fn new(runner: Box<dyn CommandRunner>, user: impl Into<String>) -> Self {
        Self {
            runner,
            user: user.into(),
        }
    }

    fn qstat(&self, args: &[String]) -> Result<Vec<JobInfo>, ManagerError> {
        let command = command_line("qstat", args);
        let out = self.runner.run("qstat", args)?;
        if !out.success {
            return Err(ManagerError::CommandFailed {
                command,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(parse_qstat_full(&out.stdout))
    }
}

/// `qsub` prints `<digits>.<server>`.
pub fn parse_submission(stdout: &str) -> Option<ExternalJobId> {
    let digits: String = stdout
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Parses the block format of `qstat -f`.
pub fn parse_qstat_full(stdout: &str) -> Vec<JobInfo> {
    let mut jobs = Vec::new();
    let mut current: Option<JobInfo> = None;

    for line in stdout.lines() {
        if let Some(raw_id) = line.trim().strip_prefix("Job Id:") {
            if let Some(done) = current.take() {
                jobs.push(done);
            }
            current = parse_submission(raw_id).map(|job_id| JobInfo {
                job_id,
                name: String::new(),
                partition: String::new(),
                state: String::new(),
                runtime: String::new(),
                user: String::new(),
            });
            continue;
        }
        let (Some(info), Some((key, value))) = (current.as_mut(), line.split_once(" = ")) else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "Job_Name" => info.name = value,
            "queue" => info.partition = value,
            "job_state" => info.state = value,
            "resources_used.walltime" => info.runtime = value,
            "Job_Owner" => {
                info.user = value.split('@').next().unwrap_or_default().to_string();
            }
            _ => {}
        }
    }
    if let Some(done) = current {
        jobs.push(done);
    }
    jobs
}

impl ResourceManager for PbsManager {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Pbs
    }

    fn submit(&self, script: &Path) -> Result<ExternalJobId, ManagerError> {
        let args = vec![script.to_string_lossy().into_owned()];
        let out = self.runner.run("qsub", &args)?;
        if !out.success {
            return Err(ManagerError::Submission {
                manager: self.kind().to_string(),
                message: out.stderr.trim().to_string(),
            });
        }
        parse_submission(&out.stdout).ok_or_else(|| ManagerError::Parse {
            command: command_line("qsub", &args),
            output: out.stdout.clone(),
        })
    }

    fn query(&self, id: ExternalJobId) -> Result<JobInfo, ManagerError> {
        let args = vec!["-f".to_string(), "-x".to_string(), id.to_string()];
        match self.qstat(&args) {
            Ok(jobs) => jobs
                .into_iter()
                .find(|j| j.job_id == id)
                .ok_or(ManagerError::JobNotFound(id)),
            Err(ManagerError::CommandFailed { stderr, .. })
                if stderr.contains("Unknown Job Id") =>
            {
                Err(ManagerError::JobNotFound(id))
            }
            Err(e) => Err(e),
        }
    }

    fn list_queue(&self) -> Result<Vec<JobInfo>, ManagerError> {
        let jobs = self.qstat(&["-f".to_string()])?;
        Ok(jobs
            .into_iter()
            .filter(|j| self.user.is_empty() || j.user == self.user)
            .collect())
    }

    fn cancel(&self, id: ExternalJobId) -> Result<bool, ManagerError> {
        let args = vec![id.to_string()];
        let out = self.runner.run("qdel", &args)?;
        if out.success {
            return Ok(true);
        }
        if out.stderr.contains("Unknown Job Id") || out.stderr.contains("has finished") {
            return Ok(false);
        }
        Err(ManagerError::CommandFailed {
            command: command_line("qdel", &args),
            stderr: out.stderr.trim().to_string(),
        })
    }
}
