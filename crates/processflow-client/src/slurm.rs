use crate::error::ManagerError;
use crate::manager::{command_line, ResourceManager};
use crate::runner::{CommandOutput, CommandRunner};
use processflow_core::model::{ExternalJobId, JobInfo, ManagerKind};
use std::path::Path;

const SQUEUE_FORMAT: &str = "%i|%j|%P|%t|%M|%u";
const SACCT_FORMAT: &str = "JobID,JobName,Partition,State,Elapsed,User";

pub struct SlurmManager {
    runner: Box<dyn CommandRunner>,
    user: String,
}

impl SlurmManager {
    pub fn new(runner: Box<dyn CommandRunner>, user: impl Into<String>) -> Self {
        Self {
            runner,
            user: user.into(),
        }
    }

    fn run(&self, program: &str, args: &[String]) -> Result<(String, CommandOutput), ManagerError> {
        let command = command_line(program, args);
        let output = self.runner.run(program, args)?;
        Ok((command, output))
    }

    fn squeue(&self, id: ExternalJobId) -> Result<Option<JobInfo>, ManagerError> {
        let args = vec![
            "-h".to_string(),
            "-j".to_string(),
            id.to_string(),
            "-o".to_string(),
            SQUEUE_FORMAT.to_string(),
        ];
        let (command, out) = self.run("squeue", &args)?;
        if !out.success {
            // squeue rejects ids that already left the queue.
            if out.stderr.contains("Invalid job id") {
                return Ok(None);
            }
            return Err(ManagerError::CommandFailed {
                command,
                stderr: out.stderr.trim().to_string(),
            });
        }
        find_job(&command, &out.stdout, id)
    }

    fn sacct(&self, id: ExternalJobId) -> Result<Option<JobInfo>, ManagerError> {
        let args = vec![
            "-n".to_string(),
            "-P".to_string(),
            "-X".to_string(),
            "-j".to_string(),
            id.to_string(),
            format!("--format={}", SACCT_FORMAT),
        ];
        let (command, out) = self.run("sacct", &args)?;
        if !out.success {
            return Err(ManagerError::CommandFailed {
                command,
                stderr: out.stderr.trim().to_string(),
            });
        }
        find_job(&command, &out.stdout, id)
    }
}

fn find_job(
    command: &str,
    stdout: &str,
    id: ExternalJobId,
) -> Result<Option<JobInfo>, ManagerError> {
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let info = parse_job_line(line).ok_or_else(|| ManagerError::Parse {
            command: command.to_string(),
            output: line.to_string(),
        })?;
        if info.job_id == id {
            return Ok(Some(info));
        }
    }
    Ok(None)
}

/// Parses one `|`-separated line in `id|name|partition|state|time|user` order,
/// which both the squeue and sacct formats above produce.
pub fn parse_job_line(line: &str) -> Option<JobInfo> {
    let fields: Vec<&str> = line.trim().split('|').collect();
    if fields.len() < 6 {
        return None;
    }
    // Array and het-job ids look like 1234_5 or 1234+0.
    let raw_id = fields[0]
        .split(|c: char| c == '_' || c == '+' || c == '.')
        .next()
        .unwrap_or("");
    let job_id = raw_id.parse().ok()?;
    Some(JobInfo {
        job_id,
        name: fields[1].to_string(),
        partition: fields[2].to_string(),
        state: fields[3].to_string(),
        runtime: fields[4].to_string(),
        user: fields[5].to_string(),
    })
}

pub fn parse_submission(stdout: &str) -> Option<ExternalJobId> {
    let line = stdout.lines().find(|l| !l.trim().is_empty())?;
    let token = line.split(';').next()?.trim();
    token
        .parse()
        .ok()
        .or_else(|| line.split_whitespace().last()?.parse().ok())
}

impl ResourceManager for SlurmManager {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Slurm
    }

    fn submit(&self, script: &Path) -> Result<ExternalJobId, ManagerError> {
        let args = vec![
            "--parsable".to_string(),
            script.to_string_lossy().into_owned(),
        ];
        let (command, out) = self.run("sbatch", &args)?;
        if !out.success {
            return Err(ManagerError::Submission {
                manager: self.kind().to_string(),
                message: out.stderr.trim().to_string(),
            });
        }
        let id = parse_submission(&out.stdout).ok_or_else(|| ManagerError::Parse {
            command,
            output: out.stdout.clone(),
        })?;
        tracing::debug!("sbatch accepted {} as job {}", script.display(), id);
        Ok(id)
    }

    fn query(&self, id: ExternalJobId) -> Result<JobInfo, ManagerError> {
        if let Some(info) = self.squeue(id)? {
            return Ok(info);
        }
        self.sacct(id)?.ok_or(ManagerError::JobNotFound(id))
    }

    fn list_queue(&self) -> Result<Vec<JobInfo>, ManagerError> {
        let mut args = vec!["-h".to_string()];
        if !self.user.is_empty() {
            args.push("-u".to_string());
            args.push(self.user.clone());
        }
        args.push("-o".to_string());
        args.push(SQUEUE_FORMAT.to_string());

        let (command, out) = self.run("squeue", &args)?;
        if !out.success {
            return Err(ManagerError::CommandFailed {
                command,
                stderr: out.stderr.trim().to_string(),
            });
        }
        out.stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| {
                parse_job_line(line).ok_or_else(|| ManagerError::Parse {
                    command: command.clone(),
                    output: line.to_string(),
                })
            })
            .collect()
    }

    fn cancel(&self, id: ExternalJobId) -> Result<bool, ManagerError> {
        let (command, out) = self.run("scancel", &[id.to_string()])?;
        if out.success {
            // Recent SLURM exits zero and only warns for finished jobs.
            return Ok(!already_finished(&out.stderr));
        }
        if already_finished(&out.stderr) {
            return Ok(false);
        }
        Err(ManagerError::CommandFailed {
            command,
            stderr: out.stderr.trim().to_string(),
        })
    }
}

fn already_finished(stderr: &str) -> bool {
    stderr.contains("already completing or completed") || stderr.contains("Invalid job id")
}
