use crate::error::ManagerError;
use crate::pbs::PbsManager;
use crate::runner::CommandRunner;
use crate::slurm::SlurmManager;
use processflow_core::model::{ExternalJobId, JobInfo, ManagerKind};
use processflow_core::status_map::StatusMap;
use std::path::Path;

/// The only point of contact with the batch system. Nothing here retries;
/// callers decide what a failure means for their job.
pub trait ResourceManager {
    fn kind(&self) -> ManagerKind;

    fn status_map(&self) -> StatusMap {
        StatusMap::for_manager(self.kind())
    }

    fn submit(&self, script: &Path) -> Result<ExternalJobId, ManagerError>;

    /// Fails with [`ManagerError::JobNotFound`] when neither the live queue
    /// nor recent history knows the id.
    fn query(&self, id: ExternalJobId) -> Result<JobInfo, ManagerError>;

    fn list_queue(&self) -> Result<Vec<JobInfo>, ManagerError>;

    /// `Ok(false)` when the job had already finished.
    fn cancel(&self, id: ExternalJobId) -> Result<bool, ManagerError>;
}

pub fn new_manager(kind: ManagerKind, runner: Box<dyn CommandRunner>) -> Box<dyn ResourceManager> {
    let user = whoami::username().unwrap_or_else(|e| {
        tracing::warn!("Could not determine the current user: {}", e);
        String::new()
    });
    match kind {
        ManagerKind::Slurm => Box::new(SlurmManager::new(runner, user)),
        ManagerKind::Pbs => Box::new(PbsManager::new(runner, user)),
    }
}

pub(crate) fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
