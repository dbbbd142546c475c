use crate::scheduler::RunOutcome;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] processflow_core::errors::ConfigError),

    #[error(transparent)]
    Domain(#[from] processflow_core::errors::DomainError),

    #[error(transparent)]
    Client(#[from] processflow_client::ClientError),

    #[error(transparent)]
    Manager(#[from] processflow_client::ManagerError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Run did not succeed: {outcome}")]
    RunFailed { outcome: RunOutcome },
}
