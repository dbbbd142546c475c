use processflow_core::model::ExternalJobId;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Submission rejected by {manager}: {message}")]
    Submission { manager: String, message: String },

    #[error("Job {0} is unknown to the queue and to job history.")]
    JobNotFound(ExternalJobId),

    #[error("'{command}' did not answer within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Failed to parse output of '{command}': {output}")]
    Parse { command: String, output: String },

    #[error("Command '{command}' failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Failed to run '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl ManagerError {
    /// Failures that say nothing about the job itself; the caller retries
    /// them on its next poll.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ManagerError::Timeout { .. }
                | ManagerError::Parse { .. }
                | ManagerError::CommandFailed { .. }
                | ManagerError::Io { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] processflow_core::errors::ConfigError),

    #[error(transparent)]
    Domain(#[from] processflow_core::errors::DomainError),

    #[error(transparent)]
    Manager(#[from] ManagerError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
