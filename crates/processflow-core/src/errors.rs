use crate::model::JobKey;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on path '{path}': {source}")]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    General(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    Invalid { key: String, reason: String },

    #[error("Output root '{path}' is not writable: {source}")]
    OutputRootUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file not found at '{0}'.\nPass one with --config or create it in the default location.")]
    ConfigNotFound(PathBuf),

    #[error("Could not determine the XDG config directory.")]
    ConfigHomeNotFound,

    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Case '{0}' is not configured.")]
    UnknownCase(String),

    #[error("Job '{job}' requires '{requires}', which is not planned. Enable it in job_types or adjust its run_frequency.")]
    MissingDependency { job: String, requires: String },

    #[error("No variables configured for '{0}'.")]
    EmptyVariableList(String),

    #[error("Unknown job type '{name}' in case '{case}'.")]
    UnknownJobType { case: String, name: String },

    #[error("Invalid year range {start}-{end}.")]
    InvalidYearRange { start: u32, end: u32 },

    #[error("Data type '{0}' is not configured under [data_types].")]
    UnknownDataType(String),
}

/// Failure kinds a job can hit during one lifecycle attempt.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("{job}: required input '{data_type}' resolved to zero files")]
    Configuration { job: String, data_type: String },

    #[error("{job}: input not yet available: {missing}")]
    TransientInputGap { job: String, missing: String },

    #[error("{job}: submission rejected: {message}")]
    Submission { job: String, message: String },

    #[error("{job}: external state unknown: {message}")]
    ExternalStateUnknown { job: String, message: String },

    #[error("{job}: manager reported completion but output is incomplete in {output}")]
    PostconditionUnmet { job: String, output: PathBuf },

    #[error("{job}: I/O error: {source}")]
    Io {
        job: String,
        #[source]
        source: std::io::Error,
    },
}

impl JobError {
    /// Whether the job must be given up on. Transient gaps and unknown
    /// external state are retried on the next poll.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            JobError::TransientInputGap { .. } | JobError::ExternalStateUnknown { .. }
        )
    }

    pub fn io(key: &JobKey, source: std::io::Error) -> Self {
        JobError::Io {
            job: key.to_string(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Data type '{0}' is not registered.")]
    UnknownDataType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality_of_job_errors() {
        let gap = JobError::TransientInputGap {
            job: "climo".into(),
            missing: "c.cam.h0.2000-01.nc".into(),
        };
        let unknown = JobError::ExternalStateUnknown {
            job: "climo".into(),
            message: "timed out".into(),
        };
        let config = JobError::Configuration {
            job: "climo".into(),
            data_type: "atm".into(),
        };
        assert!(!gap.is_fatal());
        assert!(!unknown.is_fatal());
        assert!(config.is_fatal());
    }

    #[test]
    fn test_domain_error_converts_into_config_error() {
        let err: ConfigError = DomainError::UnknownCase("x".into()).into();
        assert_eq!(err.to_string(), "Case 'x' is not configured.");
    }
}
