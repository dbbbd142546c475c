use crate::error::Result;
use crate::resources::BatchDirectives;
use processflow_core::errors::ConfigError;
use processflow_core::model::ManagerKind;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// A rendered submission script. Its exit code is what the resource manager
/// reports as the job's success or failure.
#[derive(Debug, Clone)]
pub struct BatchScript {
    pub job_name: String,
    pub log_path: PathBuf,
    pub workdir: PathBuf,
    pub directives: BatchDirectives,
    /// Shell lines run before the command, e.g. creating output directories.
    pub setup: Vec<String>,
    pub command: Vec<String>,
}

impl BatchScript {
    pub fn render(&self, kind: ManagerKind) -> String {
        let mut out = String::from("#!/bin/bash\n");
        let log = self.log_path.to_string_lossy();
        match kind {
            ManagerKind::Slurm => {
                let _ = writeln!(out, "#SBATCH --job-name={}", self.job_name);
                let _ = writeln!(out, "#SBATCH --output={}", log);
            }
            ManagerKind::Pbs => {
                let _ = writeln!(out, "#PBS -N {}", self.job_name);
                let _ = writeln!(out, "#PBS -o {}", log);
                let _ = writeln!(out, "#PBS -j oe");
            }
        }
        for line in self.directives.to_lines(kind) {
            let _ = writeln!(out, "{}", line);
        }
        out.push('\n');
        out.push_str("set -e\n");
        let _ = writeln!(out, "cd {}", shell_quote(&self.workdir.to_string_lossy()));
        for line in &self.setup {
            let _ = writeln!(out, "{}", line);
        }
        let command = self
            .command
            .iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(out, "{}", command);
        out
    }

    pub fn write(&self, kind: ManagerKind, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        fs_err::write(path, self.render(kind)).map_err(|source| ConfigError::PathIo {
            path: path.to_path_buf(),
            source,
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs_err::set_permissions(path, std::fs::Permissions::from_mode(0o755))
                .map_err(ConfigError::Io)?;
        }
        Ok(())
    }
}
