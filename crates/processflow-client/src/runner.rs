use crate::error::ManagerError;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs the resource manager's command-line tools.
///
/// A non-zero exit is not an error here; callers read `success` and decide
/// what the manager meant. Only failing to run the tool at all, or the tool
/// not answering in time, is an error.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ManagerError>;
}

pub struct LocalCommandRunner {
    timeout: Duration,
    tools_dir: Option<PathBuf>,
}

impl LocalCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            tools_dir: None,
        }
    }

    /// Prefer executables found in `dir` over those on `PATH`.
    pub fn with_tools_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tools_dir = Some(dir.into());
        self
    }

    fn tool(&self, name: &str) -> PathBuf {
        match &self.tools_dir {
            Some(dir) if dir.join(name).exists() => dir.join(name),
            _ => PathBuf::from(name),
        }
    }
}

impl CommandRunner for LocalCommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ManagerError> {
        let mut cmd = Command::new(self.tool(program));
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        processflow_core::logging::log_and_print_command(&cmd);

        let io_err = |source| ManagerError::Io {
            command: program.to_string(),
            source,
        };
        let child = cmd.spawn().map_err(io_err)?;
        let pid = child.id();

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(child.wait_with_output());
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(output)) => Ok(CommandOutput {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(e)) => Err(io_err(e)),
            Err(_) => {
                // Forked children share the pipes, so the whole group goes.
                if let Ok(raw) = i32::try_from(pid) {
                    let _ = killpg(Pid::from_raw(raw), Signal::SIGKILL);
                }
                tracing::warn!("'{}' timed out after {:?}, killed", program, self.timeout);
                Err(ManagerError::Timeout {
                    command: program.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }
}
