#![allow(dead_code)]
use assert_cmd::Command as AssertCommand;
use processflow_test_utils::project::TestProject;
use std::fs;
use std::ops::{Deref, DerefMut};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

pub struct TestHarness {
    pub project: TestProject,
    pub tools_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let project = TestProject::new();
        let tools_dir = project.root.join("bin");
        fs::create_dir_all(&tools_dir).expect("Failed to create tools dir");
        Self { project, tools_dir }
    }

    /// Puts a shell script named `name` first on the binary's PATH.
    pub fn fake_tool(&self, name: &str, body: &str) {
        let path = self.tools_dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write tool");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("Failed to make tool executable");
    }

    pub fn cmd(&self) -> AssertCommand {
        let path = format!(
            "{}:{}",
            self.tools_dir.display(),
            std::env::var("PATH").unwrap_or_default()
        );
        let mut cmd = AssertCommand::new(env!("CARGO_BIN_EXE_processflow"));
        cmd.env("XDG_CONFIG_HOME", &self.project.config_home);
        cmd.env("XDG_CACHE_HOME", &self.project.cache_home);
        cmd.env("PATH", path);
        cmd.env("RUST_BACKTRACE", "1");
        cmd.env("NO_COLOR", "1");
        cmd.env("PROCESSFLOW_LOG_LEVEL", "DEBUG");
        cmd
    }

    /// Command with `--config` pointing at a freshly written config.
    pub fn cmd_with_config(&self, content: &str) -> AssertCommand {
        let config = self.project.write_config(content);
        let mut cmd = self.cmd();
        cmd.arg("--config").arg(config);
        cmd
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TestHarness {
    type Target = TestProject;

    fn deref(&self) -> &Self::Target {
        &self.project
    }
}

impl DerefMut for TestHarness {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.project
    }
}
