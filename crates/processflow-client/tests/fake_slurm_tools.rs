use processflow_client::manager::ResourceManager;
use processflow_client::slurm::SlurmManager;
use processflow_client::{LocalCommandRunner, ManagerError};
use processflow_core::model::{ExternalJobId, JobStatus};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};

fn write_tool(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn manager(tools: &Path, timeout: Duration) -> SlurmManager {
    let runner = LocalCommandRunner::new(timeout).with_tools_dir(tools);
    SlurmManager::new(Box::new(runner), "alice")
}

#[test]
fn test_round_trip_against_fake_tools() {
    let tools = tempfile::tempdir().unwrap();
    write_tool(tools.path(), "sbatch", "echo 4711");
    write_tool(
        tools.path(),
        "squeue",
        "echo 'slurm_load_jobs error: Invalid job id specified' >&2; exit 1",
    );
    write_tool(
        tools.path(),
        "sacct",
        "echo '4711|climo-0001-0005-caseA|debug|COMPLETED|00:04:10|alice'",
    );
    write_tool(
        tools.path(),
        "scancel",
        "echo 'scancel: error: Kill job error on job id 4711: Job/step already completing or completed' >&2; exit 1",
    );

    let mgr = manager(tools.path(), Duration::from_secs(10));
    let script = tools.path().join("climo-0001-0005-caseA.sh");
    fs::write(&script, "#!/bin/bash\ntrue\n").unwrap();

    let id = mgr.submit(&script).unwrap();
    assert_eq!(id, ExternalJobId(4711));

    let info = mgr.query(id).unwrap();
    assert_eq!(info.name, "climo-0001-0005-caseA");
    assert_eq!(mgr.status_map().translate(&info.state), JobStatus::Completed);

    assert!(!mgr.cancel(id).unwrap());
}

#[test]
fn test_hanging_queue_query_is_bounded() {
    let tools = tempfile::tempdir().unwrap();
    write_tool(tools.path(), "squeue", "sleep 10");

    let mgr = manager(tools.path(), Duration::from_millis(300));
    let started = Instant::now();
    let err = mgr.query(ExternalJobId(1)).unwrap_err();

    assert!(matches!(err, ManagerError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
}

fn process_gone(pid: &str) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .is_some_and(|rest| rest.trim_start().starts_with('Z')),
        Err(_) => true,
    }
}

#[test]
fn test_timeout_kills_processes_forked_by_the_tool() {
    let tools = tempfile::tempdir().unwrap();
    let pid_file = tools.path().join("background.pid");
    write_tool(
        tools.path(),
        "squeue",
        &format!("sleep 10 &\necho $! > {}\nsleep 10", pid_file.display()),
    );

    let mgr = manager(tools.path(), Duration::from_millis(300));
    let started = Instant::now();
    let err = mgr.query(ExternalJobId(1)).unwrap_err();
    assert!(matches!(err, ManagerError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(3));

    let pid = fs::read_to_string(&pid_file).unwrap();
    let pid = pid.trim();
    let deadline = Instant::now() + Duration::from_secs(2);
    while !process_gone(pid) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(process_gone(pid), "background process {} survived", pid);
}

#[test]
fn test_rejected_submission_keeps_manager_text() {
    let tools = tempfile::tempdir().unwrap();
    write_tool(
        tools.path(),
        "sbatch",
        "echo 'sbatch: error: Batch job submission failed: Invalid account' >&2; exit 1",
    );

    let mgr = manager(tools.path(), Duration::from_secs(10));
    let err = mgr.submit(Path::new("/nonexistent.sh")).unwrap_err();
    assert!(err
        .to_string()
        .contains("Batch job submission failed: Invalid account"));
}
