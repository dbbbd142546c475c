#![allow(dead_code)]

mod harness;
use harness::TestHarness;
use predicates::prelude::PredicateBooleanExt;
use processflow_test_utils::project::CASE;
use std::fs;

#[test]
fn test_plan_lists_jobs_waiting_for_input() {
    let harness = TestHarness::new();
    let config = harness.base_config(1, 10);

    harness
        .cmd_with_config(&config)
        .arg("plan")
        .assert()
        .success()
        .stdout(predicates::str::contains("climo-0001-0005-caseA"))
        .stdout(predicates::str::contains("climo-0006-0010-caseA"))
        .stdout(predicates::str::contains("INVALID"))
        .stdout(predicates::str::contains("2 jobs planned, 0 ready to submit"));

    // Planning never touches the output tree.
    assert!(!harness.output_root().exists());
}

#[test]
fn test_plan_json_reports_ready_jobs() {
    let harness = TestHarness::new();
    harness.write_atm_years(CASE, 1..=5);
    let config = harness.config_with_diags(1, 5);

    let output = harness
        .cmd_with_config(&config)
        .arg("plan")
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let planned: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let jobs = planned.as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["job"], "climo-0001-0005-caseA");
    assert_eq!(jobs[0]["status"], "VALID");
    assert_eq!(jobs[1]["job"], "e3sm_diags-0001-0005-caseA");
    assert_eq!(jobs[1]["depends_on"][0], "climo-0001-0005-caseA");
}

#[test]
fn test_missing_config_is_reported() {
    let harness = TestHarness::new();

    harness
        .cmd()
        .arg("plan")
        .assert()
        .failure()
        .code(1)
        .stderr(predicates::str::contains("Configuration file not found"));
}

#[test]
fn test_config_from_default_location() {
    let harness = TestHarness::new();
    let dir = harness.config_home.join("processflow");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.toml"), harness.base_config(1, 5)).unwrap();

    harness
        .cmd()
        .arg("plan")
        .assert()
        .success()
        .stdout(predicates::str::contains("climo-0001-0005-caseA"));
}

#[test]
fn test_dry_run_writes_scripts_and_succeeds() {
    let harness = TestHarness::new();
    harness.write_atm_years(CASE, 1..=5);
    let config = harness.base_config(1, 5);
    harness.fake_tool("sbatch", "echo 'sbatch must not be called' >&2; exit 1");

    harness
        .cmd_with_config(&config)
        .arg("run")
        .arg("--dryrun")
        .assert()
        .success()
        .stdout(predicates::str::contains("All processing complete"));

    let script = harness.scripts_dir().join("climo-0001-0005-caseA.sh");
    let content = fs::read_to_string(script).unwrap();
    assert!(content.starts_with("#!/bin/bash"));
    assert!(content.contains("#SBATCH"));
    assert!(content.contains("ncclimo"));
}

#[test]
fn test_run_without_input_exhausts_budget() {
    let harness = TestHarness::new();
    let config = harness.base_config(1, 5);

    harness
        .cmd_with_config(&config)
        .arg("run")
        .arg("--max-iterations")
        .arg("1")
        .arg("--poll-interval")
        .arg("0")
        .assert()
        .failure()
        .code(1)
        .stdout(predicates::str::contains("climo-0001-0005-caseA"))
        .stderr(
            predicates::str::contains("Run did not succeed")
                .and(predicates::str::contains("polling budget exhausted")),
        );
}

#[test]
fn test_queue_translates_manager_states() {
    let harness = TestHarness::new();
    let config = harness.base_config(1, 5);
    harness.fake_tool(
        "squeue",
        "echo '4711|climo-0001-0005-caseA|debug|R|00:01:00|alice'",
    );

    harness
        .cmd_with_config(&config)
        .arg("queue")
        .assert()
        .success()
        .stdout(predicates::str::contains("4711"))
        .stdout(predicates::str::contains("RUNNING"));
}

#[test]
fn test_empty_queue() {
    let harness = TestHarness::new();
    let config = harness.base_config(1, 5);
    harness.fake_tool("squeue", "true");

    harness
        .cmd_with_config(&config)
        .arg("queue")
        .assert()
        .success()
        .stdout(predicates::str::contains("No jobs in the slurm queue."));
}

#[test]
fn test_cancel_reports_each_job() {
    let harness = TestHarness::new();
    let config = harness.base_config(1, 5);
    harness.fake_tool(
        "scancel",
        r#"if [ "$1" = "4712" ]; then echo "scancel: error: Kill job error on job id 4712: Job/step already completing or completed" >&2; exit 1; fi"#,
    );

    harness
        .cmd_with_config(&config)
        .arg("cancel")
        .arg("4711")
        .arg("4712")
        .assert()
        .success()
        .stdout(predicates::str::contains("job 4711"))
        .stdout(predicates::str::contains("Job 4712 had already finished"));
}

#[test]
fn test_cancel_requires_ids() {
    let harness = TestHarness::new();

    harness.cmd().arg("cancel").assert().failure();
}
