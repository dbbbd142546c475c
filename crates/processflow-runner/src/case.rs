use crate::jobs::{build_stage, CaseContext, Job};
use processflow_core::config::Config;
use processflow_core::engine::{plan_year_sets, resolve_dependencies};
use processflow_core::errors::ConfigError;
use processflow_core::layout::OutputLayout;
use processflow_core::model::{JobKey, JobStatus};
use processflow_core::registry::LocalFileRegistry;
use std::collections::{BTreeMap, BTreeSet};

/// All jobs of one simulation, in schedule order.
pub struct Case {
    pub name: String,
    pub short_name: String,
    pub native_grid: String,
    pub jobs: Vec<Job>,
    index: BTreeMap<JobKey, usize>,
}

impl Case {
    pub fn job(&self, key: &JobKey) -> Option<&Job> {
        self.index.get(key).map(|&i| &self.jobs[i])
    }

    pub fn status_of(&self, key: &JobKey) -> Option<JobStatus> {
        self.job(key).map(Job::status)
    }

    pub fn is_finished(&self) -> bool {
        self.jobs.iter().all(|j| j.status().is_terminal())
    }
}

pub fn case_context(config: &Config, name: &str) -> Result<CaseContext, ConfigError> {
    let case = config.case(name)?;
    Ok(CaseContext {
        name: name.to_string(),
        short_name: case.short_name_or(name).to_string(),
        native_grid: case.native_grid_name.clone(),
        simulation: config.simulations.year_range()?,
        layout: OutputLayout::new(config.output_root()),
    })
}

/// Expands a case's enabled job types over every configured set length and
/// wires up their dependencies.
pub fn plan_case(config: &Config, name: &str, dryrun: bool) -> Result<Case, ConfigError> {
    let ctx = case_context(config, name)?;
    let mut jobs = Vec::new();
    let mut seen = BTreeSet::new();

    for kind in config.job_kinds(name)? {
        for length in config.run_frequencies(kind) {
            for years in plan_year_sets(ctx.simulation, length) {
                let key = JobKey::new(name, kind, years);
                if !seen.insert(key.clone()) {
                    continue;
                }
                jobs.push(Job::new(key, build_stage(kind, config, &ctx)?, dryrun));
            }
        }
    }
    jobs.sort_by(|a, b| a.key().schedule_order().cmp(&b.key().schedule_order()));

    for job in jobs.iter_mut() {
        let deps = resolve_dependencies(job.key(), &job.dependency_rules(), &seen)?;
        job.set_dependencies(deps);
    }

    let index = jobs
        .iter()
        .enumerate()
        .map(|(i, j)| (j.key().clone(), i))
        .collect();
    tracing::info!("Planned {} jobs for case '{}'", jobs.len(), name);

    Ok(Case {
        name: name.to_string(),
        short_name: ctx.short_name,
        native_grid: ctx.native_grid,
        jobs,
        index,
    })
}

pub fn plan_cases(config: &Config, dryrun: bool) -> Result<Vec<Case>, ConfigError> {
    config
        .simulations
        .cases
        .keys()
        .map(|name| plan_case(config, name, dryrun))
        .collect()
}

/// Registers the raw model output every case reads, and declares the types
/// jobs will produce so downstream lookups wait for them instead of failing.
pub fn build_registry(config: &Config, cases: &[Case]) -> Result<LocalFileRegistry, ConfigError> {
    let mut registry = LocalFileRegistry::new();
    let range = config.simulations.year_range()?;
    for case in cases {
        for data_type in config.case_data_types(&case.name)? {
            let dt_config = config.data_types.get(&data_type).ok_or_else(|| {
                ConfigError::from(processflow_core::errors::DomainError::UnknownDataType(
                    data_type.clone(),
                ))
            })?;
            registry.populate(
                &case.name,
                &data_type,
                dt_config,
                range,
                &config.global.project_path,
            );
        }
        for job in &case.jobs {
            for produced in job.produced_types() {
                registry.declare(&produced, true);
            }
        }
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use processflow_core::model::{JobKind, YearSet};

    const CONFIG: &str = r#"
[global]
project_path = "/tmp/processflow-plan-test"

[simulations]
start_year = 1
end_year = 12

[simulations.cases.caseA]
native_grid_name = "ne30"

[data_types.atm]
file_format = "CASEID.cam.h0.YEAR-MONTH.nc"
local_path = "PROJECT_PATH/input/CASEID/atm"
monthly = true

[post_processing.climo]
run_frequency = [5, 10]
destination_grid_name = "fv129x256"
regrid_map_path = "/maps/m.nc"

[diags.e3sm_diags]
run_frequency = [5]
reference_data_path = "/obs"
compare_previous_set = true
"#;

    fn config() -> Config {
        Config::from_toml_str(CONFIG).unwrap()
    }

    #[test]
    fn test_partial_tail_sets_are_skipped() {
        let case = plan_case(&config(), "caseA", false).unwrap();
        let keys: Vec<String> = case.jobs.iter().map(|j| j.key().to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "climo-0001-0005-caseA",
                "e3sm_diags-0001-0005-caseA",
                "climo-0001-0010-caseA",
                "climo-0006-0010-caseA",
                "e3sm_diags-0006-0010-caseA",
            ]
        );
    }

    #[test]
    fn test_diagnostics_depend_on_climatologies() {
        let case = plan_case(&config(), "caseA", false).unwrap();
        let first = JobKey::new("caseA", JobKind::E3smDiags, YearSet::new(1, 5).unwrap());
        let second = JobKey::new("caseA", JobKind::E3smDiags, YearSet::new(6, 10).unwrap());

        assert_eq!(
            case.job(&first).unwrap().depends_on(),
            &[JobKey::new("caseA", JobKind::Climo, YearSet::new(1, 5).unwrap())]
        );
        assert_eq!(
            case.job(&second).unwrap().depends_on(),
            &[
                JobKey::new("caseA", JobKind::Climo, YearSet::new(6, 10).unwrap()),
                JobKey::new("caseA", JobKind::Climo, YearSet::new(1, 5).unwrap()),
            ]
        );
        assert!(case.jobs.iter().all(|j| j.status() == JobStatus::Invalid));
    }

    #[test]
    fn test_diagnostics_without_matching_climo_set_is_rejected() {
        let text = CONFIG.replace("run_frequency = [5, 10]", "run_frequency = [10]");
        let config = Config::from_toml_str(&text).unwrap();
        let err = plan_case(&config, "caseA", false).err().unwrap();
        assert!(err.to_string().contains("requires 'climo-0001-0005-caseA'"));
    }

    #[test]
    fn test_registry_declares_produced_types() {
        let config = config();
        let cases = plan_cases(&config, false).unwrap();
        let registry = build_registry(&config, &cases).unwrap();
        let types: Vec<&str> = registry.data_types().collect();
        assert_eq!(types, vec!["atm", "climo_native", "climo_regrid"]);
    }
}
