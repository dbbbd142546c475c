use super::{mkdir_line, CaseContext, Inputs, JobCommand, Stage};
use processflow_core::config::{ClimoConfig, E3smDiagsConfig};
use processflow_core::constants::data_types;
use processflow_core::engine::{previous_set, DependencyRule};
use processflow_core::errors::JobError;
use processflow_core::model::{JobKey, JobKind, YearSet};
use std::path::PathBuf;

const KIND: &str = "e3sm_diags";

/// Atmosphere diagnostics over the regridded climatology of the same set,
/// compared against observations or the previous set of the same run.
pub struct E3smDiagsStage {
    case: CaseContext,
    config: E3smDiagsConfig,
    climo: ClimoConfig,
}

impl E3smDiagsStage {
    pub fn new(case: CaseContext, config: E3smDiagsConfig, climo: ClimoConfig) -> Self {
        Self {
            case,
            config,
            climo,
        }
    }

    fn results_dir(&self, years: YearSet) -> PathBuf {
        self.case
            .layout
            .diags_dir(&self.case.short_name, KIND, years)
    }

    fn model_climo_dir(&self, years: YearSet) -> PathBuf {
        self.case.layout.climo_dir(
            &self.climo.destination_grid_name,
            &self.case.short_name,
            years,
        )
    }

    fn reference(&self, years: YearSet) -> PathBuf {
        if self.config.compare_previous_set {
            let first = self.case.simulation.start;
            if let Some(prev) = previous_set(years).filter(|p| p.start >= first) {
                return self.model_climo_dir(prev);
            }
        }
        self.config.reference_data_path.clone()
    }
}

impl Stage for E3smDiagsStage {
    fn kind(&self) -> JobKind {
        JobKind::E3smDiags
    }

    fn data_required(&self) -> Vec<String> {
        vec![data_types::CLIMO_REGRID.to_string()]
    }

    fn dependency_rules(&self) -> Vec<DependencyRule> {
        let mut rules = vec![DependencyRule::SameSet(JobKind::Climo)];
        if self.config.compare_previous_set {
            rules.push(DependencyRule::PreviousSet(JobKind::Climo));
        }
        rules
    }

    fn output_dirs(&self, years: YearSet) -> Vec<PathBuf> {
        vec![self.results_dir(years)]
    }

    fn output_complete(&self, years: YearSet) -> bool {
        self.results_dir(years)
            .join("viewer")
            .join("index.html")
            .is_file()
    }

    fn command(&self, key: &JobKey, _inputs: &Inputs) -> Result<JobCommand, JobError> {
        let years = key.years;
        let results = self.results_dir(years);
        Ok(JobCommand {
            setup: vec![mkdir_line(&results)],
            args: vec![
                "e3sm_diags".into(),
                "--test_data_path".into(),
                self.model_climo_dir(years).to_string_lossy().into_owned(),
                "--reference_data_path".into(),
                self.reference(years).to_string_lossy().into_owned(),
                "--results_dir".into(),
                results.to_string_lossy().into_owned(),
                "--test_name".into(),
                self.case.short_name.clone(),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use processflow_core::layout::OutputLayout;

    fn stage(compare: bool) -> E3smDiagsStage {
        E3smDiagsStage::new(
            CaseContext {
                name: "caseA".into(),
                short_name: "A".into(),
                native_grid: "ne30".into(),
                simulation: YearSet::new(1, 10).unwrap(),
                layout: OutputLayout::new("/p/output"),
            },
            E3smDiagsConfig {
                run_frequency: vec![5],
                reference_data_path: "/obs/climo".into(),
                compare_previous_set: compare,
            },
            ClimoConfig {
                run_frequency: vec![5],
                destination_grid_name: "fv129x256".into(),
                regrid_map_path: "/maps/m.nc".into(),
            },
        )
    }

    fn arg_after(args: &[String], flag: &str) -> String {
        let pos = args.iter().position(|a| a == flag).unwrap();
        args[pos + 1].clone()
    }

    #[test]
    fn test_rules_follow_comparison_mode() {
        assert_eq!(
            stage(false).dependency_rules(),
            vec![DependencyRule::SameSet(JobKind::Climo)]
        );
        assert_eq!(stage(true).dependency_rules().len(), 2);
    }

    #[test]
    fn test_reference_is_previous_set_when_comparing() {
        let s = stage(true);
        let second = JobKey::new("caseA", JobKind::E3smDiags, YearSet::new(6, 10).unwrap());
        let args = s.command(&second, &Inputs::new()).unwrap().args;
        assert_eq!(
            arg_after(&args, "--reference_data_path"),
            "/p/output/pp/fv129x256/A/climo/5yr"
        );

        let first = JobKey::new("caseA", JobKind::E3smDiags, YearSet::new(1, 5).unwrap());
        let args = s.command(&first, &Inputs::new()).unwrap().args;
        assert_eq!(arg_after(&args, "--reference_data_path"), "/obs/climo");
    }

    #[test]
    fn test_complete_when_viewer_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = stage(false);
        s.case.layout = OutputLayout::new(tmp.path());
        let years = YearSet::new(1, 5).unwrap();
        assert!(!s.output_complete(years));
        let viewer = s.results_dir(years).join("viewer");
        std::fs::create_dir_all(&viewer).unwrap();
        std::fs::write(viewer.join("index.html"), b"<html/>").unwrap();
        assert!(s.output_complete(years));
    }
}
