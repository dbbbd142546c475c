use super::{mkdir_line, CaseContext, ExtraInput, Inputs, JobCommand, Stage};
use processflow_client::script::shell_quote;
use processflow_core::config::AprimeConfig;
use processflow_core::constants::thresholds;
use processflow_core::errors::JobError;
use processflow_core::model::{JobKey, JobKind, YearSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const KIND: &str = "aprime";
const RUN_SCRIPT: &str = "run_aprime.bash";

/// Coupled-model diagnostics. Reads raw model output from a case directory
/// tree that it expects to look like a model run directory.
pub struct AprimeStage {
    case: CaseContext,
    config: AprimeConfig,
}

impl AprimeStage {
    pub fn new(case: CaseContext, config: AprimeConfig) -> Self {
        Self { case, config }
    }

    fn output_dir(&self, years: YearSet) -> PathBuf {
        self.case
            .layout
            .diags_dir(&self.case.short_name, KIND, years)
    }

    fn input_root(&self, years: YearSet) -> PathBuf {
        self.case
            .layout
            .input_dir(&self.case.short_name, KIND, years)
    }

    /// `<input root>/<case>/run`, where the inputs are linked.
    fn run_dir(&self, years: YearSet) -> PathBuf {
        self.input_root(years).join(&self.case.name).join("run")
    }

    fn count_outputs(dir: &Path) -> usize {
        WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .count()
    }
}

impl Stage for AprimeStage {
    fn kind(&self) -> JobKind {
        JobKind::Aprime
    }

    fn data_required(&self) -> Vec<String> {
        self.config.data_types.clone()
    }

    /// The ocean diagnostics always need the first two simulated years of
    /// ocean output, whichever set is being processed.
    fn extra_inputs(&self, years: YearSet) -> Vec<ExtraInput> {
        let sim = self.case.simulation;
        if years.start == sim.start || !self.config.data_types.iter().any(|d| d == "ocn") {
            return Vec::new();
        }
        YearSet::new(sim.start, (sim.start + 1).min(sim.end))
            .map(|first| ExtraInput {
                data_type: "ocn".to_string(),
                years: first,
            })
            .into_iter()
            .collect()
    }

    fn output_dirs(&self, years: YearSet) -> Vec<PathBuf> {
        vec![self.output_dir(years)]
    }

    fn output_complete(&self, years: YearSet) -> bool {
        Self::count_outputs(&self.output_dir(years)) >= thresholds::APRIME_MIN_FILES
    }

    fn prepare(&self, key: &JobKey, inputs: &Inputs) -> Result<(), JobError> {
        let run_dir = self.run_dir(key.years);
        fs_err::create_dir_all(&run_dir).map_err(|e| JobError::io(key, e))?;
        let mut linked = 0;
        for path in inputs.values().flatten() {
            let Some(name) = path.file_name() else {
                continue;
            };
            let link = run_dir.join(name);
            if link.symlink_metadata().is_ok() {
                continue;
            }
            std::os::unix::fs::symlink(path, &link).map_err(|e| JobError::io(key, e))?;
            linked += 1;
        }
        tracing::debug!("{}: linked {} inputs into {}", key, linked, run_dir.display());
        Ok(())
    }

    fn command(&self, key: &JobKey, _inputs: &Inputs) -> Result<JobCommand, JobError> {
        let years = key.years;
        let output = self.output_dir(years);
        let vars = [
            ("output_base_dir", output.to_string_lossy().into_owned()),
            ("test_casename", self.case.name.clone()),
            (
                "test_archive_dir",
                self.input_root(years).to_string_lossy().into_owned(),
            ),
            ("test_atm_res", self.config.test_atm_res.clone()),
            ("test_mpas_mesh_name", self.config.test_mpas_mesh_name.clone()),
            ("begin_yr", years.start.to_string()),
            ("end_yr", years.end.to_string()),
        ];

        let mut setup = vec![mkdir_line(&output)];
        setup.extend(
            vars.iter()
                .map(|(name, value)| format!("export {}={}", name, shell_quote(value))),
        );
        setup.push(format!(
            "cd {}",
            shell_quote(&self.config.aprime_code_path.to_string_lossy())
        ));

        Ok(JobCommand {
            setup,
            args: vec![
                "bash".into(),
                self.config
                    .aprime_code_path
                    .join(RUN_SCRIPT)
                    .to_string_lossy()
                    .into_owned(),
            ],
        })
    }
}
