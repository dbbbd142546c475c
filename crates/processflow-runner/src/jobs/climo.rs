use super::{
    input_dir, list_matching, mkdir_line, present_files, CaseContext, Inputs, JobCommand, Stage,
};
use processflow_core::config::ClimoConfig;
use processflow_core::constants::{data_types, thresholds};
use processflow_core::errors::JobError;
use processflow_core::model::{JobKey, JobKind, YearSet};
use processflow_core::registry::DataFile;
use regex::Regex;
use std::path::PathBuf;

/// Monthly, seasonal and annual climatologies with `ncclimo`, on the native
/// grid and regridded to the destination grid.
pub struct ClimoStage {
    case: CaseContext,
    config: ClimoConfig,
}

impl ClimoStage {
    pub fn new(case: CaseContext, config: ClimoConfig) -> Self {
        Self { case, config }
    }

    fn native_dir(&self, years: YearSet) -> PathBuf {
        self.case
            .layout
            .climo_dir(&self.case.native_grid, &self.case.short_name, years)
    }

    fn regrid_dir(&self, years: YearSet) -> PathBuf {
        self.case.layout.climo_dir(
            &self.config.destination_grid_name,
            &self.case.short_name,
            years,
        )
    }

    fn output_files(&self, years: YearSet, dir: PathBuf) -> Vec<PathBuf> {
        match climo_pattern(years) {
            Ok(re) => list_matching(&dir, &re),
            Err(e) => {
                tracing::error!("Invalid climatology pattern: {}", e);
                Vec::new()
            }
        }
    }
}

/// Matches `<case>_ANN_000101_000512_climo.nc` style names for the set.
pub fn climo_pattern(years: YearSet) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"_{:04}\d\d_{:04}\d\d_climo\.nc$",
        years.start, years.end
    ))
}

impl Stage for ClimoStage {
    fn kind(&self) -> JobKind {
        JobKind::Climo
    }

    fn data_required(&self) -> Vec<String> {
        vec!["atm".to_string()]
    }

    fn output_dirs(&self, years: YearSet) -> Vec<PathBuf> {
        vec![self.native_dir(years), self.regrid_dir(years)]
    }

    fn output_complete(&self, years: YearSet) -> bool {
        self.output_dirs(years).into_iter().all(|dir| {
            let found = self.output_files(years, dir.clone()).len();
            tracing::trace!("{}: {} climatology files", dir.display(), found);
            found >= thresholds::CLIMO_MIN_FILES
        })
    }

    fn command(&self, key: &JobKey, inputs: &Inputs) -> Result<JobCommand, JobError> {
        let years = key.years;
        let native = self.native_dir(years);
        let regrid = self.regrid_dir(years);
        let input = input_dir(key, inputs, "atm")?;
        Ok(JobCommand {
            setup: vec![mkdir_line(&native), mkdir_line(&regrid)],
            args: vec![
                "ncclimo".into(),
                "-c".into(),
                self.case.name.clone(),
                "-a".into(),
                "sdd".into(),
                "-s".into(),
                years.start.to_string(),
                "-e".into(),
                years.end.to_string(),
                "-i".into(),
                input.to_string_lossy().into_owned(),
                "-r".into(),
                self.config.regrid_map_path.to_string_lossy().into_owned(),
                "-o".into(),
                native.to_string_lossy().into_owned(),
                "-O".into(),
                regrid.to_string_lossy().into_owned(),
                "--no_amwg_links".into(),
            ],
        })
    }

    fn produced_types(&self) -> Vec<String> {
        vec![
            data_types::CLIMO_NATIVE.to_string(),
            data_types::CLIMO_REGRID.to_string(),
        ]
    }

    fn produced_outputs(&self, years: YearSet) -> Vec<(String, Vec<DataFile>)> {
        let case = &self.case.name;
        vec![
            (
                data_types::CLIMO_NATIVE.to_string(),
                present_files(case, self.output_files(years, self.native_dir(years)), years.start),
            ),
            (
                data_types::CLIMO_REGRID.to_string(),
                present_files(case, self.output_files(years, self.regrid_dir(years)), years.start),
            ),
        ]
    }
}
