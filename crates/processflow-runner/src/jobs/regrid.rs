use super::{
    component_data_type, list_matching, mkdir_line, present_files, CaseContext, Inputs, JobCommand,
    Stage,
};
use processflow_core::config::RegridConfig;
use processflow_core::constants::{data_types, thresholds};
use processflow_core::errors::JobError;
use processflow_core::model::{Component, JobKey, JobKind, YearSet};
use processflow_core::registry::DataFile;
use regex::Regex;
use std::path::PathBuf;

pub struct RegridStage {
    case: CaseContext,
    component: Component,
    config: RegridConfig,
}

impl RegridStage {
    pub fn new(case: CaseContext, component: Component, config: RegridConfig) -> Self {
        Self {
            case,
            component,
            config,
        }
    }

    fn output_dir(&self, years: YearSet) -> PathBuf {
        self.case.layout.regrid_dir(
            &self.config.destination_grid_name,
            &self.case.short_name,
            self.component,
            years,
        )
    }

    fn output_files(&self, years: YearSet) -> Vec<PathBuf> {
        match Regex::new(r"\.nc$") {
            Ok(re) => list_matching(&self.output_dir(years), &re),
            Err(_) => Vec::new(),
        }
    }
}

impl Stage for RegridStage {
    fn kind(&self) -> JobKind {
        JobKind::Regrid(self.component)
    }

    fn data_required(&self) -> Vec<String> {
        vec![component_data_type(self.component)]
    }

    fn output_dirs(&self, years: YearSet) -> Vec<PathBuf> {
        vec![self.output_dir(years)]
    }

    /// One regridded file per input month.
    fn output_complete(&self, years: YearSet) -> bool {
        let expected = (thresholds::MONTHS_PER_YEAR * years.length()) as usize;
        self.output_files(years).len() >= expected
    }

    fn command(&self, key: &JobKey, inputs: &Inputs) -> Result<JobCommand, JobError> {
        let data_type = component_data_type(self.component);
        let files = inputs
            .get(&data_type)
            .filter(|files| !files.is_empty())
            .ok_or_else(|| JobError::Configuration {
                job: key.to_string(),
                data_type: data_type.clone(),
            })?;
        let output = self.output_dir(key.years);

        let mut args: Vec<String> = vec![
            "ncremap".into(),
            "-m".into(),
            self.config.regrid_map_path.to_string_lossy().into_owned(),
            "-O".into(),
            output.to_string_lossy().into_owned(),
        ];
        if matches!(self.component, Component::Ocn | Component::Ice) {
            args.extend(["-P".to_string(), "mpas".to_string()]);
        }
        args.extend(files.iter().map(|f| f.to_string_lossy().into_owned()));

        Ok(JobCommand {
            setup: vec![mkdir_line(&output)],
            args,
        })
    }

    fn produced_types(&self) -> Vec<String> {
        vec![format!("{}{}", data_types::REGRID_PREFIX, self.component)]
    }

    fn produced_outputs(&self, years: YearSet) -> Vec<(String, Vec<DataFile>)> {
        vec![(
            format!("{}{}", data_types::REGRID_PREFIX, self.component),
            present_files(&self.case.name, self.output_files(years), years.start),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use processflow_core::layout::OutputLayout;

    fn stage(root: &std::path::Path, component: Component) -> RegridStage {
        RegridStage::new(
            CaseContext {
                name: "caseA".into(),
                short_name: "A".into(),
                native_grid: "ne30".into(),
                simulation: YearSet::new(1, 4).unwrap(),
                layout: OutputLayout::new(root),
            },
            component,
            RegridConfig {
                run_frequency: vec![2],
                regrid_map_path: "/maps/oEC60to30_to_0.5x0.5.nc".into(),
                destination_grid_name: "0.5x0.5".into(),
            },
        )
    }

    #[test]
    fn test_needs_a_file_per_month() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = stage(tmp.path(), Component::Atm);
        let years = YearSet::new(1, 2).unwrap();
        let dir = stage.output_dir(years);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..23 {
            std::fs::write(dir.join(format!("f{:02}.nc", i)), b"").unwrap();
        }
        std::fs::write(dir.join("notes.txt"), b"").unwrap();
        assert!(!stage.output_complete(years));

        std::fs::write(dir.join("f23.nc"), b"").unwrap();
        assert!(stage.output_complete(years));
        assert_eq!(stage.produced_outputs(years)[0].1.len(), 24);
    }

    #[test]
    fn test_mpas_components_pass_the_mpas_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = stage(tmp.path(), Component::Ocn);
        let key = JobKey::new("caseA", stage.kind(), YearSet::new(1, 2).unwrap());
        let mut inputs = Inputs::new();
        inputs.insert(
            "ocn".into(),
            vec!["/d/a.nc".into(), "/d/b.nc".into()],
        );
        let args = stage.command(&key, &inputs).unwrap().args;
        assert_eq!(&args[5..7], ["-P", "mpas"]);
        assert_eq!(&args[7..], ["/d/a.nc", "/d/b.nc"]);
        assert_eq!(stage.produced_types(), vec!["regrid_ocn"]);
    }
}
