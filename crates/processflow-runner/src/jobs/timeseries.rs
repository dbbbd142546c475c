use super::{
    component_data_type, input_dir, mkdir_line, present_files, CaseContext, Inputs, JobCommand,
    Stage,
};
use processflow_core::config::TimeseriesConfig;
use processflow_core::constants::data_types;
use processflow_core::errors::JobError;
use processflow_core::model::{Component, JobKey, JobKind, YearSet};
use processflow_core::registry::DataFile;
use std::path::{Path, PathBuf};

/// Single-variable time series split out of the monthly history files.
pub struct TimeseriesStage {
    case: CaseContext,
    component: Component,
    config: TimeseriesConfig,
}

impl TimeseriesStage {
    pub fn new(case: CaseContext, component: Component, config: TimeseriesConfig) -> Self {
        Self {
            case,
            component,
            config,
        }
    }

    fn native_dir(&self, years: YearSet) -> PathBuf {
        self.case.layout.ts_dir(
            &self.case.native_grid,
            &self.case.short_name,
            years,
            self.component,
        )
    }

    fn regrid_dir(&self, years: YearSet) -> Option<PathBuf> {
        if !self.config.regrids() {
            return None;
        }
        let grid = self.config.destination_grid_name.as_deref()?;
        Some(
            self.case
                .layout
                .ts_dir(grid, &self.case.short_name, years, self.component),
        )
    }

    fn variables(&self) -> Vec<String> {
        self.config.variables(self.component)
    }

    /// The file holding `var` for this set, if it has been written.
    fn variable_output(dir: &Path, var: &str, years: YearSet) -> Option<PathBuf> {
        [variable_file(var, years), format!("{}.nc", var)]
            .into_iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    fn output_files(&self, dir: &Path, years: YearSet) -> Vec<PathBuf> {
        self.variables()
            .iter()
            .filter_map(|var| Self::variable_output(dir, var, years))
            .collect()
    }
}

pub fn variable_file(var: &str, years: YearSet) -> String {
    format!("{}_{:04}01_{:04}12.nc", var, years.start, years.end)
}

impl Stage for TimeseriesStage {
    fn kind(&self) -> JobKind {
        JobKind::Timeseries(self.component)
    }

    fn data_required(&self) -> Vec<String> {
        vec![component_data_type(self.component)]
    }

    fn output_dirs(&self, years: YearSet) -> Vec<PathBuf> {
        let mut dirs = vec![self.native_dir(years)];
        dirs.extend(self.regrid_dir(years));
        dirs
    }

    fn output_complete(&self, years: YearSet) -> bool {
        let vars = self.variables();
        if vars.is_empty() {
            return false;
        }
        self.output_dirs(years)
            .iter()
            .all(|dir| vars.iter().all(|v| Self::variable_output(dir, v, years).is_some()))
    }

    fn command(&self, key: &JobKey, inputs: &Inputs) -> Result<JobCommand, JobError> {
        let years = key.years;
        let data_type = component_data_type(self.component);
        let vars = self.variables();
        if vars.is_empty() {
            return Err(JobError::Configuration {
                job: key.to_string(),
                data_type: format!("post_processing.timeseries.{}", self.component),
            });
        }
        let input = input_dir(key, inputs, &data_type)?;
        let native = self.native_dir(years);

        let mut setup = vec![mkdir_line(&native)];
        let mut args: Vec<String> = vec![
            "ncclimo".into(),
            format!("--input={}", input.display()),
            "-v".into(),
            vars.join(","),
            "-s".into(),
            years.start.to_string(),
            "-e".into(),
            years.end.to_string(),
            format!("--ypf={}", years.length()),
            "-o".into(),
            native.to_string_lossy().into_owned(),
        ];

        if let (Some(regrid), Some(map)) = (self.regrid_dir(years), &self.config.regrid_map_path) {
            setup.push(mkdir_line(&regrid));
            args.push("-O".into());
            args.push(regrid.to_string_lossy().into_owned());
            args.push(format!("--map={}", map.display()));
        }

        let first = inputs
            .get(&data_type)
            .and_then(|paths| paths.first())
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        match self.component {
            Component::Atm => {}
            Component::Lnd => args.push(format!("--sgs_frc={}/landfrac", first)),
            Component::Ocn => args.extend(["-m".to_string(), "mpas".to_string()]),
            Component::Ice => args.extend([
                "-m".to_string(),
                "mpas".to_string(),
                format!("--sgs_frc={}/timeMonthly_avg_iceAreaCell", first),
            ]),
        }

        Ok(JobCommand { setup, args })
    }

    fn produced_types(&self) -> Vec<String> {
        let mut types = vec![format!("{}{}", data_types::TS_NATIVE_PREFIX, self.component)];
        if self.config.regrids() {
            types.push(format!("{}{}", data_types::TS_REGRID_PREFIX, self.component));
        }
        types
    }

    fn produced_outputs(&self, years: YearSet) -> Vec<(String, Vec<DataFile>)> {
        let case = &self.case.name;
        let mut outputs = vec![(
            format!("{}{}", data_types::TS_NATIVE_PREFIX, self.component),
            present_files(case, self.output_files(&self.native_dir(years), years), years.start),
        )];
        if let Some(regrid) = self.regrid_dir(years) {
            outputs.push((
                format!("{}{}", data_types::TS_REGRID_PREFIX, self.component),
                present_files(case, self.output_files(&regrid, years), years.start),
            ));
        }
        outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use processflow_core::config::VariableList;
    use processflow_core::layout::OutputLayout;
    use processflow_core::registry::{FileRegistry, LocalFileRegistry};

    fn stage(root: &Path, component: Component, regrid: bool) -> TimeseriesStage {
        let case = CaseContext {
            name: "caseA".into(),
            short_name: "caseA".into(),
            native_grid: "ne30".into(),
            simulation: YearSet::new(1, 10).unwrap(),
            layout: OutputLayout::new(root),
        };
        let config = TimeseriesConfig {
            run_frequency: vec![5],
            destination_grid_name: regrid.then(|| "fv129x256".to_string()),
            regrid_map_path: regrid.then(|| PathBuf::from("/maps/ts_map.nc")),
            atm: Some(VariableList::Joined("FSNTOA, FLUT PRECC".into())),
            lnd: Some(VariableList::List(vec!["SOILWATER_10CM".into()])),
            ocn: None,
            ice: Some(VariableList::Joined("iceAreaCell".into())),
        };
        TimeseriesStage::new(case, component, config)
    }

    fn inputs(data_type: &str) -> Inputs {
        let mut inputs = Inputs::new();
        inputs.insert(
            data_type.into(),
            vec![PathBuf::from(format!("/data/{}/first.nc", data_type))],
        );
        inputs
    }

    #[test]
    fn test_atm_command_with_regrid() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = stage(tmp.path(), Component::Atm, true);
        let key = JobKey::new("caseA", stage.kind(), YearSet::new(1, 5).unwrap());
        let cmd = stage.command(&key, &inputs("atm")).unwrap();
        let joined = cmd.args.join(" ");
        assert!(joined
            .starts_with("ncclimo --input=/data/atm -v FSNTOA,FLUT,PRECC -s 1 -e 5 --ypf=5"));
        assert!(joined.contains("--map=/maps/ts_map.nc"));
        assert!(!joined.contains("sgs_frc"));
        assert_eq!(cmd.setup.len(), 2);
    }

    #[test]
    fn test_component_flags() {
        let tmp = tempfile::tempdir().unwrap();
        let lnd = stage(tmp.path(), Component::Lnd, false);
        let key = JobKey::new("caseA", lnd.kind(), YearSet::new(1, 5).unwrap());
        let args = lnd.command(&key, &inputs("lnd")).unwrap().args;
        assert!(args.contains(&"--sgs_frc=/data/lnd/first.nc/landfrac".to_string()));
        assert!(!args.contains(&"-O".to_string()));

        let ice = stage(tmp.path(), Component::Ice, false);
        let key = JobKey::new("caseA", ice.kind(), YearSet::new(1, 5).unwrap());
        let args = ice.command(&key, &inputs("ice")).unwrap().args;
        assert!(args.windows(2).any(|w| w == ["-m", "mpas"]));
        assert!(args.last().unwrap().ends_with("/timeMonthly_avg_iceAreaCell"));
    }

    #[test]
    fn test_empty_variable_list_is_a_configuration_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ocn = stage(tmp.path(), Component::Ocn, false);
        let key = JobKey::new("caseA", ocn.kind(), YearSet::new(1, 5).unwrap());
        let err = ocn.command(&key, &inputs("ocn")).unwrap_err();
        assert!(matches!(err, JobError::Configuration { .. }));
    }

    #[test]
    fn test_output_complete_accepts_both_name_forms() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = stage(tmp.path(), Component::Atm, false);
        let years = YearSet::new(1, 5).unwrap();
        let dir = stage.native_dir(years);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(variable_file("FSNTOA", years)), b"").unwrap();
        std::fs::write(dir.join("FLUT.nc"), b"").unwrap();
        assert!(!stage.output_complete(years));

        std::fs::write(dir.join(variable_file("PRECC", years)), b"").unwrap();
        assert!(stage.output_complete(years));

        let outputs = stage.produced_outputs(years);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].0, "ts_native_atm");
        assert_eq!(outputs[0].1.len(), 3);
    }

    #[test]
    fn test_completion_registers_only_its_own_set() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = stage(tmp.path(), Component::Atm, false);
        let first = YearSet::new(1, 5).unwrap();
        let second = YearSet::new(6, 10).unwrap();
        let dir = stage.native_dir(first);
        assert_eq!(dir, stage.native_dir(second));
        std::fs::create_dir_all(&dir).unwrap();
        for years in [first, second] {
            for var in ["FSNTOA", "FLUT", "PRECC"] {
                std::fs::write(dir.join(variable_file(var, years)), b"").unwrap();
            }
        }

        let mut registry = LocalFileRegistry::new();
        registry.declare("ts_native_atm", true);
        for years in [first, second] {
            for (data_type, files) in stage.produced_outputs(years) {
                registry.add_files(&data_type, files);
            }
        }

        let first_paths = registry
            .get_file_paths_by_year("caseA", first, "ts_native_atm")
            .unwrap();
        assert_eq!(first_paths.len(), 3);
        assert!(first_paths.contains(&dir.join("FLUT_000101_000512.nc")));

        let second_paths = registry
            .get_file_paths_by_year("caseA", second, "ts_native_atm")
            .unwrap();
        assert_eq!(second_paths.len(), 3);
        assert!(second_paths
            .iter()
            .all(|p| p.to_string_lossy().ends_with("_000601_001012.nc")));
    }
}
