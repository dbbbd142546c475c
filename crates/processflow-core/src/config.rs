use crate::errors::{ConfigError, DomainError};
use crate::model::{Component, JobKind, ManagerKind, YearSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ALL: &str = "all";

pub const APRIME_DATA_TYPES: [&str; 10] = [
    "atm",
    "ocn",
    "ice",
    "streams.ocean",
    "streams.cice",
    "rest",
    "mpas-o_in",
    "mpas-cice_in",
    "meridionalHeatTransport",
    "mpascice.rst",
];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub global: GlobalConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub simulations: SimulationsConfig,
    #[serde(default)]
    pub data_types: BTreeMap<String, DataTypeConfig>,
    #[serde(default)]
    pub post_processing: PostProcessingConfig,
    #[serde(default)]
    pub diags: DiagsConfig,
    #[serde(default)]
    pub resources: Option<Resources>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    pub project_path: PathBuf,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub native_grid_cleanup: bool,
    #[serde(default)]
    pub dryrun: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub manager: ManagerKind,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,
    #[serde(default)]
    pub max_runtime_secs: Option<u64>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub partition: Option<String>,
}

fn default_poll_interval() -> u64 {
    10
}

fn default_query_timeout() -> u64 {
    30
}

fn default_max_iterations() -> u64 {
    8640
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            manager: ManagerKind::default(),
            poll_interval_secs: default_poll_interval(),
            query_timeout_secs: default_query_timeout(),
            max_iterations: default_max_iterations(),
            max_runtime_secs: None,
            account: None,
            partition: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,
}

fn default_max_files() -> usize {
    20
}

fn default_max_age_days() -> u64 {
    14
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_age_days: default_max_age_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationsConfig {
    pub start_year: u32,
    pub end_year: u32,
    #[serde(default)]
    pub cases: BTreeMap<String, CaseConfig>,
}

impl SimulationsConfig {
    pub fn year_range(&self) -> Result<YearSet, ConfigError> {
        YearSet::new(self.start_year, self.end_year).ok_or_else(|| {
            DomainError::InvalidYearRange {
                start: self.start_year,
                end: self.end_year,
            }
            .into()
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaseConfig {
    #[serde(default)]
    pub short_name: Option<String>,
    pub native_grid_name: String,
    #[serde(default = "default_all")]
    pub job_types: Vec<String>,
    #[serde(default = "default_all")]
    pub data_types: Vec<String>,
}

fn default_all() -> Vec<String> {
    vec![ALL.to_string()]
}

impl CaseConfig {
    pub fn short_name_or<'a>(&'a self, case: &'a str) -> &'a str {
        self.short_name.as_deref().unwrap_or(case)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataTypeConfig {
    pub file_format: String,
    pub local_path: String,
    #[serde(default)]
    pub monthly: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PostProcessingConfig {
    #[serde(default)]
    pub climo: Option<ClimoConfig>,
    #[serde(default)]
    pub timeseries: Option<TimeseriesConfig>,
    #[serde(default)]
    pub regrid: BTreeMap<String, RegridConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClimoConfig {
    pub run_frequency: Vec<u32>,
    pub destination_grid_name: String,
    pub regrid_map_path: PathBuf,
}

/// Either `"T TS PRECC"` / `"T,TS"` or a TOML array of names.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum VariableList {
    Joined(String),
    List(Vec<String>),
}

impl VariableList {
    pub fn names(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            VariableList::Joined(s) => vec![s.as_str()],
            VariableList::List(items) => items.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .flat_map(|s| s.split(|c: char| c == ',' || c.is_whitespace()))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeseriesConfig {
    pub run_frequency: Vec<u32>,
    #[serde(default)]
    pub destination_grid_name: Option<String>,
    #[serde(default)]
    pub regrid_map_path: Option<PathBuf>,
    #[serde(default)]
    pub atm: Option<VariableList>,
    #[serde(default)]
    pub lnd: Option<VariableList>,
    #[serde(default)]
    pub ocn: Option<VariableList>,
    #[serde(default)]
    pub ice: Option<VariableList>,
}

impl TimeseriesConfig {
    pub fn variables(&self, component: Component) -> Vec<String> {
        let list = match component {
            Component::Atm => &self.atm,
            Component::Lnd => &self.lnd,
            Component::Ocn => &self.ocn,
            Component::Ice => &self.ice,
        };
        list.as_ref().map(VariableList::names).unwrap_or_default()
    }

    pub fn regrids(&self) -> bool {
        self.destination_grid_name.is_some() && self.regrid_map_path.is_some()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegridConfig {
    pub run_frequency: Vec<u32>,
    pub regrid_map_path: PathBuf,
    pub destination_grid_name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DiagsConfig {
    #[serde(default)]
    pub e3sm_diags: Option<E3smDiagsConfig>,
    #[serde(default)]
    pub aprime: Option<AprimeConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct E3smDiagsConfig {
    pub run_frequency: Vec<u32>,
    pub reference_data_path: PathBuf,
    #[serde(default)]
    pub compare_previous_set: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AprimeConfig {
    pub run_frequency: Vec<u32>,
    pub aprime_code_path: PathBuf,
    pub test_atm_res: String,
    pub test_mpas_mesh_name: String,
    #[serde(default = "default_aprime_data_types")]
    pub data_types: Vec<String>,
}

fn default_aprime_data_types() -> Vec<String> {
    APRIME_DATA_TYPES.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Resources {
    #[serde(default)]
    pub defaults: ResourceDefaults,
    #[serde(default)]
    pub rules: Vec<ResourceRule>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ResourceDefaults {
    pub partition: Option<String>,
    pub nodes: Option<u32>,
    pub ntasks: Option<u32>,
    pub time: Option<String>,
    #[serde(default)]
    pub extra_opts: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ResourceRule {
    pub job_glob: Option<String>,
    pub partition: Option<String>,
    pub nodes: Option<u32>,
    pub ntasks: Option<u32>,
    pub time: Option<String>,
    #[serde(default)]
    pub extra_opts: Vec<String>,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.expand_paths()?;
        config.validate()?;
        Ok(config)
    }

    pub fn output_root(&self) -> PathBuf {
        self.global.project_path.join("output")
    }

    pub fn case(&self, name: &str) -> Result<&CaseConfig, ConfigError> {
        self.simulations
            .cases
            .get(name)
            .ok_or_else(|| DomainError::UnknownCase(name.to_string()).into())
    }

    /// Job types enabled for a case, with `"all"` expanded to every
    /// configured type, in declared order.
    pub fn job_kinds(&self, case: &str) -> Result<Vec<JobKind>, ConfigError> {
        let case_config = self.case(case)?;
        let mut kinds = Vec::new();
        for name in &case_config.job_types {
            if name == ALL {
                kinds.extend(self.configured_job_kinds());
                continue;
            }
            let kind = JobKind::from_str(name).map_err(|_| DomainError::UnknownJobType {
                case: case.to_string(),
                name: name.clone(),
            })?;
            kinds.push(kind);
        }
        kinds.sort_by_key(|k| k.declared_order());
        kinds.dedup();
        Ok(kinds)
    }

    fn configured_job_kinds(&self) -> Vec<JobKind> {
        let mut kinds = Vec::new();
        if self.post_processing.climo.is_some() {
            kinds.push(JobKind::Climo);
        }
        if let Some(ts) = &self.post_processing.timeseries {
            for component in Component::ALL {
                if !ts.variables(component).is_empty() {
                    kinds.push(JobKind::Timeseries(component));
                }
            }
        }
        for name in self.post_processing.regrid.keys() {
            if let Ok(component) = Component::from_str(name) {
                kinds.push(JobKind::Regrid(component));
            }
        }
        if self.diags.e3sm_diags.is_some() {
            kinds.push(JobKind::E3smDiags);
        }
        if self.diags.aprime.is_some() {
            kinds.push(JobKind::Aprime);
        }
        kinds
    }

    pub fn regrid_config(&self, component: Component) -> Option<&RegridConfig> {
        self.post_processing
            .regrid
            .iter()
            .find(|(name, _)| Component::from_str(name).ok() == Some(component))
            .map(|(_, cfg)| cfg)
    }

    pub fn run_frequencies(&self, kind: JobKind) -> Vec<u32> {
        let freqs = match kind {
            JobKind::Climo => self.post_processing.climo.as_ref().map(|c| &c.run_frequency),
            JobKind::Timeseries(_) => self
                .post_processing
                .timeseries
                .as_ref()
                .map(|c| &c.run_frequency),
            JobKind::Regrid(c) => self.regrid_config(c).map(|c| &c.run_frequency),
            JobKind::E3smDiags => self.diags.e3sm_diags.as_ref().map(|c| &c.run_frequency),
            JobKind::Aprime => self.diags.aprime.as_ref().map(|c| &c.run_frequency),
        };
        freqs.cloned().unwrap_or_default()
    }

    /// Data types in play for a case, with `"all"` expanded to every
    /// configured type.
    pub fn case_data_types(&self, case: &str) -> Result<Vec<String>, ConfigError> {
        let case_config = self.case(case)?;
        if case_config.data_types.iter().any(|d| d == ALL) {
            return Ok(self.data_types.keys().cloned().collect());
        }
        Ok(case_config.data_types.clone())
    }

    fn expand_paths(&mut self) -> Result<(), ConfigError> {
        self.global.project_path = expand_path("global.project_path", &self.global.project_path)?;
        if let Some(climo) = &mut self.post_processing.climo {
            climo.regrid_map_path =
                expand_path("post_processing.climo.regrid_map_path", &climo.regrid_map_path)?;
        }
        if let Some(ts) = &mut self.post_processing.timeseries {
            if let Some(map) = &ts.regrid_map_path {
                ts.regrid_map_path =
                    Some(expand_path("post_processing.timeseries.regrid_map_path", map)?);
            }
        }
        for (name, regrid) in self.post_processing.regrid.iter_mut() {
            let key = format!("post_processing.regrid.{}.regrid_map_path", name);
            regrid.regrid_map_path = expand_path(&key, &regrid.regrid_map_path)?;
        }
        if let Some(diags) = &mut self.diags.e3sm_diags {
            diags.reference_data_path =
                expand_path("diags.e3sm_diags.reference_data_path", &diags.reference_data_path)?;
        }
        if let Some(aprime) = &mut self.diags.aprime {
            aprime.aprime_code_path =
                expand_path("diags.aprime.aprime_code_path", &aprime.aprime_code_path)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.simulations.year_range()?;
        if self.simulations.cases.is_empty() {
            return Err(invalid("simulations.cases", "at least one case is required"));
        }
        if self.scheduler.poll_interval_secs == 0 {
            return Err(invalid("scheduler.poll_interval_secs", "must be positive"));
        }
        for (name, regrid) in &self.post_processing.regrid {
            Component::from_str(name)
                .map_err(|e| invalid(&format!("post_processing.regrid.{}", name), &e.to_string()))?;
            check_frequencies(&format!("post_processing.regrid.{}", name), &regrid.run_frequency)?;
        }
        if let Some(climo) = &self.post_processing.climo {
            check_frequencies("post_processing.climo", &climo.run_frequency)?;
        }
        if let Some(ts) = &self.post_processing.timeseries {
            check_frequencies("post_processing.timeseries", &ts.run_frequency)?;
        }
        if let Some(diags) = &self.diags.e3sm_diags {
            check_frequencies("diags.e3sm_diags", &diags.run_frequency)?;
        }
        if let Some(aprime) = &self.diags.aprime {
            check_frequencies("diags.aprime", &aprime.run_frequency)?;
        }

        for case in self.simulations.cases.keys() {
            for kind in self.job_kinds(case)? {
                self.check_job_kind_configured(case, kind)?;
            }
            for data_type in self.case_data_types(case)? {
                if !self.data_types.contains_key(&data_type) {
                    return Err(DomainError::UnknownDataType(data_type).into());
                }
            }
        }
        Ok(())
    }

    fn check_job_kind_configured(&self, case: &str, kind: JobKind) -> Result<(), ConfigError> {
        let key = format!("simulations.cases.{}.job_types", case);
        let configured = match kind {
            JobKind::Climo => self.post_processing.climo.is_some(),
            JobKind::Timeseries(c) => match &self.post_processing.timeseries {
                Some(ts) if ts.variables(c).is_empty() => {
                    return Err(DomainError::EmptyVariableList(kind.to_string()).into())
                }
                Some(_) => true,
                None => false,
            },
            JobKind::Regrid(c) => self.regrid_config(c).is_some(),
            JobKind::E3smDiags => self.diags.e3sm_diags.is_some(),
            JobKind::Aprime => self.diags.aprime.is_some(),
        };
        if configured {
            Ok(())
        } else {
            Err(invalid(
                &key,
                &format!("'{}' is enabled but has no configuration section", kind),
            ))
        }
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn check_frequencies(key: &str, freqs: &[u32]) -> Result<(), ConfigError> {
    if freqs.is_empty() || freqs.contains(&0) {
        return Err(invalid(
            &format!("{}.run_frequency", key),
            "must list one or more positive set lengths",
        ));
    }
    Ok(())
}

pub fn expand_path(key: &str, path: &Path) -> Result<PathBuf, ConfigError> {
    let raw = path.to_string_lossy();
    shellexpand::full(&raw)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|e| invalid(key, &e.to_string()))
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("processflow");
    xdg_dirs
        .get_config_home()
        .map(|home| home.join("config.toml"))
        .ok_or(ConfigError::ConfigHomeNotFound)
}

pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound(path));
    }
    let content = fs_err::read_to_string(&path)?;
    tracing::debug!("Loaded configuration from {}", path.display());
    Config::from_toml_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[global]
project_path = "/p/project"
email = "someone@example.com"

[scheduler]
manager = "slurm"
poll_interval_secs = 5

[simulations]
start_year = 1
end_year = 10

[simulations.cases."20180129.DECKv1b_piControl"]
short_name = "piControl"
native_grid_name = "ne30"
job_types = ["all"]
data_types = ["atm", "lnd"]

[data_types.atm]
file_format = "CASEID.cam.h0.YEAR-MONTH.nc"
local_path = "PROJECT_PATH/input/CASEID/atm"
monthly = true

[data_types.lnd]
file_format = "CASEID.clm2.h0.YEAR-MONTH.nc"
local_path = "PROJECT_PATH/input/CASEID/lnd"
monthly = true

[post_processing.climo]
run_frequency = [5]
destination_grid_name = "fv129x256"
regrid_map_path = "/maps/map_ne30np4_to_fv129x256_aave.nc"

[post_processing.timeseries]
run_frequency = [10]
atm = "FSNTOA, FLUT  PRECC"
lnd = ["SOILWATER_10CM", "QOVER"]

[diags.e3sm_diags]
run_frequency = [5]
reference_data_path = "/refs/obs"
compare_previous_set = true

[[resources.rules]]
job_glob = "climo-*"
partition = "debug"
"#;

    #[test]
    fn test_sample_config_parses() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.scheduler.poll_interval_secs, 5);
        assert_eq!(config.scheduler.query_timeout_secs, 30);
        assert_eq!(config.scheduler.max_iterations, 8640);
        assert_eq!(config.output_root(), PathBuf::from("/p/project/output"));
        let case = config.case("20180129.DECKv1b_piControl").unwrap();
        assert_eq!(case.short_name_or("x"), "piControl");
    }

    #[test]
    fn test_all_expands_to_configured_job_kinds() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let kinds = config.job_kinds("20180129.DECKv1b_piControl").unwrap();
        assert_eq!(
            kinds,
            vec![
                JobKind::Climo,
                JobKind::Timeseries(Component::Atm),
                JobKind::Timeseries(Component::Lnd),
                JobKind::E3smDiags,
            ]
        );
    }

    #[test]
    fn test_variable_lists_split_on_commas_and_spaces() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let ts = config.post_processing.timeseries.as_ref().unwrap();
        assert_eq!(ts.variables(Component::Atm), vec!["FSNTOA", "FLUT", "PRECC"]);
        assert_eq!(ts.variables(Component::Lnd), vec!["SOILWATER_10CM", "QOVER"]);
        assert!(ts.variables(Component::Ocn).is_empty());
    }

    #[test]
    fn test_unknown_case_is_reported() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let err = config.case("missing").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_enabled_type_without_section_is_rejected() {
        let content = SAMPLE.replace("job_types = [\"all\"]", "job_types = [\"aprime\"]");
        let err = Config::from_toml_str(&content).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "got {:?}", err);
    }

    #[test]
    fn test_unknown_data_type_is_rejected() {
        let content = SAMPLE.replace("data_types = [\"atm\", \"lnd\"]", "data_types = [\"ocn\"]");
        let err = Config::from_toml_str(&content).unwrap_err();
        assert!(err.to_string().contains("ocn"));
    }

    #[test]
    fn test_inverted_year_range_is_rejected() {
        let content = SAMPLE.replace("end_year = 10", "end_year = 0");
        assert!(Config::from_toml_str(&content).is_err());
    }

    #[test]
    fn test_zero_run_frequency_is_rejected() {
        let content = SAMPLE.replace("run_frequency = [10]", "run_frequency = [0]");
        let err = Config::from_toml_str(&content).unwrap_err();
        assert!(err.to_string().contains("run_frequency"));
    }

    #[test]
    fn test_load_config_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigNotFound(_)));
    }
}
