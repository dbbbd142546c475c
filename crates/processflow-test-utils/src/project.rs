use processflow_core::config::Config;
use processflow_core::layout::OutputLayout;
use processflow_core::model::YearSet;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

pub const CASE: &str = "caseA";
pub const NATIVE_GRID: &str = "ne30";
pub const DEST_GRID: &str = "fv129x256";

const CLIMO_PERIODS: [&str; 17] = [
    "01", "02", "03", "04", "05", "06", "07", "08", "09", "10", "11", "12", "DJF", "MAM", "JJA",
    "SON", "ANN",
];

/// A throwaway project directory with its own config and cache homes.
pub struct TestProject {
    pub _temp_dir: tempfile::TempDir,
    pub root: PathBuf,
    pub project_path: PathBuf,
    pub config_home: PathBuf,
    pub cache_home: PathBuf,
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

impl TestProject {
    pub fn new() -> Self {
        let temp_dir = tempfile::Builder::new()
            .prefix("processflow-test-")
            .tempdir()
            .expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        let project_path = root.join("project");
        let config_home = root.join("config");
        let cache_home = root.join("cache");
        for dir in [&project_path, &config_home, &cache_home] {
            fs::create_dir_all(dir).expect("Failed to create test dir");
        }
        Self {
            _temp_dir: temp_dir,
            root,
            project_path,
            config_home,
            cache_home,
        }
    }

    /// One case with climatologies every five years, polling as fast as
    /// the scheduler allows.
    pub fn base_config(&self, start: u32, end: u32) -> String {
        format!(
            r#"
[global]
project_path = "{project}"

[scheduler]
manager = "slurm"
poll_interval_secs = 0
max_iterations = 20

[simulations]
start_year = {start}
end_year = {end}

[simulations.cases.{case}]
native_grid_name = "{native}"
data_types = ["atm"]

[data_types.atm]
file_format = "CASEID.cam.h0.YEAR-MONTH.nc"
local_path = "PROJECT_PATH/input/CASEID/atm"
monthly = true

[post_processing.climo]
run_frequency = [5]
destination_grid_name = "{dest}"
regrid_map_path = "/maps/map.nc"
"#,
            project = self.project_path.display(),
            case = CASE,
            native = NATIVE_GRID,
            dest = DEST_GRID,
        )
    }

    /// Adds an e3sm_diags section on top of [`Self::base_config`].
    pub fn config_with_diags(&self, start: u32, end: u32) -> String {
        format!(
            "{}\n[diags.e3sm_diags]\nrun_frequency = [5]\nreference_data_path = \"/obs\"\n",
            self.base_config(start, end)
        )
    }

    pub fn write_config(&self, content: &str) -> PathBuf {
        let path = self.root.join("processflow.toml");
        fs::write(&path, content).expect("Failed to write config");
        path
    }

    pub fn config(&self, content: &str) -> Config {
        Config::from_toml_str(content).expect("Test config must parse")
    }

    pub fn output_root(&self) -> PathBuf {
        self.project_path.join("output")
    }

    pub fn layout(&self) -> OutputLayout {
        OutputLayout::new(self.output_root())
    }

    pub fn atm_dir(&self, case: &str) -> PathBuf {
        self.project_path.join("input").join(case).join("atm")
    }

    /// Writes twelve monthly atmosphere files for every year in `years`.
    pub fn write_atm_years(&self, case: &str, years: RangeInclusive<u32>) {
        let dir = self.atm_dir(case);
        fs::create_dir_all(&dir).expect("Failed to create atm dir");
        for year in years {
            for month in 1..=12 {
                let name = format!("{}.cam.h0.{:04}-{:02}.nc", case, year, month);
                fs::write(dir.join(name), b"").expect("Failed to write atm file");
            }
        }
    }

    /// Native and regridded climatology directories for a set of [`CASE`].
    pub fn climo_dirs(&self, years: YearSet) -> (PathBuf, PathBuf) {
        let layout = self.layout();
        (
            layout.climo_dir(NATIVE_GRID, CASE, years),
            layout.climo_dir(DEST_GRID, CASE, years),
        )
    }

    pub fn write_climo_outputs(&self, years: YearSet) {
        let (native, regrid) = self.climo_dirs(years);
        write_climo_files(&native, CASE, years);
        write_climo_files(&regrid, CASE, years);
    }

    pub fn diags_viewer(&self, years: YearSet) -> PathBuf {
        self.layout()
            .diags_dir(CASE, "e3sm_diags", years)
            .join("viewer")
            .join("index.html")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.layout().scripts_dir()
    }
}

/// Writes a full set of monthly, seasonal and annual climatology files.
pub fn write_climo_files(dir: &Path, case: &str, years: YearSet) {
    fs::create_dir_all(dir).expect("Failed to create climo dir");
    for period in CLIMO_PERIODS {
        let name = format!(
            "{}_{}_{:04}01_{:04}12_climo.nc",
            case, period, years.start, years.end
        );
        fs::write(dir.join(name), b"").expect("Failed to write climo file");
    }
}

pub fn write_file(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(path, b"<html></html>").expect("Failed to write file");
}
