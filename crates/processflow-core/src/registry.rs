use crate::config::DataTypeConfig;
use crate::constants::{placeholders, thresholds};
use crate::errors::RegistryError;
use crate::model::YearSet;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Present,
    Missing,
    InTransit,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Present => write!(f, "present"),
            FileStatus::Missing => write!(f, "missing"),
            FileStatus::InTransit => write!(f, "in transit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataFile {
    pub name: String,
    pub local_path: PathBuf,
    pub case: String,
    pub year: Option<u32>,
    pub month: Option<u32>,
    pub status: FileStatus,
}

impl DataFile {
    /// Entry for a file that already exists on disk.
    pub fn present(case: &str, path: &Path, year: Option<u32>) -> Self {
        Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            local_path: path.to_path_buf(),
            case: case.to_string(),
            year,
            month: None,
            status: FileStatus::Present,
        }
    }

    pub fn is_present(&self) -> bool {
        self.status == FileStatus::Present
    }
}

/// Maps (case, data type, year range) to concrete files.
pub trait FileRegistry {
    /// Every known entry for the range, whatever its status.
    fn files_in_range(
        &self,
        case: &str,
        years: YearSet,
        data_type: &str,
    ) -> Result<Vec<DataFile>, RegistryError>;

    fn add_files(&mut self, data_type: &str, files: Vec<DataFile>);

    /// Re-checks entries that were not present; returns how many appeared.
    fn refresh(&mut self) -> usize;

    /// Paths of the files present on disk; empty when the data is missing.
    fn get_file_paths_by_year(
        &self,
        case: &str,
        years: YearSet,
        data_type: &str,
    ) -> Result<Vec<PathBuf>, RegistryError> {
        Ok(self
            .files_in_range(case, years, data_type)?
            .into_iter()
            .filter(DataFile::is_present)
            .map(|f| f.local_path)
            .collect())
    }
}

#[derive(Debug, Default)]
struct TypeEntry {
    by_year: bool,
    files: Vec<DataFile>,
}

/// Registry backed by the local filesystem.
#[derive(Debug, Default)]
pub struct LocalFileRegistry {
    types: BTreeMap<String, TypeEntry>,
}

impl LocalFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a data type. Types that are not selected by year (namelists,
    /// stream files) answer every range query with all of their files.
    pub fn declare(&mut self, data_type: &str, by_year: bool) {
        self.types
            .entry(data_type.to_string())
            .or_insert_with(|| TypeEntry {
                by_year,
                files: Vec::new(),
            })
            .by_year = by_year;
    }

    /// Records every file the data type should provide for `years`.
    pub fn populate(
        &mut self,
        case: &str,
        data_type: &str,
        config: &DataTypeConfig,
        years: YearSet,
        project_path: &Path,
    ) -> usize {
        let dir = PathBuf::from(
            config
                .local_path
                .replace(placeholders::PROJECT_PATH, &project_path.to_string_lossy())
                .replace(placeholders::CASEID, case),
        );
        let has_year = config.file_format.contains(placeholders::YEAR);
        self.declare(data_type, config.monthly || has_year);

        let mut files = Vec::new();
        let mut push = |year: Option<u32>, month: Option<u32>| {
            let name = expand_file_format(&config.file_format, case, year, month);
            let local_path = dir.join(&name);
            let status = if local_path.exists() {
                FileStatus::Present
            } else {
                FileStatus::Missing
            };
            files.push(DataFile {
                name,
                local_path,
                case: case.to_string(),
                year,
                month,
                status,
            });
        };

        if config.monthly {
            for year in years.years() {
                for month in 1..=thresholds::MONTHS_PER_YEAR {
                    push(Some(year), Some(month));
                }
            }
        } else if has_year {
            for year in years.years() {
                push(Some(year), None);
            }
        } else {
            push(None, None);
        }

        let count = files.len();
        let present = files.iter().filter(|f| f.is_present()).count();
        tracing::debug!(
            "Registered {} '{}' files for {} ({} present)",
            count,
            data_type,
            case,
            present
        );
        self.add_files(data_type, files);
        count
    }

    pub fn data_types(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

pub fn expand_file_format(
    format: &str,
    case: &str,
    year: Option<u32>,
    month: Option<u32>,
) -> String {
    let mut name = format.replace(placeholders::CASEID, case);
    if let Some(year) = year {
        name = name.replace(placeholders::YEAR, &format!("{:04}", year));
    }
    if let Some(month) = month {
        name = name.replace(placeholders::MONTH, &format!("{:02}", month));
    }
    name
}

impl FileRegistry for LocalFileRegistry {
    fn files_in_range(
        &self,
        case: &str,
        years: YearSet,
        data_type: &str,
    ) -> Result<Vec<DataFile>, RegistryError> {
        let entry = self
            .types
            .get(data_type)
            .ok_or_else(|| RegistryError::UnknownDataType(data_type.to_string()))?;
        Ok(entry
            .files
            .iter()
            .filter(|f| f.case == case)
            .filter(|f| !entry.by_year || f.year.is_some_and(|y| years.contains(y)))
            .cloned()
            .collect())
    }

    fn add_files(&mut self, data_type: &str, files: Vec<DataFile>) {
        let entry = self
            .types
            .entry(data_type.to_string())
            .or_insert_with(|| TypeEntry {
                by_year: true,
                files: Vec::new(),
            });
        for file in files {
            match entry
                .files
                .iter_mut()
                .find(|f| f.local_path == file.local_path && f.case == file.case)
            {
                Some(existing) => *existing = file,
                None => entry.files.push(file),
            }
        }
    }

    fn refresh(&mut self) -> usize {
        let mut appeared = 0;
        for file in self.types.values_mut().flat_map(|e| e.files.iter_mut()) {
            if file.status != FileStatus::Present && file.local_path.exists() {
                file.status = FileStatus::Present;
                appeared += 1;
            }
        }
        if appeared > 0 {
            tracing::debug!("{} registered files appeared on disk", appeared);
        }
        appeared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn atm_config() -> DataTypeConfig {
        DataTypeConfig {
            file_format: "CASEID.cam.h0.YEAR-MONTH.nc".into(),
            local_path: "PROJECT_PATH/input/CASEID/atm".into(),
            monthly: true,
        }
    }

    #[test]
    fn test_expand_file_format() {
        assert_eq!(
            expand_file_format("CASEID.cam.h0.YEAR-MONTH.nc", "caseA", Some(3), Some(7)),
            "caseA.cam.h0.0003-07.nc"
        );
        assert_eq!(
            expand_file_format("streams.ocean", "caseA", None, None),
            "streams.ocean"
        );
    }

    #[test]
    fn test_monthly_files_are_filtered_by_year() {
        let dir = tempfile::tempdir().unwrap();
        let atm_dir = dir.path().join("input/caseA/atm");
        fs::create_dir_all(&atm_dir).unwrap();
        for month in 1..=12 {
            fs::write(atm_dir.join(format!("caseA.cam.h0.0002-{:02}.nc", month)), b"").unwrap();
        }

        let mut registry = LocalFileRegistry::new();
        let years = YearSet::new(1, 3).unwrap();
        let count = registry.populate("caseA", "atm", &atm_config(), years, dir.path());
        assert_eq!(count, 36);

        let year_two = YearSet::new(2, 2).unwrap();
        let paths = registry.get_file_paths_by_year("caseA", year_two, "atm").unwrap();
        assert_eq!(paths.len(), 12);

        let year_one = YearSet::new(1, 1).unwrap();
        assert!(registry
            .get_file_paths_by_year("caseA", year_one, "atm")
            .unwrap()
            .is_empty());
        assert_eq!(registry.files_in_range("caseA", year_one, "atm").unwrap().len(), 12);
    }

    #[test]
    fn test_non_year_types_ignore_range() {
        let dir = tempfile::tempdir().unwrap();
        let mpas = dir.path().join("input/caseA/mpas");
        fs::create_dir_all(&mpas).unwrap();
        fs::write(mpas.join("streams.ocean"), b"").unwrap();

        let config = DataTypeConfig {
            file_format: "streams.ocean".into(),
            local_path: "PROJECT_PATH/input/CASEID/mpas".into(),
            monthly: false,
        };
        let mut registry = LocalFileRegistry::new();
        registry.populate(
            "caseA",
            "streams.ocean",
            &config,
            YearSet::new(1, 10).unwrap(),
            dir.path(),
        );

        let far = YearSet::new(50, 60).unwrap();
        let paths = registry.get_file_paths_by_year("caseA", far, "streams.ocean").unwrap();
        assert_eq!(paths, vec![mpas.join("streams.ocean")]);
    }

    #[test]
    fn test_refresh_picks_up_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = LocalFileRegistry::new();
        let years = YearSet::new(1, 1).unwrap();
        registry.populate("caseA", "atm", &atm_config(), years, dir.path());
        assert_eq!(registry.refresh(), 0);

        let atm_dir = dir.path().join("input/caseA/atm");
        fs::create_dir_all(&atm_dir).unwrap();
        fs::write(atm_dir.join("caseA.cam.h0.0001-01.nc"), b"").unwrap();

        assert_eq!(registry.refresh(), 1);
        assert_eq!(registry.get_file_paths_by_year("caseA", years, "atm").unwrap().len(), 1);
    }

    #[test]
    fn test_add_files_replaces_existing_entries() {
        let mut registry = LocalFileRegistry::new();
        let path = PathBuf::from("/out/caseA_ANN_000101_000512_climo.nc");
        let mut file = DataFile::present("caseA", &path, Some(1));
        file.status = FileStatus::InTransit;
        registry.add_files("climo_regrid", vec![file]);
        registry.add_files("climo_regrid", vec![DataFile::present("caseA", &path, Some(1))]);

        let years = YearSet::new(1, 5).unwrap();
        let files = registry.files_in_range("caseA", years, "climo_regrid").unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].is_present());
    }

    #[test]
    fn test_unknown_data_type_is_an_error() {
        let registry = LocalFileRegistry::new();
        let err = registry
            .get_file_paths_by_year("caseA", YearSet::new(1, 1).unwrap(), "ocn")
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownDataType(_)));
    }
}
