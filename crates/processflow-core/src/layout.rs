use crate::constants::dirs;
use crate::errors::ConfigError;
use crate::model::{Component, JobKey, YearSet};
use std::path::{Path, PathBuf};

/// On-disk layout of everything a run produces under `<project>/output`.
///
/// The directory a job writes to encodes its type and year span, which is
/// what makes a restarted run find its earlier work.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pp(&self) -> PathBuf {
        self.root.join(dirs::PP)
    }

    pub fn grid_dir(&self, grid: &str) -> PathBuf {
        self.pp().join(grid)
    }

    pub fn climo_dir(&self, grid: &str, short_name: &str, years: YearSet) -> PathBuf {
        self.grid_dir(grid)
            .join(short_name)
            .join(dirs::CLIMO)
            .join(format!("{}yr", years.length()))
    }

    pub fn ts_dir(
        &self,
        grid: &str,
        short_name: &str,
        years: YearSet,
        component: Component,
    ) -> PathBuf {
        self.pp()
            .join(dirs::TS)
            .join(short_name)
            .join(grid)
            .join(format!("{}yr", years.length()))
            .join(component.as_str())
    }

    pub fn regrid_dir(
        &self,
        grid: &str,
        short_name: &str,
        component: Component,
        years: YearSet,
    ) -> PathBuf {
        self.grid_dir(grid)
            .join(short_name)
            .join(dirs::REGRID)
            .join(component.as_str())
            .join(years.dir_label())
    }

    pub fn diags_dir(&self, short_name: &str, kind: &str, years: YearSet) -> PathBuf {
        self.root
            .join(dirs::DIAGS)
            .join(short_name)
            .join(kind)
            .join(years.dir_label())
    }

    /// Staging area for jobs that need their inputs arranged in a fixed tree.
    pub fn input_dir(&self, short_name: &str, kind: &str, years: YearSet) -> PathBuf {
        self.root
            .join(dirs::INPUT)
            .join(short_name)
            .join(kind)
            .join(years.dir_label())
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join(dirs::SCRIPTS)
    }

    pub fn script_path(&self, key: &JobKey) -> PathBuf {
        self.scripts_dir().join(format!("{}.sh", key))
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join(dirs::TMP)
    }

    /// Creates the root and confirms a file can be written there.
    pub fn ensure_writable(&self) -> Result<(), ConfigError> {
        let unwritable = |source| ConfigError::OutputRootUnwritable {
            path: self.root.clone(),
            source,
        };
        fs_err::create_dir_all(&self.root).map_err(unwritable)?;
        let marker = self.root.join(".processflow-write-check");
        fs_err::write(&marker, b"").map_err(unwritable)?;
        fs_err::remove_file(&marker).map_err(unwritable)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobKind;

    fn years() -> YearSet {
        YearSet::new(1, 5).unwrap()
    }

    #[test]
    fn test_climo_dir_encodes_set_length() {
        let layout = OutputLayout::new("/p/output");
        assert_eq!(
            layout.climo_dir("ne30", "piControl", years()),
            PathBuf::from("/p/output/pp/ne30/piControl/climo/5yr")
        );
    }

    #[test]
    fn test_ts_and_regrid_dirs() {
        let layout = OutputLayout::new("/p/output");
        assert_eq!(
            layout.ts_dir("fv129x256", "piControl", years(), Component::Lnd),
            PathBuf::from("/p/output/pp/ts/piControl/fv129x256/5yr/lnd")
        );
        assert_eq!(
            layout.regrid_dir("fv129x256", "piControl", Component::Atm, years()),
            PathBuf::from("/p/output/pp/fv129x256/piControl/regrid/atm/0001_0005")
        );
    }

    #[test]
    fn test_script_path_uses_job_key() {
        let layout = OutputLayout::new("/p/output");
        let key = JobKey::new("caseA", JobKind::Climo, years());
        assert_eq!(
            layout.script_path(&key),
            PathBuf::from("/p/output/scripts/climo-0001-0005-caseA.sh")
        );
    }

    #[test]
    fn test_ensure_writable_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path().join("nested/output"));
        layout.ensure_writable().unwrap();
        assert!(layout.root().is_dir());
        assert_eq!(std::fs::read_dir(layout.root()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_writable_reports_blocked_root() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let layout = OutputLayout::new(blocker.join("output"));
        let err = layout.ensure_writable().unwrap_err();
        assert!(matches!(err, ConfigError::OutputRootUnwritable { .. }));
    }
}
