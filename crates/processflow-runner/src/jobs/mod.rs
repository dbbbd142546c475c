use processflow_client::resources::resolve_for_job;
use processflow_client::script::BatchScript;
use processflow_client::{ManagerError, ResourceManager};
use processflow_core::config::{Config, Resources, SchedulerConfig};
use processflow_core::engine::DependencyRule;
use processflow_core::errors::{ConfigError, DomainError, JobError};
use processflow_core::event_log::{EventLog, Severity};
use processflow_core::layout::OutputLayout;
use processflow_core::model::{Component, ExternalJobId, JobKey, JobKind, JobStatus, YearSet};
use processflow_core::registry::{DataFile, FileRegistry};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub mod aprime;
pub mod climo;
pub mod e3sm_diags;
pub mod regrid;
pub mod timeseries;

/// Resolved input paths, keyed by data type.
pub type Inputs = BTreeMap<String, Vec<PathBuf>>;

/// An input a job needs from outside its own year set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraInput {
    pub data_type: String,
    pub years: YearSet,
}

/// What goes into the body of a job's batch script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobCommand {
    pub setup: Vec<String>,
    pub args: Vec<String>,
}

/// Case-level facts every stage of that case shares.
#[derive(Debug, Clone)]
pub struct CaseContext {
    pub name: String,
    pub short_name: String,
    pub native_grid: String,
    pub simulation: YearSet,
    pub layout: OutputLayout,
}

/// The per-type half of a job. `Job` owns the lifecycle and calls into this
/// for everything that differs between climatologies, time series, regridding
/// and the diagnostics.
pub trait Stage {
    fn kind(&self) -> JobKind;

    /// Data types read over the job's own year set.
    fn data_required(&self) -> Vec<String>;

    fn extra_inputs(&self, _years: YearSet) -> Vec<ExtraInput> {
        Vec::new()
    }

    fn dependency_rules(&self) -> Vec<DependencyRule> {
        Vec::new()
    }

    fn output_dirs(&self, years: YearSet) -> Vec<PathBuf>;

    /// Inspects existing output only. Safe to call at any point.
    fn output_complete(&self, years: YearSet) -> bool;

    /// Filesystem preparation that must happen before submission.
    fn prepare(&self, _key: &JobKey, _inputs: &Inputs) -> Result<(), JobError> {
        Ok(())
    }

    fn command(&self, key: &JobKey, inputs: &Inputs) -> Result<JobCommand, JobError>;

    /// Data types this stage registers on completion.
    fn produced_types(&self) -> Vec<String> {
        Vec::new()
    }

    fn produced_outputs(&self, _years: YearSet) -> Vec<(String, Vec<DataFile>)> {
        Vec::new()
    }
}

pub fn build_stage(
    kind: JobKind,
    config: &Config,
    case: &CaseContext,
) -> Result<Box<dyn Stage>, ConfigError> {
    let missing = |section: &str| {
        ConfigError::from(DomainError::MissingDependency {
            job: format!("{}-{}", kind, case.name),
            requires: section.to_string(),
        })
    };
    let stage: Box<dyn Stage> = match kind {
        JobKind::Climo => {
            let cfg = config
                .post_processing
                .climo
                .clone()
                .ok_or_else(|| missing("post_processing.climo"))?;
            Box::new(climo::ClimoStage::new(case.clone(), cfg))
        }
        JobKind::Timeseries(component) => {
            let cfg = config
                .post_processing
                .timeseries
                .clone()
                .ok_or_else(|| missing("post_processing.timeseries"))?;
            Box::new(timeseries::TimeseriesStage::new(case.clone(), component, cfg))
        }
        JobKind::Regrid(component) => {
            let cfg = config
                .regrid_config(component)
                .cloned()
                .ok_or_else(|| missing(&format!("post_processing.regrid.{}", component)))?;
            Box::new(regrid::RegridStage::new(case.clone(), component, cfg))
        }
        JobKind::E3smDiags => {
            let cfg = config
                .diags
                .e3sm_diags
                .clone()
                .ok_or_else(|| missing("diags.e3sm_diags"))?;
            let climo = config
                .post_processing
                .climo
                .clone()
                .ok_or_else(|| missing("post_processing.climo"))?;
            Box::new(e3sm_diags::E3smDiagsStage::new(case.clone(), cfg, climo))
        }
        JobKind::Aprime => {
            let cfg = config
                .diags
                .aprime
                .clone()
                .ok_or_else(|| missing("diags.aprime"))?;
            Box::new(aprime::AprimeStage::new(case.clone(), cfg))
        }
    };
    Ok(stage)
}

/// Files directly inside `dir` whose name matches `pattern`, sorted.
pub(crate) fn list_matching(dir: &Path, pattern: &Regex) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() || e.file_type().is_symlink())
        .filter(|e| pattern.is_match(&e.file_name().to_string_lossy()))
        .map(|e| e.into_path())
        .collect();
    found.sort();
    found
}

pub(crate) fn present_files(case: &str, paths: Vec<PathBuf>, year: u32) -> Vec<DataFile> {
    paths
        .iter()
        .map(|p| DataFile::present(case, p, Some(year)))
        .collect()
}

/// Directory holding the first resolved file of `data_type`.
pub(crate) fn input_dir(
    key: &JobKey,
    inputs: &Inputs,
    data_type: &str,
) -> Result<PathBuf, JobError> {
    inputs
        .get(data_type)
        .and_then(|paths| paths.first())
        .and_then(|p| p.parent())
        .map(Path::to_path_buf)
        .ok_or_else(|| JobError::Configuration {
            job: key.to_string(),
            data_type: data_type.to_string(),
        })
}

pub(crate) fn component_data_type(component: Component) -> String {
    component.as_str().to_string()
}

pub(crate) fn mkdir_line(dir: &Path) -> String {
    format!(
        "mkdir -p {}",
        processflow_client::script::shell_quote(&dir.to_string_lossy())
    )
}

/// Everything `execute` needs from the run that owns the job.
pub struct ExecContext<'a> {
    pub manager: &'a dyn ResourceManager,
    pub registry: &'a dyn FileRegistry,
    pub layout: &'a OutputLayout,
    pub scheduler: &'a SchedulerConfig,
    pub resources: Option<&'a Resources>,
}

/// One unit of work: a stage applied to a case over a year set.
pub struct Job {
    key: JobKey,
    status: JobStatus,
    job_id: Option<ExternalJobId>,
    depends_on: Vec<JobKey>,
    dryrun: bool,
    completion_handled: bool,
    note: Option<String>,
    stage: Box<dyn Stage>,
}

impl Job {
    pub fn new(key: JobKey, stage: Box<dyn Stage>, dryrun: bool) -> Self {
        Self {
            key,
            status: JobStatus::Invalid,
            job_id: None,
            depends_on: Vec::new(),
            dryrun,
            completion_handled: false,
            note: None,
            stage,
        }
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn job_id(&self) -> Option<ExternalJobId> {
        self.job_id
    }

    pub fn depends_on(&self) -> &[JobKey] {
        &self.depends_on
    }

    pub fn set_dependencies(&mut self, deps: Vec<JobKey>) {
        self.depends_on = deps;
    }

    pub fn dependency_rules(&self) -> Vec<DependencyRule> {
        self.stage.dependency_rules()
    }

    pub fn produced_types(&self) -> Vec<String> {
        self.stage.produced_types()
    }

    pub fn completion_handled(&self) -> bool {
        self.completion_handled
    }

    /// Last reason recorded for the job's status, if any.
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn output_dirs(&self) -> Vec<PathBuf> {
        self.stage.output_dirs(self.key.years)
    }

    /// Moves the job forward. Regressions are refused and logged.
    pub fn advance(&mut self, next: JobStatus, events: &mut EventLog) -> bool {
        if self.status == next {
            return true;
        }
        if !self.status.can_advance_to(next) {
            events.warn(format!(
                "{}: ignoring status change {} -> {}",
                self.key, self.status, next
            ));
            return false;
        }
        tracing::debug!("{}: {} -> {}", self.key, self.status, next);
        self.status = next;
        true
    }

    pub fn fail(&mut self, reason: impl Into<String>, events: &mut EventLog) {
        let reason = reason.into();
        if self.advance(JobStatus::Failed, events) {
            events.error(format!("{}: {}", self.key, reason));
            self.note = Some(reason);
        }
    }

    pub fn cancel(&mut self, events: &mut EventLog) {
        if self.advance(JobStatus::Cancelled, events) {
            events.warn(format!("{}: cancelled", self.key));
            self.note = Some("cancelled by operator".to_string());
        }
    }

    fn requirements(&self) -> Vec<(String, YearSet)> {
        let years = self.key.years;
        let mut reqs: Vec<(String, YearSet)> = self
            .stage
            .data_required()
            .into_iter()
            .map(|dt| (dt, years))
            .collect();
        reqs.extend(
            self.stage
                .extra_inputs(years)
                .into_iter()
                .map(|extra| (extra.data_type, extra.years)),
        );
        reqs
    }

    /// Checks inputs without touching job state or the filesystem.
    pub fn check_inputs(&self, registry: &dyn FileRegistry) -> Result<(), JobError> {
        let job = self.key.to_string();
        for (data_type, years) in self.requirements() {
            let files = registry
                .files_in_range(&self.key.case, years, &data_type)
                .map_err(|_| JobError::Configuration {
                    job: job.clone(),
                    data_type: data_type.clone(),
                })?;
            if files.is_empty() {
                return Err(JobError::TransientInputGap {
                    job,
                    missing: format!("no '{}' files for {}", data_type, years),
                });
            }
            if let Some(missing) = files.iter().find(|f| !f.is_present()) {
                return Err(JobError::TransientInputGap {
                    job,
                    missing: missing.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn resolve_inputs(&self, registry: &dyn FileRegistry) -> Result<Inputs, JobError> {
        let mut inputs = Inputs::new();
        for (data_type, years) in self.requirements() {
            let paths = registry
                .get_file_paths_by_year(&self.key.case, years, &data_type)
                .unwrap_or_default();
            if paths.is_empty() {
                return Err(JobError::Configuration {
                    job: self.key.to_string(),
                    data_type,
                });
            }
            inputs.entry(data_type).or_default().extend(paths);
        }
        Ok(inputs)
    }

    /// Confirms every input is on disk and creates the output directories.
    /// A dry run skips the check.
    pub fn prevalidate(&mut self, registry: &dyn FileRegistry, events: &mut EventLog) -> bool {
        if self.dryrun {
            return self.advance(JobStatus::Valid, events);
        }
        match self.check_inputs(registry) {
            Ok(()) => {
                for dir in self.output_dirs() {
                    if let Err(e) = fs_err::create_dir_all(&dir) {
                        self.fail(JobError::io(&self.key, e).to_string(), events);
                        return false;
                    }
                }
                self.note = None;
                events.info(format!("{}: prevalidation successful", self.key));
                self.advance(JobStatus::Valid, events)
            }
            Err(e) if !e.is_fatal() => {
                let message = e.to_string();
                if self.note.as_deref() != Some(message.as_str()) {
                    events.warn(message.clone());
                    self.note = Some(message);
                } else {
                    tracing::debug!("{}", message);
                }
                false
            }
            Err(e) => {
                self.fail(e.to_string(), events);
                false
            }
        }
    }

    pub fn postvalidate(&self) -> bool {
        self.stage.output_complete(self.key.years)
    }

    /// Submits the job unless its output is already complete. A fatal error
    /// leaves the job `FAILED` with the reason recorded in `events`.
    pub fn execute(
        &mut self,
        ctx: &ExecContext<'_>,
        events: &mut EventLog,
    ) -> Result<Option<ExternalJobId>, JobError> {
        let result = self.try_execute(ctx, events);
        if let Err(e) = &result {
            if e.is_fatal() {
                self.fail(e.to_string(), events);
            }
        }
        result
    }

    fn try_execute(
        &mut self,
        ctx: &ExecContext<'_>,
        events: &mut EventLog,
    ) -> Result<Option<ExternalJobId>, JobError> {
        if self.postvalidate() {
            events.info(format!(
                "{}: output already complete, not submitting",
                self.key
            ));
            self.advance(JobStatus::Completed, events);
            return Ok(None);
        }
        self.advance(JobStatus::Pending, events);

        let inputs = match self.resolve_inputs(ctx.registry) {
            Ok(inputs) => inputs,
            Err(JobError::Configuration { data_type, .. }) if self.dryrun => {
                events.info(format!(
                    "{}: dry run, would wait for '{}' input",
                    self.key, data_type
                ));
                self.advance(JobStatus::Completed, events);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if !self.dryrun {
            self.stage.prepare(&self.key, &inputs)?;
        }
        let command = self.stage.command(&self.key, &inputs)?;

        let job_name = self.key.to_string();
        let script_path = ctx.layout.script_path(&self.key);
        let script = BatchScript {
            job_name: job_name.clone(),
            log_path: ctx.layout.scripts_dir().join(format!("{}.out", job_name)),
            workdir: ctx.layout.temp_dir(),
            directives: resolve_for_job(&job_name, ctx.scheduler, ctx.resources),
            setup: command.setup,
            command: command.args,
        };
        let kind = ctx.manager.kind();
        fs_err::create_dir_all(ctx.layout.temp_dir()).map_err(|e| JobError::io(&self.key, e))?;
        script
            .write(kind, &script_path)
            .map_err(|e| JobError::Submission {
                job: job_name.clone(),
                message: format!("could not write {}: {}", script_path.display(), e),
            })?;

        if self.dryrun {
            events.info(format!(
                "{}: dry run, script written to {}",
                self.key,
                script_path.display()
            ));
            self.advance(JobStatus::Completed, events);
            return Ok(None);
        }

        let id = ctx
            .manager
            .submit(&script_path)
            .map_err(|e| JobError::Submission {
                job: job_name.clone(),
                message: match e {
                    ManagerError::Submission { message, .. } => message,
                    other => other.to_string(),
                },
            })?;
        self.job_id = Some(id);
        self.advance(JobStatus::Submitted, events);
        events.info(format!("{}: submitted as job {}", self.key, id));

        if let Err(e) = self.poll(ctx.manager, events) {
            log_transient(&e, events);
        }
        Ok(Some(id))
    }

    /// Reconciles local status with what the resource manager reports.
    pub fn poll(
        &mut self,
        manager: &dyn ResourceManager,
        events: &mut EventLog,
    ) -> Result<JobStatus, JobError> {
        let Some(id) = self.job_id else {
            return Ok(self.status);
        };
        match manager.query(id) {
            Ok(info) => {
                let reported = manager.status_map().translate(&info.state);
                match reported {
                    JobStatus::Completed => self.confirm_completion(events),
                    JobStatus::Failed | JobStatus::Cancelled => {
                        if self.advance(reported, events) {
                            events.error(format!(
                                "{}: job {} ended as {}",
                                self.key, id, info.state
                            ));
                            self.note = Some(format!("resource manager reported {}", info.state));
                        }
                        Ok(self.status)
                    }
                    other => {
                        if other != self.status && self.advance(other, events) {
                            events.info(format!("{}: {}", self.key, other));
                        }
                        Ok(self.status)
                    }
                }
            }
            Err(ManagerError::JobNotFound(_)) => {
                tracing::debug!("{}: job {} no longer known to the manager", self.key, id);
                self.confirm_completion(events)
            }
            Err(e) => Err(JobError::ExternalStateUnknown {
                job: self.key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn confirm_completion(&mut self, events: &mut EventLog) -> Result<JobStatus, JobError> {
        if self.postvalidate() {
            if self.advance(JobStatus::Completed, events) {
                events.info(format!("{}: completed", self.key));
            }
            return Ok(self.status);
        }
        let output = self.output_dirs().into_iter().next().unwrap_or_default();
        let err = JobError::PostconditionUnmet {
            job: self.key.to_string(),
            output,
        };
        self.fail(err.to_string(), events);
        Err(err)
    }

    /// Registers the job's outputs the first time it is seen `COMPLETED`.
    /// Returns whether the handler ran.
    pub fn handle_completion(
        &mut self,
        registry: &mut dyn FileRegistry,
        events: &mut EventLog,
    ) -> bool {
        if self.status != JobStatus::Completed {
            tracing::debug!(
                "{}: completion handler skipped, status is {}",
                self.key,
                self.status
            );
            return false;
        }
        if self.completion_handled {
            return false;
        }
        self.completion_handled = true;

        if self.dryrun {
            tracing::debug!("{}: dry run, no outputs registered", self.key);
            return true;
        }
        let mut registered = 0;
        for (data_type, files) in self.stage.produced_outputs(self.key.years) {
            registered += files.len();
            registry.add_files(&data_type, files);
        }
        events.info(format!(
            "{}: registered {} output files",
            self.key, registered
        ));
        true
    }
}

/// Fatal errors are recorded when the job is failed; only retriable ones
/// still need an entry.
pub(crate) fn log_transient(err: &JobError, events: &mut EventLog) {
    if !err.is_fatal() {
        events.push(Severity::Warning, err.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use processflow_core::registry::LocalFileRegistry;
    use std::cell::Cell;

    struct StubStage {
        complete: Cell<bool>,
    }

    impl Stage for StubStage {
        fn kind(&self) -> JobKind {
            JobKind::Climo
        }

        fn data_required(&self) -> Vec<String> {
            vec!["atm".to_string()]
        }

        fn output_dirs(&self, _years: YearSet) -> Vec<PathBuf> {
            Vec::new()
        }

        fn output_complete(&self, _years: YearSet) -> bool {
            self.complete.get()
        }

        fn command(&self, _key: &JobKey, _inputs: &Inputs) -> Result<JobCommand, JobError> {
            Ok(JobCommand::default())
        }
    }

    fn job(complete: bool) -> Job {
        let key = JobKey::new("caseA", JobKind::Climo, YearSet::new(1, 5).unwrap());
        let stage = StubStage {
            complete: Cell::new(complete),
        };
        Job::new(key, Box::new(stage), false)
    }

    #[test]
    fn test_status_never_regresses() {
        let mut events = EventLog::new();
        let mut job = job(false);
        assert!(job.advance(JobStatus::Running, &mut events));
        assert!(!job.advance(JobStatus::Pending, &mut events));
        assert_eq!(job.status(), JobStatus::Running);
        assert!(events.contains("ignoring status change RUNNING -> PENDING"));

        let warnings = events.count(Severity::Warning);
        assert!(job.advance(JobStatus::Other, &mut events));
        assert!(job.advance(JobStatus::Running, &mut events));
        assert_eq!(job.status(), JobStatus::Running);
        assert_eq!(events.count(Severity::Warning), warnings);

        job.fail("boom", &mut events);
        assert!(!job.advance(JobStatus::Completed, &mut events));
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.note(), Some("boom"));
    }

    #[test]
    fn test_completion_handler_runs_once_and_only_when_completed() {
        let mut events = EventLog::new();
        let mut registry = LocalFileRegistry::new();
        let mut job = job(true);

        assert!(!job.handle_completion(&mut registry, &mut events));
        assert!(!job.completion_handled());

        job.advance(JobStatus::Completed, &mut events);
        assert!(job.handle_completion(&mut registry, &mut events));
        assert!(!job.handle_completion(&mut registry, &mut events));
        assert!(events.contains("climo-0001-0005-caseA: registered 0 output files"));
    }

    #[test]
    fn test_unknown_input_type_fails_prevalidation() {
        let mut events = EventLog::new();
        let registry = LocalFileRegistry::new();
        let mut job = job(false);

        assert!(!job.prevalidate(&registry, &mut events));
        assert_eq!(job.status(), JobStatus::Failed);
    }

    #[test]
    fn test_missing_input_is_a_transient_gap() {
        let mut events = EventLog::new();
        let mut registry = LocalFileRegistry::new();
        registry.declare("atm", true);
        let mut job = job(false);

        assert!(!job.prevalidate(&registry, &mut events));
        assert!(!job.prevalidate(&registry, &mut events));
        assert_eq!(job.status(), JobStatus::Invalid);
        assert_eq!(events.count(Severity::Warning), 1);
        assert!(events.contains("no 'atm' files for"));
    }
}
