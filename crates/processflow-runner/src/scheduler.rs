use crate::case::Case;
use crate::jobs::{log_transient, ExecContext};
use processflow_client::ResourceManager;
use processflow_core::config::{Resources, SchedulerConfig};
use processflow_core::engine::{blocked_jobs, readiness, Readiness};
use processflow_core::event_log::EventLog;
use processflow_core::layout::OutputLayout;
use processflow_core::model::{ExternalJobId, JobKey, JobStatus};
use processflow_core::registry::FileRegistry;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    Success,
    PartialFailure,
    BudgetExhausted,
    Cancelled,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Success => write!(f, "success"),
            RunOutcome::PartialFailure => write!(f, "one or more jobs failed"),
            RunOutcome::BudgetExhausted => write!(f, "polling budget exhausted"),
            RunOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub description: String,
    pub status: JobStatus,
    pub job_id: Option<ExternalJobId>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub case: String,
    pub jobs: Vec<JobSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub cases: Vec<CaseReport>,
    /// Every job that did not reach `COMPLETED`.
    pub failures: Vec<JobSummary>,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }

    pub fn status_of(&self, description: &str) -> Option<JobStatus> {
        self.cases
            .iter()
            .flat_map(|c| c.jobs.iter())
            .find(|j| j.description == description)
            .map(|j| j.status)
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub poll_interval: Duration,
    pub max_iterations: u64,
    pub max_runtime: Option<Duration>,
}

impl RunOptions {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_iterations: config.max_iterations,
            max_runtime: config.max_runtime_secs.map(Duration::from_secs),
        }
    }
}

/// Owns every case and drives the polling loop. The only mutator of job
/// state for the lifetime of a run.
pub struct RunManager<'a> {
    cases: Vec<Case>,
    manager: &'a dyn ResourceManager,
    registry: Box<dyn FileRegistry>,
    layout: OutputLayout,
    scheduler: SchedulerConfig,
    resources: Option<Resources>,
    options: RunOptions,
    events: EventLog,
    interrupted: Arc<AtomicBool>,
}

impl<'a> RunManager<'a> {
    pub fn new(
        cases: Vec<Case>,
        manager: &'a dyn ResourceManager,
        registry: Box<dyn FileRegistry>,
        layout: OutputLayout,
        scheduler: SchedulerConfig,
        resources: Option<Resources>,
    ) -> Self {
        let options = RunOptions::from_config(&scheduler);
        Self {
            cases,
            manager,
            registry,
            layout,
            scheduler,
            resources,
            options,
            events: EventLog::new(),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Flag that, once set, makes the loop cancel outstanding work and stop.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn registry(&self) -> &dyn FileRegistry {
        self.registry.as_ref()
    }

    pub fn run(&mut self) -> RunReport {
        let started = Instant::now();
        self.events.info(format!(
            "Starting run with {} jobs across {} cases",
            self.cases.iter().map(|c| c.jobs.len()).sum::<usize>(),
            self.cases.len()
        ));
        self.initial_pass();

        let mut iteration: u64 = 0;
        let outcome = loop {
            if self.is_interrupted() {
                self.cancel_all();
                break RunOutcome::Cancelled;
            }

            self.poll_active();
            self.registry.refresh();
            self.revalidate_invalid();
            self.propagate_failures();
            self.submit_ready();
            self.handle_completions();

            if self.all_finished() {
                break if self.all_completed() {
                    RunOutcome::Success
                } else {
                    RunOutcome::PartialFailure
                };
            }

            iteration += 1;
            if iteration >= self.options.max_iterations {
                self.events.error(format!(
                    "Stopping after {} polling iterations with jobs still outstanding",
                    iteration
                ));
                break RunOutcome::BudgetExhausted;
            }
            if let Some(limit) = self.options.max_runtime {
                if started.elapsed() >= limit {
                    self.events.error(format!(
                        "Stopping after {:?} with jobs still outstanding",
                        limit
                    ));
                    break RunOutcome::BudgetExhausted;
                }
            }

            if !self.sleep() {
                self.cancel_all();
                break RunOutcome::Cancelled;
            }
        };

        tracing::info!("Run finished after {} iterations: {}", iteration, outcome);
        self.report(outcome)
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Waits out the poll interval in short slices. Returns false if
    /// interrupted meanwhile.
    fn sleep(&self) -> bool {
        let deadline = Instant::now() + self.options.poll_interval;
        loop {
            if self.is_interrupted() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }

    /// Jobs whose output already exists are completed without submission;
    /// everything else gets its first input check.
    fn initial_pass(&mut self) {
        for case in self.cases.iter_mut() {
            for job in case.jobs.iter_mut() {
                if job.postvalidate() {
                    self.events
                        .info(format!("{}: output already complete", job.key()));
                    job.advance(JobStatus::Completed, &mut self.events);
                } else {
                    job.prevalidate(self.registry.as_ref(), &mut self.events);
                }
            }
        }
        self.handle_completions();
    }

    fn poll_active(&mut self) {
        for case in self.cases.iter_mut() {
            for job in case.jobs.iter_mut() {
                if !job.status().is_active() {
                    continue;
                }
                if let Err(e) = job.poll(self.manager, &mut self.events) {
                    log_transient(&e, &mut self.events);
                }
            }
        }
    }

    fn revalidate_invalid(&mut self) {
        for case in self.cases.iter_mut() {
            for job in case.jobs.iter_mut() {
                if job.status() == JobStatus::Invalid {
                    job.prevalidate(self.registry.as_ref(), &mut self.events);
                }
            }
        }
    }

    fn propagate_failures(&mut self) {
        for case in self.cases.iter_mut() {
            let statuses: BTreeMap<JobKey, JobStatus> = case
                .jobs
                .iter()
                .map(|j| (j.key().clone(), j.status()))
                .collect();
            let dependencies: BTreeMap<JobKey, Vec<JobKey>> = case
                .jobs
                .iter()
                .map(|j| (j.key().clone(), j.depends_on().to_vec()))
                .collect();
            let blocked: BTreeMap<JobKey, JobKey> =
                blocked_jobs(&statuses, &dependencies).into_iter().collect();
            if blocked.is_empty() {
                continue;
            }
            for job in case.jobs.iter_mut() {
                if let Some(cause) = blocked.get(job.key()) {
                    job.fail(format!("blocked by {}", cause), &mut self.events);
                }
            }
        }
    }

    fn submit_ready(&mut self) {
        let ctx = ExecContext {
            manager: self.manager,
            registry: self.registry.as_ref(),
            layout: &self.layout,
            scheduler: &self.scheduler,
            resources: self.resources.as_ref(),
        };
        for case in self.cases.iter_mut() {
            for idx in 0..case.jobs.len() {
                if case.jobs[idx].status() != JobStatus::Valid {
                    continue;
                }
                let ready = {
                    let deps = case.jobs[idx].depends_on();
                    let statuses: Vec<(&JobKey, JobStatus)> = deps
                        .iter()
                        .map(|d| (d, case.status_of(d).unwrap_or(JobStatus::Invalid)))
                        .collect();
                    readiness(statuses)
                };
                match ready {
                    Readiness::Ready => {
                        let job = &mut case.jobs[idx];
                        if let Err(e) = job.execute(&ctx, &mut self.events) {
                            log_transient(&e, &mut self.events);
                        }
                    }
                    Readiness::Waiting { pending } => {
                        tracing::trace!(
                            "{}: waiting on {} dependencies",
                            case.jobs[idx].key(),
                            pending.len()
                        );
                    }
                    Readiness::Blocked { .. } => {}
                }
            }
        }
    }

    fn handle_completions(&mut self) {
        for case in self.cases.iter_mut() {
            for job in case.jobs.iter_mut() {
                if job.status() == JobStatus::Completed && !job.completion_handled() {
                    job.handle_completion(self.registry.as_mut(), &mut self.events);
                }
            }
        }
    }

    fn all_finished(&self) -> bool {
        self.cases.iter().all(Case::is_finished)
    }

    fn all_completed(&self) -> bool {
        self.cases
            .iter()
            .flat_map(|c| c.jobs.iter())
            .all(|j| j.status() == JobStatus::Completed)
    }

    /// Best-effort cancel of everything still outstanding. Completed work is
    /// left as it is.
    pub fn cancel_all(&mut self) {
        self.events
            .warn("Interrupted, cancelling outstanding jobs".to_string());
        for case in self.cases.iter_mut() {
            for job in case.jobs.iter_mut() {
                if job.status().is_terminal() {
                    continue;
                }
                if let (Some(id), true) = (job.job_id(), job.status().is_active()) {
                    match self.manager.cancel(id) {
                        Ok(true) => tracing::info!("Cancelled job {}", id),
                        Ok(false) => tracing::info!("Job {} had already finished", id),
                        Err(e) => self
                            .events
                            .warn(format!("{}: cancel of {} failed: {}", job.key(), id, e)),
                    }
                }
                job.cancel(&mut self.events);
            }
        }
    }

    fn report(&self, outcome: RunOutcome) -> RunReport {
        let cases: Vec<CaseReport> = self
            .cases
            .iter()
            .map(|case| CaseReport {
                case: case.name.clone(),
                jobs: case
                    .jobs
                    .iter()
                    .map(|job| JobSummary {
                        description: job.key().to_string(),
                        status: job.status(),
                        job_id: job.job_id(),
                        note: job.note().map(str::to_string),
                    })
                    .collect(),
            })
            .collect();
        let failures = cases
            .iter()
            .flat_map(|c| c.jobs.iter())
            .filter(|j| j.status != JobStatus::Completed)
            .cloned()
            .collect();
        RunReport {
            outcome,
            cases,
            failures,
        }
    }
}
