use processflow_client::{ManagerError, ResourceManager};
use processflow_core::model::{ExternalJobId, JobInfo, JobStatus, ManagerKind};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// What the fake answers to one `query`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A raw state string, as the manager's own tools would print it.
    State(String),
    Timeout,
    NotFound,
}

impl Reply {
    pub fn state(s: &str) -> Self {
        Reply::State(s.to_string())
    }
}

type Hook = Box<dyn Fn() + Send>;

struct FakeJob {
    name: String,
    script: PathBuf,
    replies: VecDeque<Reply>,
    last_state: String,
    hook_ran: bool,
}

#[derive(Default)]
struct State {
    next_id: u64,
    scripts: HashMap<String, Vec<Reply>>,
    hooks: HashMap<String, Hook>,
    rejections: HashMap<String, String>,
    jobs: BTreeMap<ExternalJobId, FakeJob>,
    submissions: Vec<String>,
    cancellations: Vec<ExternalJobId>,
    queries: usize,
}

/// In-memory resource manager. Jobs are identified by their script's file
/// stem, which is the job key. Unscripted jobs report completion on their
/// first query.
///
/// `CANCELLED` is Slurm vocabulary; under PBS a cancelled job reads as `X`.
pub struct FakeResourceManager {
    kind: ManagerKind,
    state: Mutex<State>,
}

impl Default for FakeResourceManager {
    fn default() -> Self {
        Self::new(ManagerKind::Slurm)
    }
}

impl FakeResourceManager {
    pub fn new(kind: ManagerKind) -> Self {
        Self {
            kind,
            state: Mutex::new(State {
                next_id: 1000,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replies for successive queries of `job`. The last reply repeats.
    pub fn script(&self, job: &str, replies: Vec<Reply>) -> &Self {
        self.lock().scripts.insert(job.to_string(), replies);
        self
    }

    /// Runs `hook` the first time `job` is reported complete or drops out of
    /// the queue, standing in for the work the batch job would have done.
    pub fn on_complete(&self, job: &str, hook: impl Fn() + Send + 'static) -> &Self {
        self.lock().hooks.insert(job.to_string(), Box::new(hook));
        self
    }

    pub fn reject(&self, job: &str, message: &str) -> &Self {
        self.lock()
            .rejections
            .insert(job.to_string(), message.to_string());
        self
    }

    /// Names of submitted jobs, in submission order.
    pub fn submissions(&self) -> Vec<String> {
        self.lock().submissions.clone()
    }

    pub fn submit_count(&self, job: &str) -> usize {
        self.lock()
            .submissions
            .iter()
            .filter(|s| s.as_str() == job)
            .count()
    }

    pub fn cancellations(&self) -> Vec<ExternalJobId> {
        self.lock().cancellations.clone()
    }

    pub fn query_count(&self) -> usize {
        self.lock().queries
    }

    pub fn script_of(&self, job: &str) -> Option<PathBuf> {
        self.lock()
            .jobs
            .values()
            .find(|j| j.name == job)
            .map(|j| j.script.clone())
    }

    fn completed_state(&self) -> &'static str {
        match self.kind {
            ManagerKind::Slurm => "COMPLETED",
            ManagerKind::Pbs => "F",
        }
    }

    fn info(&self, id: ExternalJobId, job: &FakeJob) -> JobInfo {
        JobInfo {
            job_id: id,
            name: job.name.clone(),
            partition: "debug".to_string(),
            state: job.last_state.clone(),
            runtime: "00:00:01".to_string(),
            user: "tester".to_string(),
        }
    }
}

impl ResourceManager for FakeResourceManager {
    fn kind(&self) -> ManagerKind {
        self.kind
    }

    fn submit(&self, script: &Path) -> Result<ExternalJobId, ManagerError> {
        let name = script
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut state = self.lock();
        if let Some(message) = state.rejections.get(&name) {
            return Err(ManagerError::Submission {
                manager: self.kind.to_string(),
                message: message.clone(),
            });
        }
        let id = ExternalJobId(state.next_id);
        state.next_id += 1;
        let replies = state
            .scripts
            .get(&name)
            .cloned()
            .unwrap_or_else(|| vec![Reply::state(self.completed_state())]);
        state.submissions.push(name.clone());
        state.jobs.insert(
            id,
            FakeJob {
                name,
                script: script.to_path_buf(),
                replies: replies.into(),
                last_state: "PENDING".to_string(),
                hook_ran: false,
            },
        );
        Ok(id)
    }

    fn query(&self, id: ExternalJobId) -> Result<JobInfo, ManagerError> {
        let map = self.status_map();
        let mut guard = self.lock();
        let state = &mut *guard;
        state.queries += 1;
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or(ManagerError::JobNotFound(id))?;

        let reply = if job.replies.len() > 1 {
            job.replies.pop_front()
        } else {
            job.replies.front().cloned()
        };
        match reply {
            Some(Reply::Timeout) => Err(ManagerError::Timeout {
                command: "squeue".to_string(),
                timeout: Duration::from_secs(30),
            }),
            Some(Reply::NotFound) => {
                if !job.hook_ran {
                    job.hook_ran = true;
                    if let Some(hook) = state.hooks.get(&job.name) {
                        hook();
                    }
                }
                Err(ManagerError::JobNotFound(id))
            }
            Some(Reply::State(raw)) => {
                job.last_state = raw;
                if map.translate(&job.last_state) == JobStatus::Completed && !job.hook_ran {
                    job.hook_ran = true;
                    if let Some(hook) = state.hooks.get(&job.name) {
                        hook();
                    }
                }
                Ok(self.info(id, job))
            }
            None => Ok(self.info(id, job)),
        }
    }

    fn list_queue(&self) -> Result<Vec<JobInfo>, ManagerError> {
        let state = self.lock();
        Ok(state
            .jobs
            .iter()
            .map(|(id, job)| self.info(*id, job))
            .collect())
    }

    fn cancel(&self, id: ExternalJobId) -> Result<bool, ManagerError> {
        let map = self.status_map();
        let mut state = self.lock();
        state.cancellations.push(id);
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or(ManagerError::JobNotFound(id))?;
        if map.translate(&job.last_state).is_terminal() {
            return Ok(false);
        }
        let cancelled = match self.kind {
            ManagerKind::Slurm => "CANCELLED",
            ManagerKind::Pbs => "X",
        };
        job.last_state = cancelled.to_string();
        job.replies = VecDeque::from(vec![Reply::state(cancelled)]);
        Ok(true)
    }
}
