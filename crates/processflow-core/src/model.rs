use crate::status_map::StatusMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Invalid,
    Valid,
    Pending,
    Submitted,
    Running,
    Completed,
    Failed,
    Cancelled,
    Other,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Statuses that exist only while the resource manager owns the job.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            JobStatus::Pending | JobStatus::Submitted | JobStatus::Running | JobStatus::Other
        )
    }

    fn progress(self) -> u8 {
        match self {
            JobStatus::Invalid => 0,
            JobStatus::Valid => 1,
            JobStatus::Pending | JobStatus::Submitted => 2,
            JobStatus::Running | JobStatus::Other => 3,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 4,
        }
    }

    /// Terminal statuses are final and progress never moves backwards.
    /// PENDING and SUBMITTED may alternate, since a requeued job reports
    /// PENDING again. OTHER (suspended, held) can be entered from and left
    /// for any active status.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        if (self == JobStatus::Other || next == JobStatus::Other)
            && self.is_active()
            && next.is_active()
        {
            return true;
        }
        next.progress() >= self.progress()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Invalid => "INVALID",
            JobStatus::Valid => "VALID",
            JobStatus::Pending => "PENDING",
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Other => "OTHER",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Atm,
    Lnd,
    Ocn,
    Ice,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::Atm,
        Component::Lnd,
        Component::Ocn,
        Component::Ice,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Component::Atm => "atm",
            Component::Lnd => "lnd",
            Component::Ocn => "ocn",
            Component::Ice => "ice",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseComponentError(pub String);

impl fmt::Display for ParseComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid model component: '{}'. Valid values are: atm, lnd, ocn, ice",
            self.0
        )
    }
}

impl std::error::Error for ParseComponentError {}

impl FromStr for Component {
    type Err = ParseComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "atm" | "atmosphere" => Ok(Component::Atm),
            "lnd" | "land" => Ok(Component::Lnd),
            "ocn" | "ocean" => Ok(Component::Ocn),
            "ice" | "sea-ice" => Ok(Component::Ice),
            _ => Err(ParseComponentError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobKind {
    Climo,
    Timeseries(Component),
    Regrid(Component),
    E3smDiags,
    Aprime,
}

impl JobKind {
    /// Position of the job type within one year set.
    pub fn declared_order(self) -> (u8, Option<Component>) {
        match self {
            JobKind::Climo => (0, None),
            JobKind::Timeseries(c) => (1, Some(c)),
            JobKind::Regrid(c) => (2, Some(c)),
            JobKind::E3smDiags => (3, None),
            JobKind::Aprime => (4, None),
        }
    }

    pub fn is_diagnostic(self) -> bool {
        matches!(self, JobKind::E3smDiags | JobKind::Aprime)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Climo => write!(f, "climo"),
            JobKind::Timeseries(c) => write!(f, "timeseries_{}", c),
            JobKind::Regrid(c) => write!(f, "regrid_{}", c),
            JobKind::E3smDiags => write!(f, "e3sm_diags"),
            JobKind::Aprime => write!(f, "aprime"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseJobKindError(pub String);

impl fmt::Display for ParseJobKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid job type: '{}'. Valid values are: climo, timeseries_<component>, regrid_<component>, e3sm_diags, aprime",
            self.0
        )
    }
}

impl std::error::Error for ParseJobKindError {}

impl FromStr for JobKind {
    type Err = ParseJobKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "climo" => return Ok(JobKind::Climo),
            "e3sm_diags" => return Ok(JobKind::E3smDiags),
            "aprime" | "aprime_diags" => return Ok(JobKind::Aprime),
            _ => {}
        }
        let component = |rest: &str| {
            Component::from_str(rest).map_err(|_| ParseJobKindError(s.to_string()))
        };
        if let Some(rest) = s.strip_prefix("timeseries_") {
            return Ok(JobKind::Timeseries(component(rest)?));
        }
        if let Some(rest) = s.strip_prefix("regrid_") {
            return Ok(JobKind::Regrid(component(rest)?));
        }
        Err(ParseJobKindError(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearSet {
    pub start: u32,
    pub end: u32,
}

impl YearSet {
    pub fn new(start: u32, end: u32) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn length(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn contains(&self, year: u32) -> bool {
        (self.start..=self.end).contains(&year)
    }

    pub fn overlaps(&self, other: &YearSet) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn years(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }

    pub fn dir_label(&self) -> String {
        format!("{:04}_{:04}", self.start, self.end)
    }
}

impl fmt::Display for YearSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:04}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub case: String,
    pub kind: JobKind,
    pub years: YearSet,
}

impl JobKey {
    pub fn new(case: impl Into<String>, kind: JobKind, years: YearSet) -> Self {
        Self {
            case: case.into(),
            kind,
            years,
        }
    }

    /// Ordering used for every pass over a case: year set first, then job type.
    pub fn schedule_order(&self) -> (u32, u32, (u8, Option<Component>)) {
        (self.years.start, self.years.end, self.kind.declared_order())
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.kind, self.years, self.case)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalJobId(pub u64);

impl fmt::Display for ExternalJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExternalJobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(ExternalJobId)
    }
}

/// One queue entry as the resource manager reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobInfo {
    pub job_id: ExternalJobId,
    pub name: String,
    pub partition: String,
    pub state: String,
    pub runtime: String,
    pub user: String,
}

impl JobInfo {
    pub fn status(&self, map: &StatusMap) -> JobStatus {
        map.translate(&self.state)
    }
}

impl fmt::Display for JobInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{} {} {}", self.job_id, self.name, self.state),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ManagerKind {
    #[default]
    Slurm,
    Pbs,
}

impl fmt::Display for ManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerKind::Slurm => write!(f, "slurm"),
            ManagerKind::Pbs => write!(f, "pbs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseManagerKindError(pub String);

impl fmt::Display for ParseManagerKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid resource manager: '{}'. Valid values are: slurm, pbs",
            self.0
        )
    }
}

impl std::error::Error for ParseManagerKindError {}

impl FromStr for ManagerKind {
    type Err = ParseManagerKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slurm" => Ok(ManagerKind::Slurm),
            "pbs" => Ok(ManagerKind::Pbs),
            _ => Err(ParseManagerKindError(s.to_string())),
        }
    }
}
