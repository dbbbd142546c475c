use crate::errors::DomainError;
use crate::model::{JobKey, JobKind, JobStatus, YearSet};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// How a job type depends on another job type of the same case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyRule {
    /// The given job type over the identical year set.
    SameSet(JobKind),
    /// The given job type over the set of equal length directly before this one.
    PreviousSet(JobKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Waiting { pending: Vec<JobKey> },
    Blocked { failed: Vec<JobKey> },
}

/// Splits the simulation range into consecutive sets of `length` years.
/// A trailing set that would run past the end is not planned.
pub fn plan_year_sets(range: YearSet, length: u32) -> Vec<YearSet> {
    if length == 0 {
        return Vec::new();
    }
    let mut sets = Vec::new();
    let mut start = range.start;
    while let Some(end) = start.checked_add(length - 1) {
        if end > range.end {
            break;
        }
        sets.push(YearSet { start, end });
        start = end + 1;
    }
    sets
}

pub fn previous_set(years: YearSet) -> Option<YearSet> {
    let length = years.length();
    let start = years.start.checked_sub(length)?;
    YearSet::new(start, years.start - 1)
}

/// Turns declared rules into concrete dependency keys against the planned jobs.
pub fn resolve_dependencies(
    key: &JobKey,
    rules: &[DependencyRule],
    planned: &BTreeSet<JobKey>,
) -> Result<Vec<JobKey>, DomainError> {
    let mut deps = Vec::new();
    for rule in rules {
        let target = match *rule {
            DependencyRule::SameSet(kind) => JobKey::new(key.case.clone(), kind, key.years),
            DependencyRule::PreviousSet(kind) => {
                let Some(years) = previous_set(key.years) else {
                    continue;
                };
                let target = JobKey::new(key.case.clone(), kind, years);
                // The first set of a chain has no predecessor to compare with.
                if !planned.contains(&target) && !has_earlier_set(planned, &target) {
                    continue;
                }
                target
            }
        };
        if !planned.contains(&target) {
            return Err(DomainError::MissingDependency {
                job: key.to_string(),
                requires: target.to_string(),
            });
        }
        deps.push(target);
    }
    Ok(deps)
}

fn has_earlier_set(planned: &BTreeSet<JobKey>, target: &JobKey) -> bool {
    planned.iter().any(|k| {
        k.case == target.case
            && k.kind == target.kind
            && k.years.length() == target.years.length()
            && k.years.start <= target.years.start
    })
}

pub fn readiness<'a>(deps: impl IntoIterator<Item = (&'a JobKey, JobStatus)>) -> Readiness {
    let mut pending = Vec::new();
    let mut failed = Vec::new();
    for (key, status) in deps {
        match status {
            JobStatus::Completed => {}
            JobStatus::Failed | JobStatus::Cancelled => failed.push(key.clone()),
            _ => pending.push(key.clone()),
        }
    }
    if !failed.is_empty() {
        Readiness::Blocked { failed }
    } else if !pending.is_empty() {
        Readiness::Waiting { pending }
    } else {
        Readiness::Ready
    }
}

/// Non-terminal jobs that can never run because something upstream of them,
/// directly or transitively, failed or was cancelled. Each is paired with the
/// dependency that blocks it.
pub fn blocked_jobs(
    statuses: &BTreeMap<JobKey, JobStatus>,
    dependencies: &BTreeMap<JobKey, Vec<JobKey>>,
) -> Vec<(JobKey, JobKey)> {
    let mut cache: HashMap<&JobKey, Option<JobKey>> = HashMap::new();
    let mut blocked = Vec::new();
    for (key, status) in statuses {
        if status.is_terminal() {
            continue;
        }
        if let Some(cause) = resolve_blocker(key, statuses, dependencies, &mut cache) {
            blocked.push((key.clone(), cause));
        }
    }
    blocked
}

fn resolve_blocker<'a>(
    key: &'a JobKey,
    statuses: &'a BTreeMap<JobKey, JobStatus>,
    dependencies: &'a BTreeMap<JobKey, Vec<JobKey>>,
    cache: &mut HashMap<&'a JobKey, Option<JobKey>>,
) -> Option<JobKey> {
    if let Some(cached) = cache.get(key) {
        return cached.clone();
    }
    cache.insert(key, None);

    let mut cause = None;
    for dep in dependencies.get(key).into_iter().flatten() {
        match statuses.get(dep) {
            Some(JobStatus::Failed) | Some(JobStatus::Cancelled) => {
                cause = Some(dep.clone());
            }
            Some(_) => {
                if resolve_blocker(dep, statuses, dependencies, cache).is_some() {
                    cause = Some(dep.clone());
                }
            }
            None => {}
        }
        if cause.is_some() {
            break;
        }
    }

    cache.insert(key, cause.clone());
    cause
}
