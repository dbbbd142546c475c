use crate::model::{JobStatus, ManagerKind};

/// Translation table from a resource manager's state vocabulary to [`JobStatus`].
///
/// Lookups are total: anything the table does not know is reported as
/// [`JobStatus::Other`], which keeps the job under polling instead of
/// ending it.
#[derive(Debug, Clone, Copy)]
pub struct StatusMap {
    manager: ManagerKind,
    entries: &'static [(&'static str, JobStatus)],
}

const SLURM: &[(&str, JobStatus)] = &[
    ("PD", JobStatus::Pending),
    ("PENDING", JobStatus::Pending),
    ("RQ", JobStatus::Pending),
    ("REQUEUED", JobStatus::Pending),
    ("RH", JobStatus::Pending),
    ("REQUEUE_HOLD", JobStatus::Pending),
    ("RF", JobStatus::Pending),
    ("REQUEUE_FED", JobStatus::Pending),
    ("CF", JobStatus::Submitted),
    ("CONFIGURING", JobStatus::Submitted),
    ("R", JobStatus::Running),
    ("RUNNING", JobStatus::Running),
    ("RS", JobStatus::Running),
    ("RESIZING", JobStatus::Running),
    ("SI", JobStatus::Running),
    ("SIGNALING", JobStatus::Running),
    ("SO", JobStatus::Running),
    ("STAGE_OUT", JobStatus::Running),
    ("CD", JobStatus::Completed),
    ("COMPLETED", JobStatus::Completed),
    ("CG", JobStatus::Completed),
    ("COMPLETING", JobStatus::Completed),
    ("F", JobStatus::Failed),
    ("FAILED", JobStatus::Failed),
    ("TO", JobStatus::Failed),
    ("TIMEOUT", JobStatus::Failed),
    ("NF", JobStatus::Failed),
    ("NODE_FAIL", JobStatus::Failed),
    ("OOM", JobStatus::Failed),
    ("OUT_OF_MEMORY", JobStatus::Failed),
    ("BF", JobStatus::Failed),
    ("BOOT_FAIL", JobStatus::Failed),
    ("DL", JobStatus::Failed),
    ("DEADLINE", JobStatus::Failed),
    ("PR", JobStatus::Failed),
    ("PREEMPTED", JobStatus::Failed),
    ("CA", JobStatus::Cancelled),
    ("CANCELLED", JobStatus::Cancelled),
    ("RV", JobStatus::Cancelled),
    ("REVOKED", JobStatus::Cancelled),
    ("S", JobStatus::Other),
    ("SUSPENDED", JobStatus::Other),
    ("ST", JobStatus::Other),
    ("STOPPED", JobStatus::Other),
    ("SE", JobStatus::Other),
    ("SPECIAL_EXIT", JobStatus::Other),
];

// PBS reports a finished job as E (exiting), C or F depending on the flavour.
const PBS: &[(&str, JobStatus)] = &[
    ("Q", JobStatus::Pending),
    ("W", JobStatus::Pending),
    ("T", JobStatus::Pending),
    ("R", JobStatus::Running),
    ("B", JobStatus::Running),
    ("E", JobStatus::Completed),
    ("C", JobStatus::Completed),
    ("F", JobStatus::Completed),
    ("X", JobStatus::Completed),
    ("H", JobStatus::Other),
    ("S", JobStatus::Other),
    ("M", JobStatus::Other),
    ("U", JobStatus::Other),
];

impl StatusMap {
    pub fn slurm() -> Self {
        Self {
            manager: ManagerKind::Slurm,
            entries: SLURM,
        }
    }

    pub fn pbs() -> Self {
        Self {
            manager: ManagerKind::Pbs,
            entries: PBS,
        }
    }

    pub fn for_manager(kind: ManagerKind) -> Self {
        match kind {
            ManagerKind::Slurm => Self::slurm(),
            ManagerKind::Pbs => Self::pbs(),
        }
    }

    pub fn manager(&self) -> ManagerKind {
        self.manager
    }

    pub fn translate(&self, raw: &str) -> JobStatus {
        let normalized = normalize(raw);
        self.entries
            .iter()
            .find(|(state, _)| *state == normalized)
            .map(|(_, status)| *status)
            .unwrap_or(JobStatus::Other)
    }
}

// sacct prints e.g. "CANCELLED by 1234" and marks truncated fields with '+'.
fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .next()
        .unwrap_or("")
        .trim_end_matches('+')
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slurm_short_codes() {
        let map = StatusMap::slurm();
        assert_eq!(map.translate("PD"), JobStatus::Pending);
        assert_eq!(map.translate("R"), JobStatus::Running);
        assert_eq!(map.translate("CD"), JobStatus::Completed);
        assert_eq!(map.translate("CG"), JobStatus::Completed);
        assert_eq!(map.translate("F"), JobStatus::Failed);
        assert_eq!(map.translate("CA"), JobStatus::Cancelled);
    }

    #[test]
    fn test_slurm_long_names_from_sacct() {
        let map = StatusMap::slurm();
        assert_eq!(map.translate("COMPLETED"), JobStatus::Completed);
        assert_eq!(map.translate("CANCELLED by 51234"), JobStatus::Cancelled);
        assert_eq!(map.translate("CANCELLED+"), JobStatus::Cancelled);
        assert_eq!(map.translate(" timeout \n"), JobStatus::Failed);
    }

    #[test]
    fn test_pbs_codes() {
        let map = StatusMap::pbs();
        assert_eq!(map.translate("Q"), JobStatus::Pending);
        assert_eq!(map.translate("W"), JobStatus::Pending);
        assert_eq!(map.translate("R"), JobStatus::Running);
        assert_eq!(map.translate("E"), JobStatus::Completed);
        assert_eq!(map.translate("H"), JobStatus::Other);
    }

    #[test]
    fn test_unknown_states_map_to_other() {
        for map in [StatusMap::slurm(), StatusMap::pbs()] {
            assert_eq!(map.translate(""), JobStatus::Other);
            assert_eq!(map.translate("WHATEVER_NEW_STATE"), JobStatus::Other);
        }
    }

    #[test]
    fn test_translation_is_deterministic() {
        let map = StatusMap::slurm();
        let first = map.translate("R");
        for _ in 0..10 {
            assert_eq!(map.translate("R"), first);
        }
    }
}
