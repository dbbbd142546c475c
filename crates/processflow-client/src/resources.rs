use processflow_core::{
    config::{ResourceRule, Resources, SchedulerConfig},
    model::ManagerKind,
};
use wildmatch::WildMatch;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchDirectives {
    pub account: Option<String>,
    pub partition: Option<String>,
    pub nodes: Option<u32>,
    pub ntasks: Option<u32>,
    pub time: Option<String>,
    pub extra_opts: Vec<String>,
}

impl BatchDirectives {
    /// Header lines for a batch script, without the job name and log paths.
    pub fn to_lines(&self, kind: ManagerKind) -> Vec<String> {
        match kind {
            ManagerKind::Slurm => self.slurm_lines(),
            ManagerKind::Pbs => self.pbs_lines(),
        }
    }

    fn slurm_lines(&self) -> Vec<String> {
        let mut opts = Vec::new();
        if let Some(a) = &self.account {
            opts.push(format!("--account={}", a));
        }
        if let Some(p) = &self.partition {
            opts.push(format!("--partition={}", p));
        }
        if let Some(n) = self.nodes {
            opts.push(format!("--nodes={}", n));
        }
        if let Some(n) = self.ntasks {
            opts.push(format!("--ntasks={}", n));
        }
        if let Some(t) = &self.time {
            opts.push(format!("--time={}", t));
        }
        opts.extend(self.extra_opts.iter().cloned());
        opts.into_iter().map(|o| format!("#SBATCH {}", o)).collect()
    }

    fn pbs_lines(&self) -> Vec<String> {
        let mut opts = Vec::new();
        if let Some(a) = &self.account {
            opts.push(format!("-A {}", a));
        }
        if let Some(p) = &self.partition {
            opts.push(format!("-q {}", p));
        }
        match (self.nodes, self.ntasks) {
            (Some(n), Some(t)) => opts.push(format!("-l nodes={}:ppn={}", n, t)),
            (Some(n), None) => opts.push(format!("-l nodes={}", n)),
            (None, Some(t)) => opts.push(format!("-l ncpus={}", t)),
            (None, None) => {}
        }
        if let Some(t) = &self.time {
            opts.push(format!("-l walltime={}", t));
        }
        opts.extend(self.extra_opts.iter().cloned());
        opts.into_iter().map(|o| format!("#PBS {}", o)).collect()
    }
}

/// Resolves directives for one job: scheduler-wide account and partition,
/// then `[resources.defaults]`, then every matching rule in file order.
pub fn resolve_for_job(
    job_name: &str,
    scheduler: &SchedulerConfig,
    resources: Option<&Resources>,
) -> BatchDirectives {
    let mut current = BatchDirectives {
        account: scheduler.account.clone(),
        partition: scheduler.partition.clone(),
        ..Default::default()
    };

    if let Some(r) = resources {
        let d = &r.defaults;
        if d.partition.is_some() {
            current.partition = d.partition.clone();
        }
        current.nodes = d.nodes;
        current.ntasks = d.ntasks;
        current.time = d.time.clone();
        current.extra_opts = d.extra_opts.clone();

        for rule in &r.rules {
            let matches = rule
                .job_glob
                .as_ref()
                .is_none_or(|glob| WildMatch::new(glob).matches(job_name));
            if matches {
                merge_rule(&mut current, rule);
            }
        }
    }

    tracing::debug!("Resolved batch directives for '{}': {:?}", job_name, current);
    current
}

fn merge_rule(current: &mut BatchDirectives, rule: &ResourceRule) {
    if let Some(val) = &rule.partition {
        current.partition = Some(val.clone());
    }
    if let Some(val) = rule.nodes {
        current.nodes = Some(val);
    }
    if let Some(val) = rule.ntasks {
        current.ntasks = Some(val);
    }
    if let Some(val) = &rule.time {
        current.time = Some(val.clone());
    }
    if !rule.extra_opts.is_empty() {
        current.extra_opts = rule.extra_opts.clone();
    }
}
