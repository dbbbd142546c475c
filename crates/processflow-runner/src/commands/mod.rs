use processflow_client::{new_manager, LocalCommandRunner, ResourceManager};
use processflow_core::config::Config;
use std::time::Duration;

pub mod cancel;
pub mod plan;
pub mod queue;
pub mod run;

/// A resource manager client whose every command is bounded by the
/// configured query timeout.
pub(crate) fn build_manager(config: &Config) -> Box<dyn ResourceManager> {
    let runner =
        LocalCommandRunner::new(Duration::from_secs(config.scheduler.query_timeout_secs));
    new_manager(config.scheduler.manager, Box::new(runner))
}
