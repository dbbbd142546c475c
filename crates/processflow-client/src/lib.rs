pub mod error;
pub mod manager;
pub mod pbs;
pub mod resources;
pub mod runner;
pub mod script;
pub mod slurm;

pub use error::{ClientError, ManagerError, Result};
pub use manager::{new_manager, ResourceManager};
pub use runner::{CommandOutput, CommandRunner, LocalCommandRunner};
