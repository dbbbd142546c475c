pub mod fake_manager;
pub mod project;
