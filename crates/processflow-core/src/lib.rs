pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod event_log;
pub mod layout;
pub mod logging;
pub mod model;
pub mod registry;
pub mod status_map;
