pub mod backend;
pub mod config;
pub mod coordinator;
pub mod preflight;
pub mod process;
pub mod rate_limit;
pub mod resolver;
pub mod run_tracker;
