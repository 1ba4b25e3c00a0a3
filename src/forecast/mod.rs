pub mod config;
pub mod orchestrator;
pub mod progress;
pub mod task;
