pub mod config;
pub mod journey;
pub mod task;
