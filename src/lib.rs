pub mod constants;
pub mod config;
pub mod error;
pub mod logging;
pub mod table;

pub mod pipeline;

// Layered boundaries for application ports and infrastructure adapters
pub mod app;
pub mod infra;

pub mod observability;
