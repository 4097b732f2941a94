//! Integration tests for docweave generation runs

mod cache_idempotence;
mod cli_logging;
mod config_loading;
mod event_stream;
mod scenarios;
mod scheduler_bounds;
mod stall_guard;
pub mod support;
mod text_properties;
