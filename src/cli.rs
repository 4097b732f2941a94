//! CLI domain: parse, route, output, and presentation only.
//! No generation logic; a single route table dispatches to domain services.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{CacheCommands, Cli, Commands, RequestArgs};
pub use presentation::{format_event_json, format_event_line, format_plan_text};
pub use route::CliContext;
