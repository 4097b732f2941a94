//! Docweave: Structured Long-Form Document Generation
//!
//! Turns a free-text instruction into a multi-section document. A run plans per-section
//! budgets, drafts sections concurrently against language-model services, repairs length
//! problems, and assembles the result, streaming progress events the whole way.

pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod logging;
pub mod progress;
pub mod provider;
pub mod text;
