//! Text primitives shared by planning, drafting and aggregation.
//!
//! Everything here is deterministic and model-free: section identity, length measurement
//! that ignores structured markers, and the cleanup rules applied to model output.

pub mod measure;
pub mod sanitize;
pub mod token;

pub use measure::{body_len, paragraphs, strip_markers};
pub use token::SectionToken;
