//! Progress event stream.
//!
//! Every observable step of a run is a [`ProgressEvent`] pushed through an [`EventBus`].
//! Consumers read events strictly in emission order; at the transport boundary unknown
//! kinds are carried as [`StreamEvent::Passthrough`].

pub mod bus;
pub mod event;

pub use bus::EventBus;
pub use event::{PhaseMark, ProgressEvent, RunPhase, SectionPhase, StreamEvent};
