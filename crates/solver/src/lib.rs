//! Client side of the external compute service.
//!
//! [`api::SolverApi`] wraps the service's HTTP endpoints; [`pump::pump`]
//! drives an event-stream body through the line splitter and parser,
//! forwarding each line and reporting how the stream ended.

pub mod api;
pub mod pump;

pub use api::{SolverApi, SolverError, SolverReply};
pub use pump::{pump, StreamOutcome};
