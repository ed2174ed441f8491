//! Pure domain logic for the loadplan service.
//!
//! Nothing in this crate performs I/O: the job registry contract, the
//! push-event stream parser, result reconciliation and request-link
//! matching are all plain functions and types so they can be exercised
//! without a database or a running compute service.

pub mod calculation;
pub mod error;
pub mod event_stream;
pub mod job_registry;
pub mod reconcile;
pub mod request_link;
pub mod result_view;
pub mod types;
