//! Row structs read from and written to the database.
//!
//! Each submodule holds the `FromRow` entity structs for one area of the
//! schema, plus the small DTOs the repositories return.

pub mod calculation;
pub mod history;
pub mod job;
pub mod request;
pub mod result;
