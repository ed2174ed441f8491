//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` (or a connection inside a caller's transaction) as
//! the first argument.

pub mod calculation_repo;
pub mod history_repo;
pub mod request_repo;
pub mod result_repo;
pub mod user_repo;

pub use calculation_repo::CalculationRepo;
pub use history_repo::HistoryRepo;
pub use request_repo::CalculationRequestRepo;
pub use result_repo::ResultRepo;
pub use user_repo::UserRepo;
