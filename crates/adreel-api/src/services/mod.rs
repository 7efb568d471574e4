//! Business logic services.

pub mod quota;
pub mod teams;
pub mod timeout;

pub use quota::{QuotaService, TeamUsage};
pub use teams::TeamService;
pub use timeout::TimeoutSweeper;
