// notification_service/src/lib.rs
//! Recurring notification jobs: the day-before appointment reminder sweep,
//! the daily diary nudge, and the daily birthday check.

pub mod jobs;
pub mod scheduler;

pub use jobs::Jobs;
pub use scheduler::Scheduler;
