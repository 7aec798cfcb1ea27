// models/src/lib.rs

pub mod appointment;
pub mod diary;
pub mod errors;
pub mod patient;

pub use appointment::Appointment;
pub use diary::DiaryEntry;
pub use errors::{BotError, BotResult};
pub use patient::Patient;
