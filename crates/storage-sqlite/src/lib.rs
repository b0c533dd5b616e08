//! SQLite storage layer for tracklet, built on diesel.

pub mod db;
pub mod errors;
pub mod reminders;
pub mod schema;

pub use reminders::ReminderRepository;
