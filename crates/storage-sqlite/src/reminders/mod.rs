//! SQLite-backed reminder repository.

pub mod model;
mod repository;

pub use repository::ReminderRepository;
