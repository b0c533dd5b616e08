//! Reminder scheduling and delivery engine.

mod delivery;
mod reconciliation;
mod recurrence;
mod reminders_model;
mod reminders_service;
mod reminders_traits;
mod scheduler;

pub use delivery::*;
pub use reconciliation::*;
pub use recurrence::*;
pub use reminders_model::*;
pub use reminders_service::*;
pub use reminders_traits::*;
pub use scheduler::*;

#[cfg(test)]
mod tests;
