pub mod errors;
pub mod events;
pub mod reminders;
pub mod utils;

pub use errors::{Error, Result};
