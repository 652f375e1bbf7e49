//! Task layer
//!
//! Units of work run on a rayon pool once every unit they depend on has
//! completed. Completing a unit releases its dependents, so a worker never
//! blocks waiting for another unit; blocking only happens in
//! [`TaskHandle::complete`].

mod error;
pub use error::SchedulerError;

mod handle;
pub use handle::{Task, TaskHandle};

mod scheduler;
pub use scheduler::Scheduler;
