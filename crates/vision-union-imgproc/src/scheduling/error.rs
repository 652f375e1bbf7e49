use thiserror::Error;

/// Errors raised by the task layer.
#[derive(Error, Debug, PartialEq)]
pub enum SchedulerError {
    /// A dedicated pool was requested with zero threads.
    #[error("Invalid number of threads: {0}")]
    InvalidThreadCount(usize),

    /// Failed to build the dedicated thread pool.
    #[error("Failed to build thread pool: {0}")]
    BuildError(String),

    /// The task completed without producing a value.
    ///
    /// Its closure failed or panicked, or one of its dependencies had no value.
    #[error("Task {0} completed without producing a value")]
    MissingOutput(usize),

    /// The value of the task is still referenced by another task.
    #[error("Task {0} output is still shared")]
    OutputShared(usize),
}
