//! Fluent builder for Scheduler construction.
//!
//! Provides a builder pattern interface for creating and configuring
//! Scheduler instances.

use crate::error::ConfigError;
use crate::sched::Scheduler;
use crate::stack;

/// Builder for constructing [`Scheduler`] instances with a fluent API.
///
/// The only tunable today is the per-task stack capacity; the default is a
/// large multiple of the page size.
///
/// # Example
/// ```ignore
/// let sched = SchedulerBuilder::new()
///     .stack_capacity(1 << 20)
///     .build()?;
/// ```
pub struct SchedulerBuilder {
    stack_capacity: usize,
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            stack_capacity: stack::default_stack_capacity(),
        }
    }

    /// Sets the stack capacity, in bytes, of every spawned task.
    ///
    /// Must be page-aligned and large enough for the seeded frame and a
    /// useful call chain; validated by [`build`](Self::build).
    pub fn stack_capacity(mut self, bytes: usize) -> Self {
        self.stack_capacity = bytes;
        self
    }

    /// Validates the configuration and constructs the scheduler.
    pub fn build(self) -> Result<Scheduler, ConfigError> {
        stack::validate_capacity(self.stack_capacity)?;

        Ok(Scheduler::with_stack_capacity(self.stack_capacity))
    }
}
