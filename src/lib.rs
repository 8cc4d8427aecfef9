//! Stackful cooperative concurrency: coroutines and generators over one
//! register-switching core.
//!
//! This crate provides two primitives built on the same foundation, raw
//! CPU-register context switching on manually managed stacks:
//!
//! - **Coroutines**: lightweight tasks round-robin scheduled on a single
//!   thread, with readiness-driven blocking on file descriptors.
//! - **Generators**: stackful producer/consumer pairs exchanging values
//!   through an explicit yield/next protocol, with nesting support.
//!
//! # Architecture
//!
//! - **Scheduler**: active/asleep/dead task sets, round-robin dispatch and
//!   readiness resolution via `poll(2)`
//! - **StackPool**: fixed-capacity mapped stacks, seeded register frames,
//!   dead-id recycling
//! - **arch**: the five context-switch primitives, the only code that
//!   touches raw registers
//! - **Generator**: per-thread frame stack implementing the yield/next
//!   value-exchange protocol
//! - **SchedulerBuilder**: fluent builder for scheduler instantiation
//!
//! Control transfers only at explicit suspension points ([`yield_now`],
//! [`sleep_read`]/[`sleep_write`], generator [`Generator::next`] and
//! [`yield_value`], or task/generator completion); there is no preemption
//! and no locking, because exactly one context is ever live per scheduler.

mod arch;
mod builder;
mod error;
mod generator;
mod sched;
mod stack;

pub use builder::SchedulerBuilder;
pub use error::ConfigError;
pub use generator::{Generator, GeneratorIter, yield_value};
pub use sched::{
    Scheduler, alive_count, current_id, sleep_read, sleep_write, spawn, wake_up, yield_now,
};

/// Index of a task in the scheduler's context table. Never reused while the
/// task is active or asleep; reclaimed only after it finishes.
pub type TaskId = usize;
