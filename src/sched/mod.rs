//! Coroutine scheduler subsystem.

mod api;
pub(crate) mod core;
pub(crate) mod poller;

pub use api::{alive_count, current_id, sleep_read, sleep_write, spawn, wake_up, yield_now};
pub use self::core::Scheduler;
