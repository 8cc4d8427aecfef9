//! Configuration errors.
//!
//! Failures inside the switching machinery itself are fatal by design, since
//! a half-completed context switch cannot be unwound. The only reportable
//! errors are in configuration taken from the caller before anything runs.

use thiserror::Error;

/// Rejected runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The requested stack capacity is too small to hold the seeded frame
    /// and a useful call chain.
    #[error("stack capacity of {requested} bytes is below the {minimum} byte minimum")]
    StackTooSmall { requested: usize, minimum: usize },

    /// Stack regions are whole-page mappings; the capacity must be a
    /// multiple of the page size.
    #[error("stack capacity of {requested} bytes is not a multiple of the {page_size} byte page size")]
    UnalignedStackCapacity { requested: usize, page_size: usize },
}
