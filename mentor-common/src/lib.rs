pub mod allocator;
pub mod capacity;
pub mod error;
pub mod metrics;
pub mod registration;
pub mod retry;
pub mod stats;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
