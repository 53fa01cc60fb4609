//! Utility modules for aiops-core
//!
//! - retry: Retry logic with exponential backoff and cancellation

mod retry;

pub use retry::{retry_with_backoff, RetryConfig, RetryError};
