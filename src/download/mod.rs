//! Module for transferring files from HTTP sources
//!
//! This module provides the single-resource transfer engine and the retry policy
//! that the course orchestrator wraps around it.

mod http;
mod models;
mod retry;

// Re-export the public API
pub use http::Downloader;
pub use models::{Progress, TransferError, TransferOutcome};
pub use retry::{Attempt, Attempted, DEFAULT_MAX_ATTEMPTS, RetryOutcome, RetryPolicy};
