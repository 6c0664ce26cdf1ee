//! Retry and backoff policy for remote store transfers.
//!
//! This module encapsulates error classification (timeouts, throttling,
//! connection failures, explicit rate limits) and exponential backoff
//! decisions so the delivery pipeline applies one explicit, bounded policy.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::StoreError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::{run_with_retry, run_with_retry_until, RetryExhausted};
