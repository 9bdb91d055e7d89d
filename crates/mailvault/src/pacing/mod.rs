//! Pacing of outbound calls
//!
//! - Token-bucket rate governor shared by all calls against one quota
//! - Retry combinator with exponential backoff
//! - Cooperative cancellation for every wait point

mod cancel;
mod governor;
mod retry;

pub use cancel::CancelToken;
pub use governor::RateGovernor;
pub use retry::{Attempt, RetryPolicy};
