//! Queue module: run-queue ordering and retry backoff.

mod priority;
mod retry;

pub use priority::{PriorityQueue, QueueFull};
pub use retry::RetryPolicy;
