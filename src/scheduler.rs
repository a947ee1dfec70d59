// Delay source for reconnect timers; swapped out in tests

use futures_util::future::BoxFuture;
use std::time::Duration;

/// Produces the future the transport awaits between reconnect attempts.
/// Dropping the future cancels the pending attempt.
pub trait Scheduler: Send + Sync + 'static {
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()>;
}

/// Wall-clock timers on the tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(delay))
    }
}
