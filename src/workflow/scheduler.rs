//! Injected wait scheduler
//!
//! Waits between polling attempts go through this trait instead of a global
//! timer, so the 24-iteration polling properties can run under test without
//! wall-clock delay.

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Production scheduler backed by the tokio timer.
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
