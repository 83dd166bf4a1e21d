#[cfg(test)]
use mockall::automock;
use {
    crate::auction::entities::AuctionId,
    async_trait::async_trait,
    std::{
        sync::Arc,
        time::Duration,
    },
    uuid::Uuid,
};

pub mod memory;
pub mod redis;

pub use {
    memory::MemoryLocker,
    redis::RedisLocker,
};

/// Budget a caller is willing to block waiting for the lock.
pub const DEFAULT_WAIT_BUDGET: Duration = Duration::from_secs(5);
/// Upper bound on how long a crashed holder can keep an auction frozen.
pub const DEFAULT_HOLD_TTL: Duration = Duration::from_secs(10);
pub const ACQUIRE_RETRY_INTERVAL: Duration = Duration::from_millis(10);

pub type LockToken = Uuid;

/// Per-auction mutual exclusion across every server instance.
///
/// `acquire` returns a fresh owner token if the caller became the sole
/// holder within `wait_budget`, `None` on timeout. `release` is fenced on
/// the token: a non-matching or absent holder is a silent no-op, since the
/// prior holder's TTL already fired and someone else may own the lock now.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuctionLocker: Send + Sync + 'static {
    async fn acquire(
        &self,
        auction_id: AuctionId,
        wait_budget: Duration,
        hold_ttl: Duration,
    ) -> anyhow::Result<Option<LockToken>>;

    async fn release(&self, auction_id: AuctionId, token: LockToken);
}

/// Holds an acquired lock and guarantees release on every exit path.
///
/// Prefer the explicit `release().await`; the `Drop` fallback spawns the
/// release so a request cancelled mid-critical-section still frees the
/// auction without waiting out the TTL.
pub struct LockGuard {
    locker:     Arc<dyn AuctionLocker>,
    auction_id: AuctionId,
    token:      Option<LockToken>,
}

impl LockGuard {
    pub fn new(locker: Arc<dyn AuctionLocker>, auction_id: AuctionId, token: LockToken) -> Self {
        Self {
            locker,
            auction_id,
            token: Some(token),
        }
    }

    pub async fn release(mut self) {
        if let Some(token) = self.token.take() {
            self.locker.release(self.auction_id, token).await;
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            let locker = self.locker.clone();
            let auction_id = self.auction_id;
            tokio::spawn(async move {
                locker.release(auction_id, token).await;
            });
        }
    }
}
