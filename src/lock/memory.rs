use {
    super::{
        AuctionLocker,
        LockToken,
        ACQUIRE_RETRY_INTERVAL,
    },
    crate::auction::entities::AuctionId,
    async_trait::async_trait,
    std::{
        collections::HashMap,
        time::{
            Duration,
            Instant,
        },
    },
    tokio::sync::Mutex,
    uuid::Uuid,
};

struct Holder {
    token:      LockToken,
    expires_at: Instant,
}

/// Single-process fallback with the same contract and expiry semantics as
/// the distributed locker, used when the Redis backend is disabled.
#[derive(Default)]
pub struct MemoryLocker {
    holders: Mutex<HashMap<AuctionId, Holder>>,
}

impl MemoryLocker {
    pub fn new() -> Self {
        Self::default()
    }

    async fn try_acquire(&self, auction_id: AuctionId, hold_ttl: Duration) -> Option<LockToken> {
        let mut holders = self.holders.lock().await;
        let now = Instant::now();
        match holders.get(&auction_id) {
            Some(holder) if holder.expires_at > now => None,
            _ => {
                let token = Uuid::new_v4();
                holders.insert(
                    auction_id,
                    Holder {
                        token,
                        expires_at: now + hold_ttl,
                    },
                );
                Some(token)
            }
        }
    }
}

#[async_trait]
impl AuctionLocker for MemoryLocker {
    async fn acquire(
        &self,
        auction_id: AuctionId,
        wait_budget: Duration,
        hold_ttl: Duration,
    ) -> anyhow::Result<Option<LockToken>> {
        let deadline = Instant::now() + wait_budget;
        loop {
            if let Some(token) = self.try_acquire(auction_id, hold_ttl).await {
                return Ok(Some(token));
            }
            if Instant::now() + ACQUIRE_RETRY_INTERVAL > deadline {
                return Ok(None);
            }
            tokio::time::sleep(ACQUIRE_RETRY_INTERVAL).await;
        }
    }

    async fn release(&self, auction_id: AuctionId, token: LockToken) {
        let mut holders = self.holders.lock().await;
        if holders
            .get(&auction_id)
            .is_some_and(|holder| holder.token == token)
        {
            holders.remove(&auction_id);
        }
    }
}
