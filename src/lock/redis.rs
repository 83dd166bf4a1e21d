use {
    super::{
        AuctionLocker,
        LockToken,
        ACQUIRE_RETRY_INTERVAL,
    },
    crate::auction::entities::AuctionId,
    anyhow::anyhow,
    async_trait::async_trait,
    redis::aio::ConnectionManager,
    std::time::{
        Duration,
        Instant,
    },
    uuid::Uuid,
};

// Deletes the key only when the caller still owns it, in one round trip.
const RELEASE_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

/// Distributed per-auction lock on a single Redis key: `SET NX PX` with a
/// random owner token, released by a compare-and-delete script. The PX
/// expiry is what bounds the damage of a holder that dies mid-section.
pub struct RedisLocker {
    connection:     ConnectionManager,
    release_script: redis::Script,
}

impl RedisLocker {
    pub async fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| anyhow!("Invalid Redis url({}): {:?}", redis_url, e))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| anyhow!("Failed to connect to Redis at {}: {:?}", redis_url, e))?;
        Ok(Self {
            connection,
            release_script: redis::Script::new(RELEASE_SCRIPT),
        })
    }

    fn lock_key(auction_id: AuctionId) -> String {
        format!("auction_lock:{}", auction_id)
    }

    async fn try_acquire(
        &self,
        key: &str,
        token: LockToken,
        hold_ttl: Duration,
    ) -> anyhow::Result<bool> {
        let mut connection = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token.to_string())
            .arg("NX")
            .arg("PX")
            .arg(hold_ttl.as_millis() as u64)
            .query_async(&mut connection)
            .await
            .map_err(|e| anyhow!("Lock backend SET failed: {:?}", e))?;
        Ok(reply.is_some())
    }
}

#[async_trait]
impl AuctionLocker for RedisLocker {
    async fn acquire(
        &self,
        auction_id: AuctionId,
        wait_budget: Duration,
        hold_ttl: Duration,
    ) -> anyhow::Result<Option<LockToken>> {
        let key = Self::lock_key(auction_id);
        let token = Uuid::new_v4();
        let deadline = Instant::now() + wait_budget;
        loop {
            if self.try_acquire(&key, token, hold_ttl).await? {
                return Ok(Some(token));
            }
            if Instant::now() + ACQUIRE_RETRY_INTERVAL > deadline {
                return Ok(None);
            }
            tokio::time::sleep(ACQUIRE_RETRY_INTERVAL).await;
        }
    }

    async fn release(&self, auction_id: AuctionId, token: LockToken) {
        let mut connection = self.connection.clone();
        let result: Result<i64, _> = self
            .release_script
            .key(Self::lock_key(auction_id))
            .arg(token.to_string())
            .invoke_async(&mut connection)
            .await;
        if let Err(e) = result {
            // The TTL will free the lock; nothing else to do here.
            tracing::warn!(
                auction_id = auction_id.to_string(),
                error = ?e,
                "Failed to release auction lock"
            );
        }
    }
}
