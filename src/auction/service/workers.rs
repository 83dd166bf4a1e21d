use {
    super::{
        conclude_auctions::ConcludeAuctionInput,
        Service,
    },
    crate::{
        api::RestError,
        server::{
            EXIT_CHECK_INTERVAL,
            SHOULD_EXIT,
        },
    },
    anyhow::Result,
    std::{
        sync::atomic::Ordering,
        time::Duration,
    },
    time::OffsetDateTime,
};

const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const EXPIRY_BATCH_SIZE: i64 = 50;

impl Service {
    /// Periodic sweep that turns Active auctions past `end_at` into
    /// Completed/Expired. The guard in bid admission already makes such
    /// auctions unbiddable; this loop materializes the terminal state and
    /// emits the closing events.
    pub async fn run_expiry_loop(&self) -> Result<()> {
        tracing::info!("Starting auction expiry sweeper...");
        let mut sweep_interval = tokio::time::interval(EXPIRY_SWEEP_INTERVAL);
        let mut exit_check_interval = tokio::time::interval(EXIT_CHECK_INTERVAL);
        while !SHOULD_EXIT.load(Ordering::Acquire) {
            tokio::select! {
                _ = sweep_interval.tick() => {
                    if let Err(e) = self.sweep_expired_auctions().await {
                        tracing::error!(error = ?e, "Expiry sweep failed");
                    }
                }
                _ = exit_check_interval.tick() => {}
            }
        }
        tracing::info!("Shutting down auction expiry sweeper...");
        Ok(())
    }

    async fn sweep_expired_auctions(&self) -> Result<(), RestError> {
        let now = OffsetDateTime::now_utc();
        let expired = self.repo.find_expired_auctions(now, EXPIRY_BATCH_SIZE).await?;
        for auction in expired {
            // Per-auction failures leave the rest of the batch alone; the
            // next sweep picks the stragglers up again.
            if let Err(e) = self
                .conclude_auction(ConcludeAuctionInput {
                    auction_id: auction.id,
                })
                .await
            {
                tracing::error!(
                    auction_id = auction.id.to_string(),
                    error = ?e,
                    "Failed to conclude expired auction"
                );
            }
        }
        Ok(())
    }
}
