use {
    super::Service,
    crate::{
        api::{
            ws::{
                AuctionStatusEvent,
                UpdateEvent,
            },
            RestError,
        },
        auction::entities,
        kernel::entities::UserId,
    },
    time::OffsetDateTime,
};

pub struct ActivateAuctionInput {
    pub auction_id: entities::AuctionId,
    pub caller_id:  UserId,
}

impl Service {
    /// Pending -> Active by the seller, under the same per-auction lock as
    /// bids so a bid can never observe a half-applied transition.
    #[tracing::instrument(skip_all, fields(auction_id = %input.auction_id), err(level = tracing::Level::TRACE))]
    pub async fn activate_auction(
        &self,
        input: ActivateAuctionInput,
    ) -> Result<entities::Auction, RestError> {
        let guard = self.lock_auction(input.auction_id).await?;
        let result = self.activate_auction_locked(input).await;
        guard.release().await;
        result
    }

    async fn activate_auction_locked(
        &self,
        input: ActivateAuctionInput,
    ) -> Result<entities::Auction, RestError> {
        let mut auction = self.repo.get_auction(input.auction_id).await?;
        if auction.seller_id != input.caller_id {
            return Err(RestError::BusinessRule(
                "Only the seller can activate this auction".to_string(),
            ));
        }
        if auction.status != entities::AuctionStatus::Pending {
            return Err(RestError::BusinessRule(
                "Only pending auctions can be activated".to_string(),
            ));
        }
        let now = OffsetDateTime::now_utc();
        if auction.end_at <= now {
            return Err(RestError::BusinessRule(
                "Auction end time has already passed".to_string(),
            ));
        }

        if !self.repo.activate_auction(auction.id, now).await? {
            return Err(RestError::Conflict);
        }
        auction.status = entities::AuctionStatus::Active;
        auction.start_at = now;
        auction.updated_at = now;

        self.emit(UpdateEvent::AuctionStatusChanged(AuctionStatusEvent {
            auction_id: auction.id,
            status:     auction.status,
            message:    "Auction is now open for bids".to_string(),
            winner_bid: None,
        }));
        Ok(auction)
    }
}
