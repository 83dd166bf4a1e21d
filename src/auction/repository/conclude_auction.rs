use {
    super::{
        models,
        Repository,
    },
    crate::{
        api::RestError,
        auction::entities,
    },
    time::OffsetDateTime,
};

impl Repository {
    /// Active -> Completed/Expired once `end_at` has passed. The guarded
    /// update makes a double conclusion a no-op.
    #[tracing::instrument(skip_all, fields(auction_id = %auction_id, status = ?status))]
    pub async fn conclude_auction(
        &self,
        auction_id: entities::AuctionId,
        status: entities::AuctionStatus,
        winner_bid_id: Option<entities::BidId>,
        now: OffsetDateTime,
    ) -> Result<bool, RestError> {
        self.db
            .conclude_auction(
                auction_id,
                models::AuctionStatus::from(status),
                winner_bid_id,
                now,
            )
            .await
    }
}
