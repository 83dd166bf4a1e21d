use {
    super::Repository,
    crate::{
        api::RestError,
        auction::entities,
    },
    time::OffsetDateTime,
};

impl Repository {
    /// Returns `false` when the auction is already terminal or has bids.
    #[tracing::instrument(skip_all, fields(auction_id = %auction_id))]
    pub async fn cancel_auction(
        &self,
        auction_id: entities::AuctionId,
        now: OffsetDateTime,
    ) -> Result<bool, RestError> {
        self.db.cancel_auction(auction_id, now).await
    }
}
