use {
    super::Repository,
    crate::{
        api::RestError,
        auction::entities,
    },
    time::OffsetDateTime,
};

impl Repository {
    /// Pending -> Active, stamping `start_at` with the activation instant.
    /// Returns `false` when the auction is no longer Pending.
    #[tracing::instrument(skip_all, fields(auction_id = %auction_id))]
    pub async fn activate_auction(
        &self,
        auction_id: entities::AuctionId,
        now: OffsetDateTime,
    ) -> Result<bool, RestError> {
        self.db.activate_auction(auction_id, now).await
    }
}
