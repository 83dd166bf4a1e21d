use {
    super::Repository,
    crate::{
        api::RestError,
        auction::entities,
    },
    bigdecimal::BigDecimal,
};

impl Repository {
    /// The only write path for bids: one transaction inserting the new
    /// winning bid, clearing the prior winner's flag, and re-pricing the
    /// auction. `false` means the auction was concurrently mutated and the
    /// caller should surface a retryable conflict.
    #[tracing::instrument(skip_all, fields(auction_id = %bid.auction_id, bid_id = %bid.id), err(level = tracing::Level::TRACE))]
    pub async fn add_bid_and_update_auction(
        &self,
        bid: &entities::Bid,
        prior_top_bid_id: Option<entities::BidId>,
        expected_price: &BigDecimal,
        new_price: &BigDecimal,
    ) -> Result<bool, RestError> {
        self.db
            .add_bid_and_update_auction(bid, prior_top_bid_id, expected_price, new_price)
            .await
    }
}
