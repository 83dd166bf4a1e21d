use {
    super::Repository,
    crate::{
        api::RestError,
        auction::entities,
        kernel::entities::{
            Page,
            UserId,
        },
    },
};

impl Repository {
    /// Bid history for one auction, newest first.
    pub async fn get_auction_bids(
        &self,
        auction_id: entities::AuctionId,
        page: Page,
    ) -> Result<Vec<entities::Bid>, RestError> {
        Ok(self
            .db
            .get_auction_bids(auction_id, page.limit(), page.offset())
            .await?
            .iter()
            .map(|bid| bid.get_entity())
            .collect())
    }

    /// Everything one user has bid across auctions, newest first.
    pub async fn get_user_bids(
        &self,
        bidder_id: UserId,
        page: Page,
    ) -> Result<Vec<entities::Bid>, RestError> {
        Ok(self
            .db
            .get_user_bids(bidder_id, page.limit(), page.offset())
            .await?
            .iter()
            .map(|bid| bid.get_entity())
            .collect())
    }
}
