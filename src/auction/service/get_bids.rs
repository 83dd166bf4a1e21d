use {
    super::Service,
    crate::{
        api::RestError,
        auction::entities,
        kernel::entities::{
            Page,
            UserId,
        },
    },
};

pub struct GetAuctionBidsInput {
    pub auction_id: entities::AuctionId,
    pub page:       Page,
}

pub struct GetUserBidsInput {
    pub bidder_id: UserId,
    pub page:      Page,
}

impl Service {
    /// Bid history for an auction, newest first. Asking for an unknown
    /// auction is a not-found, not an empty page.
    pub async fn get_auction_bids(
        &self,
        input: GetAuctionBidsInput,
    ) -> Result<Vec<entities::Bid>, RestError> {
        self.repo.get_auction(input.auction_id).await?;
        self.repo.get_auction_bids(input.auction_id, input.page).await
    }

    pub async fn get_user_bids(
        &self,
        input: GetUserBidsInput,
    ) -> Result<Vec<entities::Bid>, RestError> {
        self.repo.get_user_bids(input.bidder_id, input.page).await
    }
}
