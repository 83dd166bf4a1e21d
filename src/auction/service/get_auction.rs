use {
    super::Service,
    crate::{
        api::RestError,
        auction::entities,
    },
};

pub struct GetAuctionInput {
    pub auction_id: entities::AuctionId,
}

impl Service {
    /// Detail view: the auction plus its current top bid from one
    /// consistent, non-locking read.
    pub async fn get_auction(
        &self,
        input: GetAuctionInput,
    ) -> Result<(entities::Auction, Option<entities::Bid>), RestError> {
        self.repo.get_auction_with_top_bid(input.auction_id).await
    }
}
