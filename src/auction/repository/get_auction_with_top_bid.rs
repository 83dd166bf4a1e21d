use {
    super::Repository,
    crate::{
        api::RestError,
        auction::entities,
    },
};

impl Repository {
    /// Single consistent read of the auction and its current top bid, the
    /// snapshot every validation inside the critical section works from.
    pub async fn get_auction_with_top_bid(
        &self,
        auction_id: entities::AuctionId,
    ) -> Result<(entities::Auction, Option<entities::Bid>), RestError> {
        let (auction, top_bid) = self.db.get_auction_with_top_bid(auction_id).await?;
        Ok((auction.get_entity(), top_bid.map(|bid| bid.get_entity())))
    }
}
