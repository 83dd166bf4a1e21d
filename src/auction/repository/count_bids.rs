use {
    super::Repository,
    crate::{
        api::RestError,
        auction::entities,
    },
};

impl Repository {
    pub async fn count_bids(
        &self,
        auction_id: entities::AuctionId,
    ) -> Result<i64, RestError> {
        self.db.count_bids(auction_id).await
    }
}
