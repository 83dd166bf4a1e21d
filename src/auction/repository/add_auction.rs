use {
    super::Repository,
    crate::{
        api::RestError,
        auction::entities,
    },
};

impl Repository {
    #[tracing::instrument(skip_all, fields(auction_id = %auction.id), err(level = tracing::Level::TRACE))]
    pub async fn add_auction(&self, auction: &entities::Auction) -> Result<(), RestError> {
        self.db.add_auction(auction).await
    }
}
