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
    pub async fn list_auctions_by_seller(
        &self,
        seller_id: UserId,
        page: Page,
    ) -> Result<Vec<entities::Auction>, RestError> {
        Ok(self
            .db
            .list_auctions_by_seller(seller_id, page.limit(), page.offset())
            .await?
            .iter()
            .map(|auction| auction.get_entity())
            .collect())
    }
}
