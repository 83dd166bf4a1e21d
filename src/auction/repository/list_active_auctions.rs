use {
    super::Repository,
    crate::{
        api::RestError,
        auction::entities,
        kernel::entities::Page,
    },
    time::OffsetDateTime,
};

impl Repository {
    /// Active auctions that have not ended, soonest-ending first,
    /// optionally narrowed to one category.
    pub async fn list_active_auctions(
        &self,
        now: OffsetDateTime,
        category_id: Option<entities::CategoryId>,
        page: Page,
    ) -> Result<Vec<entities::Auction>, RestError> {
        Ok(self
            .db
            .list_active_auctions(now, category_id, page.limit(), page.offset())
            .await?
            .iter()
            .map(|auction| auction.get_entity())
            .collect())
    }

    pub async fn count_active_auctions(&self, now: OffsetDateTime) -> Result<i64, RestError> {
        self.db.count_active_auctions(now).await
    }
}
