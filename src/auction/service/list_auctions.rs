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
    time::OffsetDateTime,
};

pub struct ListActiveAuctionsInput {
    pub category_id: Option<entities::CategoryId>,
    pub page:        Page,
}

pub struct ListSellerAuctionsInput {
    pub seller_id: UserId,
    pub page:      Page,
}

impl Service {
    /// Active auctions ordered by how soon they end. With a category the
    /// category must exist; browsing an unknown one is a not-found.
    pub async fn list_active_auctions(
        &self,
        input: ListActiveAuctionsInput,
    ) -> Result<Vec<entities::Auction>, RestError> {
        if let Some(category_id) = input.category_id {
            self.repo.get_category(category_id).await?;
        }
        self.repo
            .list_active_auctions(OffsetDateTime::now_utc(), input.category_id, input.page)
            .await
    }

    pub async fn list_seller_auctions(
        &self,
        input: ListSellerAuctionsInput,
    ) -> Result<Vec<entities::Auction>, RestError> {
        self.repo
            .list_auctions_by_seller(input.seller_id, input.page)
            .await
    }

    pub async fn count_active_auctions(&self) -> Result<i64, RestError> {
        self.repo
            .count_active_auctions(OffsetDateTime::now_utc())
            .await
    }
}
