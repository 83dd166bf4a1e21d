use {
    super::Repository,
    crate::{
        api::RestError,
        auction::entities,
    },
    time::OffsetDateTime,
};

impl Repository {
    /// Active auctions whose `end_at` has passed, oldest first, for the
    /// expiry sweeper to conclude batch by batch.
    pub async fn find_expired_auctions(
        &self,
        now: OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<entities::Auction>, RestError> {
        Ok(self
            .db
            .find_expired_auctions(now, limit)
            .await?
            .iter()
            .map(|auction| auction.get_entity())
            .collect())
    }
}
