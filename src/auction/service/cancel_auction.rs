use {
    super::Service,
    crate::{
        api::{
            ws::{
                AuctionStatusEvent,
                UpdateEvent,
            },
            RestError,
        },
        auction::entities,
        kernel::entities::UserId,
    },
    time::OffsetDateTime,
};

pub struct CancelAuctionInput {
    pub auction_id: entities::AuctionId,
    pub caller_id:  UserId,
}

impl Service {
    /// Seller-initiated cancel, legal only while the auction has zero
    /// bids. Held under the auction lock so a racing bid either lands
    /// before the cancel (and blocks it) or observes the cancelled state.
    #[tracing::instrument(skip_all, fields(auction_id = %input.auction_id), err(level = tracing::Level::TRACE))]
    pub async fn cancel_auction(
        &self,
        input: CancelAuctionInput,
    ) -> Result<entities::Auction, RestError> {
        let guard = self.lock_auction(input.auction_id).await?;
        let result = self.cancel_auction_locked(input).await;
        guard.release().await;
        result
    }

    async fn cancel_auction_locked(
        &self,
        input: CancelAuctionInput,
    ) -> Result<entities::Auction, RestError> {
        let mut auction = self.repo.get_auction(input.auction_id).await?;
        if auction.seller_id != input.caller_id {
            return Err(RestError::BusinessRule(
                "Only the seller can cancel this auction".to_string(),
            ));
        }
        if auction.status.is_terminal() {
            return Err(RestError::BusinessRule(
                "Auction has already concluded".to_string(),
            ));
        }
        if self.repo.count_bids(auction.id).await? > 0 {
            return Err(RestError::BusinessRule(
                "Cannot cancel an auction with bids".to_string(),
            ));
        }

        let now = OffsetDateTime::now_utc();
        if !self.repo.cancel_auction(auction.id, now).await? {
            return Err(RestError::Conflict);
        }
        auction.status = entities::AuctionStatus::Cancelled;
        auction.updated_at = now;

        self.emit(UpdateEvent::AuctionStatusChanged(AuctionStatusEvent {
            auction_id: auction.id,
            status:     auction.status,
            message:    "Auction was cancelled by the seller".to_string(),
            winner_bid: None,
        }));
        Ok(auction)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::auction::repository::{
            Auction as AuctionRow,
            AuctionStatus as AuctionStatusRow,
            MockDatabase,
        },
        bigdecimal::BigDecimal,
        std::str::FromStr,
        time::{
            Duration,
            PrimitiveDateTime,
        },
        uuid::Uuid,
    };

    fn primitive(datetime: OffsetDateTime) -> PrimitiveDateTime {
        PrimitiveDateTime::new(datetime.date(), datetime.time())
    }

    fn active_row(seller_id: UserId) -> AuctionRow {
        let now = OffsetDateTime::now_utc();
        let price = BigDecimal::from_str("75.00").unwrap();
        AuctionRow {
            id: Uuid::new_v4(),
            title: "Cast iron doorstop".to_string(),
            description: "Painted terrier".to_string(),
            image_url: None,
            starting_price: price.clone(),
            current_price: price,
            reserve_price: None,
            min_increment: BigDecimal::from_str("5.00").unwrap(),
            start_at: primitive(now - Duration::hours(1)),
            end_at: primitive(now + Duration::days(1)),
            status: AuctionStatusRow::Active,
            seller_id,
            category_id: Uuid::new_v4(),
            winner_bid_id: None,
            created_at: primitive(now),
            updated_at: primitive(now),
        }
    }

    #[tokio::test]
    async fn seller_cancels_bidless_auction() {
        let seller_id = Uuid::new_v4();
        let row = active_row(seller_id);
        let auction_id = row.id;

        let mut db = MockDatabase::new();
        db.expect_get_auction().returning(move |_| Ok(row.clone()));
        db.expect_count_bids().returning(|_| Ok(0));
        db.expect_cancel_auction().returning(|_, _| Ok(true));

        let (service, mut events) = Service::new_with_mock_db(db);
        let auction = service
            .cancel_auction(CancelAuctionInput {
                auction_id,
                caller_id: seller_id,
            })
            .await
            .unwrap();
        assert_eq!(auction.status, entities::AuctionStatus::Cancelled);
        assert!(matches!(
            events.try_recv().unwrap(),
            UpdateEvent::AuctionStatusChanged(_)
        ));
    }

    #[tokio::test]
    async fn cancel_is_refused_once_a_bid_exists() {
        let seller_id = Uuid::new_v4();
        let row = active_row(seller_id);
        let auction_id = row.id;

        let mut db = MockDatabase::new();
        db.expect_get_auction().returning(move |_| Ok(row.clone()));
        db.expect_count_bids().returning(|_| Ok(1));

        let (service, _events) = Service::new_with_mock_db(db);
        let result = service
            .cancel_auction(CancelAuctionInput {
                auction_id,
                caller_id: seller_id,
            })
            .await;
        assert_eq!(
            result.unwrap_err(),
            RestError::BusinessRule("Cannot cancel an auction with bids".to_string())
        );
    }

    #[tokio::test]
    async fn concluded_auction_cannot_be_cancelled() {
        let seller_id = Uuid::new_v4();
        let mut row = active_row(seller_id);
        row.status = AuctionStatusRow::Completed;
        let auction_id = row.id;

        let mut db = MockDatabase::new();
        db.expect_get_auction().returning(move |_| Ok(row.clone()));

        let (service, _events) = Service::new_with_mock_db(db);
        let result = service
            .cancel_auction(CancelAuctionInput {
                auction_id,
                caller_id: seller_id,
            })
            .await;
        assert!(matches!(result.unwrap_err(), RestError::BusinessRule(_)));
    }
}
